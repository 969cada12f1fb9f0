/// Errors returned by the session handle.
///
/// Transport faults inside a running session are never returned here; the
/// session recovers from them by reconnecting.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// `connect` was called without a URL and none was configured.
    #[error("no URL provided")]
    MissingUrl,

    /// A command vector does not match the motor channel count.
    #[error("commands must be set for exactly {expected} channels (got {actual})")]
    Shape { expected: usize, actual: usize },

    /// A network SSID or passphrase does not fit its 1-byte length prefix.
    #[error("{field} is {len} bytes (max {max})")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    /// Frame encoding failed.
    #[error("frame error: {0}")]
    Frame(#[from] motordrive_frame::FrameError),

    /// The session task is no longer running.
    #[error("session stopped")]
    Stopped,
}

pub type Result<T> = std::result::Result<T, SessionError>;

/// Errors that can occur while opening or using a driver socket.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The URL could not be used to open a socket.
    #[error("invalid socket url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The socket failed before it reached the open state.
    #[error("failed to connect to {url}: {source}")]
    Connect {
        url: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// An accepted stream did not complete the WebSocket handshake.
    #[error("failed to accept socket from {peer}: {source}")]
    Accept {
        peer: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The peer refused the connection (in-memory transport fault injection).
    #[error("connection to {0} refused")]
    Refused(String),

    /// An I/O error occurred on the underlying stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;

use std::fmt;
use std::io;

use motordrive_frame::FrameError;
use motordrive_session::SessionError;
use motordrive_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::AddrInUse
        | io::ErrorKind::AddrNotAvailable => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Io(source) => io_error(context, source),
        TransportError::InvalidUrl { .. } => CliError::new(USAGE, format!("{context}: {err}")),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Shape { .. }
        | FrameError::FieldTooLong { .. }
        | FrameError::MissingLimits { .. } => CliError::new(USAGE, format!("{context}: {err}")),
        other => CliError::new(DATA_INVALID, format!("{context}: {other}")),
    }
}

pub fn session_error(context: &str, err: SessionError) -> CliError {
    match err {
        SessionError::Frame(err) => frame_error(context, err),
        SessionError::MissingUrl | SessionError::Shape { .. } | SessionError::FieldTooLong { .. } => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        SessionError::Stopped => CliError::new(FAILURE, format!("{context}: {err}")),
    }
}

pub fn json_error(context: &str, err: serde_json::Error) -> CliError {
    CliError::new(DATA_INVALID, format!("{context}: {err}"))
}

pub fn timeout_error(context: &str, limit: std::time::Duration) -> CliError {
    CliError::new(TIMEOUT, format!("{context}: no answer within {limit:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caller_faults_map_to_usage() {
        let err = session_error(
            "send failed",
            SessionError::Shape {
                expected: 24,
                actual: 3,
            },
        );
        assert_eq!(err.code, USAGE);
        assert!(err.message.starts_with("send failed: "));

        assert_eq!(session_error("connect", SessionError::MissingUrl).code, USAGE);
    }

    #[test]
    fn nested_errors_keep_their_class() {
        let err = transport_error("connect", TransportError::Refused("ws://x".to_string()));
        assert_eq!(err.code, TRANSPORT_ERROR);

        let err = transport_error(
            "connect",
            TransportError::InvalidUrl {
                url: "http://x".to_string(),
                reason: "unsupported scheme".to_string(),
            },
        );
        assert_eq!(err.code, USAGE);

        let err = session_error("decode", SessionError::Frame(FrameError::Empty));
        assert_eq!(err.code, DATA_INVALID);

        let err = transport_error(
            "bind",
            TransportError::Io(io::Error::from(io::ErrorKind::AddrInUse)),
        );
        assert_eq!(err.code, TRANSPORT_ERROR);
    }
}

use crate::opcode::Opcode;

/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FrameError {
    /// The message carried no opcode byte.
    #[error("empty frame")]
    Empty,

    /// The leading byte is not a known opcode.
    #[error("unknown opcode 0x{0:02x}")]
    UnknownOpcode(u8),

    /// A fixed-layout payload has the wrong size.
    #[error("{opcode} payload is {actual} bytes (expected {expected})")]
    LengthMismatch {
        opcode: Opcode,
        expected: usize,
        actual: usize,
    },

    /// A variable-layout payload ended early.
    #[error("{opcode} payload truncated (needed {needed} more bytes, {remaining} left)")]
    Truncated {
        opcode: Opcode,
        needed: usize,
        remaining: usize,
    },

    /// A value does not have the channel count the protocol shape requires.
    #[error("{what}: expected {expected} entries, got {actual}")]
    Shape {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// A length-prefixed field does not fit its 1-byte prefix.
    #[error("{field} is {len} bytes (max {max})")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    /// The limits config layout needs limits on every motor channel.
    #[error("motor channel {channel} has no limits for the limits config layout")]
    MissingLimits { channel: usize },
}

pub type Result<T> = std::result::Result<T, FrameError>;

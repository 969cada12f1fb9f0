use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::{FrameError, Result};
use crate::opcode::Opcode;

/// Motor channels on the observed driver board.
pub const DEFAULT_MOTOR_CHANNELS: usize = 24;

/// Pressure (strain gauge) channels on the observed driver board.
pub const DEFAULT_PRESSURE_CHANNELS: usize = 12;

/// Telemetry scalars: 5 float32 + 1 uint32 tick.
pub const TELEMETRY_HEADER_LEN: usize = 24;

/// Wire value for "no seek target".
pub const SEEK_DISABLED: f32 = -1.0;

/// Longest SSID or passphrase a 1-byte length prefix can carry.
pub const MAX_FIELD_LEN: usize = u8::MAX as usize;

/// A frame split into opcode and payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub opcode: Opcode,
    /// Everything after the opcode byte.
    pub payload: Bytes,
}

impl Frame {
    pub fn new(opcode: Opcode, payload: impl Into<Bytes>) -> Self {
        Self {
            opcode,
            payload: payload.into(),
        }
    }

    /// The total wire size of this frame (opcode + payload).
    pub fn wire_size(&self) -> usize {
        1 + self.payload.len()
    }
}

/// Split one socket message into a [`Frame`].
///
/// Messages are always complete frames; there is no reassembly.
pub fn decode_frame(message: &Bytes) -> Result<Frame> {
    let Some(&code) = message.first() else {
        return Err(FrameError::Empty);
    };
    let opcode = Opcode::try_from(code)?;
    Ok(Frame {
        opcode,
        payload: message.slice(1..),
    })
}

/// Encode a bare request (opcode byte only).
pub fn encode_request(opcode: Opcode) -> Bytes {
    Bytes::copy_from_slice(&[u8::from(opcode)])
}

/// Per-channel layout of configuration frames.
///
/// Pick one per deployment; the protocol has no version negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigLayout {
    /// Position range, reverse flags, PID and thresholds (30 bytes per channel).
    #[default]
    Base,
    /// `Base` plus an enabled flag and three power/current limits (43 bytes per channel).
    Limits,
}

impl ConfigLayout {
    /// Bytes per motor channel in a configuration payload.
    pub const fn motor_block_len(self) -> usize {
        match self {
            ConfigLayout::Base => 30,
            ConfigLayout::Limits => 43,
        }
    }
}

/// Channel counts and layout revision shared by both ends of the socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolShape {
    pub motor_channels: usize,
    pub pressure_channels: usize,
    #[serde(default)]
    pub config_layout: ConfigLayout,
}

impl Default for ProtocolShape {
    fn default() -> Self {
        Self {
            motor_channels: DEFAULT_MOTOR_CHANNELS,
            pressure_channels: DEFAULT_PRESSURE_CHANNELS,
            config_layout: ConfigLayout::Base,
        }
    }
}

impl ProtocolShape {
    /// Telemetry payload size: `24 + 16·motors + 4·pressures`.
    pub const fn telemetry_len(&self) -> usize {
        TELEMETRY_HEADER_LEN + 16 * self.motor_channels + 4 * self.pressure_channels
    }

    /// Command payload size: `8·motors`.
    pub const fn command_len(&self) -> usize {
        8 * self.motor_channels
    }

    /// Configuration payload size for the configured layout.
    pub const fn config_len(&self) -> usize {
        self.config_layout.motor_block_len() * self.motor_channels + 8 * self.pressure_channels
    }

    /// Set-config payload size: save flag + configuration block.
    pub const fn set_config_len(&self) -> usize {
        1 + self.config_len()
    }
}

pub(crate) fn expect_len(opcode: Opcode, payload: &[u8], expected: usize) -> Result<()> {
    if payload.len() != expected {
        return Err(FrameError::LengthMismatch {
            opcode,
            expected,
            actual: payload.len(),
        });
    }
    Ok(())
}

pub(crate) fn expect_count(what: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(FrameError::Shape {
            what,
            expected,
            actual,
        });
    }
    Ok(())
}

pub(crate) fn put_opcode(dst: &mut BytesMut, opcode: Opcode, payload_len: usize) {
    dst.reserve(1 + payload_len);
    dst.put_u8(u8::from(opcode));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observed_protocol_sizes() {
        let shape = ProtocolShape::default();
        assert_eq!(shape.telemetry_len(), 456);
        assert_eq!(shape.command_len(), 192);
        assert_eq!(shape.config_len(), 816);
        assert_eq!(shape.set_config_len(), 817);
    }

    #[test]
    fn limits_layout_grows_config() {
        let shape = ProtocolShape {
            config_layout: ConfigLayout::Limits,
            ..ProtocolShape::default()
        };
        assert_eq!(shape.config_len(), 43 * 24 + 8 * 12);
    }

    #[test]
    fn decode_frame_splits_opcode() {
        let frame = decode_frame(&Bytes::from_static(&[0x05, 0x00])).unwrap();
        assert_eq!(frame.opcode, Opcode::Networks);
        assert_eq!(frame.payload.as_ref(), &[0x00]);
        assert_eq!(frame.wire_size(), 2);
    }

    #[test]
    fn decode_frame_rejects_empty_and_unknown() {
        assert_eq!(decode_frame(&Bytes::new()), Err(FrameError::Empty));
        assert_eq!(
            decode_frame(&Bytes::from_static(&[0x42, 1, 2])),
            Err(FrameError::UnknownOpcode(0x42))
        );
    }

    #[test]
    fn request_is_single_byte() {
        assert_eq!(encode_request(Opcode::RequestTelemetry).as_ref(), &[0x07]);
        assert_eq!(encode_request(Opcode::ScanNetworks).as_ref(), &[0x04]);
    }

    #[test]
    fn shape_deserializes_with_default_layout() {
        let shape: ProtocolShape =
            serde_json::from_str(r#"{"motor_channels":6,"pressure_channels":2}"#).unwrap();
        assert_eq!(shape.config_layout, ConfigLayout::Base);
        assert_eq!(shape.telemetry_len(), 24 + 96 + 8);
    }
}

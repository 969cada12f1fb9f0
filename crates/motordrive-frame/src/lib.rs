//! Binary wire codec for the multi-channel motor driver protocol.
//!
//! Every socket message is one complete frame:
//! - A 1-byte opcode
//! - A payload whose layout is fixed by the opcode and the [`ProtocolShape`]
//!
//! All floats are little-endian IEEE-754 single precision. Decoders take the
//! payload with the opcode stripped; encoders return the whole frame.

pub mod codec;
pub mod command;
pub mod config;
pub mod error;
pub mod math;
pub mod network;
pub mod opcode;
pub mod telemetry;
pub mod types;

pub use codec::{
    decode_frame, encode_request, ConfigLayout, Frame, ProtocolShape, DEFAULT_MOTOR_CHANNELS,
    DEFAULT_PRESSURE_CHANNELS, MAX_FIELD_LEN, SEEK_DISABLED, TELEMETRY_HEADER_LEN,
};
pub use command::{decode_commands, encode_commands, zero_commands};
pub use config::{decode_config, decode_set_config, encode_config_frame, encode_set_config};
pub use error::{FrameError, Result};
pub use math::{clamp, deinterpolate, exp_average, interpolate, wrapping_diff};
pub use network::{decode_connect_network, decode_networks, encode_connect_network, encode_networks};
pub use opcode::{Direction, Opcode};
pub use telemetry::{decode_telemetry, encode_telemetry};
pub use types::{
    ChannelCommand, ChannelConfig, ChannelLimits, ChannelTelemetry, ConnectNetwork, DriverConfig,
    NetworkInfo, NetworkTarget, PressureConfig, PressureTelemetry, TelemetryFrame,
};

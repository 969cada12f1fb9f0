//! Frame opcodes.
//!
//! Every frame starts with one opcode byte. Device-to-client opcodes carry
//! data; most client-to-device opcodes are bare requests.

use std::fmt;

use crate::error::FrameError;

/// Which side of the socket sends a given opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    DeviceToClient,
    ClientToDevice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// Telemetry snapshot.
    Telemetry = 0x00,
    /// Power and seek commands for every motor channel.
    Command = 0x01,
    /// Current driver configuration.
    Config = 0x02,
    /// Replace the configuration, optionally saving it.
    SetConfig = 0x03,
    /// Ask the driver to scan for wifi networks.
    ScanNetworks = 0x04,
    /// Wifi networks visible to the driver.
    Networks = 0x05,
    /// Join a wifi network or start an access point.
    ConnectNetwork = 0x06,
    /// Keep the telemetry subscription alive.
    RequestTelemetry = 0x07,
    /// Ask for the configuration.
    RequestConfig = 0x08,
    /// Reload configuration from non-volatile storage, then resend it.
    ReloadConfig = 0x09,
}

impl Opcode {
    /// Human-readable name, used in logs and errors.
    pub fn name(self) -> &'static str {
        match self {
            Opcode::Telemetry => "TELEMETRY",
            Opcode::Command => "COMMAND",
            Opcode::Config => "CONFIG",
            Opcode::SetConfig => "SET_CONFIG",
            Opcode::ScanNetworks => "SCAN_NETWORKS",
            Opcode::Networks => "NETWORKS",
            Opcode::ConnectNetwork => "CONNECT_NETWORK",
            Opcode::RequestTelemetry => "REQUEST_TELEMETRY",
            Opcode::RequestConfig => "REQUEST_CONFIG",
            Opcode::ReloadConfig => "RELOAD_CONFIG",
        }
    }

    pub fn direction(self) -> Direction {
        match self {
            Opcode::Telemetry | Opcode::Config | Opcode::Networks => Direction::DeviceToClient,
            _ => Direction::ClientToDevice,
        }
    }
}

impl TryFrom<u8> for Opcode {
    type Error = FrameError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Ok(match code {
            0x00 => Opcode::Telemetry,
            0x01 => Opcode::Command,
            0x02 => Opcode::Config,
            0x03 => Opcode::SetConfig,
            0x04 => Opcode::ScanNetworks,
            0x05 => Opcode::Networks,
            0x06 => Opcode::ConnectNetwork,
            0x07 => Opcode::RequestTelemetry,
            0x08 => Opcode::RequestConfig,
            0x09 => Opcode::ReloadConfig,
            other => return Err(FrameError::UnknownOpcode(other)),
        })
    }
}

impl From<Opcode> for u8 {
    fn from(opcode: Opcode) -> Self {
        opcode as u8
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:02x})", self.name(), *self as u8)
    }
}

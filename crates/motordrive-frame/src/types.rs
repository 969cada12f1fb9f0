//! Typed values carried by the wire protocol.

use serde::{Deserialize, Serialize};

use crate::codec::SEEK_DISABLED;
use crate::math::{clamp, deinterpolate};

/// Outbound command for one motor channel.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ChannelCommand {
    /// Drive power in `[-1, 1]`; clamped on encode.
    pub power: f32,
    /// Target as a fraction of the channel's configured position range, or
    /// `None` to leave the channel without a seek target.
    #[serde(default)]
    pub seek: Option<f32>,
}

impl ChannelCommand {
    /// Power only, no seek target.
    pub fn power(power: f32) -> Self {
        Self { power, seek: None }
    }

    /// Seek to `fraction` of the position range with the given power.
    pub fn seek(power: f32, fraction: f32) -> Self {
        Self {
            power,
            seek: Some(fraction),
        }
    }

    /// The safe default: no power and no target.
    pub fn zero() -> Self {
        Self::default()
    }

    /// Map a raw wire value back to an optional seek.
    ///
    /// Any negative value is treated as the disabled sentinel, so `0.0` stays
    /// a real target.
    pub(crate) fn seek_from_wire(raw: f32) -> Option<f32> {
        if raw < 0.0 {
            None
        } else {
            Some(raw)
        }
    }

    /// Raw wire value for a seek position; `None` becomes the sentinel.
    pub(crate) fn seek_to_wire(seek: Option<f32>) -> f32 {
        seek.unwrap_or(SEEK_DISABLED)
    }
}

/// Per-channel motor telemetry as reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ChannelTelemetry {
    pub position: f32,
    pub current: f32,
    pub power: f32,
    /// Last commanded position, or `-1` when the channel has no target.
    pub seek: f32,
}

impl ChannelTelemetry {
    /// Whether the device reports a seek target for this channel.
    pub fn has_target(&self) -> bool {
        self.seek >= 0.0
    }

    /// The seek target as a fraction of the channel's position range.
    ///
    /// `None` when there is no target, or when the configured range is empty
    /// (`min_position == max_position`) and no fraction exists.
    pub fn seek_fraction(&self, config: &ChannelConfig) -> Option<f32> {
        if !self.has_target() {
            return None;
        }
        let fraction = deinterpolate(self.seek, config.min_position, config.max_position);
        fraction.is_finite().then_some(fraction)
    }

    /// Current position as a fraction of the channel's position range.
    pub fn position_fraction(&self, config: &ChannelConfig) -> f32 {
        clamp(
            deinterpolate(self.position, config.min_position, config.max_position),
            0.0,
            1.0,
        )
    }
}

/// Strain gauge reading.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PressureTelemetry {
    pub strain: f32,
}

/// One decoded telemetry frame, before any local bookkeeping.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TelemetryFrame {
    pub voltage: f32,
    pub current: f32,
    pub power: f32,
    pub fps: f32,
    pub max_loop_time: f32,
    /// Device tick counter; wraps at 2^32.
    pub driver_time: u32,
    pub motor_channels: Vec<ChannelTelemetry>,
    pub pressure_channels: Vec<PressureTelemetry>,
}

/// Extra per-channel fields of the limits config layout.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelLimits {
    pub enabled: bool,
    pub min_power: f32,
    pub max_current: f32,
    pub max_avg_current: f32,
}

impl Default for ChannelLimits {
    fn default() -> Self {
        Self {
            enabled: true,
            min_power: 0.0,
            max_current: 1.0,
            max_avg_current: 1.0,
        }
    }
}

/// Motor channel configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub min_position: f32,
    pub max_position: f32,
    pub reverse_output: bool,
    pub reverse_input: bool,
    pub p: f32,
    pub i_time: f32,
    pub d_time: f32,
    pub threshold: f32,
    pub overshoot_threshold: f32,
    /// Present only when decoded with the limits layout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<ChannelLimits>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            min_position: 0.0,
            max_position: 1.0,
            reverse_output: false,
            reverse_input: false,
            p: 1.0,
            i_time: 0.0,
            d_time: 0.0,
            threshold: 0.0,
            overshoot_threshold: 0.0,
            limits: None,
        }
    }
}

/// Strain gauge calibration.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PressureConfig {
    pub zero_offset: f32,
    pub coefficient: f32,
}

/// Full device configuration. Replaced wholesale on every config frame.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DriverConfig {
    pub motor_channels: Vec<ChannelConfig>,
    pub pressure_channels: Vec<PressureConfig>,
}

/// A wifi network visible to the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub ssid: String,
    pub rssi: i8,
}

/// Where the device should put its wifi interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum NetworkTarget {
    /// Host its own access point.
    AccessPoint = 0,
    /// Join an external router.
    Router = 1,
}

impl NetworkTarget {
    pub fn from_use_router(use_router: bool) -> Self {
        if use_router {
            NetworkTarget::Router
        } else {
            NetworkTarget::AccessPoint
        }
    }

    pub(crate) fn from_wire(flag: u8) -> Self {
        if flag == 0 {
            NetworkTarget::AccessPoint
        } else {
            NetworkTarget::Router
        }
    }
}

/// Connect-to-network request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectNetwork {
    pub target: NetworkTarget,
    pub ssid: String,
    pub password: String,
}

use motordrive_frame::{ChannelCommand, DriverConfig, NetworkInfo};

use crate::cache::DriverState;

/// Receives session events.
///
/// Every method runs inside the session task, one event at a time, so
/// implementations should return quickly. All methods default to no-ops.
pub trait SessionObserver: Send + 'static {
    /// A new telemetry snapshot was decoded.
    fn on_state(&mut self, _state: &DriverState) {}

    /// A configuration frame replaced the current config.
    fn on_config(&mut self, _config: &DriverConfig) {}

    /// A network scan result arrived.
    fn on_networks(&mut self, _networks: &[NetworkInfo]) {}

    /// A socket is being opened.
    fn on_connecting(&mut self) {}

    /// The socket opened and the initial requests went out.
    fn on_connected(&mut self) {}

    /// The socket closed or failed to open.
    fn on_close(&mut self) {}

    /// Called right before each scheduled command transmit. The slice is the
    /// session's command buffer and may be edited in place.
    fn on_send_commands(&mut self, _commands: &mut [ChannelCommand]) {}
}

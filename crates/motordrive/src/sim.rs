//! Scripted driver for demos and tests.
//!
//! [`SimDevice`] answers client frames the way a driver board does: one
//! telemetry frame per telemetry request, config and network lists on
//! demand, and motors that move toward their commanded targets. It can be
//! served over real WebSockets ([`serve`]) or over the in-memory transport
//! ([`serve_device`]). Every client of one server talks to the same board.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use motordrive_frame::{
    clamp, decode_commands, decode_connect_network, decode_frame, decode_set_config,
    encode_config_frame, encode_networks, encode_telemetry, zero_commands, ChannelCommand,
    ChannelConfig, ChannelLimits, ChannelTelemetry, ConfigLayout, ConnectNetwork, DriverConfig,
    NetworkInfo, Opcode, PressureConfig, PressureTelemetry, ProtocolShape, Result,
    TelemetryFrame, SEEK_DISABLED,
};
use motordrive_transport::{
    accept, Connection, DeviceEnd, Outbound, SocketEvent, TransportError, NORMAL_CLOSURE,
};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Position units per second at full power.
const SLEW_RATE: f32 = 0.5;

/// Current drawn by a channel moving at full power.
const STALL_CURRENT: f32 = 0.8;

const SUPPLY_VOLTAGE: f32 = 12.0;

/// A board shared by every client connected to it.
pub type SharedDevice = Arc<Mutex<SimDevice>>;

/// Simulated driver board state.
#[derive(Debug, Clone)]
pub struct SimDevice {
    shape: ProtocolShape,
    config: DriverConfig,
    saved: DriverConfig,
    networks: Vec<NetworkInfo>,
    joined: Option<ConnectNetwork>,
    commands: Vec<ChannelCommand>,
    motors: Vec<ChannelTelemetry>,
    driver_time: u32,
    last_step: Option<Instant>,
}

impl SimDevice {
    pub fn new(shape: ProtocolShape) -> Self {
        let config = default_config(&shape);
        let motors = config
            .motor_channels
            .iter()
            .map(|channel| ChannelTelemetry {
                position: channel.min_position,
                seek: SEEK_DISABLED,
                ..ChannelTelemetry::default()
            })
            .collect();
        Self {
            shape,
            saved: config.clone(),
            config,
            networks: Vec::new(),
            joined: None,
            commands: zero_commands(shape.motor_channels),
            motors,
            driver_time: 0,
            last_step: None,
        }
    }

    /// Networks reported by a scan.
    pub fn with_networks(mut self, networks: Vec<NetworkInfo>) -> Self {
        self.networks = networks;
        self
    }

    /// Starting value of the device tick counter.
    pub fn with_driver_time(mut self, driver_time: u32) -> Self {
        self.driver_time = driver_time;
        self
    }

    /// Replace both the live and the stored configuration.
    pub fn with_config(mut self, config: DriverConfig) -> Self {
        self.saved = config.clone();
        self.config = config;
        self
    }

    pub fn into_shared(self) -> SharedDevice {
        Arc::new(Mutex::new(self))
    }

    pub fn shape(&self) -> &ProtocolShape {
        &self.shape
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Configuration as it would survive a reboot.
    pub fn saved_config(&self) -> &DriverConfig {
        &self.saved
    }

    /// The last connect-to-network request.
    pub fn joined(&self) -> Option<&ConnectNetwork> {
        self.joined.as_ref()
    }

    /// Commands as last received; seeks are raw positions.
    pub fn commands(&self) -> &[ChannelCommand] {
        &self.commands
    }

    /// Handle one client message and return the reply, if the request has one.
    pub fn handle(&mut self, message: &Bytes, now: Instant) -> Result<Option<Bytes>> {
        let frame = decode_frame(message)?;
        let reply = match frame.opcode {
            Opcode::RequestTelemetry => {
                self.step(now);
                Some(encode_telemetry(&self.shape, &self.telemetry())?)
            }
            Opcode::Command => {
                self.commands = decode_commands(&self.shape, &frame.payload)?;
                None
            }
            Opcode::SetConfig => {
                let (config, save) = decode_set_config(&self.shape, &frame.payload)?;
                if save {
                    self.saved = config.clone();
                }
                self.config = config;
                Some(encode_config_frame(&self.shape, &self.config)?)
            }
            Opcode::RequestConfig => Some(encode_config_frame(&self.shape, &self.config)?),
            Opcode::ReloadConfig => {
                self.config = self.saved.clone();
                Some(encode_config_frame(&self.shape, &self.config)?)
            }
            Opcode::ScanNetworks => Some(encode_networks(&self.networks)?),
            Opcode::ConnectNetwork => {
                let request = decode_connect_network(&frame.payload)?;
                info!(ssid = %request.ssid, target = ?request.target, "joining network");
                self.joined = Some(request);
                None
            }
            Opcode::Telemetry | Opcode::Config | Opcode::Networks => {
                warn!(opcode = %frame.opcode, "device received a device-to-client frame");
                None
            }
        };
        Ok(reply)
    }

    /// Advance the motors to `now`.
    fn step(&mut self, now: Instant) {
        let dt = self
            .last_step
            .map_or(Duration::ZERO, |last| now.saturating_duration_since(last));
        self.last_step = Some(now);
        self.driver_time = self.driver_time.wrapping_add(dt.as_millis() as u32);

        let dt = dt.as_secs_f32();
        let channels = self
            .motors
            .iter_mut()
            .zip(&self.commands)
            .zip(&self.config.motor_channels);
        for ((motor, command), config) in channels {
            let low = config.min_position.min(config.max_position);
            let high = config.min_position.max(config.max_position);
            let power = clamp(command.power, -1.0, 1.0);
            let target = match command.seek {
                Some(seek) => seek,
                None if power < 0.0 => low,
                None => high,
            };
            let travel = SLEW_RATE * power.abs() * dt;
            let remaining = target - motor.position;
            let next = if remaining.abs() <= travel {
                target
            } else {
                motor.position + travel.copysign(remaining)
            };
            let next = clamp(next, low, high);

            motor.current = if next == motor.position {
                0.0
            } else {
                power.abs() * STALL_CURRENT
            };
            motor.position = next;
            motor.power = power;
            motor.seek = command.seek.unwrap_or(SEEK_DISABLED);
        }
    }

    fn telemetry(&self) -> TelemetryFrame {
        let current: f32 = self.motors.iter().map(|motor| motor.current).sum();
        TelemetryFrame {
            voltage: SUPPLY_VOLTAGE,
            current,
            power: SUPPLY_VOLTAGE * current,
            fps: 500.0,
            max_loop_time: 2.0,
            driver_time: self.driver_time,
            motor_channels: self.motors.clone(),
            pressure_channels: vec![PressureTelemetry::default(); self.shape.pressure_channels],
        }
    }
}

/// Configuration of a freshly flashed board.
pub fn default_config(shape: &ProtocolShape) -> DriverConfig {
    let limits = match shape.config_layout {
        ConfigLayout::Base => None,
        ConfigLayout::Limits => Some(ChannelLimits::default()),
    };
    DriverConfig {
        motor_channels: vec![
            ChannelConfig {
                limits,
                ..ChannelConfig::default()
            };
            shape.motor_channels
        ],
        pressure_channels: vec![
            PressureConfig {
                zero_offset: 0.0,
                coefficient: 1.0,
            };
            shape.pressure_channels
        ],
    }
}

/// Accept WebSocket clients until `cancel` fires.
pub async fn serve(
    listener: TcpListener,
    device: SharedDevice,
    cancel: CancellationToken,
) -> std::result::Result<(), TransportError> {
    loop {
        let (stream, peer) = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            accepted = listener.accept() => accepted?,
        };
        let device = device.clone();
        let cancel = cancel.child_token();
        tokio::spawn(async move {
            match accept(stream, peer.to_string()).await {
                Ok(conn) => serve_connection(conn, device, cancel).await,
                Err(err) => warn!(%peer, %err, "handshake failed"),
            }
        });
    }
}

/// Answer one WebSocket client until it closes or `cancel` fires.
pub async fn serve_connection(
    mut conn: Connection,
    device: SharedDevice,
    cancel: CancellationToken,
) {
    info!(peer = conn.url(), "client connected");
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => {
                conn.close(NORMAL_CLOSURE);
                return;
            }
            event = conn.next_event() => event,
        };
        match event {
            SocketEvent::Message(message) => {
                let reply = device.lock().await.handle(&message, Instant::now());
                match reply {
                    Ok(Some(reply)) => {
                        conn.send(reply);
                    }
                    Ok(None) => {}
                    Err(err) => debug!(peer = conn.url(), %err, "dropping frame"),
                }
            }
            SocketEvent::Closed { code } => {
                info!(peer = conn.url(), ?code, "client disconnected");
                return;
            }
            SocketEvent::Error(reason) => {
                warn!(peer = conn.url(), %reason, "client socket failed");
                return;
            }
        }
    }
}

/// Answer an in-memory client until it detaches or `cancel` fires.
pub async fn serve_device(mut end: DeviceEnd, device: SharedDevice, cancel: CancellationToken) {
    loop {
        let outbound = tokio::select! {
            _ = cancel.cancelled() => {
                end.close(NORMAL_CLOSURE);
                return;
            }
            outbound = end.recv() => outbound,
        };
        match outbound {
            Some(Outbound::Binary(message)) => {
                let reply = device.lock().await.handle(&message, Instant::now());
                match reply {
                    Ok(Some(reply)) => {
                        end.send(reply);
                    }
                    Ok(None) => {}
                    Err(err) => debug!(url = end.url(), %err, "dropping frame"),
                }
            }
            Some(Outbound::Close(code)) => {
                end.close(code);
                return;
            }
            None => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use motordrive_frame::{
        decode_config, decode_networks, decode_telemetry, encode_commands, encode_connect_network,
        encode_request, encode_set_config, NetworkTarget,
    };

    use super::*;

    fn small_shape() -> ProtocolShape {
        ProtocolShape {
            motor_channels: 2,
            pressure_channels: 1,
            ..ProtocolShape::default()
        }
    }

    fn telemetry_at(device: &mut SimDevice, now: Instant) -> TelemetryFrame {
        let reply = device
            .handle(&encode_request(Opcode::RequestTelemetry), now)
            .unwrap()
            .expect("telemetry request should be answered");
        let frame = decode_frame(&reply).unwrap();
        assert_eq!(frame.opcode, Opcode::Telemetry);
        decode_telemetry(device.shape(), &frame.payload).unwrap()
    }

    #[test]
    fn default_config_matches_layout() {
        let base = default_config(&ProtocolShape::default());
        assert_eq!(base.motor_channels.len(), 24);
        assert_eq!(base.pressure_channels.len(), 12);
        assert!(base.motor_channels[0].limits.is_none());

        let limits = default_config(&ProtocolShape {
            config_layout: ConfigLayout::Limits,
            ..ProtocolShape::default()
        });
        assert!(limits.motor_channels.iter().all(|c| c.limits.is_some()));
    }

    #[test]
    fn seek_command_moves_motor_toward_target() {
        let shape = small_shape();
        let mut device = SimDevice::new(shape);
        let start = Instant::now();
        telemetry_at(&mut device, start);

        let commands = vec![ChannelCommand::seek(1.0, 0.25), ChannelCommand::zero()];
        let frame = encode_commands(&shape, &commands, device.config()).unwrap();
        assert_eq!(device.handle(&frame, start).unwrap(), None);

        let later = telemetry_at(&mut device, start + Duration::from_millis(200));
        assert_eq!(later.driver_time, 200);
        assert!((later.motor_channels[0].position - 0.1).abs() < 1e-4);
        assert!((later.motor_channels[0].seek - 0.25).abs() < 1e-6);
        assert!(later.motor_channels[0].current > 0.0);
        assert_eq!(later.motor_channels[1].seek, SEEK_DISABLED);
        assert_eq!(later.motor_channels[1].position, 0.0);

        let arrived = telemetry_at(&mut device, start + Duration::from_secs(2));
        assert!((arrived.motor_channels[0].position - 0.25).abs() < 1e-4);

        let settled = telemetry_at(&mut device, start + Duration::from_secs(3));
        assert!((settled.motor_channels[0].position - 0.25).abs() < 1e-4);
        assert_eq!(settled.motor_channels[0].current, 0.0);
        assert_eq!(settled.current, 0.0);
    }

    #[test]
    fn driver_time_wraps() {
        let mut device = SimDevice::new(small_shape()).with_driver_time(u32::MAX - 10);
        let start = Instant::now();
        telemetry_at(&mut device, start);
        let frame = telemetry_at(&mut device, start + Duration::from_millis(20));
        assert_eq!(frame.driver_time, 9);
    }

    #[test]
    fn set_config_without_save_is_undone_by_reload() {
        let shape = small_shape();
        let mut device = SimDevice::new(shape);
        let now = Instant::now();

        let mut changed = device.config().clone();
        changed.motor_channels[0].max_position = 0.5;
        let reply = device
            .handle(&encode_set_config(&shape, &changed, false).unwrap(), now)
            .unwrap()
            .unwrap();
        let frame = decode_frame(&reply).unwrap();
        assert_eq!(decode_config(&shape, &frame.payload).unwrap(), changed);
        assert_ne!(device.saved_config(), &changed);

        let reply = device
            .handle(&encode_request(Opcode::ReloadConfig), now)
            .unwrap()
            .unwrap();
        let frame = decode_frame(&reply).unwrap();
        assert_eq!(frame.opcode, Opcode::Config);
        assert_eq!(device.config(), device.saved_config());
        assert_eq!(device.config().motor_channels[0].max_position, 1.0);

        device
            .handle(&encode_set_config(&shape, &changed, true).unwrap(), now)
            .unwrap();
        assert_eq!(device.saved_config(), &changed);
    }

    #[test]
    fn scan_and_join() {
        let networks = vec![NetworkInfo {
            ssid: "lab".to_string(),
            rssi: -48,
        }];
        let mut device = SimDevice::new(small_shape()).with_networks(networks.clone());
        let now = Instant::now();

        let reply = device
            .handle(&encode_request(Opcode::ScanNetworks), now)
            .unwrap()
            .unwrap();
        let frame = decode_frame(&reply).unwrap();
        assert_eq!(decode_networks(&frame.payload).unwrap(), networks);

        let join = encode_connect_network(&ConnectNetwork {
            target: NetworkTarget::Router,
            ssid: "lab".to_string(),
            password: "hunter22".to_string(),
        })
        .unwrap();
        assert_eq!(device.handle(&join, now).unwrap(), None);
        assert_eq!(device.joined().map(|j| j.ssid.as_str()), Some("lab"));
    }

    #[test]
    fn malformed_frames_are_errors() {
        let mut device = SimDevice::new(small_shape());
        let now = Instant::now();
        assert!(device.handle(&Bytes::new(), now).is_err());
        assert!(device.handle(&Bytes::from_static(&[0x42]), now).is_err());
        assert!(device
            .handle(&Bytes::from_static(&[0x01, 0x00, 0x00]), now)
            .is_err());
    }

    #[cfg(feature = "session")]
    #[tokio::test(start_paused = true)]
    async fn session_reads_simulated_driver() {
        use motordrive_session::{SessionBuilder, SessionPhase};
        use motordrive_transport::MemoryConnector;

        let shape = small_shape();
        let (connector, mut listener) = MemoryConnector::new();
        let cancel = CancellationToken::new();
        let device_cancel = cancel.clone();
        let device = SimDevice::new(shape).into_shared();
        let board = device.clone();
        tokio::spawn(async move {
            while let Some(end) = listener.accept().await {
                tokio::spawn(serve_device(end, device.clone(), device_cancel.clone()));
            }
        });

        let client = SessionBuilder::new(connector)
            .with_url("mem://sim")
            .with_shape(shape)
            .spawn();
        client.connect(None).await.unwrap();
        client.wait_for_phase(SessionPhase::Connected).await.unwrap();

        let mut config = client.watch_config();
        config.wait_for(Option::is_some).await.unwrap();
        client
            .set_commands(vec![ChannelCommand::power(1.0), ChannelCommand::zero()])
            .unwrap();
        client.command().unwrap();

        tokio::time::sleep(Duration::from_secs(1)).await;
        let state = client.state().expect("telemetry should have arrived");
        assert!(state.motor_channels[0].position > 0.0);
        assert_eq!(state.motor_channels[1].position, 0.0);

        client.shutdown().await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();
        assert_eq!(board.lock().await.commands()[0], ChannelCommand::zero());
    }
}

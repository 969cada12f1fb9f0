use std::sync::Arc;

use motordrive_frame::{
    encode_connect_network, encode_request, encode_set_config, ChannelCommand, ConnectNetwork,
    DriverConfig, FrameError, NetworkInfo, NetworkTarget, Opcode, ProtocolShape,
};
use motordrive_transport::Connector;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::debug;

use crate::cache::DriverState;
use crate::config::SessionConfig;
use crate::error::{Result, SessionError};
use crate::observer::SessionObserver;
use crate::session::{Published, Request, Session, SessionPhase};

/// Configures and starts a driver session.
pub struct SessionBuilder {
    connector: Box<dyn Connector>,
    url: Option<String>,
    shape: ProtocolShape,
    config: SessionConfig,
    observers: Vec<Box<dyn SessionObserver>>,
}

impl SessionBuilder {
    pub fn new(connector: impl Connector) -> Self {
        Self {
            connector: Box::new(connector),
            url: None,
            shape: ProtocolShape::default(),
            config: SessionConfig::default(),
            observers: Vec::new(),
        }
    }

    /// URL used by `connect(None)` and every reconnect.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_shape(mut self, shape: ProtocolShape) -> Self {
        self.shape = shape;
        self
    }

    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Add an observer. Observers are called in the order they were added.
    pub fn with_observer(mut self, observer: impl SessionObserver) -> Self {
        self.observers.push(Box::new(observer));
        self
    }

    /// Start the session task. Must be called inside a Tokio runtime.
    ///
    /// The session stays disconnected until [`DriverClient::connect`].
    pub fn spawn(self) -> DriverClient {
        let (tx, rx) = mpsc::unbounded_channel();
        let published = Published::new();
        let client = DriverClient {
            requests: tx,
            shape: self.shape,
            phase: published.phase.subscribe(),
            state: published.state.subscribe(),
            config: published.config.subscribe(),
            networks: published.networks.subscribe(),
            skew_ms: published.skew_ms.subscribe(),
        };

        let session = Session::new(
            self.connector,
            self.url,
            self.shape,
            self.config,
            self.observers,
            rx,
            published,
        );
        tokio::spawn(session.run());
        debug!("session spawned");
        client
    }
}

/// Handle to a running session.
///
/// Clones share the session. When the last handle is dropped the session
/// releases commands, closes its socket and stops.
#[derive(Debug, Clone)]
pub struct DriverClient {
    requests: mpsc::UnboundedSender<Request>,
    shape: ProtocolShape,
    phase: watch::Receiver<SessionPhase>,
    state: watch::Receiver<Option<Arc<DriverState>>>,
    config: watch::Receiver<Option<Arc<DriverConfig>>>,
    networks: watch::Receiver<Arc<Vec<NetworkInfo>>>,
    skew_ms: watch::Receiver<f64>,
}

impl DriverClient {
    /// Connect, remembering `url` for reconnects. Re-enables a closed session.
    ///
    /// Fails with [`SessionError::MissingUrl`] when no URL was ever given.
    /// Returns once the attempt has started; watch [`DriverClient::phase`]
    /// for the outcome.
    pub async fn connect(&self, url: Option<&str>) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.request(Request::Connect {
            url: url.map(str::to_string),
            reply,
        })?;
        rx.await.map_err(|_| SessionError::Stopped)?
    }

    /// Abandon the current socket and open a new one immediately.
    ///
    /// Commands are released and the current state is cleared, so the next
    /// telemetry frame counts as the first.
    pub async fn reconnect(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.request(Request::Reconnect { reply })?;
        rx.await.map_err(|_| SessionError::Stopped)?
    }

    /// Close the socket with a normal closure and stop reconnecting.
    pub fn close(&self) -> Result<()> {
        self.request(Request::Close)
    }

    /// Start transmitting the command buffer periodically. Idempotent.
    pub fn command(&self) -> Result<()> {
        self.request(Request::Command)
    }

    /// Stop transmitting commands. If they were being transmitted, one
    /// all-zero command frame goes out first.
    pub fn release(&self) -> Result<()> {
        self.request(Request::Release)
    }

    /// Replace the command buffer. Must have one entry per motor channel.
    pub fn set_commands(&self, commands: Vec<ChannelCommand>) -> Result<()> {
        if commands.len() != self.shape.motor_channels {
            return Err(SessionError::Shape {
                expected: self.shape.motor_channels,
                actual: commands.len(),
            });
        }
        self.request(Request::SetCommands(commands))
    }

    /// Ask the device to scan for wifi networks. The result arrives through
    /// [`DriverClient::networks`].
    pub fn scan_networks(&self) -> Result<()> {
        self.send(encode_request(Opcode::ScanNetworks))
    }

    /// Join a router (`use_router`) or start the device's own access point.
    pub fn connect_to_network(&self, ssid: &str, password: &str, use_router: bool) -> Result<()> {
        let frame = encode_connect_network(&ConnectNetwork {
            target: NetworkTarget::from_use_router(use_router),
            ssid: ssid.to_string(),
            password: password.to_string(),
        })
        .map_err(|err| match err {
            FrameError::FieldTooLong { field, len, max } => {
                SessionError::FieldTooLong { field, len, max }
            }
            other => SessionError::Frame(other),
        })?;
        self.send(frame)
    }

    pub fn request_config(&self) -> Result<()> {
        self.send(encode_request(Opcode::RequestConfig))
    }

    /// Have the device reload its stored configuration and resend it.
    pub fn reload_config(&self) -> Result<()> {
        self.send(encode_request(Opcode::ReloadConfig))
    }

    /// Send a whole configuration, optionally saving it on the device.
    ///
    /// The local config is not updated; the device answers with a config
    /// frame once it has applied the change.
    pub fn send_config(&self, config: &DriverConfig, save: bool) -> Result<()> {
        let frame = encode_set_config(&self.shape, config, save)?;
        self.send(frame)
    }

    /// Latest telemetry snapshot; `None` until the first frame on a socket.
    pub fn state(&self) -> Option<Arc<DriverState>> {
        self.state.borrow().clone()
    }

    /// Latest device configuration; `None` until the first config frame.
    pub fn config(&self) -> Option<Arc<DriverConfig>> {
        self.config.borrow().clone()
    }

    /// Latest network scan result.
    pub fn networks(&self) -> Arc<Vec<NetworkInfo>> {
        self.networks.borrow().clone()
    }

    /// Smoothed difference between local and device elapsed time, in ms.
    pub fn smoothed_skew(&self) -> f64 {
        *self.skew_ms.borrow()
    }

    pub fn phase(&self) -> SessionPhase {
        *self.phase.borrow()
    }

    /// Wait until the session reaches `phase`.
    pub async fn wait_for_phase(&self, phase: SessionPhase) -> Result<()> {
        let mut rx = self.phase.clone();
        rx.wait_for(|current| *current == phase)
            .await
            .map(|_| ())
            .map_err(|_| SessionError::Stopped)
    }

    /// Recent snapshots, newest first.
    pub async fn state_history(&self) -> Result<Vec<Arc<DriverState>>> {
        let (reply, rx) = oneshot::channel();
        self.request(Request::History(reply))?;
        rx.await.map_err(|_| SessionError::Stopped)
    }

    pub fn watch_state(&self) -> watch::Receiver<Option<Arc<DriverState>>> {
        self.state.clone()
    }

    pub fn watch_config(&self) -> watch::Receiver<Option<Arc<DriverConfig>>> {
        self.config.clone()
    }

    pub fn watch_networks(&self) -> watch::Receiver<Arc<Vec<NetworkInfo>>> {
        self.networks.clone()
    }

    pub fn watch_phase(&self) -> watch::Receiver<SessionPhase> {
        self.phase.clone()
    }

    pub fn shape(&self) -> &ProtocolShape {
        &self.shape
    }

    /// Whether the session task is still running.
    pub fn is_running(&self) -> bool {
        !self.requests.is_closed()
    }

    /// Release commands, close the socket and stop the session task for
    /// every handle.
    pub async fn shutdown(&self) -> Result<()> {
        let (ack, rx) = oneshot::channel();
        self.request(Request::Shutdown(ack))?;
        rx.await.map_err(|_| SessionError::Stopped)
    }

    fn send(&self, frame: bytes::Bytes) -> Result<()> {
        self.request(Request::Send(frame))
    }

    fn request(&self, request: Request) -> Result<()> {
        self.requests
            .send(request)
            .map_err(|_| SessionError::Stopped)
    }
}

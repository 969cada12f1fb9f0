//! The session task: socket lifecycle, reconnect policy, watchdog, frame
//! dispatch and command transmit, all driven from one `select!` loop.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use motordrive_frame::{
    decode_config, decode_frame, decode_networks, decode_telemetry, encode_commands,
    encode_request, zero_commands, ChannelCommand, Direction, DriverConfig, FrameError,
    NetworkInfo, Opcode, ProtocolShape,
};
use motordrive_transport::{Connection, Connector, SocketEvent, TransportError, NORMAL_CLOSURE};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{self, Instant};
use tracing::{debug, error, info, trace, warn};

use crate::cache::{DriverState, TelemetryCache};
use crate::config::SessionConfig;
use crate::error::{Result, SessionError};
use crate::observer::SessionObserver;
use crate::scheduler::{CommandScheduler, Ticker};

/// Where the session is in its connect/reconnect cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Never connected.
    Disconnected,
    /// A socket is being opened.
    Connecting,
    /// A socket is open.
    Connected,
    /// The socket closed; a reconnect decision follows immediately.
    Closed,
    /// Waiting for the deferred reconnect.
    Reconnecting,
    /// Closed by request. Nothing reconnects until `connect` is called.
    Disabled,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionPhase::Disconnected => "disconnected",
            SessionPhase::Connecting => "connecting",
            SessionPhase::Connected => "connected",
            SessionPhase::Closed => "closed",
            SessionPhase::Reconnecting => "reconnecting",
            SessionPhase::Disabled => "disabled",
        };
        f.write_str(name)
    }
}

/// Requests from [`crate::DriverClient`] handles to the session task.
pub(crate) enum Request {
    Connect {
        url: Option<String>,
        reply: oneshot::Sender<Result<()>>,
    },
    Reconnect {
        reply: oneshot::Sender<Result<()>>,
    },
    Close,
    Command,
    Release,
    SetCommands(Vec<ChannelCommand>),
    Send(Bytes),
    History(oneshot::Sender<Vec<Arc<DriverState>>>),
    Shutdown(oneshot::Sender<()>),
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::Connect { url, .. } => f.debug_struct("Connect").field("url", url).finish(),
            Request::Reconnect { .. } => f.write_str("Reconnect"),
            Request::Close => f.write_str("Close"),
            Request::Command => f.write_str("Command"),
            Request::Release => f.write_str("Release"),
            Request::SetCommands(c) => f.debug_tuple("SetCommands").field(&c.len()).finish(),
            Request::Send(b) => f.debug_tuple("Send").field(&b.len()).finish(),
            Request::History(_) => f.write_str("History"),
            Request::Shutdown(_) => f.write_str("Shutdown"),
        }
    }
}

/// Values the session publishes to its handles.
pub(crate) struct Published {
    pub phase: watch::Sender<SessionPhase>,
    pub state: watch::Sender<Option<Arc<DriverState>>>,
    pub config: watch::Sender<Option<Arc<DriverConfig>>>,
    pub networks: watch::Sender<Arc<Vec<NetworkInfo>>>,
    pub skew_ms: watch::Sender<f64>,
}

impl Published {
    pub fn new() -> Self {
        Self {
            phase: watch::Sender::new(SessionPhase::Disconnected),
            state: watch::Sender::new(None),
            config: watch::Sender::new(None),
            networks: watch::Sender::new(Arc::new(Vec::new())),
            skew_ms: watch::Sender::new(0.0),
        }
    }
}

/// The single socket owned by the session.
enum Link {
    Idle,
    Connecting(BoxFuture<'static, motordrive_transport::Result<Connection>>),
    Open(Connection),
}

enum LinkEvent {
    Opened(Connection),
    Failed(TransportError),
    Socket(SocketEvent),
}

impl Link {
    /// Next thing that happens on the link. Never resolves while idle.
    async fn next(&mut self) -> LinkEvent {
        match self {
            Link::Idle => std::future::pending().await,
            Link::Connecting(opening) => match opening.await {
                Ok(conn) => LinkEvent::Opened(conn),
                Err(err) => LinkEvent::Failed(err),
            },
            Link::Open(conn) => LinkEvent::Socket(conn.next_event().await),
        }
    }
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Link::Idle => f.write_str("Idle"),
            Link::Connecting(_) => f.write_str("Connecting"),
            Link::Open(conn) => f.debug_tuple("Open").field(conn).finish(),
        }
    }
}

enum Wake {
    Request(Option<Request>),
    Link(LinkEvent),
    Poll,
    Command,
    Reconnect,
}

async fn deferred(at: Option<Instant>) {
    match at {
        Some(at) => time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

pub(crate) struct Session {
    connector: Box<dyn Connector>,
    url: Option<String>,
    shape: ProtocolShape,
    config: SessionConfig,
    observers: Vec<Box<dyn SessionObserver>>,
    requests: mpsc::UnboundedReceiver<Request>,
    published: Published,

    link: Link,
    disabled: bool,
    reconnect_at: Option<Instant>,
    connect_started: Instant,
    last_update: Option<Instant>,

    poll: Ticker,
    scheduler: CommandScheduler,
    commands: Vec<ChannelCommand>,

    cache: TelemetryCache,
    driver_config: Option<Arc<DriverConfig>>,
}

impl Session {
    pub fn new(
        connector: Box<dyn Connector>,
        url: Option<String>,
        shape: ProtocolShape,
        config: SessionConfig,
        observers: Vec<Box<dyn SessionObserver>>,
        requests: mpsc::UnboundedReceiver<Request>,
        published: Published,
    ) -> Self {
        Self {
            connector,
            url,
            shape,
            observers,
            requests,
            published,
            link: Link::Idle,
            disabled: false,
            reconnect_at: None,
            connect_started: Instant::now(),
            last_update: None,
            poll: Ticker::new(config.telemetry_poll_interval),
            scheduler: CommandScheduler::new(config.command_interval),
            commands: zero_commands(shape.motor_channels),
            cache: TelemetryCache::new(&config),
            driver_config: None,
            config,
        }
    }

    pub async fn run(mut self) {
        debug!(transport = self.connector.transport_name(), "session task started");
        loop {
            let wake = tokio::select! {
                request = self.requests.recv() => Wake::Request(request),
                event = self.link.next() => Wake::Link(event),
                _ = self.poll.tick() => Wake::Poll,
                _ = self.scheduler.tick() => Wake::Command,
                _ = deferred(self.reconnect_at) => Wake::Reconnect,
            };

            match wake {
                Wake::Request(Some(request)) => {
                    if !self.handle_request(request) {
                        return;
                    }
                }
                Wake::Request(None) => {
                    // Every handle is gone.
                    self.stop();
                    return;
                }
                Wake::Link(LinkEvent::Opened(conn)) => self.on_open(conn),
                Wake::Link(LinkEvent::Failed(err)) => {
                    warn!(%err, "connection attempt failed");
                    self.lost();
                }
                Wake::Link(LinkEvent::Socket(event)) => self.on_socket_event(event),
                Wake::Poll => self.on_poll(),
                Wake::Command => self.transmit_commands(None),
                Wake::Reconnect => {
                    self.reconnect_at = None;
                    self.open();
                }
            }
        }
    }

    /// Returns `false` once the session should stop.
    fn handle_request(&mut self, request: Request) -> bool {
        trace!(?request, "session request");
        match request {
            Request::Connect { url, reply } => {
                if let Some(url) = url {
                    self.url = Some(url);
                }
                let result = if self.url.is_some() {
                    if self.disabled {
                        self.discard_state();
                    }
                    self.disabled = false;
                    self.open();
                    Ok(())
                } else {
                    Err(SessionError::MissingUrl)
                };
                let _ = reply.send(result);
            }
            Request::Reconnect { reply } => {
                let result = if self.url.is_some() {
                    self.disabled = false;
                    self.reconnect_now();
                    Ok(())
                } else {
                    Err(SessionError::MissingUrl)
                };
                let _ = reply.send(result);
            }
            Request::Close => self.close(),
            Request::Command => {
                if self.scheduler.arm() {
                    debug!("command transmit armed");
                }
            }
            Request::Release => self.release(),
            Request::SetCommands(commands) => self.commands = commands,
            Request::Send(frame) => self.send(frame),
            Request::History(reply) => {
                let _ = reply.send(self.cache.history().cloned().collect());
            }
            Request::Shutdown(ack) => {
                self.stop();
                let _ = ack.send(());
                return false;
            }
        }
        true
    }

    /// Open a new socket, dropping whatever the session held before.
    fn open(&mut self) {
        let Some(url) = self.url.clone() else {
            return;
        };
        self.detach();
        self.connect_started = Instant::now();

        info!(%url, transport = self.connector.transport_name(), "connecting");
        self.link = Link::Connecting(self.connector.connect(&url));
        self.set_phase(SessionPhase::Connecting);
        for observer in &mut self.observers {
            observer.on_connecting();
        }
    }

    /// Drop the current socket and its timers. Nothing from the old socket
    /// reaches the session after this.
    fn detach(&mut self) {
        self.poll.disarm();
        self.reconnect_at = None;
        self.link = Link::Idle;
    }

    fn on_open(&mut self, conn: Connection) {
        info!(url = conn.url(), "connected");
        self.link = Link::Open(conn);

        self.send(encode_request(Opcode::ScanNetworks));
        self.send(encode_request(Opcode::RequestConfig));
        self.poll.arm();

        self.set_phase(SessionPhase::Connected);
        for observer in &mut self.observers {
            observer.on_connected();
        }
    }

    fn on_socket_event(&mut self, event: SocketEvent) {
        match event {
            SocketEvent::Message(message) => self.dispatch(message),
            SocketEvent::Error(reason) => {
                error!(%reason, "socket error");
                if self.disabled {
                    self.lost();
                } else {
                    self.reconnect_now();
                }
            }
            SocketEvent::Closed { code } => {
                if code == Some(NORMAL_CLOSURE) {
                    debug!("socket closed");
                } else {
                    error!(?code, "socket closed abnormally");
                }
                self.lost();
            }
        }
    }

    /// The socket closed or never opened.
    fn lost(&mut self) {
        self.detach();
        self.set_phase(SessionPhase::Closed);
        for observer in &mut self.observers {
            observer.on_close();
        }

        if self.disabled {
            self.set_phase(SessionPhase::Disabled);
        } else {
            self.reconnect_at = Some(Instant::now() + self.config.reconnect_delay);
            self.set_phase(SessionPhase::Reconnecting);
        }
    }

    /// Abandon the current socket without waiting for a close handshake and
    /// open a new one right away.
    fn reconnect_now(&mut self) {
        self.poll.disarm();
        self.release();
        self.detach();
        self.discard_state();
        self.open();
    }

    /// Forget the last telemetry along with the watchdog baseline.
    fn discard_state(&mut self) {
        self.cache.reset();
        self.last_update = None;
        self.published.state.send_replace(None);
    }

    fn close(&mut self) {
        self.disabled = true;
        self.reconnect_at = None;
        self.poll.disarm();
        if let Link::Open(conn) = &self.link {
            info!(url = conn.url(), "closing");
            conn.close(NORMAL_CLOSURE);
        } else {
            // Drops an attempt still in flight.
            self.link = Link::Idle;
        }
        self.set_phase(SessionPhase::Disabled);
    }

    fn stop(&mut self) {
        self.release();
        self.close();
        self.link = Link::Idle;
        debug!("session task stopped");
    }

    fn on_poll(&mut self) {
        self.send(encode_request(Opcode::RequestTelemetry));
        if self.is_stale(Instant::now()) {
            info!("stale connection; attempting reconnect");
            self.reconnect_now();
        }
    }

    fn is_stale(&self, now: Instant) -> bool {
        if self.disabled {
            return false;
        }
        match (self.last_update, self.config.connect_grace) {
            (Some(last), _) => now > last + self.config.stale_timeout,
            (None, Some(grace)) => now > self.connect_started + grace,
            // Nothing received yet; the socket itself reports failures.
            (None, None) => false,
        }
    }

    fn release(&mut self) {
        if self.scheduler.disarm() {
            debug!("command transmit released");
            self.transmit_commands(Some(zero_commands(self.shape.motor_channels)));
        }
    }

    /// Encode and send commands: the session's buffer, or `commands` when given.
    fn transmit_commands(&mut self, commands: Option<Vec<ChannelCommand>>) {
        for observer in &mut self.observers {
            observer.on_send_commands(&mut self.commands);
        }

        // Seek normalization needs the channel ranges.
        let Some(config) = self.driver_config.as_deref() else {
            trace!("no config yet; skipping command transmit");
            return;
        };
        let commands = commands.as_deref().unwrap_or(&self.commands);
        match encode_commands(&self.shape, commands, config) {
            Ok(frame) => self.send(frame),
            Err(err) => error!(%err, "cannot encode commands"),
        }
    }

    /// Queue a frame on the open socket; discarded when there is none.
    fn send(&self, frame: Bytes) {
        match &self.link {
            Link::Open(conn) => {
                conn.send(frame);
            }
            _ => trace!(len = frame.len(), "socket not open; frame discarded"),
        }
    }

    fn dispatch(&mut self, message: Bytes) {
        let frame = match decode_frame(&message) {
            Ok(frame) => frame,
            Err(FrameError::UnknownOpcode(code)) => {
                warn!(code, len = message.len(), "unknown opcode");
                return;
            }
            Err(err) => {
                debug!(%err, "dropping frame");
                return;
            }
        };

        if frame.opcode.direction() == Direction::ClientToDevice {
            warn!(opcode = frame.opcode.name(), "unexpected opcode from device");
            return;
        }

        let result = match frame.opcode {
            Opcode::Telemetry => decode_telemetry(&self.shape, &frame.payload).map(|telemetry| {
                let now = Instant::now();
                let state = self.cache.ingest(telemetry, now);
                self.last_update = Some(now);
                self.published.state.send_replace(Some(Arc::clone(&state)));
                self.published.skew_ms.send_replace(self.cache.smoothed_skew_ms());
                for observer in &mut self.observers {
                    observer.on_state(&state);
                }
            }),
            Opcode::Config => decode_config(&self.shape, &frame.payload).map(|config| {
                let config = Arc::new(config);
                self.driver_config = Some(Arc::clone(&config));
                self.published.config.send_replace(Some(Arc::clone(&config)));
                for observer in &mut self.observers {
                    observer.on_config(&config);
                }
            }),
            Opcode::Networks => decode_networks(&frame.payload).map(|networks| {
                let networks = Arc::new(networks);
                self.published.networks.send_replace(Arc::clone(&networks));
                for observer in &mut self.observers {
                    observer.on_networks(&networks);
                }
            }),
            _ => Ok(()),
        };

        if let Err(err) = result {
            debug!(opcode = frame.opcode.name(), %err, "dropping frame");
        }
    }

    fn set_phase(&self, phase: SessionPhase) {
        let previous = self.published.phase.send_replace(phase);
        if previous != phase {
            debug!(%previous, %phase, "session phase");
        }
    }
}

use bytes::Bytes;
use futures_util::future::BoxFuture;
use tokio::sync::mpsc;

use crate::error::Result;

/// WebSocket close code for a normal, requested closure.
pub const NORMAL_CLOSURE: u16 = 1000;

/// A message queued for the socket's I/O task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// One complete binary frame.
    Binary(Bytes),
    /// Request a closing handshake with the given close code.
    Close(u16),
}

/// Something that happened on an open socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// One complete binary message; never a fragment.
    Message(Bytes),
    /// Transport-level failure. The socket should be considered dead.
    Error(String),
    /// The socket closed. `code` is `None` when no close frame was seen.
    Closed { code: Option<u16> },
}

/// An open socket, as seen by its single owner.
///
/// Dropping a `Connection` detaches it: the I/O task stops delivering events
/// and tears the socket down without waiting for a closing handshake.
pub struct Connection {
    url: String,
    outbound: mpsc::UnboundedSender<Outbound>,
    inbound: mpsc::UnboundedReceiver<SocketEvent>,
}

impl Connection {
    /// Assemble a connection from the channels of a running I/O task.
    pub fn new(
        url: impl Into<String>,
        outbound: mpsc::UnboundedSender<Outbound>,
        inbound: mpsc::UnboundedReceiver<SocketEvent>,
    ) -> Self {
        Self {
            url: url.into(),
            outbound,
            inbound,
        }
    }

    /// Queue a binary frame.
    ///
    /// Sends on a socket that is already gone are discarded; the return value
    /// only says whether the frame was queued.
    pub fn send(&self, payload: impl Into<Bytes>) -> bool {
        self.outbound
            .send(Outbound::Binary(payload.into()))
            .is_ok()
    }

    /// Ask the peer to close with `code`.
    pub fn close(&self, code: u16) {
        let _ = self.outbound.send(Outbound::Close(code));
    }

    /// Wait for the next socket event.
    ///
    /// An I/O task that ends without reporting anything counts as a close
    /// without a close frame.
    pub async fn next_event(&mut self) -> SocketEvent {
        self.inbound
            .recv()
            .await
            .unwrap_or(SocketEvent::Closed { code: None })
    }

    /// Whether the I/O task behind this connection has stopped.
    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }

    /// The URL this connection was opened with.
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("url", &self.url)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Opens driver sockets.
///
/// The returned future resolves once the socket is open; an error means the
/// socket failed before it ever opened.
pub trait Connector: Send + Sync + 'static {
    /// Start opening a socket to `url`.
    fn connect(&self, url: &str) -> BoxFuture<'static, Result<Connection>>;

    /// Transport name for diagnostics.
    fn transport_name(&self) -> &'static str;
}

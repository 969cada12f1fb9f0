//! In-memory transport for tests and scripted devices.
//!
//! [`MemoryConnector`] hands out [`Connection`]s whose far side shows up as a
//! [`DeviceEnd`] on the paired [`MemoryListener`].

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use futures_util::future::{self, BoxFuture};
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{Result, TransportError};
use crate::traits::{Connection, Connector, Outbound, SocketEvent};

/// Connector whose sockets terminate in the paired [`MemoryListener`].
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    accepted: mpsc::UnboundedSender<DeviceEnd>,
    refuse: Arc<AtomicUsize>,
    attempts: Arc<AtomicUsize>,
}

/// Receives the device side of every connection opened through a [`MemoryConnector`].
#[derive(Debug)]
pub struct MemoryListener {
    accepted: mpsc::UnboundedReceiver<DeviceEnd>,
}

/// Device side of an in-memory socket.
#[derive(Debug)]
pub struct DeviceEnd {
    url: String,
    from_client: mpsc::UnboundedReceiver<Outbound>,
    to_client: mpsc::UnboundedSender<SocketEvent>,
}

impl MemoryConnector {
    /// Create a connector and the listener that receives its device ends.
    pub fn new() -> (Self, MemoryListener) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                accepted: tx,
                refuse: Arc::new(AtomicUsize::new(0)),
                attempts: Arc::new(AtomicUsize::new(0)),
            },
            MemoryListener { accepted: rx },
        )
    }

    /// Make the next `n` connection attempts fail before opening.
    pub fn refuse_next(&self, n: usize) {
        self.refuse.store(n, Ordering::SeqCst);
    }

    /// Total connection attempts so far, refused ones included.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Connector for MemoryConnector {
    fn connect(&self, url: &str) -> BoxFuture<'static, Result<Connection>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let refused = self
            .refuse
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            debug!(%url, "refusing in-memory connection");
            return Box::pin(future::ready(Err(TransportError::Refused(url.to_string()))));
        }

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let device = DeviceEnd {
            url: url.to_string(),
            from_client: out_rx,
            to_client: in_tx,
        };

        let result = match self.accepted.send(device) {
            Ok(()) => Ok(Connection::new(url, out_tx, in_rx)),
            Err(_) => Err(TransportError::Refused(url.to_string())),
        };
        Box::pin(future::ready(result))
    }

    fn transport_name(&self) -> &'static str {
        "memory"
    }
}

impl MemoryListener {
    /// Wait for the next connection. `None` once every connector is gone.
    pub async fn accept(&mut self) -> Option<DeviceEnd> {
        self.accepted.recv().await
    }

    /// Take an already-opened connection without waiting.
    pub fn try_accept(&mut self) -> Option<DeviceEnd> {
        self.accepted.try_recv().ok()
    }
}

impl DeviceEnd {
    /// Next frame or close request from the client; `None` once the client detached.
    pub async fn recv(&mut self) -> Option<Outbound> {
        self.from_client.recv().await
    }

    /// Like [`DeviceEnd::recv`] but never waits.
    pub fn try_recv(&mut self) -> Option<Outbound> {
        self.from_client.try_recv().ok()
    }

    /// Deliver one binary message to the client.
    pub fn send(&self, payload: impl Into<Bytes>) -> bool {
        self.to_client
            .send(SocketEvent::Message(payload.into()))
            .is_ok()
    }

    /// Close the socket from the device side.
    pub fn close(&self, code: u16) {
        let _ = self.to_client.send(SocketEvent::Closed { code: Some(code) });
    }

    /// Report a transport error to the client.
    pub fn fail(&self, reason: &str) {
        let _ = self.to_client.send(SocketEvent::Error(reason.to_string()));
    }

    /// Whether the client has dropped its side of this socket.
    pub fn is_detached(&self) -> bool {
        self.to_client.is_closed()
    }

    /// The URL the client asked for.
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frames_cross_in_both_directions() {
        let (connector, mut listener) = MemoryConnector::new();
        let mut conn = connector.connect("mem://driver").await.unwrap();
        let mut device = listener.accept().await.unwrap();
        assert_eq!(device.url(), "mem://driver");

        assert!(conn.send(vec![0x04]));
        assert_eq!(
            device.recv().await,
            Some(Outbound::Binary(Bytes::from_static(&[0x04])))
        );

        assert!(device.send(vec![0x05, 0x00]));
        assert_eq!(
            conn.next_event().await,
            SocketEvent::Message(Bytes::from_static(&[0x05, 0x00]))
        );
    }

    #[tokio::test]
    async fn refused_attempts_are_counted() {
        let (connector, mut listener) = MemoryConnector::new();
        connector.refuse_next(2);

        assert!(connector.connect("mem://a").await.is_err());
        assert!(connector.connect("mem://a").await.is_err());
        assert!(connector.connect("mem://a").await.is_ok());
        assert_eq!(connector.attempts(), 3);
        assert!(listener.try_accept().is_some());
        assert!(listener.try_accept().is_none());
    }

    #[tokio::test]
    async fn dropping_connection_detaches_device() {
        let (connector, mut listener) = MemoryConnector::new();
        let conn = connector.connect("mem://a").await.unwrap();
        let mut device = listener.accept().await.unwrap();

        assert!(!device.is_detached());
        drop(conn);
        assert!(device.is_detached());
        assert_eq!(device.recv().await, None);
    }

    #[tokio::test]
    async fn closed_device_reports_close_code() {
        let (connector, mut listener) = MemoryConnector::new();
        let mut conn = connector.connect("mem://a").await.unwrap();
        let device = listener.accept().await.unwrap();

        device.close(4000);
        assert_eq!(
            conn.next_event().await,
            SocketEvent::Closed { code: Some(4000) }
        );

        drop(device);
        assert_eq!(conn.next_event().await, SocketEvent::Closed { code: None });
        assert!(conn.is_closed());
    }
}

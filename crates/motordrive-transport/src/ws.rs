use bytes::Bytes;
use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, warn};

use crate::error::{Result, TransportError};
use crate::traits::{Connection, Connector, Outbound, SocketEvent};

/// WebSocket transport built on `tokio-tungstenite`.
///
/// Each open socket is driven by its own I/O task; the session only ever
/// talks to it through the [`Connection`] channels.
#[derive(Debug, Clone, Default)]
pub struct WsConnector {}

impl WsConnector {
    pub fn new() -> Self {
        Self {}
    }
}

impl Connector for WsConnector {
    fn connect(&self, url: &str) -> BoxFuture<'static, Result<Connection>> {
        let url = url.to_string();
        Box::pin(async move {
            check_scheme(&url)?;
            let (stream, _response) = tokio_tungstenite::connect_async(url.as_str())
                .await
                .map_err(|err| connect_error(&url, err))?;
            debug!(%url, "websocket open");
            Ok(attach(stream, url))
        })
    }

    fn transport_name(&self) -> &'static str {
        "websocket"
    }
}

/// Complete the server side of a WebSocket handshake on an accepted stream.
pub async fn accept<S>(stream: S, peer: impl Into<String>) -> Result<Connection>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let peer = peer.into();
    let ws = tokio_tungstenite::accept_async(stream)
        .await
        .map_err(|err| TransportError::Accept {
            peer: peer.clone(),
            source: Box::new(err),
        })?;
    debug!(%peer, "websocket accepted");
    Ok(attach(ws, peer))
}

/// Wrap an already-open WebSocket stream in a [`Connection`].
///
/// Used for both client sockets and sockets accepted by a server (the
/// simulator), so both ends share one I/O loop.
pub fn attach<S>(stream: WebSocketStream<S>, label: impl Into<String>) -> Connection
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let label = label.into();
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    tokio::spawn(pump(stream, out_rx, in_tx, label.clone()));
    Connection::new(label, out_tx, in_rx)
}

async fn pump<S>(
    stream: WebSocketStream<S>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    inbound: mpsc::UnboundedSender<SocketEvent>,
    label: String,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut sink, mut source) = stream.split();

    loop {
        tokio::select! {
            out = outbound.recv() => match out {
                Some(Outbound::Binary(payload)) => {
                    if let Err(err) = sink.send(Message::Binary(payload.to_vec())).await {
                        let _ = inbound.send(SocketEvent::Error(err.to_string()));
                        break;
                    }
                }
                Some(Outbound::Close(code)) => {
                    let frame = CloseFrame {
                        code: CloseCode::from(code),
                        reason: "".into(),
                    };
                    if let Err(err) = sink.send(Message::Close(Some(frame))).await {
                        debug!(%label, %err, "close request failed");
                        let _ = inbound.send(SocketEvent::Closed { code: None });
                        break;
                    }
                    // Keep reading: the peer's close frame ends the loop.
                }
                None => {
                    // Owner dropped the connection; nobody is listening for events.
                    debug!(%label, "socket detached");
                    let _ = sink.close().await;
                    break;
                }
            },
            msg = source.next() => match msg {
                Some(Ok(Message::Binary(data))) => {
                    if inbound.send(SocketEvent::Message(Bytes::from(data))).is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Text(_))) => {
                    warn!(%label, "received data is not binary");
                }
                Some(Ok(Message::Close(frame))) => {
                    let code = frame.map(|f| u16::from(f.code));
                    let _ = sink.flush().await;
                    let _ = inbound.send(SocketEvent::Closed { code });
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    let _ = inbound.send(SocketEvent::Error(err.to_string()));
                    break;
                }
                None => {
                    let _ = inbound.send(SocketEvent::Closed { code: None });
                    break;
                }
            },
        }
    }
}

/// Only `ws://` and `wss://` reach the handshake.
fn check_scheme(url: &str) -> Result<()> {
    let scheme = url.split_once("://").map(|(scheme, _)| scheme);
    match scheme {
        Some(s) if s.eq_ignore_ascii_case("ws") || s.eq_ignore_ascii_case("wss") => Ok(()),
        Some(s) => Err(TransportError::InvalidUrl {
            url: url.to_string(),
            reason: format!("unsupported scheme {s}, expected ws or wss"),
        }),
        None => Err(TransportError::InvalidUrl {
            url: url.to_string(),
            reason: "missing ws:// or wss:// scheme".to_string(),
        }),
    }
}

fn connect_error(url: &str, err: tungstenite::Error) -> TransportError {
    match err {
        tungstenite::Error::Url(reason) => TransportError::InvalidUrl {
            url: url.to_string(),
            reason: reason.to_string(),
        },
        tungstenite::Error::HttpFormat(reason) => TransportError::InvalidUrl {
            url: url.to_string(),
            reason: reason.to_string(),
        },
        tungstenite::Error::Io(io) => TransportError::Connect {
            url: url.to_string(),
            source: Box::new(io),
        },
        other => TransportError::Connect {
            url: url.to_string(),
            source: Box::new(other),
        },
    }
}

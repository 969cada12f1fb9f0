//! Socket abstraction for motor driver sessions.
//!
//! Provides a single ownership model over different socket backends:
//! - WebSocket via `tokio-tungstenite` (the real driver)
//! - In-memory pairs (tests and scripted devices)
//!
//! This is the lowest layer of motordrive. The session owns exactly one
//! [`Connection`] at a time and drops it to detach from a socket.

pub mod error;
pub mod memory;
pub mod traits;
pub mod ws;

pub use error::{Result, TransportError};
pub use memory::{DeviceEnd, MemoryConnector, MemoryListener};
pub use traits::{Connection, Connector, Outbound, SocketEvent, NORMAL_CLOSURE};
pub use ws::{accept, attach, WsConnector};

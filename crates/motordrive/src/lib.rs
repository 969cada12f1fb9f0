//! Client for multi-channel motor drivers.
//!
//! A driver board streams telemetry and accepts power/seek commands over a
//! single WebSocket, using a compact little-endian binary protocol. This
//! crate ties the layers together.
//!
//! # Crate Structure
//!
//! - [`transport`]: socket abstraction (WebSocket, in-memory)
//! - [`frame`]: opcodes and wire codec
//! - [`session`]: connection lifecycle, polling and command scheduling (behind `session` feature)
//! - [`sim`]: scripted driver for demos and tests (behind `sim` feature)

/// Re-export transport types.
pub mod transport {
    pub use motordrive_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use motordrive_frame::*;
}

/// Re-export session types (requires `session` feature).
#[cfg(feature = "session")]
pub mod session {
    pub use motordrive_session::*;
}

#[cfg(feature = "sim")]
pub mod sim;

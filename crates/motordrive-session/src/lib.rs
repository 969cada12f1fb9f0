//! Session management for motor driver sockets.
//!
//! This is the "just works" layer. One background task owns the socket and
//! takes care of:
//! - connecting, reconnecting and the staleness watchdog
//! - polling telemetry and keeping a bounded history of snapshots
//! - transmitting the command buffer while armed
//!
//! Applications talk to it through a cloneable [`DriverClient`] and, for
//! push-style events, a [`SessionObserver`].

pub mod cache;
pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod observer;
pub mod scheduler;
pub mod session;

pub use cache::{DriverState, TelemetryCache};
pub use client::{DriverClient, SessionBuilder};
pub use clock::{ClockReconciler, Elapsed};
pub use config::SessionConfig;
pub use error::{Result, SessionError};
pub use observer::SessionObserver;
pub use scheduler::{CommandScheduler, Ticker};
pub use session::SessionPhase;

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default telemetry poll interval. The device drops subscribers after 200 ms.
pub const DEFAULT_TELEMETRY_POLL_INTERVAL: Duration = Duration::from_millis(80);

/// Default command transmit interval.
pub const DEFAULT_COMMAND_INTERVAL: Duration = Duration::from_millis(50);

/// Default staleness timeout before a forced reconnect.
pub const DEFAULT_STALE_TIMEOUT: Duration = Duration::from_millis(2000);

/// Default number of telemetry snapshots kept in history (about 10 s at 20 Hz).
pub const DEFAULT_MAX_HISTORY: usize = 200;

/// Timing and bookkeeping knobs for a driver session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// How often telemetry is re-requested; also the watchdog cadence.
    pub telemetry_poll_interval: Duration,
    /// How often armed commands are transmitted.
    pub command_interval: Duration,
    /// Time without telemetry before the socket is abandoned.
    pub stale_timeout: Duration,
    /// When set, a socket that has not produced any telemetry within this long
    /// after the connect attempt is abandoned too. Without it the watchdog
    /// only runs once telemetry has been seen.
    pub connect_grace: Option<Duration>,
    /// Maximum telemetry history length.
    pub max_history: usize,
    /// Delay before reconnecting after a close. Zero means the next turn of
    /// the session loop.
    pub reconnect_delay: Duration,
    /// Elapsed time assumed for the first frame on a fresh session.
    pub first_frame_elapsed: Duration,
    /// Weight of the newest sample in the skew average.
    pub skew_gamma: f64,
    /// Bound on the smoothed skew, either side of zero.
    pub skew_limit: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            telemetry_poll_interval: DEFAULT_TELEMETRY_POLL_INTERVAL,
            command_interval: DEFAULT_COMMAND_INTERVAL,
            stale_timeout: DEFAULT_STALE_TIMEOUT,
            connect_grace: None,
            max_history: DEFAULT_MAX_HISTORY,
            reconnect_delay: Duration::ZERO,
            first_frame_elapsed: Duration::from_millis(100),
            skew_gamma: 0.9,
            skew_limit: Duration::from_millis(500),
        }
    }
}

impl SessionConfig {
    /// The tighter watchdog: 500 ms without telemetry, with a 2 s allowance
    /// for the first frame after connecting.
    pub fn tight_watchdog() -> Self {
        Self {
            stale_timeout: Duration::from_millis(500),
            connect_grace: Some(Duration::from_millis(2000)),
            ..Self::default()
        }
    }

    pub fn with_stale_timeout(mut self, timeout: Duration) -> Self {
        self.stale_timeout = timeout;
        self
    }

    pub fn with_connect_grace(mut self, grace: Duration) -> Self {
        self.connect_grace = Some(grace);
        self
    }

    pub fn with_max_history(mut self, entries: usize) -> Self {
        self.max_history = entries;
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_command_interval(mut self, interval: Duration) -> Self {
        self.command_interval = interval;
        self
    }

    pub fn with_telemetry_poll_interval(mut self, interval: Duration) -> Self {
        self.telemetry_poll_interval = interval;
        self
    }
}

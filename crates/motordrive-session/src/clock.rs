//! Device tick and local clock reconciliation.

use std::time::Duration;

use motordrive_frame::{exp_average, wrapping_diff};
use tokio::time::Instant;

use crate::config::SessionConfig;

/// Elapsed time since the previous frame, on both clocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Elapsed {
    /// Device ticks (milliseconds) since the previous frame.
    pub driver_elapsed: u32,
    /// Local wall-clock time since the previous frame arrived.
    pub local_elapsed: Duration,
}

/// Turns device ticks and local arrival times into comparable elapsed times
/// and keeps a smoothed estimate of how far they drift apart.
#[derive(Debug, Clone)]
pub struct ClockReconciler {
    gamma: f64,
    limit_ms: f64,
    first_elapsed: Duration,
    last: Option<(u32, Instant)>,
    smoothed_skew_ms: f64,
}

impl ClockReconciler {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            gamma: config.skew_gamma,
            limit_ms: config.skew_limit.as_secs_f64() * 1000.0,
            first_elapsed: config.first_frame_elapsed,
            last: None,
            smoothed_skew_ms: 0.0,
        }
    }

    /// Record a frame with device tick `driver_time` arriving at `now`.
    pub fn observe(&mut self, driver_time: u32, now: Instant) -> Elapsed {
        let elapsed = match self.last {
            None => Elapsed {
                driver_elapsed: u32::try_from(self.first_elapsed.as_millis()).unwrap_or(u32::MAX),
                local_elapsed: self.first_elapsed,
            },
            Some((tick, at)) => Elapsed {
                driver_elapsed: wrapping_diff(tick, driver_time),
                local_elapsed: now.saturating_duration_since(at),
            },
        };
        self.last = Some((driver_time, now));

        let diff = elapsed.local_elapsed.as_secs_f64() * 1000.0 - f64::from(elapsed.driver_elapsed);
        self.smoothed_skew_ms = exp_average(diff, self.smoothed_skew_ms, self.gamma)
            .clamp(-self.limit_ms, self.limit_ms);
        elapsed
    }

    /// Forget the previous frame; the next one is treated as the first.
    ///
    /// The smoothed skew is kept.
    pub fn reset(&mut self) {
        self.last = None;
    }

    /// Smoothed `local_elapsed - driver_elapsed`, in milliseconds.
    pub fn smoothed_skew_ms(&self) -> f64 {
        self.smoothed_skew_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn first_frame_assumes_nominal_elapsed() {
        let mut clock = ClockReconciler::new(&SessionConfig::default());
        let elapsed = clock.observe(5_000, Instant::now());
        assert_eq!(elapsed.driver_elapsed, 100);
        assert_eq!(elapsed.local_elapsed, ms(100));
        assert_eq!(clock.smoothed_skew_ms(), 0.0);
    }

    #[test]
    fn tick_wraparound() {
        let mut clock = ClockReconciler::new(&SessionConfig::default());
        let t0 = Instant::now();
        clock.observe(0xFFFF_FFF0, t0);
        let elapsed = clock.observe(0x10, t0 + ms(32));
        assert_eq!(elapsed.driver_elapsed, 0x20);
        assert_eq!(elapsed.local_elapsed, ms(32));
        assert!(clock.smoothed_skew_ms().abs() < 1e-9);
    }

    #[test]
    fn skew_is_smoothed_and_clamped() {
        let mut clock = ClockReconciler::new(&SessionConfig::default());
        let t0 = Instant::now();
        clock.observe(0, t0);

        // 60 ms locally for 50 device ticks: 10 ms skew, weighted 0.9.
        clock.observe(50, t0 + ms(60));
        assert!((clock.smoothed_skew_ms() - 9.0).abs() < 1e-6);

        // A single packet held up for 10 s cannot push the estimate past 500 ms.
        clock.observe(100, t0 + ms(10_060));
        assert_eq!(clock.smoothed_skew_ms(), 500.0);

        // Back-to-back arrival pulls it down again.
        clock.observe(150, t0 + ms(10_060));
        assert!((clock.smoothed_skew_ms() - 5.0).abs() < 1e-6);
    }

    #[test]
    fn reset_restarts_elapsed_but_keeps_skew() {
        let mut clock = ClockReconciler::new(&SessionConfig::default());
        let t0 = Instant::now();
        clock.observe(0, t0);
        clock.observe(50, t0 + ms(60));
        let skew = clock.smoothed_skew_ms();

        clock.reset();
        let elapsed = clock.observe(9_999, t0 + ms(5_000));
        assert_eq!(elapsed.driver_elapsed, 100);
        assert!((clock.smoothed_skew_ms() - skew * 0.1).abs() < 1e-6);
    }
}

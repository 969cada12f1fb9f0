//! Latest telemetry snapshot and bounded history.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use motordrive_frame::{ChannelTelemetry, PressureTelemetry, TelemetryFrame};
use serde::{Serialize, Serializer};
use tokio::time::Instant;

use crate::clock::ClockReconciler;
use crate::config::SessionConfig;

/// One telemetry snapshot with local bookkeeping attached.
///
/// Snapshots are shared as `Arc<DriverState>` and never change once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriverState {
    pub voltage: f32,
    pub current: f32,
    pub power: f32,
    pub fps: f32,
    pub max_loop_time: f32,
    /// Device tick counter; wraps at 2^32.
    pub driver_time: u32,
    /// Device ticks since the previous snapshot.
    pub driver_elapsed: u32,
    /// When this snapshot was decoded.
    #[serde(skip)]
    pub local_time: Instant,
    /// Local time since the previous snapshot.
    #[serde(rename = "local_elapsed_ms", serialize_with = "as_millis")]
    pub local_elapsed: Duration,
    pub motor_channels: Vec<ChannelTelemetry>,
    pub pressure_channels: Vec<PressureTelemetry>,
}

fn as_millis<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(value.as_secs_f64() * 1000.0)
}

/// Holds the latest [`DriverState`], a newest-first history ring and the
/// clock reconciler that feeds them.
#[derive(Debug)]
pub struct TelemetryCache {
    state: Option<Arc<DriverState>>,
    history: VecDeque<Arc<DriverState>>,
    max_history: usize,
    clock: ClockReconciler,
}

impl TelemetryCache {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            state: None,
            history: VecDeque::with_capacity(config.max_history + 1),
            max_history: config.max_history,
            clock: ClockReconciler::new(config),
        }
    }

    /// Turn a decoded frame into the new current snapshot.
    pub fn ingest(&mut self, frame: TelemetryFrame, now: Instant) -> Arc<DriverState> {
        let elapsed = self.clock.observe(frame.driver_time, now);
        let state = Arc::new(DriverState {
            voltage: frame.voltage,
            current: frame.current,
            power: frame.power,
            fps: frame.fps,
            max_loop_time: frame.max_loop_time,
            driver_time: frame.driver_time,
            driver_elapsed: elapsed.driver_elapsed,
            local_time: now,
            local_elapsed: elapsed.local_elapsed,
            motor_channels: frame.motor_channels,
            pressure_channels: frame.pressure_channels,
        });

        self.history.push_front(Arc::clone(&state));
        while self.history.len() > self.max_history {
            self.history.pop_back();
        }
        self.state = Some(Arc::clone(&state));
        state
    }

    /// Drop the current snapshot so the next frame counts as the first.
    /// History is kept.
    pub fn reset(&mut self) {
        self.state = None;
        self.clock.reset();
    }

    pub fn state(&self) -> Option<&Arc<DriverState>> {
        self.state.as_ref()
    }

    /// Snapshots, newest first.
    pub fn history(&self) -> impl Iterator<Item = &Arc<DriverState>> {
        self.history.iter()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn smoothed_skew_ms(&self) -> f64 {
        self.clock.smoothed_skew_ms()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(tick: u32) -> TelemetryFrame {
        TelemetryFrame {
            driver_time: tick,
            ..TelemetryFrame::default()
        }
    }

    #[test]
    fn history_is_bounded_newest_first() {
        let mut cache = TelemetryCache::new(&SessionConfig::default());
        let t0 = Instant::now();
        for i in 0..250u32 {
            cache.ingest(frame(i * 50), t0 + Duration::from_millis(u64::from(i) * 50));
        }

        assert_eq!(cache.history_len(), 200);
        let ticks: Vec<u32> = cache.history().map(|s| s.driver_time).collect();
        assert_eq!(ticks[0], 249 * 50);
        assert_eq!(ticks[199], 50 * 50);
        assert!(ticks.windows(2).all(|w| w[0] > w[1]));
        assert_eq!(cache.state().map(|s| s.driver_time), Some(249 * 50));
    }

    #[test]
    fn elapsed_uses_previous_snapshot() {
        let mut cache = TelemetryCache::new(&SessionConfig::default());
        let t0 = Instant::now();
        let first = cache.ingest(frame(1_000), t0);
        assert_eq!(first.driver_elapsed, 100);

        let second = cache.ingest(frame(1_048), t0 + Duration::from_millis(50));
        assert_eq!(second.driver_elapsed, 48);
        assert_eq!(second.local_elapsed, Duration::from_millis(50));
        assert_eq!(second.local_time, t0 + Duration::from_millis(50));
    }

    #[test]
    fn reset_clears_state_but_not_history() {
        let mut cache = TelemetryCache::new(&SessionConfig::default());
        let t0 = Instant::now();
        cache.ingest(frame(10), t0);
        cache.ingest(frame(60), t0 + Duration::from_millis(50));

        cache.reset();
        assert!(cache.state().is_none());
        assert_eq!(cache.history_len(), 2);

        let next = cache.ingest(frame(7), t0 + Duration::from_secs(3));
        assert_eq!(next.driver_elapsed, 100);
    }

    #[test]
    fn zero_history_keeps_only_current_state() {
        let config = SessionConfig::default().with_max_history(0);
        let mut cache = TelemetryCache::new(&config);
        cache.ingest(frame(1), Instant::now());
        assert_eq!(cache.history_len(), 0);
        assert!(cache.state().is_some());
    }

    #[test]
    fn state_serializes_without_instant() {
        let mut cache = TelemetryCache::new(&SessionConfig::default());
        let state = cache.ingest(frame(42), Instant::now());
        let json = serde_json::to_value(&*state).unwrap();
        assert_eq!(json["driver_time"], 42);
        assert_eq!(json["local_elapsed_ms"], 100.0);
        assert!(json.get("local_time").is_none());
    }
}

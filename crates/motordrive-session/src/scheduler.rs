//! Cancellable periodic timers for the session loop.

use std::time::Duration;

use tokio::time::{self, Instant, Interval, MissedTickBehavior};

/// A periodic timer that can be armed and disarmed any number of times.
///
/// Arming an armed ticker and disarming an idle one are both no-ops, so a
/// ticker can never run twice. The first tick fires one period after arming.
#[derive(Debug)]
pub struct Ticker {
    period: Duration,
    interval: Option<Interval>,
}

impl Ticker {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            interval: None,
        }
    }

    /// Start ticking. Returns `false` if the ticker was already armed.
    pub fn arm(&mut self) -> bool {
        if self.interval.is_some() {
            return false;
        }
        let mut interval = time::interval_at(Instant::now() + self.period, self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.interval = Some(interval);
        true
    }

    /// Stop ticking. Returns `true` if the ticker was armed.
    pub fn disarm(&mut self) -> bool {
        self.interval.take().is_some()
    }

    pub fn is_armed(&self) -> bool {
        self.interval.is_some()
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Wait for the next tick. Never resolves while disarmed.
    ///
    /// Cancel safe.
    pub async fn tick(&mut self) {
        match self.interval.as_mut() {
            Some(interval) => {
                interval.tick().await;
            }
            None => std::future::pending().await,
        }
    }
}

/// Arms and disarms the periodic command transmit.
///
/// The scheduler only decides *when* to send; the session reads the command
/// buffer at tick time.
#[derive(Debug)]
pub struct CommandScheduler {
    ticker: Ticker,
}

impl CommandScheduler {
    pub fn new(period: Duration) -> Self {
        Self {
            ticker: Ticker::new(period),
        }
    }

    /// Begin periodic transmission. Idempotent.
    pub fn arm(&mut self) -> bool {
        self.ticker.arm()
    }

    /// Stop periodic transmission. Returns whether it was armed, in which case
    /// the caller owes the device one all-zero command frame.
    pub fn disarm(&mut self) -> bool {
        self.ticker.disarm()
    }

    pub fn is_armed(&self) -> bool {
        self.ticker.is_armed()
    }

    pub async fn tick(&mut self) {
        self.ticker.tick().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn first_tick_after_one_period() {
        let mut ticker = Ticker::new(Duration::from_millis(50));
        assert!(ticker.arm());
        let start = Instant::now();
        ticker.tick().await;
        assert_eq!(start.elapsed(), Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn arming_twice_keeps_one_timer() {
        let mut ticker = Ticker::new(Duration::from_millis(50));
        assert!(ticker.arm());
        time::advance(Duration::from_millis(30)).await;
        assert!(!ticker.arm());

        let start = Instant::now();
        ticker.tick().await;
        // Still on the original schedule.
        assert_eq!(start.elapsed(), Duration::from_millis(20));
    }

    #[test]
    fn disarm_is_idempotent() {
        let mut scheduler = CommandScheduler::new(Duration::from_millis(50));
        assert!(!scheduler.disarm());
        assert!(!scheduler.disarm());
        assert!(!scheduler.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn disarmed_ticker_never_fires() {
        let mut scheduler = CommandScheduler::new(Duration::from_millis(50));
        scheduler.arm();
        assert!(scheduler.disarm());

        let fired = time::timeout(Duration::from_secs(1), scheduler.tick()).await;
        assert!(fired.is_err());
    }
}

//! Session clock
//!
//! Wall-clock timestamps for the session record and a periodic ticker that
//! drives countdown, elapsed display and the timer deadline.

use chrono::{DateTime, Duration as ChronoDuration, Local};
use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// Default tick period
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Source of wall-clock time for timestamps
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

/// Clock backed by the system time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Clock that only moves when told to.
///
/// Tests advance it by whole seconds and feed one tick per advance, so the
/// tick count and the wall time stay in step.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Local>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Local>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move time forward
    pub fn advance(&self, by: Duration) {
        let by = ChronoDuration::from_std(by).unwrap_or_else(|_| ChronoDuration::zero());
        let mut now = self.now.lock();
        *now += by;
    }

    pub fn advance_secs(&self, secs: u64) {
        self.advance(Duration::from_secs(secs));
    }

    #[cfg(test)]
    pub fn set(&self, to: DateTime<Local>) {
        *self.now.lock() = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Local> {
        *self.now.lock()
    }
}

/// Periodic tick source for the session event loop
pub struct Ticker {
    interval: Interval,
}

impl Ticker {
    /// Create a ticker whose first tick fires one period from now
    pub fn new(period: Duration) -> Self {
        let period = if period.is_zero() { DEFAULT_TICK_INTERVAL } else { period };
        let mut interval = interval_at(Instant::now() + period, period);
        // A stalled loop must not replay a burst of ticks and skip the countdown.
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }

    pub async fn tick(&mut self) {
        self.interval.tick().await;
    }

    /// Restart the period from now
    pub fn reset(&mut self) {
        self.interval.reset();
    }
}

impl Default for Ticker {
    fn default() -> Self {
        Self::new(DEFAULT_TICK_INTERVAL)
    }
}

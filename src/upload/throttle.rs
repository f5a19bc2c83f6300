//! Fixed-rate launch throttle
//!
//! Caps how often work is *started*, not how much of it is in flight: the
//! first launch is immediate and every later one waits for the next tick.

use std::time::Duration;
use tokio::time::{self, Interval, MissedTickBehavior};

/// Fixed-interval ticker gating task launches
#[derive(Debug)]
pub struct LaunchThrottle {
    interval: Interval,
    launched: usize,
}

impl LaunchThrottle {
    /// Create a throttle allowing one launch per `period`
    pub fn new(period: Duration) -> Self {
        // tokio panics on a zero period.
        let mut interval = time::interval(period.max(Duration::from_millis(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            interval,
            launched: 0,
        }
    }

    /// Wait until the next launch is allowed
    pub async fn ready(&mut self) {
        self.interval.tick().await;
        self.launched += 1;
    }

    /// Number of launches granted so far
    pub fn launched(&self) -> usize {
        self.launched
    }
}

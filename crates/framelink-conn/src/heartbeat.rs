use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

/// Traffic-based liveness tracker.
///
/// Any successfully read or written frame counts as activity. There is no
/// ping/pong exchange: a connection that only sends is still alive.
#[derive(Debug)]
pub struct Heartbeat {
    last_activity: Mutex<Instant>,
    interval: Duration,
}

impl Heartbeat {
    /// Start tracking with `now` as the last activity.
    pub fn new(interval: Duration) -> Self {
        Self {
            last_activity: Mutex::new(Instant::now()),
            interval,
        }
    }

    /// Record activity.
    pub fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    /// Check period and idle threshold.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Time of the last recorded activity.
    pub fn last_activity(&self) -> Instant {
        *self.last_activity.lock()
    }

    /// Time since the last recorded activity.
    pub fn idle_for(&self) -> Duration {
        Instant::now().saturating_duration_since(self.last_activity())
    }

    /// Whether the idle time exceeds the interval.
    ///
    /// Evaluated under the same lock `touch` takes.
    pub fn is_expired(&self) -> bool {
        let last = self.last_activity.lock();
        Instant::now().saturating_duration_since(*last) > self.interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn expires_only_after_interval_is_exceeded() {
        let heartbeat = Heartbeat::new(Duration::from_secs(5));

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(!heartbeat.is_expired(), "exactly one interval is still alive");

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(heartbeat.is_expired());
    }

    #[tokio::test(start_paused = true)]
    async fn touch_resets_idle_time() {
        let heartbeat = Heartbeat::new(Duration::from_secs(5));

        tokio::time::advance(Duration::from_secs(4)).await;
        heartbeat.touch();
        tokio::time::advance(Duration::from_secs(4)).await;

        assert!(!heartbeat.is_expired());
        assert_eq!(heartbeat.idle_for(), Duration::from_secs(4));
    }
}

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

/// Timestamped entries of one metric within a trailing window.
#[derive(Debug, Default)]
pub(super) struct RateLimitWindow {
    entries: VecDeque<(Instant, u64)>,
    total: u64,
    last_touched: Option<Instant>,
}

impl RateLimitWindow {
    /// Drops entries older than `now - window`.
    pub fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(&(at, amount)) = self.entries.front() {
            if now.saturating_duration_since(at) < window {
                break;
            }
            self.total -= amount;
            self.entries.pop_front();
        }
    }

    pub fn record(&mut self, now: Instant, amount: u64) {
        self.entries.push_back((now, amount));
        self.total += amount;
        self.last_touched = Some(now);
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Time until at least `needed` units have left the window.
    pub fn reset_in(&self, now: Instant, window: Duration, needed: u64) -> Duration {
        let mut freed = 0u64;
        for &(at, amount) in &self.entries {
            freed += amount;
            if freed >= needed {
                return (at + window).saturating_duration_since(now);
            }
        }
        self.entries
            .back()
            .map(|&(at, _)| (at + window).saturating_duration_since(now))
            .unwrap_or_default()
    }

    pub fn is_idle(&self, now: Instant, ttl: Duration) -> bool {
        self.last_touched
            .is_none_or(|at| now.saturating_duration_since(at) >= ttl)
    }
}

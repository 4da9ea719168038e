//! In-process sliding-window request counter
//!
//! The one piece of cross-invocation mutable state in the security core.
//! Timestamps are tracked per `(ip, endpoint)` pair in a sharded map;
//! entries are pruned on access and swept in the background so memory stays
//! bounded. State is ephemeral: a process restart starts counting from
//! zero.

use crate::config::RateConfig;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RateKey {
    ip: String,
    endpoint: String,
}

/// Concurrency-safe request-rate tracker
pub struct RateTracker {
    window: Duration,
    max_entry_age: Duration,
    entries: DashMap<RateKey, VecDeque<Instant>>,
}

impl RateTracker {
    pub fn new(config: &RateConfig) -> Self {
        Self {
            window: config.window,
            max_entry_age: config.max_entry_age,
            entries: DashMap::new(),
        }
    }

    /// Record one request and return the in-window count for the pair
    pub fn record(&self, ip: &str, endpoint: &str) -> usize {
        let now = Instant::now();
        let key = RateKey {
            ip: ip.to_string(),
            endpoint: endpoint.to_string(),
        };
        let mut timestamps = self.entries.entry(key).or_default();
        Self::prune(&mut timestamps, now, self.window);
        timestamps.push_back(now);
        timestamps.len()
    }

    /// Current in-window count without recording a request
    pub fn count(&self, ip: &str, endpoint: &str) -> usize {
        let now = Instant::now();
        let key = RateKey {
            ip: ip.to_string(),
            endpoint: endpoint.to_string(),
        };
        match self.entries.get_mut(&key) {
            Some(mut timestamps) => {
                Self::prune(&mut timestamps, now, self.window);
                timestamps.len()
            }
            None => 0,
        }
    }

    /// Drop expired timestamps everywhere and remove empty keys
    pub fn sweep(&self) {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, timestamps| {
            Self::prune(timestamps, now, self.max_entry_age);
            !timestamps.is_empty()
        });
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!(
                target: "mealdesk_monitor",
                removed, "swept idle rate-tracker entries"
            );
        }
    }

    /// Number of tracked `(ip, endpoint)` pairs
    pub fn tracked_pairs(&self) -> usize {
        self.entries.len()
    }

    /// Spawn the periodic background sweeper
    ///
    /// The returned handle stops the task when dropped or on an explicit
    /// [`SweeperHandle::stop`]; there is no implicit process-wide interval.
    pub fn start_sweeper(self: Arc<Self>, interval: Duration) -> SweeperHandle {
        let tracker = self;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                tracker.sweep();
            }
        });
        SweeperHandle { handle }
    }

    fn prune(timestamps: &mut VecDeque<Instant>, now: Instant, horizon: Duration) {
        while let Some(oldest) = timestamps.front() {
            if now.duration_since(*oldest) > horizon {
                timestamps.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Lifecycle handle for the background sweeper task
pub struct SweeperHandle {
    handle: JoinHandle<()>,
}

impl SweeperHandle {
    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn short_config() -> RateConfig {
        RateConfig {
            window: Duration::from_millis(80),
            max_entry_age: Duration::from_millis(80),
            sweep_interval: Duration::from_millis(20),
        }
    }

    #[test]
    fn counts_per_pair() {
        let tracker = RateTracker::new(&RateConfig::default());

        assert_eq!(tracker.record("10.0.0.1", "/orders"), 1);
        assert_eq!(tracker.record("10.0.0.1", "/orders"), 2);
        // Other endpoint and other IP count independently
        assert_eq!(tracker.record("10.0.0.1", "/menus"), 1);
        assert_eq!(tracker.record("10.0.0.2", "/orders"), 1);
        assert_eq!(tracker.tracked_pairs(), 3);

        assert_eq!(tracker.count("10.0.0.1", "/orders"), 2);
        assert_eq!(tracker.count("10.0.0.3", "/orders"), 0);
    }

    #[tokio::test]
    async fn window_expiry() {
        let tracker = RateTracker::new(&short_config());
        tracker.record("10.0.0.1", "/orders");
        tracker.record("10.0.0.1", "/orders");
        assert_eq!(tracker.count("10.0.0.1", "/orders"), 2);

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(tracker.count("10.0.0.1", "/orders"), 0);
        assert_eq!(tracker.record("10.0.0.1", "/orders"), 1);
    }

    #[tokio::test]
    async fn sweep_drops_idle_keys() {
        let tracker = RateTracker::new(&short_config());
        tracker.record("10.0.0.1", "/orders");
        tracker.record("10.0.0.2", "/orders");
        assert_eq!(tracker.tracked_pairs(), 2);

        tokio::time::sleep(Duration::from_millis(120)).await;
        tracker.sweep();
        assert_eq!(tracker.tracked_pairs(), 0);
    }

    #[tokio::test]
    async fn background_sweeper_runs_and_stops() {
        let tracker = Arc::new(RateTracker::new(&short_config()));
        tracker.record("10.0.0.1", "/orders");

        let sweeper = Arc::clone(&tracker).start_sweeper(Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(160)).await;
        assert_eq!(tracker.tracked_pairs(), 0);

        sweeper.stop();
        tracker.record("10.0.0.1", "/orders");
        tokio::time::sleep(Duration::from_millis(160)).await;
        // Sweeper is stopped; the expired entry stays until swept manually
        assert_eq!(tracker.tracked_pairs(), 1);
    }
}

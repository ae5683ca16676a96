use std::sync::Arc;

use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::debug;

use crate::metrics::{unix_now_ms, SampleStore};

/// Periodically evicts samples older than the TTL from the store
pub struct ExpirySweeper {
    store: Arc<SampleStore>,
    ttl: Duration,
    period: Duration,
}

impl ExpirySweeper {
    pub fn new(store: Arc<SampleStore>, ttl: Duration, period: Duration) -> Self {
        ExpirySweeper { store, ttl, period }
    }

    pub async fn run(self) {
        let mut tick = interval(self.period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately; nothing can be stale yet
        tick.tick().await;

        loop {
            tick.tick().await;
            self.sweep_at(unix_now_ms());
        }
    }

    /// One sweep pass against the given clock, returning the number evicted
    pub fn sweep_at(&self, now_ms: i64) -> usize {
        let removed = self.store.sweep(self.ttl, now_ms);
        debug!(removed, remaining = self.store.len(), "expiry sweep");
        removed
    }
}

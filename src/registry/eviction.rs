//! Background eviction sweep.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tokio::time;

use crate::registry::store::Registry;

/// Periodically removes instances whose lease has run out.
pub struct EvictionTask {
    registry: Arc<Registry>,
    interval: Duration,
}

impl EvictionTask {
    pub fn new(registry: Arc<Registry>) -> Self {
        let interval = Duration::from_secs(registry.config().eviction_interval_secs);
        Self { registry, interval }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            interval = ?self.interval,
            max_age = ?self.registry.config().eviction_age(),
            "Eviction sweep starting"
        );

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let evicted = self.registry.evict_expired(Instant::now());
                    if !evicted.is_empty() {
                        tracing::info!(count = evicted.len(), "Eviction sweep removed instances");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Eviction sweep received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

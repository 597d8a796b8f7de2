//! Lease renewal loop for a running instance.

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time;

use crate::error::{MeshError, Result};
use crate::registry::{Instance, InstanceStatus, RegistryClient};

/// Renews the lease on a fixed interval, registering again whenever the
/// registry no longer knows the instance.
pub struct HeartbeatTask {
    registry: RegistryClient,
    instance: Instance,
    interval: Duration,
}

impl HeartbeatTask {
    pub fn new(registry: RegistryClient, instance: Instance, interval: Duration) -> Self {
        Self {
            registry,
            instance,
            interval,
        }
    }

    /// One renewal. `NotFound` (evicted, registry restarted, startup
    /// registration failed) triggers a fresh registration.
    pub async fn beat(&self) -> Result<()> {
        let result = self
            .registry
            .heartbeat(
                &self.instance.service_name,
                &self.instance.instance_id,
                Some(InstanceStatus::Up),
            )
            .await;

        match result {
            Err(MeshError::NotFound(_)) => {
                tracing::warn!(
                    service = %self.instance.service_name,
                    instance_id = %self.instance.instance_id,
                    "Registry does not know this instance, registering again"
                );
                self.registry.register(&self.instance).await.map(|_| ())
            }
            other => other,
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            service = %self.instance.service_name,
            instance_id = %self.instance.instance_id,
            interval = ?self.interval,
            "Heartbeat starting"
        );

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        // The first tick fires immediately; registration just happened.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.beat().await {
                        tracing::warn!(
                            service = %self.instance.service_name,
                            instance_id = %self.instance.instance_id,
                            error = %e,
                            "Heartbeat failed"
                        );
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Heartbeat received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

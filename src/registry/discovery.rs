//! Instance resolution seam shared by the gateway and peer clients.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::Result;
use crate::registry::instance::Instance;
use crate::registry::store::Registry;

/// Resolves a service name to its UP instances.
#[async_trait]
pub trait Discovery: Send + Sync {
    async fn lookup(&self, service: &str) -> Result<Vec<Instance>>;

    /// Forget any cached answer for `service`, e.g. after an instance refused
    /// a connection. No-op for sources that do not cache.
    fn invalidate(&self, _service: &str) {}
}

#[async_trait]
impl Discovery for Registry {
    async fn lookup(&self, service: &str) -> Result<Vec<Instance>> {
        Ok(Registry::lookup(self, service))
    }
}

struct CachedLookup {
    fetched_at: Instant,
    stale: bool,
    instances: Vec<Instance>,
}

/// Caches lookups for `ttl` and serves the last good answer when the
/// underlying registry fails.
pub struct CachedDiscovery {
    inner: Arc<dyn Discovery>,
    ttl: Duration,
    cache: DashMap<String, CachedLookup>,
}

impl CachedDiscovery {
    pub fn new(inner: Arc<dyn Discovery>, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            cache: DashMap::new(),
        }
    }
}

#[async_trait]
impl Discovery for CachedDiscovery {
    async fn lookup(&self, service: &str) -> Result<Vec<Instance>> {
        let key = service.to_lowercase();
        if let Some(entry) = self.cache.get(&key) {
            if !entry.stale && entry.fetched_at.elapsed() < self.ttl {
                return Ok(entry.instances.clone());
            }
        }

        match self.inner.lookup(&key).await {
            Ok(instances) => {
                self.cache.insert(
                    key,
                    CachedLookup {
                        fetched_at: Instant::now(),
                        stale: false,
                        instances: instances.clone(),
                    },
                );
                Ok(instances)
            }
            Err(e) => match self.cache.get(&key) {
                Some(entry) => {
                    tracing::warn!(service = %key, error = %e, "Registry lookup failed, serving stale instances");
                    Ok(entry.instances.clone())
                }
                None => Err(e),
            },
        }
    }

    /// Marks the entry stale; it is still served if the registry is down.
    fn invalidate(&self, service: &str) {
        if let Some(mut entry) = self.cache.get_mut(&service.to_lowercase()) {
            entry.stale = true;
        }
    }
}

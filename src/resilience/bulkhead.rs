//! Concurrency ceiling for one call path.
//!
//! # Design Decisions
//! - Backed by a Tokio semaphore: admission is atomic, the ceiling cannot be exceeded
//! - The permit is an RAII guard, so a cancelled or timed-out caller frees its slot
//!   as soon as its future is dropped
//! - `max_wait` of zero rejects immediately instead of queueing

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{MeshError, Result};

#[derive(Debug)]
pub struct Bulkhead {
    name: String,
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
    max_wait: Duration,
}

/// Slot held for the duration of one call.
#[derive(Debug)]
pub struct BulkheadPermit {
    _permit: OwnedSemaphorePermit,
}

impl Bulkhead {
    pub fn new(name: impl Into<String>, max_concurrent: usize, max_wait: Duration) -> Self {
        Self {
            name: name.into(),
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            max_wait,
        }
    }

    /// Admit a call or reject it with `Unavailable`.
    pub async fn acquire(&self) -> Result<BulkheadPermit> {
        let permit = if self.max_wait.is_zero() {
            self.semaphore.clone().try_acquire_owned().ok()
        } else {
            tokio::time::timeout(self.max_wait, self.semaphore.clone().acquire_owned())
                .await
                .ok()
                .and_then(|r| r.ok())
        };

        permit
            .map(|p| BulkheadPermit { _permit: p })
            .ok_or_else(|| {
                MeshError::Unavailable(format!(
                    "bulkhead '{}' full ({} concurrent calls)",
                    self.name, self.max_concurrent
                ))
            })
    }

    pub fn in_flight(&self) -> usize {
        self.max_concurrent - self.semaphore.available_permits()
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }
}

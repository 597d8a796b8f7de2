//! A named composition of resilience guards.
//!
//! # Data Flow
//! ```text
//! call(op)
//!     → rate limiter     (reject: Unavailable)
//!     → bulkhead         (reject: Unavailable; slot held across retries)
//!     → attempt loop:
//!         → circuit breaker (reject: Unavailable, no further attempts)
//!         → timeout         (expire: TimedOut)
//!         → op()
//!         → Transient/TimedOut: record failure, back off, retry while budget remains
//!     → budget exhausted: Unavailable
//! ```
//!
//! # Design Decisions
//! - Guards are optional; a policy built without any of them just runs `op` once
//! - Business errors pass through untouched and do not affect breaker statistics

use std::future::Future;
use std::time::Duration;

use crate::config::schema::PolicyConfig;
use crate::error::{MeshError, Result};
use crate::observability::metrics;
use crate::resilience::backoff::Backoff;
use crate::resilience::bulkhead::Bulkhead;
use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitState};
use crate::resilience::rate_limit::RateLimiter;
use crate::resilience::retries::RetryPolicy;
use crate::resilience::timeouts::with_timeout;

#[derive(Debug)]
pub struct CallPolicy {
    name: String,
    rate_limiter: Option<RateLimiter>,
    bulkhead: Option<Bulkhead>,
    retry: RetryPolicy,
    circuit_breaker: Option<CircuitBreaker>,
    call_timeout: Option<Duration>,
    /// Source config, used to keep state across reloads when nothing changed.
    config: Option<PolicyConfig>,
}

impl CallPolicy {
    pub fn builder(name: impl Into<String>) -> PolicyBuilder {
        PolicyBuilder::new(name)
    }

    pub fn from_config(name: &str, config: &PolicyConfig) -> Self {
        let mut builder = PolicyBuilder::new(name)
            .retry(RetryPolicy::new(config.max_retries, Backoff::from(&config.backoff)))
            .circuit_breaker(CircuitBreaker::from_config(name, &config.circuit_breaker))
            .bulkhead(
                config.bulkhead_max_concurrent_calls,
                Duration::from_millis(config.bulkhead_max_wait_ms),
            )
            .timeout(Duration::from_millis(config.call_timeout_ms));
        if config.rate_limit_per_second > 0 {
            builder = builder.rate_limit(config.rate_limit_per_second, config.rate_limit_burst);
        }
        let mut policy = builder.build();
        policy.config = Some(config.clone());
        policy
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> Option<&PolicyConfig> {
        self.config.as_ref()
    }

    pub fn circuit_state(&self) -> Option<CircuitState> {
        self.circuit_breaker.as_ref().map(|cb| cb.state())
    }

    pub fn in_flight(&self) -> usize {
        self.bulkhead.as_ref().map_or(0, |b| b.in_flight())
    }

    /// Run `op` under every guard, retrying transient failures.
    pub async fn call<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.execute(self.retry, op).await
    }

    /// Like `call`, but never retries. For operations that must not be replayed.
    pub async fn call_once<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.execute(RetryPolicy::disabled(), op).await
    }

    async fn execute<T, F, Fut>(&self, retry: RetryPolicy, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(limiter) = &self.rate_limiter {
            if !limiter.try_acquire() {
                metrics::record_rejection(&self.name, "rate_limited");
                tracing::debug!(policy = %self.name, "Call rejected by rate limiter");
                return Err(MeshError::Unavailable(format!(
                    "rate limit exceeded for '{}'",
                    self.name
                )));
            }
        }

        let _slot = match &self.bulkhead {
            Some(bulkhead) => match bulkhead.acquire().await {
                Ok(slot) => Some(slot),
                Err(e) => {
                    metrics::record_rejection(&self.name, "bulkhead_full");
                    tracing::debug!(policy = %self.name, "Call rejected by bulkhead");
                    return Err(e);
                }
            },
            None => None,
        };

        let mut attempt = 0u32;
        loop {
            attempt += 1;

            let permit = match &self.circuit_breaker {
                Some(cb) => match cb.try_acquire() {
                    Ok(permit) => Some(permit),
                    Err(e) => {
                        metrics::record_rejection(&self.name, "circuit_open");
                        return Err(e);
                    }
                },
                None => None,
            };

            let result = match self.call_timeout {
                Some(limit) => with_timeout(limit, &self.name, op()).await,
                None => op().await,
            };

            match result {
                Ok(value) => {
                    if let Some(permit) = permit {
                        permit.success();
                    }
                    return Ok(value);
                }
                Err(e) if e.is_transient() => {
                    if let Some(permit) = permit {
                        permit.failure();
                    }
                    if retry.should_retry(attempt, &e) {
                        let delay = retry.delay(attempt);
                        tracing::info!(
                            policy = %self.name,
                            attempt,
                            delay = ?delay,
                            error = %e,
                            "Retrying call"
                        );
                        metrics::record_retry(&self.name);
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    tracing::warn!(
                        policy = %self.name,
                        attempts = attempt,
                        error = %e,
                        "Call failed, retries exhausted"
                    );
                    metrics::record_rejection(&self.name, "retries_exhausted");
                    return Err(MeshError::Unavailable(format!(
                        "'{}' failed after {} attempt(s): {}",
                        self.name, attempt, e
                    )));
                }
                Err(e) => {
                    if let Some(permit) = permit {
                        permit.ignore();
                    }
                    return Err(e);
                }
            }
        }
    }
}

/// Assemble a `CallPolicy` from individual guards.
#[derive(Debug)]
pub struct PolicyBuilder {
    name: String,
    rate_limiter: Option<RateLimiter>,
    bulkhead: Option<Bulkhead>,
    retry: RetryPolicy,
    circuit_breaker: Option<CircuitBreaker>,
    call_timeout: Option<Duration>,
}

impl PolicyBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rate_limiter: None,
            bulkhead: None,
            retry: RetryPolicy::disabled(),
            circuit_breaker: None,
            call_timeout: None,
        }
    }

    pub fn rate_limit(mut self, per_second: u32, burst: u32) -> Self {
        self.rate_limiter = Some(RateLimiter::new(per_second, burst));
        self
    }

    pub fn bulkhead(mut self, max_concurrent: usize, max_wait: Duration) -> Self {
        self.bulkhead = Some(Bulkhead::new(self.name.clone(), max_concurrent, max_wait));
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn circuit_breaker(mut self, breaker: CircuitBreaker) -> Self {
        self.circuit_breaker = Some(breaker);
        self
    }

    pub fn timeout(mut self, limit: Duration) -> Self {
        self.call_timeout = Some(limit);
        self
    }

    pub fn build(self) -> CallPolicy {
        CallPolicy {
            name: self.name,
            rate_limiter: self.rate_limiter,
            bulkhead: self.bulkhead,
            retry: self.retry,
            circuit_breaker: self.circuit_breaker,
            call_timeout: self.call_timeout,
            config: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let policy = CallPolicy::builder("exchange")
            .retry(RetryPolicy::new(2, Backoff::none()))
            .build();
        let calls = AtomicUsize::new(0);

        let result = policy
            .call(|| async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(MeshError::Transient("reset".into()))
                } else {
                    Ok("rate")
                }
            })
            .await;
        assert_eq!(result.unwrap(), "rate");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_become_unavailable() {
        let policy = CallPolicy::builder("exchange")
            .retry(RetryPolicy::new(2, Backoff::none()))
            .build();
        let calls = AtomicUsize::new(0);

        let result: Result<()> = policy
            .call(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(MeshError::Transient("reset".into()))
            })
            .await;
        assert!(matches!(result, Err(MeshError::Unavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_business_errors_pass_through() {
        let policy = CallPolicy::builder("exchange")
            .retry(RetryPolicy::new(3, Backoff::none()))
            .circuit_breaker(CircuitBreaker::new(
                "exchange",
                0.5,
                2,
                Duration::from_secs(60),
                Duration::from_secs(30),
            ))
            .build();
        let calls = AtomicUsize::new(0);

        for _ in 0..5 {
            let result: Result<()> = policy
                .call(|| async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(MeshError::Upstream { status: 400, message: "bad amount".into() })
                })
                .await;
            assert!(matches!(result, Err(MeshError::Upstream { status: 400, .. })));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert_eq!(policy.circuit_state(), Some(CircuitState::Closed));
    }

    #[tokio::test]
    async fn test_open_breaker_fails_fast() {
        let policy = CallPolicy::builder("exchange")
            .circuit_breaker(CircuitBreaker::new(
                "exchange",
                0.5,
                2,
                Duration::from_secs(60),
                Duration::from_secs(30),
            ))
            .build();
        let calls = AtomicUsize::new(0);
        let failing = || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(MeshError::Transient("reset".into()))
        };

        for _ in 0..2 {
            assert!(policy.call(failing).await.is_err());
        }
        assert_eq!(policy.circuit_state(), Some(CircuitState::Open));

        let result = policy.call(failing).await;
        assert!(matches!(result, Err(MeshError::Unavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2, "open circuit must not invoke the operation");
    }

    #[tokio::test]
    async fn test_timeout_counts_as_transient() {
        let policy = CallPolicy::builder("exchange")
            .retry(RetryPolicy::new(1, Backoff::none()))
            .timeout(Duration::from_millis(20))
            .build();
        let calls = AtomicUsize::new(0);

        let result: Result<()> = policy
            .call(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(MeshError::Unavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_per_attempt_timeout_frees_bulkhead_slot() {
        let policy = CallPolicy::builder("exchange")
            .bulkhead(1, Duration::ZERO)
            .timeout(Duration::from_millis(20))
            .build();

        let result: Result<()> = policy
            .call(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(MeshError::Unavailable(_))));
        assert_eq!(policy.in_flight(), 0);
        assert!(policy.call(|| async { Ok(()) }).await.is_ok());
    }

    #[tokio::test]
    async fn test_abandoned_call_frees_bulkhead_slot() {
        let policy = CallPolicy::builder("exchange")
            .bulkhead(1, Duration::ZERO)
            .build();

        let slow = policy.call(|| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok("late")
        });
        let (outer, held) = tokio::join!(
            tokio::time::timeout(Duration::from_millis(50), slow),
            async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                policy.in_flight()
            }
        );
        assert!(outer.is_err(), "caller deadline should expire first");
        assert_eq!(held, 1);

        // The downstream never finished, yet the slot is back.
        assert_eq!(policy.in_flight(), 0);
        assert_eq!(policy.call(|| async { Ok("rate") }).await.unwrap(), "rate");
    }

    #[tokio::test]
    async fn test_bulkhead_ceiling_under_load() {
        let policy = Arc::new(
            CallPolicy::builder("exchange")
                .bulkhead(3, Duration::ZERO)
                .build(),
        );
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks = (0..10).map(|_| {
            let policy = policy.clone();
            let active = active.clone();
            let peak = peak.clone();
            async move {
                policy
                    .call(|| {
                        let active = active.clone();
                        let peak = peak.clone();
                        async move {
                            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                            peak.fetch_max(now, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            active.fetch_sub(1, Ordering::SeqCst);
                            Ok(())
                        }
                    })
                    .await
            }
        });
        let results = futures_util::future::join_all(tasks).await;

        let admitted = results.iter().filter(|r| r.is_ok()).count();
        let rejected = results
            .iter()
            .filter(|r| matches!(r, Err(MeshError::Unavailable(_))))
            .count();
        assert_eq!(admitted, 3);
        assert_eq!(rejected, 7);
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(policy.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_rate_limit_rejects() {
        let policy = CallPolicy::builder("exchange").rate_limit(1, 1).build();
        assert!(policy.call(|| async { Ok(()) }).await.is_ok());
        assert!(matches!(
            policy.call(|| async { Ok(()) }).await,
            Err(MeshError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_call_once_does_not_retry() {
        let policy = CallPolicy::builder("exchange")
            .retry(RetryPolicy::new(3, Backoff::none()))
            .build();
        let calls = AtomicUsize::new(0);
        let result: Result<()> = policy
            .call_once(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(MeshError::Transient("reset".into()))
            })
            .await;
        assert!(matches!(result, Err(MeshError::Unavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

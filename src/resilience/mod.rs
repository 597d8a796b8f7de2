//! Resilience policy engine.
//!
//! # Data Flow
//! ```text
//! Outbound call:
//!     → engine.rs (resolve named policy)
//!     → policy.rs (rate limit → bulkhead → retry loop)
//!         → circuit_breaker.rs (admit or fail fast)
//!         → timeouts.rs (per-attempt deadline)
//!         → retries.rs + backoff.rs (classify failure, wait, try again)
//! ```
//!
//! # Design Decisions
//! - Every guard fails with `Unavailable`; callers need not know which one tripped
//! - Only transient failures are retried or counted by the breaker
//! - Policies are plain values wrapped around a closure, usable from the
//!   gateway and from peer-to-peer calls alike

pub mod backoff;
pub mod bulkhead;
pub mod circuit_breaker;
pub mod engine;
pub mod policy;
pub mod rate_limit;
pub mod retries;
pub mod timeouts;

pub use backoff::Backoff;
pub use bulkhead::Bulkhead;
pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use engine::ResilienceEngine;
pub use policy::{CallPolicy, PolicyBuilder};
pub use rate_limit::RateLimiter;
pub use retries::RetryPolicy;

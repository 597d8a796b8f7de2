//! Retry classification and schedule.
//!
//! # Design Decisions
//! - Only `Transient` and `TimedOut` failures are retried
//! - Gateway status codes 502/503/504 count as transient; everything else is
//!   the upstream's answer and is passed through
//! - Non-idempotent requests get a single attempt at the gateway

use std::time::Duration;

use axum::http::{Method, StatusCode};

use crate::error::MeshError;
use crate::resilience::backoff::Backoff;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff: Backoff) -> Self {
        Self {
            max_retries,
            backoff,
        }
    }

    pub fn disabled() -> Self {
        Self::new(0, Backoff::none())
    }

    /// Whether attempt number `attempt` (1-based) may be followed by another.
    pub fn should_retry(&self, attempt: u32, error: &MeshError) -> bool {
        error.is_transient() && attempt <= self.max_retries
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        self.backoff.delay(attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::disabled()
    }
}

/// Status codes that indicate the peer (or something in front of it) could not serve.
pub fn is_transient_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
    )
}

/// Only idempotent methods are replayed.
pub fn is_retryable_method(method: &Method) -> bool {
    method.is_idempotent()
}

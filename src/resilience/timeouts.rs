//! Per-attempt deadlines.

use std::future::Future;
use std::time::Duration;

use crate::error::{MeshError, Result};

/// Run `fut` with a deadline. The future is dropped (cancelled) when it expires.
pub async fn with_timeout<T, F>(limit: Duration, what: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(MeshError::TimedOut(format!(
            "{} exceeded {}ms",
            what,
            limit.as_millis()
        ))),
    }
}

//! Token bucket rate limiter.
//!
//! Rejects immediately when the bucket is empty; callers never wait for tokens.

use std::sync::Mutex;
use std::time::Instant;

/// A simple token bucket.
#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(capacity: f64) -> Self {
        Self {
            tokens: capacity,
            last_update: Instant::now(),
        }
    }

    fn try_acquire(&mut self, capacity: f64, refill_rate: f64) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();

        // Refill tokens
        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_update = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Per-policy rate limiter.
#[derive(Debug)]
pub struct RateLimiter {
    bucket: Mutex<TokenBucket>,
    per_second: f64,
    burst: f64,
}

impl RateLimiter {
    /// `burst` of 0 means "same as the per-second rate".
    pub fn new(per_second: u32, burst: u32) -> Self {
        let per_second = per_second as f64;
        let burst = if burst == 0 { per_second } else { burst as f64 };
        Self {
            bucket: Mutex::new(TokenBucket::new(burst)),
            per_second,
            burst,
        }
    }

    /// Take one permit if available.
    pub fn try_acquire(&self) -> bool {
        let mut bucket = self.bucket.lock().expect("rate limiter mutex poisoned");
        bucket.try_acquire(self.burst, self.per_second)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_rejects_over_budget() {
        let limiter = RateLimiter::new(2, 0);
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[test]
    fn test_refills_over_time() {
        let limiter = RateLimiter::new(50, 1);
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
        std::thread::sleep(Duration::from_millis(40));
        assert!(limiter.try_acquire());
    }
}

//! Circuit breaker over a rolling failure-rate window.
//!
//! # States
//! - Closed: calls pass through, outcomes are recorded
//! - Open: calls fail fast with `Unavailable` until the cooldown elapses
//! - Half-Open: exactly one probe call is admitted
//!
//! # State Transitions
//! ```text
//! Closed → Open: failures / calls >= threshold, with at least `minimum_calls` in the window
//! Open → Half-Open: first call after the cooldown becomes the probe
//! Half-Open → Closed: probe succeeds
//! Half-Open → Open: probe fails
//! ```
//!
//! # Design Decisions
//! - Outcomes are reported through a `BreakerPermit`; dropping it unreported
//!   (cancellation) frees the probe slot without changing state
//! - Business errors are reported with `ignore()` and never count as failures

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config::schema::CircuitBreakerConfig;
use crate::error::{MeshError, Result};
use crate::observability::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    fn gauge(self) -> u8 {
        match self {
            CircuitState::Closed => 0,
            CircuitState::Open => 1,
            CircuitState::HalfOpen => 2,
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
    /// (recorded at, failed)
    window: VecDeque<(Instant, bool)>,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    failure_rate_threshold: f64,
    minimum_calls: usize,
    window: Duration,
    cooldown: Duration,
    inner: Mutex<BreakerState>,
}

/// Admission ticket for one call. Report the outcome exactly once.
#[derive(Debug)]
pub struct BreakerPermit<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
    reported: bool,
}

impl CircuitBreaker {
    pub fn new(
        name: impl Into<String>,
        failure_rate_threshold: f64,
        minimum_calls: usize,
        window: Duration,
        cooldown: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            failure_rate_threshold,
            minimum_calls: minimum_calls.max(1),
            window,
            cooldown,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                opened_at: None,
                probe_in_flight: false,
                window: VecDeque::new(),
            }),
        }
    }

    pub fn from_config(name: impl Into<String>, config: &CircuitBreakerConfig) -> Self {
        Self::new(
            name,
            config.failure_rate_threshold,
            config.minimum_calls,
            Duration::from_secs(config.window_secs),
            Duration::from_secs(config.cooldown_secs),
        )
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Admit a call, or fail fast while the circuit is open.
    pub fn try_acquire(&self) -> Result<BreakerPermit<'_>> {
        let mut inner = self.lock();
        let probe = match inner.state {
            CircuitState::Closed => false,
            CircuitState::Open => {
                let cooled = inner
                    .opened_at
                    .map_or(true, |at| at.elapsed() >= self.cooldown);
                if !cooled {
                    return Err(self.rejected());
                }
                self.transition(&mut inner, CircuitState::HalfOpen);
                inner.probe_in_flight = true;
                true
            }
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    return Err(self.rejected());
                }
                inner.probe_in_flight = true;
                true
            }
        };

        Ok(BreakerPermit {
            breaker: self,
            probe,
            reported: false,
        })
    }

    fn record(&self, probe: bool, failed: bool) {
        let mut inner = self.lock();
        if probe {
            inner.probe_in_flight = false;
            inner.window.clear();
            if failed {
                inner.opened_at = Some(Instant::now());
                self.transition(&mut inner, CircuitState::Open);
            } else {
                inner.opened_at = None;
                self.transition(&mut inner, CircuitState::Closed);
            }
            return;
        }

        // Late outcomes from calls admitted before the circuit opened are dropped.
        if inner.state != CircuitState::Closed {
            return;
        }

        let now = Instant::now();
        inner.window.push_back((now, failed));
        while let Some(&(at, _)) = inner.window.front() {
            if now.duration_since(at) > self.window {
                inner.window.pop_front();
            } else {
                break;
            }
        }

        let calls = inner.window.len();
        let failures = inner.window.iter().filter(|(_, failed)| *failed).count();
        if calls >= self.minimum_calls
            && failures as f64 / calls as f64 >= self.failure_rate_threshold
        {
            tracing::warn!(
                policy = %self.name,
                calls,
                failures,
                "Failure rate threshold reached"
            );
            inner.window.clear();
            inner.opened_at = Some(now);
            self.transition(&mut inner, CircuitState::Open);
        }
    }

    fn release_probe(&self) {
        self.lock().probe_in_flight = false;
    }

    fn transition(&self, inner: &mut BreakerState, to: CircuitState) {
        if inner.state == to {
            return;
        }
        tracing::info!(policy = %self.name, from = ?inner.state, to = ?to, "Circuit state changed");
        inner.state = to;
        metrics::record_breaker_state(&self.name, to.gauge());
    }

    fn rejected(&self) -> MeshError {
        MeshError::Unavailable(format!("circuit breaker '{}' is open", self.name))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerState> {
        self.inner.lock().expect("circuit breaker mutex poisoned")
    }
}

impl BreakerPermit<'_> {
    pub fn success(mut self) {
        self.reported = true;
        self.breaker.record(self.probe, false);
    }

    pub fn failure(mut self) {
        self.reported = true;
        self.breaker.record(self.probe, true);
    }

    /// Outcome that says nothing about the dependency's health.
    pub fn ignore(mut self) {
        self.reported = true;
        if self.probe {
            self.breaker.release_probe();
        }
    }
}

impl Drop for BreakerPermit<'_> {
    fn drop(&mut self) {
        if !self.reported && self.probe {
            self.breaker.release_probe();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(cooldown: Duration) -> CircuitBreaker {
        CircuitBreaker::new("exchange", 0.5, 4, Duration::from_secs(60), cooldown)
    }

    #[test]
    fn test_opens_at_threshold() {
        let cb = breaker(Duration::from_secs(30));
        cb.try_acquire().unwrap().success();
        cb.try_acquire().unwrap().success();
        cb.try_acquire().unwrap().failure();
        assert_eq!(cb.state(), CircuitState::Closed);

        cb.try_acquire().unwrap().failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(matches!(cb.try_acquire(), Err(MeshError::Unavailable(_))));
    }

    #[test]
    fn test_needs_minimum_calls() {
        let cb = breaker(Duration::from_secs(30));
        for _ in 0..3 {
            cb.try_acquire().unwrap().failure();
        }
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_ignored_outcomes_do_not_count() {
        let cb = breaker(Duration::from_secs(30));
        for _ in 0..10 {
            cb.try_acquire().unwrap().ignore();
        }
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_single_half_open_probe() {
        let cb = breaker(Duration::from_millis(20));
        for _ in 0..4 {
            cb.try_acquire().unwrap().failure();
        }
        assert_eq!(cb.state(), CircuitState::Open);
        std::thread::sleep(Duration::from_millis(30));

        let probe = cb.try_acquire().unwrap();
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert!(cb.try_acquire().is_err());

        probe.success();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.try_acquire().is_ok());
    }

    #[test]
    fn test_failed_probe_reopens() {
        let cb = breaker(Duration::from_millis(20));
        for _ in 0..4 {
            cb.try_acquire().unwrap().failure();
        }
        std::thread::sleep(Duration::from_millis(30));
        cb.try_acquire().unwrap().failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(cb.try_acquire().is_err());
    }

    #[test]
    fn test_dropped_probe_frees_slot() {
        let cb = breaker(Duration::from_millis(20));
        for _ in 0..4 {
            cb.try_acquire().unwrap().failure();
        }
        std::thread::sleep(Duration::from_millis(30));
        drop(cb.try_acquire().unwrap());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert!(cb.try_acquire().is_ok());
    }
}

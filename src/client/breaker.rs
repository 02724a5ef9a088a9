//! Circuit breaker protecting the partner API from repeated failing calls.
//!
//! The breaker counts consecutive failures; once the threshold is reached it
//! opens and rejects calls without touching the network. After the recovery
//! timeout a single trial call is admitted (half-open); its outcome decides
//! whether the circuit closes again or re-opens for another cool-down.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;
use utoipa::ToSchema;

/// Observable state of the circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls flow normally.
    Closed,
    /// Calls are rejected until the recovery timeout elapses.
    Open,
    /// One trial call is in flight; others are rejected.
    HalfOpen,
}

/// Point-in-time breaker statistics for status reporting.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BreakerStats {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub total_rejected: u64,
    /// Seconds until the open circuit admits a trial call, if open.
    pub retry_in_seconds: Option<u64>,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
    total_rejected: u64,
}

/// Consecutive-failure circuit breaker with a half-open trial phase.
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    recovery_timeout: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            failure_threshold,
            recovery_timeout,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                trial_in_flight: false,
                total_rejected: 0,
            }),
        }
    }

    /// Returns `Ok(())` when a call may proceed, or the remaining cool-down
    /// in seconds when the circuit rejects it.
    ///
    /// When the cool-down has elapsed this transitions the circuit to
    /// half-open and admits exactly one trial call.
    pub fn try_acquire(&self) -> Result<(), u64> {
        let mut inner = self.lock();

        match inner.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|at| at.elapsed())
                    .unwrap_or(Duration::ZERO);
                if elapsed >= self.recovery_timeout {
                    inner.state = CircuitState::HalfOpen;
                    inner.trial_in_flight = true;
                    Ok(())
                } else {
                    inner.total_rejected += 1;
                    Err((self.recovery_timeout - elapsed).as_secs().max(1))
                }
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    inner.total_rejected += 1;
                    Err(self.recovery_timeout.as_secs().max(1))
                } else {
                    inner.trial_in_flight = true;
                    Ok(())
                }
            }
        }
    }

    /// Records a successful call, closing the circuit if it was half-open.
    pub fn record_success(&self) {
        let mut inner = self.lock();
        inner.consecutive_failures = 0;
        inner.opened_at = None;
        inner.trial_in_flight = false;
        inner.state = CircuitState::Closed;
    }

    /// Records a failed call. A half-open trial failure re-opens the circuit
    /// immediately; in the closed state the circuit opens once consecutive
    /// failures reach the threshold.
    pub fn record_failure(&self) {
        let mut inner = self.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);

        match inner.state {
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                inner.trial_in_flight = false;
            }
            CircuitState::Closed if inner.consecutive_failures >= self.failure_threshold => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
            }
            _ => {}
        }
    }

    /// Forces the circuit open, e.g. for operator intervention.
    pub fn force_open(&self) {
        let mut inner = self.lock();
        inner.state = CircuitState::Open;
        inner.opened_at = Some(Instant::now());
        inner.trial_in_flight = false;
    }

    /// Forces the circuit closed and clears the failure count.
    pub fn force_close(&self) {
        self.record_success();
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn stats(&self) -> BreakerStats {
        let inner = self.lock();
        let retry_in_seconds = match inner.state {
            CircuitState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|at| at.elapsed())
                    .unwrap_or(Duration::ZERO);
                Some(self.recovery_timeout.saturating_sub(elapsed).as_secs())
            }
            _ => None,
        };

        BreakerStats {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            total_rejected: inner.total_rejected,
            retry_in_seconds,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerInner> {
        // The mutex only guards plain counters; a poisoned guard is still usable.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, recovery_ms: u64) -> CircuitBreaker {
        CircuitBreaker::new(threshold, Duration::from_millis(recovery_ms))
    }

    #[test]
    fn stays_closed_below_threshold() {
        let cb = breaker(3, 50);
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.try_acquire().is_ok());
    }

    #[test]
    fn opens_at_threshold_and_rejects() {
        let cb = breaker(3, 10_000);
        for _ in 0..3 {
            cb.record_failure();
        }
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(cb.try_acquire().is_err());
        assert_eq!(cb.stats().total_rejected, 1);
    }

    #[test]
    fn success_resets_failure_count() {
        let cb = breaker(3, 50);
        cb.record_failure();
        cb.record_failure();
        cb.record_success();
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_admits_single_trial() {
        let cb = breaker(1, 10);
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);

        std::thread::sleep(Duration::from_millis(20));

        assert!(cb.try_acquire().is_ok());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        // Second caller is rejected while the trial is in flight.
        assert!(cb.try_acquire().is_err());
    }

    #[test]
    fn trial_success_closes_circuit() {
        let cb = breaker(1, 10);
        cb.record_failure();
        std::thread::sleep(Duration::from_millis(20));
        assert!(cb.try_acquire().is_ok());
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.try_acquire().is_ok());
    }

    #[test]
    fn trial_failure_reopens_circuit() {
        let cb = breaker(1, 10);
        cb.record_failure();
        std::thread::sleep(Duration::from_millis(20));
        assert!(cb.try_acquire().is_ok());
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(cb.try_acquire().is_err());
    }

    #[test]
    fn force_open_and_close() {
        let cb = breaker(5, 10_000);
        cb.force_open();
        assert!(cb.try_acquire().is_err());
        cb.force_close();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.try_acquire().is_ok());
    }
}

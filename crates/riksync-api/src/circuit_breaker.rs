//! Circuit breaker for the upstream API
//!
//! Protects the open-data API (and our own retry budget) from hammering an
//! upstream that is already failing. One breaker guards the whole client.
//!
//! States:
//! - Closed: normal operation, failures are counted
//! - Open: calls fail fast with [`ApiError::CircuitOpen`] until the recovery
//!   timeout has passed since the last failure
//! - HalfOpen: a bounded number of trial calls probe the upstream; enough
//!   successes close the circuit, any failure reopens it
//!
//! Only outcomes for which [`ApiError::counts_as_breaker_failure`] holds are
//! recorded as failures. State is process local and starts Closed.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use riksync_core::config::CircuitBreakerConfig;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::ApiError;

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    HalfOpen,
    Open,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::HalfOpen => write!(f, "half_open"),
            Self::Open => write!(f, "open"),
        }
    }
}

/// Point-in-time copy of the breaker's counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub last_failure_time: Option<Instant>,
    pub half_open_in_flight: u32,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure_time: Option<Instant>,
    half_open_in_flight: u32,
}

/// Closed / Open / HalfOpen circuit breaker
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    success_threshold: u32,
    recovery_timeout: Duration,
    half_open_max_calls: u32,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(config: &CircuitBreakerConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold.max(1),
            success_threshold: config.success_threshold.max(1),
            recovery_timeout: config.recovery_timeout(),
            half_open_max_calls: config.half_open_max_calls.max(1),
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                last_failure_time: None,
                half_open_in_flight: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admits or rejects a call.
    ///
    /// The returned permit carries the outcome back through
    /// [`BreakerPermit::record`]. A permit dropped without a recorded
    /// outcome (the call was cancelled) gives its half-open trial slot back.
    pub fn check(&self) -> Result<BreakerPermit<'_>, ApiError> {
        let mut inner = self.lock();

        if inner.state == CircuitState::Open {
            let recovered = inner
                .last_failure_time
                .map_or(true, |at| at.elapsed() >= self.recovery_timeout);
            if !recovered {
                debug!("Circuit open, rejecting call");
                return Err(ApiError::CircuitOpen);
            }
            info!("Recovery timeout elapsed, circuit half-open");
            inner.state = CircuitState::HalfOpen;
            inner.success_count = 0;
            inner.half_open_in_flight = 0;
        }

        let trial = inner.state == CircuitState::HalfOpen;
        if trial {
            if inner.half_open_in_flight >= self.half_open_max_calls {
                debug!(
                    in_flight = inner.half_open_in_flight,
                    "Half-open trial slots taken, rejecting call"
                );
                return Err(ApiError::CircuitOpen);
            }
            inner.half_open_in_flight += 1;
        }

        Ok(BreakerPermit {
            breaker: self,
            trial,
            recorded: false,
        })
    }

    fn record_success(&self) {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.failure_count = inner.failure_count.saturating_sub(1);
            }
            CircuitState::HalfOpen => {
                inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
                inner.success_count += 1;
                if inner.success_count >= self.success_threshold {
                    info!(
                        successes = inner.success_count,
                        "Upstream recovered, circuit closed"
                    );
                    inner.state = CircuitState::Closed;
                    inner.failure_count = 0;
                    inner.success_count = 0;
                    inner.half_open_in_flight = 0;
                }
            }
            CircuitState::Open => {}
        }
    }

    fn record_failure(&self) {
        let mut inner = self.lock();
        inner.last_failure_time = Some(Instant::now());
        match inner.state {
            CircuitState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.failure_threshold {
                    warn!(
                        failures = inner.failure_count,
                        recovery_timeout_ms = self.recovery_timeout.as_millis() as u64,
                        "Failure threshold reached, circuit opened"
                    );
                    inner.state = CircuitState::Open;
                }
            }
            CircuitState::HalfOpen => {
                warn!("Trial call failed, circuit reopened");
                inner.state = CircuitState::Open;
                inner.success_count = 0;
                inner.half_open_in_flight = 0;
            }
            CircuitState::Open => {}
        }
    }

    /// Releases a half-open trial slot for an outcome that says nothing
    /// about upstream health (404, 413, decode errors).
    fn record_ignored(&self) {
        let mut inner = self.lock();
        if inner.state == CircuitState::HalfOpen {
            inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
        }
    }

    fn record_outcome<T>(&self, outcome: &Result<T, ApiError>) {
        match outcome {
            Ok(_) => self.record_success(),
            Err(err) if err.counts_as_breaker_failure() => self.record_failure(),
            Err(_) => self.record_ignored(),
        }
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        let inner = self.lock();
        CircuitSnapshot {
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            last_failure_time: inner.last_failure_time,
            half_open_in_flight: inner.half_open_in_flight,
        }
    }
}

/// Admission handed out by [`CircuitBreaker::check`]
#[derive(Debug)]
#[must_use = "record the call outcome on the permit"]
pub struct BreakerPermit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    recorded: bool,
}

impl BreakerPermit<'_> {
    /// Whether this call is a half-open trial
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    /// Records the outcome of the admitted call.
    pub fn record<T>(mut self, outcome: &Result<T, ApiError>) {
        self.recorded = true;
        self.breaker.record_outcome(outcome);
    }
}

impl Drop for BreakerPermit<'_> {
    fn drop(&mut self) {
        if !self.recorded && self.trial {
            debug!("Half-open trial abandoned, releasing slot");
            self.breaker.record_ignored();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(failure_threshold: u32, success_threshold: u32, half_open_max: u32) -> CircuitBreaker {
        CircuitBreaker::new(&CircuitBreakerConfig {
            failure_threshold,
            success_threshold,
            recovery_timeout_ms: 1_000,
            half_open_max_calls: half_open_max,
        })
    }

    fn trip(cb: &CircuitBreaker, times: u32) {
        for _ in 0..times {
            cb.check()
                .expect("closed circuit admits")
                .record::<()>(&Err(ApiError::Server { status: 503 }));
        }
    }

    fn ok() -> Result<(), ApiError> {
        Ok(())
    }

    #[test]
    fn test_opens_at_failure_threshold() {
        let cb = breaker(3, 1, 1);
        trip(&cb, 2);
        assert_eq!(cb.state(), CircuitState::Closed);
        trip(&cb, 1);
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(matches!(cb.check(), Err(ApiError::CircuitOpen)));
    }

    #[test]
    fn test_success_decays_failure_count_in_closed() {
        let cb = breaker(3, 1, 1);
        trip(&cb, 2);
        cb.check().expect("admitted").record(&ok());
        assert_eq!(cb.snapshot().failure_count, 1);
        trip(&cb, 1);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_after_recovery_timeout() {
        let cb = breaker(1, 2, 1);
        trip(&cb, 1);
        assert!(cb.check().is_err());

        tokio::time::advance(Duration::from_millis(1_001)).await;
        let permit = cb.check().expect("trial admitted");
        assert!(permit.is_trial());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert_eq!(cb.snapshot().half_open_in_flight, 1);
        permit.record(&ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_limits_concurrent_trials() {
        let cb = breaker(1, 2, 1);
        trip(&cb, 1);
        tokio::time::advance(Duration::from_secs(2)).await;

        let first = cb.check().expect("trial admitted");
        assert!(matches!(cb.check(), Err(ApiError::CircuitOpen)));

        first.record(&ok());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.check().expect("second trial admitted").record(&ok());
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.snapshot().failure_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens() {
        let cb = breaker(1, 1, 1);
        trip(&cb, 1);
        tokio::time::advance(Duration::from_secs(2)).await;

        cb.check()
            .expect("trial admitted")
            .record::<()>(&Err(ApiError::Timeout("slow".into())));
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(cb.check().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ignored_outcome_frees_trial_slot() {
        let cb = breaker(1, 1, 1);
        trip(&cb, 1);
        tokio::time::advance(Duration::from_secs(2)).await;

        cb.check()
            .expect("trial admitted")
            .record::<()>(&Err(ApiError::NotFound("/x".into())));
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert!(cb.check().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_trial_releases_slot() {
        let cb = breaker(1, 1, 1);
        trip(&cb, 1);
        tokio::time::advance(Duration::from_secs(2)).await;

        let abandoned = cb.check().expect("trial admitted");
        assert!(matches!(cb.check(), Err(ApiError::CircuitOpen)));
        drop(abandoned);

        let snapshot = cb.snapshot();
        assert_eq!(snapshot.state, CircuitState::HalfOpen);
        assert_eq!(snapshot.half_open_in_flight, 0);

        cb.check().expect("slot is free again").record(&ok());
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_dropped_closed_permit_changes_nothing() {
        let cb = breaker(2, 1, 1);
        trip(&cb, 1);
        let permit = cb.check().expect("admitted");
        assert!(!permit.is_trial());
        drop(permit);
        assert_eq!(cb.snapshot().failure_count, 1);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_non_health_errors_do_not_trip() {
        let cb = breaker(2, 1, 1);
        for _ in 0..5 {
            cb.check()
                .expect("admitted")
                .record::<()>(&Err(ApiError::PayloadTooLarge { status: 414 }));
        }
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.snapshot().failure_count, 0);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(CircuitState::Closed.to_string(), "closed");
        assert_eq!(CircuitState::HalfOpen.to_string(), "half_open");
        assert_eq!(CircuitState::Open.to_string(), "open");
    }
}

// crates/pipeline-core/src/breaker.rs
// ============================================================================
// Module: Circuit Breaker
// Description: Fault-isolation wrapper with CLOSED/OPEN/HALF_OPEN state.
// Purpose: Stop calling a downstream that is failing, and probe it back to
//          health once a reset timeout elapses.
// Dependencies: std::sync, std::time, crate::telemetry
// ============================================================================

//! ## Overview
//! One [`CircuitBreaker`] guards one downstream (JIRA, GitHub, SAP Cloud
//! Integration). State is process-local and never persisted (`spec.md` §3:
//! "Circuit-breaker state: process-local; cleared on process restart").
//!
//! # Invariants
//! - Transitions follow the table in `spec.md` §4.3 exactly; there is no
//!   path from `Open` to `Closed` that skips `HalfOpen`.
//! - Counter updates are atomic but breakers are not serialized against each
//!   other; `metrics()` is a consistent snapshot of *this* breaker only.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

use thiserror::Error;

use crate::telemetry::EngineEvent;
use crate::telemetry::EventSink;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Circuit breaker tuning parameters (`spec.md` §4.3).
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before tripping to `Open`. Default 5.
    pub failure_threshold: u32,
    /// Time an `Open` breaker waits before admitting a trial call. Default 30s.
    pub reset_timeout: Duration,
    /// Consecutive `HalfOpen` successes required to close. Default 2.
    pub half_open_success_threshold: u32,
    /// Breaker name, used in telemetry events.
    pub name: String,
}

impl CircuitBreakerConfig {
    /// Builds a config with `spec.md` §4.3's documented defaults for the
    /// given breaker name.
    #[must_use]
    pub fn with_defaults(name: impl Into<String>) -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
            half_open_success_threshold: 2,
            name: name.into(),
        }
    }
}

// ============================================================================
// SECTION: State
// ============================================================================

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerPhase {
    /// Calls pass through; failures accumulate toward `failure_threshold`.
    Closed,
    /// Calls are rejected without attempting the downstream.
    Open,
    /// A trial call is in flight (or has completed) after `reset_timeout`.
    HalfOpen,
}

/// Point-in-time counters for a breaker.
#[derive(Debug, Clone, Copy, Default)]
pub struct BreakerMetrics {
    /// Total successful calls.
    pub total_successes: u64,
    /// Total failed calls.
    pub total_failures: u64,
    /// Total calls rejected while `Open`.
    pub total_rejections: u64,
    /// Current consecutive-failure count.
    pub consecutive_failures: u32,
    /// Transitions into `Closed`.
    pub transitions_to_closed: u64,
    /// Transitions into `Open`.
    pub transitions_to_open: u64,
    /// Transitions into `HalfOpen`.
    pub transitions_to_half_open: u64,
}

struct Inner {
    phase: BreakerPhase,
    consecutive_failures: u32,
    half_open_successes: u32,
    last_failure_at: Option<Instant>,
    metrics: BreakerMetrics,
}

impl Inner {
    const fn new() -> Self {
        Self {
            phase: BreakerPhase::Closed,
            consecutive_failures: 0,
            half_open_successes: 0,
            last_failure_at: None,
            metrics: BreakerMetrics {
                total_successes: 0,
                total_failures: 0,
                total_rejections: 0,
                consecutive_failures: 0,
                transitions_to_closed: 0,
                transitions_to_open: 0,
                transitions_to_half_open: 0,
            },
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Outcome of a call attempted through a breaker.
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// The breaker is `Open` and rejected the call without attempting it.
    #[error("circuit breaker '{0}' is open")]
    CircuitOpen(String),
    /// The wrapped call itself failed.
    #[error(transparent)]
    Inner(E),
}

// ============================================================================
// SECTION: Circuit Breaker
// ============================================================================

/// A single named circuit breaker.
pub struct CircuitBreaker {
    /// Static tuning parameters.
    config: CircuitBreakerConfig,
    /// Predicate deciding whether a given failure counts toward tripping;
    /// defaults to "every failure counts".
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// Builds a new breaker in the `Closed` state.
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self { config, inner: Mutex::new(Inner::new()) }
    }

    /// Breaker name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Runs `f` through the breaker, recording success/failure and applying
    /// state transitions per `spec.md` §4.3. `count_failure` decides whether
    /// a given `Err` counts toward tripping (defaulting callers should pass
    /// `|_| true`).
    ///
    /// # Errors
    /// Returns [`BreakerError::CircuitOpen`] if the breaker rejects the call
    /// outright, or [`BreakerError::Inner`] carrying `f`'s error.
    pub fn call<F, T, E>(
        &self,
        sink: &dyn EventSink,
        count_failure: impl Fn(&E) -> bool,
        f: F,
    ) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Result<T, E>,
    {
        if !self.admit(sink) {
            let mut guard = lock(&self.inner);
            guard.metrics.total_rejections += 1;
            return Err(BreakerError::CircuitOpen(self.config.name.clone()));
        }
        match f() {
            Ok(value) => {
                self.on_success(sink);
                Ok(value)
            }
            Err(err) => {
                if count_failure(&err) {
                    self.on_failure(sink);
                }
                Err(BreakerError::Inner(err))
            }
        }
    }

    /// Returns whether a call should be attempted right now, transitioning
    /// `Open -> HalfOpen` if the reset timeout has elapsed.
    fn admit(&self, sink: &dyn EventSink) -> bool {
        let mut guard = lock(&self.inner);
        match guard.phase {
            BreakerPhase::Closed | BreakerPhase::HalfOpen => true,
            BreakerPhase::Open => {
                let elapsed = guard.last_failure_at.is_none_or(|at| at.elapsed() >= self.config.reset_timeout);
                if elapsed {
                    guard.phase = BreakerPhase::HalfOpen;
                    guard.half_open_successes = 0;
                    guard.metrics.transitions_to_half_open += 1;
                    drop(guard);
                    sink.record(EngineEvent::CircuitTransitioned {
                        name: self.config.name.clone(),
                        to: "half_open".to_owned(),
                    });
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Records a successful call outcome.
    fn on_success(&self, sink: &dyn EventSink) {
        let mut guard = lock(&self.inner);
        guard.metrics.total_successes += 1;
        guard.consecutive_failures = 0;
        guard.metrics.consecutive_failures = 0;
        match guard.phase {
            BreakerPhase::Closed => {}
            BreakerPhase::Open => {}
            BreakerPhase::HalfOpen => {
                guard.half_open_successes += 1;
                if guard.half_open_successes >= self.config.half_open_success_threshold {
                    guard.phase = BreakerPhase::Closed;
                    guard.metrics.transitions_to_closed += 1;
                    drop(guard);
                    sink.record(EngineEvent::CircuitTransitioned {
                        name: self.config.name.clone(),
                        to: "closed".to_owned(),
                    });
                }
            }
        }
    }

    /// Records a failed call outcome.
    fn on_failure(&self, sink: &dyn EventSink) {
        let mut guard = lock(&self.inner);
        guard.metrics.total_failures += 1;
        guard.last_failure_at = Some(Instant::now());
        match guard.phase {
            BreakerPhase::Closed => {
                guard.consecutive_failures += 1;
                guard.metrics.consecutive_failures = guard.consecutive_failures;
                if guard.consecutive_failures >= self.config.failure_threshold {
                    guard.phase = BreakerPhase::Open;
                    guard.metrics.transitions_to_open += 1;
                    drop(guard);
                    sink.record(EngineEvent::CircuitTransitioned {
                        name: self.config.name.clone(),
                        to: "open".to_owned(),
                    });
                }
            }
            BreakerPhase::HalfOpen => {
                guard.phase = BreakerPhase::Open;
                guard.metrics.transitions_to_open += 1;
                drop(guard);
                sink.record(EngineEvent::CircuitTransitioned {
                    name: self.config.name.clone(),
                    to: "open".to_owned(),
                });
            }
            BreakerPhase::Open => {}
        }
    }

    /// Forces the breaker to `Closed`, clearing counters.
    pub fn reset(&self) {
        let mut guard = lock(&self.inner);
        *guard = Inner::new();
    }

    /// Clears counters without changing the current phase.
    pub fn reset_metrics(&self) {
        let mut guard = lock(&self.inner);
        let phase = guard.phase;
        let last_failure_at = guard.last_failure_at;
        let consecutive = guard.consecutive_failures;
        let half_open = guard.half_open_successes;
        *guard = Inner::new();
        guard.phase = phase;
        guard.last_failure_at = last_failure_at;
        guard.consecutive_failures = consecutive;
        guard.half_open_successes = half_open;
    }

    /// Returns a consistent snapshot of this breaker's own counters.
    #[must_use]
    pub fn metrics(&self) -> BreakerMetrics {
        lock(&self.inner).metrics
    }

    /// Returns the current phase.
    #[must_use]
    pub fn phase(&self) -> BreakerPhase {
        lock(&self.inner).phase
    }
}

/// Locks the inner mutex, recovering the guard on poison rather than
/// propagating a panic into call sites (a breaker is best-effort
/// infrastructure; a poisoned lock should not crash the coordinator).
fn lock(mutex: &Mutex<Inner>) -> std::sync::MutexGuard<'_, Inner> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::CircuitBreaker;
    use super::CircuitBreakerConfig;
    use crate::telemetry::NoopEventSink;

    fn breaker(threshold: u32) -> CircuitBreaker {
        let mut config = CircuitBreakerConfig::with_defaults("test");
        config.failure_threshold = threshold;
        config.reset_timeout = std::time::Duration::from_millis(0);
        config.half_open_success_threshold = 2;
        CircuitBreaker::new(config)
    }

    #[test]
    fn opens_after_threshold_failures() {
        let breaker = breaker(3);
        let sink = NoopEventSink;
        for _ in 0..3 {
            let result: Result<(), &str> = breaker.call(&sink, |_| true, || Err("boom"));
            assert!(result.is_err());
        }
        assert!(matches!(breaker.phase(), super::BreakerPhase::Open));
        assert_eq!(breaker.metrics().transitions_to_open, 1);
    }

    #[test]
    fn half_open_recovers_to_closed() {
        let breaker = breaker(1);
        let sink = NoopEventSink;
        let _: Result<(), &str> = breaker.call(&sink, |_| true, || Err("boom"));
        assert!(matches!(breaker.phase(), super::BreakerPhase::Open));

        for _ in 0..2 {
            let result: Result<(), &str> = breaker.call(&sink, |_| true, || Ok(()));
            assert!(result.is_ok());
        }
        assert!(matches!(breaker.phase(), super::BreakerPhase::Closed));
    }

    #[test]
    fn open_breaker_rejects_without_calling() {
        let breaker = breaker(1);
        let sink = NoopEventSink;
        let mut config = CircuitBreakerConfig::with_defaults("blocked");
        config.reset_timeout = std::time::Duration::from_secs(3600);
        let blocked = CircuitBreaker::new(config);
        let _: Result<(), &str> = blocked.call(&sink, |_| true, || Err("boom"));

        let mut called = false;
        let result: Result<(), &str> = blocked.call(&sink, |_| true, || {
            called = true;
            Ok(())
        });
        assert!(!called);
        assert!(matches!(result, Err(super::BreakerError::CircuitOpen(_))));
    }
}

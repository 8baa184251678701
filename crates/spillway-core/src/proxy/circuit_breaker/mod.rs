//! Per-provider circuit breaker.
//!
//! Two states:
//! - Closed: normal operation, the provider is eligible for selection
//! - Open: the provider failed `failure_threshold` consecutive times and is
//!   skipped until `reset_timeout` elapses or a half-open probe succeeds
//!
//! There is no dedicated half-open state: probing is a selection-time
//! decision, and an open breaker auto-resets lazily when `is_open` observes
//! that its reset timeout has elapsed.


use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;

#[derive(Debug, Default)]
struct BreakerState {
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

/// Circuit breaker for a single provider.
///
/// Each breaker serializes its own reads and writes; there are no
/// cross-breaker invariants. The breaker for the last-priority provider is
/// constructed with `fallback = true`: it keeps counting failures for
/// observability but always reports closed, so the cascade can never run out
/// of candidates.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    reset_timeout: Duration,
    fallback: bool,
    state: Mutex<BreakerState>,
}

/// Point-in-time view of one breaker, as reported by the health endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub is_open: bool,
    pub failure_count: u32,
    /// Seconds until auto-reset, or null when not tripped.
    pub remaining_time: Option<f64>,
}

impl CircuitBreaker {
    pub fn new(
        name: impl Into<String>,
        failure_threshold: u32,
        reset_timeout: Duration,
        fallback: bool,
    ) -> Self {
        Self {
            name: name.into(),
            failure_threshold,
            reset_timeout,
            fallback,
            state: Mutex::new(BreakerState::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Record a successful attempt: zero the counter and close the breaker.
    pub fn record_success(&self) {
        let mut state = self.state.lock();
        let was_open = state.opened_at.is_some();
        state.consecutive_failures = 0;
        state.opened_at = None;
        drop(state);

        if was_open {
            tracing::warn!(
                provider = %self.name,
                action = "recovered",
                failure_count = 0u32,
                "circuit_breaker"
            );
        }
    }

    /// Record a failed attempt. The breaker trips when the count reaches the
    /// threshold; counting continues past it without re-stamping `opened_at`.
    pub fn record_failure(&self) {
        let mut state = self.state.lock();
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        let tripped =
            state.consecutive_failures >= self.failure_threshold && state.opened_at.is_none();
        if tripped {
            state.opened_at = Some(Instant::now());
        }
        let failure_count = state.consecutive_failures;
        drop(state);

        if tripped {
            tracing::warn!(
                provider = %self.name,
                action = "tripped",
                failure_count,
                "circuit_breaker"
            );
        }
    }

    /// Whether the breaker is open at `now`.
    ///
    /// Observing an expired open interval auto-resets the breaker (counter
    /// and `opened_at` both cleared), so a tripped provider becomes eligible
    /// again on the first inspection after its timeout.
    pub fn is_open(&self, now: Instant) -> bool {
        if self.fallback {
            return false;
        }

        let mut state = self.state.lock();
        let Some(opened_at) = state.opened_at else {
            return false;
        };

        if now.duration_since(opened_at) >= self.reset_timeout {
            state.consecutive_failures = 0;
            state.opened_at = None;
            drop(state);
            tracing::warn!(
                provider = %self.name,
                action = "reset",
                failure_count = 0u32,
                "circuit_breaker"
            );
            return false;
        }

        true
    }

    /// Hard reset to the initial state.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        let was_dirty = state.opened_at.is_some() || state.consecutive_failures > 0;
        state.consecutive_failures = 0;
        state.opened_at = None;
        drop(state);

        if was_dirty {
            tracing::warn!(
                provider = %self.name,
                action = "reset",
                failure_count = 0u32,
                "circuit_breaker"
            );
        }
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let now = Instant::now();
        let is_open = self.is_open(now);

        let state = self.state.lock();
        let remaining_time = state.opened_at.map(|opened_at| {
            self.reset_timeout.saturating_sub(now.duration_since(opened_at)).as_secs_f64()
        });

        BreakerSnapshot { is_open, failure_count: state.consecutive_failures, remaining_time }
    }

    #[cfg(test)]
    pub(crate) fn failure_count(&self) -> u32 {
        self.state.lock().consecutive_failures
    }
}

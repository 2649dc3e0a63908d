//! Circuit breaker for calls to external dependencies
//!
//! # States
//! - Closed: calls pass through, consecutive failures are counted
//! - Open: calls are rejected with `CircuitOpenError` until `open_timeout` elapses
//! - HalfOpen: trial calls pass through to test recovery
//!
//! # State Transitions
//! ```text
//! Closed   → Open:     failure_count reaches failure_threshold
//! Open     → HalfOpen: first call after open_timeout since the last failure
//! HalfOpen → Closed:   success_count reaches success_threshold
//! HalfOpen → Open:     any failure
//! ```
//!
//! Transitions are evaluated lazily on the next call; there is no timer.
//! Only the bookkeeping is serialized by the breaker's mutex. The wrapped
//! operation runs outside it, so concurrent calls to a healthy dependency
//! run in parallel.

use std::future::Future;

use chrono::{DateTime, Utc};
use resonance_shared_config::CircuitBreakerConfig;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::{BreakerError, CircuitOpenError};

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Point-in-time view of a breaker's bookkeeping
#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerStats {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub failure_threshold: u32,
    pub success_threshold: u32,
    /// Calls that reached the breaker, rejected or not
    pub total_calls: u64,
    /// Calls rejected while open
    pub rejected_calls: u64,
    pub total_failures: u64,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub last_state_change_at: DateTime<Utc>,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure: Option<Instant>,
    last_failure_at: Option<DateTime<Utc>>,
    last_state_change: Instant,
    last_state_change_at: DateTime<Utc>,
    total_calls: u64,
    rejected_calls: u64,
    total_failures: u64,
}

impl BreakerState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            last_failure: None,
            last_failure_at: None,
            last_state_change: Instant::now(),
            last_state_change_at: Utc::now(),
            total_calls: 0,
            rejected_calls: 0,
            total_failures: 0,
        }
    }

    /// Enter `next`, clearing both counters
    fn transition_to(&mut self, name: &str, next: CircuitState) {
        let previous = self.state;
        self.state = next;
        self.failure_count = 0;
        self.success_count = 0;
        self.last_state_change = Instant::now();
        self.last_state_change_at = Utc::now();

        match next {
            CircuitState::Open => {
                tracing::warn!(breaker = name, from = %previous, "Circuit breaker opened")
            }
            CircuitState::HalfOpen => {
                tracing::info!(breaker = name, from = %previous, "Circuit breaker half-open, probing recovery")
            }
            CircuitState::Closed => {
                tracing::info!(breaker = name, from = %previous, "Circuit breaker closed")
            }
        }
    }

    /// When the open window is measured from
    fn opened_at(&self) -> Instant {
        self.last_failure.unwrap_or(self.last_state_change)
    }
}

/// Failure tracker guarding one external dependency
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Create a closed breaker for the named dependency
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: Mutex::new(BreakerState::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current state, without evaluating time-based transitions
    pub async fn state(&self) -> CircuitState {
        self.state.lock().await.state
    }

    pub async fn stats(&self) -> CircuitBreakerStats {
        let state = self.state.lock().await;
        CircuitBreakerStats {
            name: self.name.clone(),
            state: state.state,
            failure_count: state.failure_count,
            success_count: state.success_count,
            failure_threshold: self.config.failure_threshold,
            success_threshold: self.config.success_threshold,
            total_calls: state.total_calls,
            rejected_calls: state.rejected_calls,
            total_failures: state.total_failures,
            last_failure_at: state.last_failure_at,
            last_state_change_at: state.last_state_change_at,
        }
    }

    /// Force the breaker closed and clear all counters
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        *state = BreakerState::new();
        tracing::info!(breaker = %self.name, "Circuit breaker manually reset");
    }

    /// Run an async operation through the breaker
    ///
    /// Returns `BreakerError::Open` without running `operation` while the
    /// breaker is open.
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.before_call().await.map_err(BreakerError::Open)?;

        match operation().await {
            Ok(value) => {
                self.on_success().await;
                Ok(value)
            }
            Err(e) => {
                self.on_failure().await;
                Err(BreakerError::Inner(e))
            }
        }
    }

    /// Run a synchronous operation through the breaker
    pub async fn call_sync<F, T, E>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Result<T, E>,
    {
        self.call(|| std::future::ready(operation())).await
    }

    /// Apply any due transition and decide whether the call may proceed
    async fn before_call(&self) -> Result<(), CircuitOpenError> {
        let mut state = self.state.lock().await;
        state.total_calls += 1;

        match state.state {
            CircuitState::Closed => {
                let quiet_long_enough = state
                    .last_failure
                    .is_some_and(|at| at.elapsed() >= self.config.closed_reset_timeout);
                if state.failure_count > 0 && quiet_long_enough {
                    tracing::debug!(
                        breaker = %self.name,
                        failures = state.failure_count,
                        "Resetting stale failure count"
                    );
                    state.failure_count = 0;
                }
                Ok(())
            }
            CircuitState::Open => {
                let elapsed = state.opened_at().elapsed();
                if elapsed >= self.config.open_timeout {
                    state.transition_to(&self.name, CircuitState::HalfOpen);
                    Ok(())
                } else {
                    state.rejected_calls += 1;
                    let remaining = self.config.open_timeout - elapsed;
                    Err(CircuitOpenError {
                        service_name: self.name.clone(),
                        retry_after_secs: remaining.as_secs_f64(),
                    })
                }
            }
            CircuitState::HalfOpen => Ok(()),
        }
    }

    async fn on_success(&self) {
        let mut state = self.state.lock().await;
        match state.state {
            CircuitState::Closed => state.failure_count = 0,
            CircuitState::HalfOpen => {
                state.success_count += 1;
                if state.success_count >= self.config.success_threshold.max(1) {
                    state.transition_to(&self.name, CircuitState::Closed);
                }
            }
            // A call that started before the breaker opened
            CircuitState::Open => {}
        }
    }

    async fn on_failure(&self) {
        let mut state = self.state.lock().await;
        state.total_failures += 1;
        state.last_failure = Some(Instant::now());
        state.last_failure_at = Some(Utc::now());

        match state.state {
            CircuitState::Closed => {
                state.failure_count += 1;
                if state.failure_count >= self.config.failure_threshold.max(1) {
                    state.transition_to(&self.name, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => state.transition_to(&self.name, CircuitState::Open),
            CircuitState::Open => state.failure_count += 1,
        }
    }
}

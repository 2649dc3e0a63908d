//! Circuit breaker configuration types

use crate::{parse_env, ConfigError, ConfigResult};
use std::time::Duration;

/// Thresholds and timeouts for one circuit breaker instance
///
/// All values are fixed for the lifetime of the breaker they configure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures (while closed) that open the circuit
    pub failure_threshold: u32,

    /// Successes (while half-open) that close the circuit again
    pub success_threshold: u32,

    /// How long the circuit stays open before a trial call is let through
    pub open_timeout: Duration,

    /// Quiet period after the last failure that clears the closed-state failure count
    pub closed_reset_timeout: Duration,
}

impl CircuitBreakerConfig {
    /// Load circuit breaker defaults from environment variables
    pub fn from_env() -> ConfigResult<Self> {
        let config = Self {
            failure_threshold: parse_env("CIRCUIT_BREAKER_FAILURE_THRESHOLD", 5)?,
            success_threshold: parse_env("CIRCUIT_BREAKER_SUCCESS_THRESHOLD", 2)?,
            open_timeout: secs_from_env("CIRCUIT_BREAKER_OPEN_TIMEOUT_SECS", 60.0)?,
            closed_reset_timeout: secs_from_env("CIRCUIT_BREAKER_CLOSED_RESET_TIMEOUT_SECS", 300.0)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Set the failure threshold
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Set the success threshold
    pub fn success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold;
        self
    }

    /// Set the open timeout
    pub fn open_timeout(mut self, timeout: Duration) -> Self {
        self.open_timeout = timeout;
        self
    }

    /// Set the closed-state reset timeout
    pub fn closed_reset_timeout(mut self, timeout: Duration) -> Self {
        self.closed_reset_timeout = timeout;
        self
    }

    /// Both thresholds must be at least 1
    pub fn validate(&self) -> ConfigResult<()> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::validation(
                "circuit breaker failure_threshold must be at least 1",
            ));
        }
        if self.success_threshold == 0 {
            return Err(ConfigError::validation(
                "circuit breaker success_threshold must be at least 1",
            ));
        }
        Ok(())
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            open_timeout: Duration::from_secs(60),
            closed_reset_timeout: Duration::from_secs(300),
        }
    }
}

/// Parse a (possibly fractional) number of seconds into a `Duration`
fn secs_from_env(name: &str, default: f64) -> ConfigResult<Duration> {
    let secs: f64 = parse_env(name, default)?;
    Duration::try_from_secs_f64(secs)
        .map_err(|e| ConfigError::invalid_value(name, e.to_string()))
}

//! Worker configuration loaded from environment variables
//!
//! This module provides configuration management for the Resonance worker service.
//! Configuration is loaded from environment variables with sensible defaults for
//! development environments.

use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use resonance_shared_config::{
    CircuitBreakerConfig, CommonConfig, Environment, JobQueueConfig, LidarrConfig,
};

/// Worker configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Common configuration shared with other services
    pub common: CommonConfig,

    /// How long shutdown waits for in-flight jobs, in seconds
    pub shutdown_timeout_secs: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let common = CommonConfig::from_env()
            .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

        Ok(Self {
            common,

            shutdown_timeout_secs: env::var("WORKER_SHUTDOWN_TIMEOUT")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .context("Invalid WORKER_SHUTDOWN_TIMEOUT value")?,
        })
    }

    // Convenience accessors for common config fields

    /// Get job queue configuration
    pub fn jobs(&self) -> &JobQueueConfig {
        &self.common.jobs
    }

    /// Get the default circuit breaker configuration
    pub fn circuit_breaker(&self) -> CircuitBreakerConfig {
        self.common.circuit_breaker
    }

    /// Get Lidarr configuration (if configured)
    pub fn lidarr(&self) -> Option<&LidarrConfig> {
        self.common.lidarr.as_ref()
    }

    /// Check if Lidarr integration is configured
    pub fn has_lidarr(&self) -> bool {
        self.common.has_lidarr()
    }

    /// Get environment mode
    pub fn environment(&self) -> Environment {
        self.common.environment
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.common.environment.is_production()
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use resonance_shared_config::RetryBackoffKind;
    use std::sync::Mutex;

    // Mutex to ensure tests that modify environment variables don't run in parallel
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const WORKER_VARS: &[&str] = &[
        "WORKER_NUM_WORKERS",
        "WORKER_MAX_RETRIES",
        "WORKER_RETRY_BACKOFF",
        "WORKER_SHUTDOWN_TIMEOUT",
        "CIRCUIT_BREAKER_FAILURE_THRESHOLD",
        "LIDARR_URL",
        "LIDARR_API_KEY",
        "DOWNLOAD_MONITOR_INTERVAL_SECS",
    ];

    /// Helper to temporarily set environment variables for a test
    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new(vars: &[(&str, &str)]) -> Self {
            let saved: Vec<_> = vars
                .iter()
                .map(|(k, v)| {
                    let old = env::var(*k).ok();
                    env::set_var(*k, *v);
                    (k.to_string(), old)
                })
                .collect();
            Self { vars: saved }
        }

        fn remove_vars(vars: &[&str]) -> Self {
            let saved: Vec<_> = vars
                .iter()
                .map(|k| {
                    let old = env::var(*k).ok();
                    env::remove_var(*k);
                    (k.to_string(), old)
                })
                .collect();
            Self { vars: saved }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (k, v) in &self.vars {
                match v {
                    Some(val) => env::set_var(k, val),
                    None => env::remove_var(k),
                }
            }
        }
    }

    #[test]
    fn test_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let _guard = EnvGuard::remove_vars(WORKER_VARS);

        let config = Config::from_env().unwrap();
        assert_eq!(config.jobs().num_workers, 4);
        assert_eq!(config.jobs().max_retries, 3);
        assert_eq!(config.jobs().retry_backoff, RetryBackoffKind::Immediate);
        assert_eq!(config.circuit_breaker().failure_threshold, 5);
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(30));
        assert!(!config.has_lidarr());
    }

    #[test]
    fn test_custom_values() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let _clear = EnvGuard::remove_vars(WORKER_VARS);
        let _guard = EnvGuard::new(&[
            ("WORKER_NUM_WORKERS", "8"),
            ("WORKER_MAX_RETRIES", "5"),
            ("WORKER_RETRY_BACKOFF", "exponential"),
            ("WORKER_SHUTDOWN_TIMEOUT", "5"),
            ("CIRCUIT_BREAKER_FAILURE_THRESHOLD", "2"),
        ]);

        let config = Config::from_env().unwrap();
        assert_eq!(config.jobs().num_workers, 8);
        assert_eq!(config.jobs().max_retries, 5);
        assert_eq!(config.jobs().retry_backoff, RetryBackoffKind::Exponential);
        assert_eq!(config.circuit_breaker().failure_threshold, 2);
        assert_eq!(config.shutdown_timeout_secs, 5);
    }

    #[test]
    fn test_lidarr_enabled_when_both_vars_set() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let _clear = EnvGuard::remove_vars(WORKER_VARS);
        let _guard = EnvGuard::new(&[
            ("LIDARR_URL", "http://lidarr:8686"),
            ("LIDARR_API_KEY", "secret"),
            ("DOWNLOAD_MONITOR_INTERVAL_SECS", "3"),
        ]);

        let config = Config::from_env().unwrap();
        let lidarr = config.lidarr().unwrap();
        assert_eq!(lidarr.api_url("queue"), "http://lidarr:8686/api/v1/queue");
        assert_eq!(lidarr.monitor_interval_secs, 3);
    }

    #[test]
    fn test_malformed_lidarr_url_fails() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let _clear = EnvGuard::remove_vars(WORKER_VARS);
        let _guard = EnvGuard::new(&[("LIDARR_URL", "not a url"), ("LIDARR_API_KEY", "secret")]);

        let err = Config::from_env().unwrap_err();
        assert!(err.to_string().contains("LIDARR_URL"), "unexpected error: {err}");
    }

    #[test]
    fn test_zero_workers_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let _clear = EnvGuard::remove_vars(WORKER_VARS);
        let _guard = EnvGuard::new(&[("WORKER_NUM_WORKERS", "0")]);

        assert!(Config::from_env().is_err());
    }

    #[test]
    fn test_invalid_shutdown_timeout_format() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let _clear = EnvGuard::remove_vars(WORKER_VARS);
        let _guard = EnvGuard::new(&[("WORKER_SHUTDOWN_TIMEOUT", "soon")]);

        let err = Config::from_env().unwrap_err();
        assert!(err.to_string().contains("WORKER_SHUTDOWN_TIMEOUT"));
    }

    #[test]
    fn test_negative_values_fail_parsing() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let _clear = EnvGuard::remove_vars(WORKER_VARS);
        let _guard = EnvGuard::new(&[("WORKER_MAX_RETRIES", "-1")]);

        // Negative numbers should fail for unsigned types
        assert!(Config::from_env().is_err());
    }
}

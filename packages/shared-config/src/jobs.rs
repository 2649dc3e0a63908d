//! Background job queue configuration types

use crate::{get_env_or_default, parse_env, ConfigError, ConfigResult};
use std::time::Duration;

/// Delay strategy applied before a failed job is re-queued
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryBackoffKind {
    /// Push the job straight back onto the work channel
    #[default]
    Immediate,
    /// Exponential delay with jitter, capped at the configured maximum
    Exponential,
}

impl std::str::FromStr for RetryBackoffKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "immediate" | "none" | "flat" => Ok(Self::Immediate),
            "exponential" | "exp" => Ok(Self::Exponential),
            other => Err(format!("unknown retry backoff '{}'", other)),
        }
    }
}

impl std::fmt::Display for RetryBackoffKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Immediate => write!(f, "immediate"),
            Self::Exponential => write!(f, "exponential"),
        }
    }
}

/// Job queue configuration
#[derive(Debug, Clone)]
pub struct JobQueueConfig {
    /// Number of concurrent worker loops (also the running-job ceiling)
    pub num_workers: usize,

    /// Default attempt ceiling for enqueued jobs
    pub max_retries: u32,

    /// Delay strategy between attempts
    pub retry_backoff: RetryBackoffKind,

    /// Base delay for exponential backoff in milliseconds
    pub retry_base_delay_ms: u64,

    /// Upper bound for exponential backoff in milliseconds
    pub retry_max_delay_ms: u64,

    /// How often `wait_for_job` re-checks a job's status, in milliseconds
    pub wait_poll_interval_ms: u64,

    /// How long finished jobs stay in the table, in seconds (0 keeps them forever)
    pub job_retention_secs: u64,

    /// How often finished jobs are purged, in seconds
    pub purge_interval_secs: u64,
}

impl JobQueueConfig {
    /// Load job queue configuration from environment variables
    pub fn from_env() -> ConfigResult<Self> {
        let retry_backoff = get_env_or_default("WORKER_RETRY_BACKOFF", "immediate")
            .parse::<RetryBackoffKind>()
            .map_err(|e| ConfigError::invalid_value("WORKER_RETRY_BACKOFF", e))?;

        let config = Self {
            num_workers: parse_env("WORKER_NUM_WORKERS", 4)?,
            max_retries: parse_env("WORKER_MAX_RETRIES", 3)?,
            retry_backoff,
            retry_base_delay_ms: parse_env("WORKER_RETRY_BASE_DELAY_MS", 1_000)?,
            retry_max_delay_ms: parse_env("WORKER_RETRY_MAX_DELAY_MS", 60_000)?,
            wait_poll_interval_ms: parse_env("WORKER_WAIT_POLL_INTERVAL_MS", 100)?,
            job_retention_secs: parse_env("WORKER_JOB_RETENTION_SECS", 86_400)?,
            purge_interval_secs: parse_env("WORKER_PURGE_INTERVAL_SECS", 300)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Create a configuration with a custom worker count (useful for testing)
    pub fn with_workers(num_workers: usize) -> Self {
        Self {
            num_workers,
            ..Self::default()
        }
    }

    /// Check value ranges that the type system can't express
    pub fn validate(&self) -> ConfigResult<()> {
        if self.num_workers == 0 {
            return Err(ConfigError::validation(
                "WORKER_NUM_WORKERS must be at least 1",
            ));
        }
        if self.wait_poll_interval_ms == 0 {
            return Err(ConfigError::validation(
                "WORKER_WAIT_POLL_INTERVAL_MS must be greater than 0",
            ));
        }
        if self.job_retention_secs > 0 && self.purge_interval_secs == 0 {
            return Err(ConfigError::validation(
                "WORKER_PURGE_INTERVAL_SECS must be greater than 0 when jobs are purged",
            ));
        }
        if self.retry_max_delay_ms < self.retry_base_delay_ms {
            return Err(ConfigError::validation(format!(
                "WORKER_RETRY_MAX_DELAY_MS ({}) is below WORKER_RETRY_BASE_DELAY_MS ({})",
                self.retry_max_delay_ms, self.retry_base_delay_ms
            )));
        }
        Ok(())
    }

    /// Poll interval used by `wait_for_job`
    pub fn wait_poll_interval(&self) -> Duration {
        Duration::from_millis(self.wait_poll_interval_ms)
    }

    /// Retention for finished jobs, `None` when purging is disabled
    pub fn job_retention(&self) -> Option<Duration> {
        (self.job_retention_secs > 0).then(|| Duration::from_secs(self.job_retention_secs))
    }

    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval_secs)
    }
}

impl Default for JobQueueConfig {
    fn default() -> Self {
        Self {
            num_workers: 4,
            max_retries: 3,
            retry_backoff: RetryBackoffKind::Immediate,
            retry_base_delay_ms: 1_000,
            retry_max_delay_ms: 60_000,
            wait_poll_interval_ms: 100,
            job_retention_secs: 86_400,
            purge_interval_secs: 300,
        }
    }
}

//! Shared configuration types for Resonance background services
//!
//! This crate provides the configuration types used by the job queue core
//! and the worker binary, all loaded from environment variables.

mod circuit_breaker;
mod error;
mod jobs;
mod lidarr;

pub use circuit_breaker::CircuitBreakerConfig;
pub use error::{ConfigError, ConfigResult};
pub use jobs::{JobQueueConfig, RetryBackoffKind};
pub use lidarr::LidarrConfig;

use std::env;

/// Common configuration shared between all services
#[derive(Debug, Clone)]
pub struct CommonConfig {
    /// Job queue configuration
    pub jobs: JobQueueConfig,

    /// Default configuration for circuit breakers created lazily by name
    pub circuit_breaker: CircuitBreakerConfig,

    /// Lidarr integration configuration (optional)
    pub lidarr: Option<LidarrConfig>,

    /// Environment mode (development, staging, production)
    pub environment: Environment,

    /// Log level (from RUST_LOG or LOG_LEVEL)
    pub log_level: String,
}

/// Application environment mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl std::str::FromStr for Environment {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "staging" | "stage" => Self::Staging,
            _ => Self::Development,
        })
    }
}

impl Environment {
    /// Check if this is a production environment
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Staging => write!(f, "staging"),
            Self::Production => write!(f, "production"),
        }
    }
}

impl CommonConfig {
    /// Load common configuration from environment variables
    pub fn from_env() -> ConfigResult<Self> {
        Ok(Self {
            jobs: JobQueueConfig::from_env()?,
            circuit_breaker: CircuitBreakerConfig::from_env()?,
            lidarr: lidarr_from_env()?,
            environment: env::var("ENVIRONMENT")
                .unwrap_or_else(|_| "development".to_string())
                .parse()
                .unwrap_or_default(),
            log_level: env::var("RUST_LOG")
                .or_else(|_| env::var("LOG_LEVEL"))
                .unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Check if Lidarr integration is configured
    pub fn has_lidarr(&self) -> bool {
        self.lidarr.is_some()
    }
}

/// Lidarr is optional, but a malformed URL or an empty key is an error
fn lidarr_from_env() -> ConfigResult<Option<LidarrConfig>> {
    if !LidarrConfig::is_configured() {
        return Ok(None);
    }
    LidarrConfig::from_env().map(Some)
}

/// Helper function to get a required environment variable
pub fn get_required_env(name: &str) -> ConfigResult<String> {
    env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))
}

/// Helper function to get an optional environment variable with a default
pub fn get_env_or_default(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

/// Helper function to parse an environment variable into a specific type
pub fn parse_env<T>(name: &str, default: T) -> ConfigResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(val) => val
            .parse::<T>()
            .map_err(|e| ConfigError::invalid_value(name, e.to_string())),
        Err(_) => Ok(default),
    }
}

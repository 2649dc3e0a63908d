//! Errors raised while loading queue, breaker and Lidarr settings

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    /// A variable that has no default is unset
    #[error("{0} is not set")]
    MissingEnvVar(String),

    /// A variable is set but does not parse or is out of range
    #[error("{0} has an invalid value: {1}")]
    InvalidValue(String, String),

    /// A service URL does not parse or uses a scheme we can't talk to
    #[error("{0} is not a usable URL: {1}")]
    InvalidUrl(String, String),

    /// Individually valid settings that contradict each other
    #[error("inconsistent settings: {0}")]
    ValidationError(String),
}

impl ConfigError {
    pub fn invalid_value(variable: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue(variable.to_string(), reason.into())
    }

    pub fn invalid_url(variable: &str, reason: impl Into<String>) -> Self {
        Self::InvalidUrl(variable.to_string(), reason.into())
    }

    pub fn validation(reason: impl Into<String>) -> Self {
        Self::ValidationError(reason.into())
    }

    /// Environment variable the error points at, if it is about a single one
    pub fn variable(&self) -> Option<&str> {
        match self {
            Self::MissingEnvVar(name) | Self::InvalidValue(name, _) | Self::InvalidUrl(name, _) => {
                Some(name)
            }
            Self::ValidationError(_) => None,
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;

//! Lidarr integration configuration types

use crate::{get_required_env, parse_env, ConfigError, ConfigResult};
use std::env;

/// Lidarr music library manager configuration
#[derive(Debug, Clone)]
pub struct LidarrConfig {
    /// Lidarr server URL
    pub url: String,

    /// Lidarr API key
    pub api_key: String,

    /// Download monitor poll interval in seconds
    pub monitor_interval_secs: u64,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl LidarrConfig {
    /// Load Lidarr configuration from environment variables
    ///
    /// Returns an error if the required variables (URL and API key) are not set.
    /// This allows consumers to call `.ok()` to get `Option<LidarrConfig>`.
    pub fn from_env() -> ConfigResult<Self> {
        let url = get_required_env("LIDARR_URL")?;
        let api_key = get_required_env("LIDARR_API_KEY")?;

        if url.trim().is_empty() {
            return Err(ConfigError::invalid_value("LIDARR_URL", "URL cannot be empty"));
        }

        let parsed = url::Url::parse(url.trim())
            .map_err(|e| ConfigError::invalid_url("LIDARR_URL", e.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::invalid_url(
                "LIDARR_URL",
                format!("unsupported scheme '{}'", parsed.scheme()),
            ));
        }

        if api_key.trim().is_empty() {
            return Err(ConfigError::invalid_value(
                "LIDARR_API_KEY",
                "API key cannot be empty",
            ));
        }

        Ok(Self {
            url,
            api_key,
            monitor_interval_secs: parse_env("DOWNLOAD_MONITOR_INTERVAL_SECS", 10)?,
            timeout_secs: parse_env("LIDARR_TIMEOUT", 30)?,
        })
    }

    /// Check if Lidarr is configured (both URL and API key are set)
    pub fn is_configured() -> bool {
        env::var("LIDARR_URL").is_ok() && env::var("LIDARR_API_KEY").is_ok()
    }

    /// Create a configuration with custom URL and API key (useful for testing)
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
            monitor_interval_secs: 10,
            timeout_secs: 30,
        }
    }

    /// Get the full URL for the API endpoint
    pub fn api_url(&self, path: &str) -> String {
        let base = self.url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{}/api/v1/{}", base, path)
    }
}

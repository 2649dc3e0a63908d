//! Named circuit breakers shared across call sites
//!
//! One breaker per external dependency, created once and handed out by
//! reference so every caller of the same service shares its failure history.

use std::sync::Arc;

use dashmap::DashMap;
use resonance_shared_config::CircuitBreakerConfig;

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerStats};

/// Registry of circuit breakers keyed by dependency name
#[derive(Debug, Clone, Default)]
pub struct CircuitBreakerRegistry {
    breakers: Arc<DashMap<String, Arc<CircuitBreaker>>>,
    default_config: CircuitBreakerConfig,
}

impl CircuitBreakerRegistry {
    /// Create a registry whose lazily-created breakers use `default_config`
    pub fn new(default_config: CircuitBreakerConfig) -> Self {
        Self {
            breakers: Arc::new(DashMap::new()),
            default_config,
        }
    }

    /// Get the breaker for `name`, creating it with the default config on first use
    pub fn get_or_create(&self, name: &str) -> Arc<CircuitBreaker> {
        self.get_or_create_with(name, self.default_config)
    }

    /// Get the breaker for `name`, creating it with `config` on first use
    ///
    /// An existing breaker keeps the configuration it was created with.
    pub fn get_or_create_with(&self, name: &str, config: CircuitBreakerConfig) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(name) {
            return existing.clone();
        }

        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                tracing::debug!(breaker = name, "Creating circuit breaker");
                Arc::new(CircuitBreaker::new(name, config))
            })
            .clone()
    }

    /// Get an existing breaker
    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(|b| b.clone())
    }

    /// Names of all registered breakers, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.breakers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Stats for every registered breaker, sorted by name
    pub async fn all_stats(&self) -> Vec<CircuitBreakerStats> {
        // Collect first so no shard lock is held across an await
        let breakers: Vec<Arc<CircuitBreaker>> =
            self.breakers.iter().map(|e| e.value().clone()).collect();

        let mut stats = Vec::with_capacity(breakers.len());
        for breaker in breakers {
            stats.push(breaker.stats().await);
        }
        stats.sort_by(|a, b| a.name.cmp(&b.name));
        stats
    }

    /// Force every breaker closed
    pub async fn reset_all(&self) {
        let breakers: Vec<Arc<CircuitBreaker>> =
            self.breakers.iter().map(|e| e.value().clone()).collect();
        for breaker in breakers {
            breaker.reset().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::CircuitState;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_name_shares_breaker() {
        let registry = CircuitBreakerRegistry::new(CircuitBreakerConfig::default().failure_threshold(1));
        let a = registry.get_or_create("lidarr");
        let b = registry.get_or_create("lidarr");
        assert!(Arc::ptr_eq(&a, &b));

        let _ = a.call(|| async { Err::<(), _>("down") }).await;
        assert_eq!(b.state().await, CircuitState::Open);
    }

    #[tokio::test]
    async fn test_explicit_config_only_applies_on_creation() {
        let registry = CircuitBreakerRegistry::default();
        let custom = CircuitBreakerConfig::default().open_timeout(Duration::from_millis(100));
        let first = registry.get_or_create_with("musicbrainz", custom);
        assert_eq!(first.config().open_timeout, Duration::from_millis(100));

        let again = registry.get_or_create_with("musicbrainz", CircuitBreakerConfig::default());
        assert_eq!(again.config().open_timeout, Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_stats_and_reset_all() {
        let registry = CircuitBreakerRegistry::new(CircuitBreakerConfig::default().failure_threshold(1));
        registry.get_or_create("spotify");
        let lidarr = registry.get_or_create("lidarr");
        let _ = lidarr.call(|| async { Err::<(), _>("down") }).await;

        assert_eq!(registry.names(), vec!["lidarr", "spotify"]);
        assert!(registry.get("deezer").is_none());

        let stats = registry.all_stats().await;
        assert_eq!(stats[0].name, "lidarr");
        assert_eq!(stats[0].state, CircuitState::Open);
        assert_eq!(stats[1].state, CircuitState::Closed);

        registry.reset_all().await;
        assert_eq!(lidarr.state().await, CircuitState::Closed);
    }
}

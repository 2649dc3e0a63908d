//! Common test utilities for worker integration tests

#![allow(dead_code)]

use std::time::Duration;

use resonance_job_queue::{Job, JobQueue};
use resonance_shared_config::{
    CircuitBreakerConfig, CommonConfig, Environment, JobQueueConfig, LidarrConfig,
};
use resonance_test_utils::MockLidarrServer;
use resonance_worker::config::Config;
use uuid::Uuid;

pub use resonance_test_utils::{LidarrAlbumFixture, LidarrQueueRecordFixture};

/// Worker config with fast polling and the given Lidarr setup
pub fn worker_config(lidarr: Option<LidarrConfig>, breaker: CircuitBreakerConfig) -> Config {
    Config {
        common: CommonConfig {
            jobs: JobQueueConfig {
                num_workers: 2,
                max_retries: 3,
                wait_poll_interval_ms: 10,
                ..JobQueueConfig::default()
            },
            circuit_breaker: breaker,
            lidarr,
            environment: Environment::Development,
            log_level: "debug".to_string(),
        },
        shutdown_timeout_secs: 5,
    }
}

/// Lidarr config pointing at a mock server
pub fn lidarr_config(server: &MockLidarrServer) -> LidarrConfig {
    LidarrConfig::new(server.url(), server.api_key())
}

/// Wait for a job to finish, failing the test after a few seconds
pub async fn wait(queue: &JobQueue, id: Uuid) -> Job {
    queue
        .wait_for_job(id, Some(Duration::from_secs(5)))
        .await
        .expect("job did not finish in time")
}

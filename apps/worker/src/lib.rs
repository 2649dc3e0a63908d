//! Resonance background worker
//!
//! Hosts the job queue for the application. The Lidarr download handler and
//! download monitor are wired into the queue, finished jobs are purged after
//! the configured retention, and shutdown drains in-flight work.

pub mod config;
pub mod error;
pub mod jobs;

use resonance_job_queue::{CircuitBreakerRegistry, JobQueue};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{WorkerError, WorkerResult};
use crate::jobs::LidarrJobs;

/// A running worker
pub struct Worker {
    queue: JobQueue,
    breakers: CircuitBreakerRegistry,
    token: CancellationToken,
    monitor: Option<JoinHandle<()>>,
    purger: Option<JoinHandle<()>>,
}

impl Worker {
    /// Register handlers, start the worker pool and the download monitor
    pub async fn start(config: &Config) -> WorkerResult<Self> {
        let queue = JobQueue::new(config.jobs());
        let breakers = CircuitBreakerRegistry::new(config.circuit_breaker());
        let token = CancellationToken::new();

        let lidarr = match LidarrJobs::from_config(config.lidarr(), &breakers) {
            Ok(lidarr) => Some(lidarr),
            Err(err @ WorkerError::LidarrNotConfigured) => {
                if config.is_production() {
                    err.log();
                } else {
                    tracing::warn!("Lidarr not configured, download jobs will fail and the download monitor is disabled");
                }
                None
            }
            Err(e) => return Err(e),
        };

        if let Some(lidarr) = &lidarr {
            lidarr.register(&queue).await?;
        }

        queue.start(config.jobs().num_workers).await?;

        let monitor = lidarr
            .as_ref()
            .map(|lidarr| lidarr.monitor(queue.clone()).spawn(token.clone()));

        let purger = config.jobs().job_retention().map(|retention| {
            queue.spawn_purge_loop(retention, config.jobs().purge_interval(), token.clone())
        });

        tracing::info!(
            workers = config.jobs().num_workers,
            lidarr = config.has_lidarr(),
            job_retention_secs = config.jobs().job_retention_secs,
            environment = %config.environment(),
            "Worker started"
        );

        Ok(Self {
            queue,
            breakers,
            token,
            monitor,
            purger,
        })
    }

    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    pub fn breakers(&self) -> &CircuitBreakerRegistry {
        &self.breakers
    }

    /// Whether the download monitor is running
    pub fn has_monitor(&self) -> bool {
        self.monitor.is_some()
    }

    /// Whether finished jobs are purged periodically
    pub fn has_purger(&self) -> bool {
        self.purger.is_some()
    }

    /// Stop the monitor and the purge loop, then drain in-flight jobs
    pub async fn shutdown(self) {
        self.token.cancel();
        if let Some(monitor) = self.monitor {
            if let Err(e) = monitor.await {
                tracing::warn!(error = %e, "Download monitor task ended abnormally");
            }
        }
        if let Some(purger) = self.purger {
            if let Err(e) = purger.await {
                tracing::warn!(error = %e, "Job purge task ended abnormally");
            }
        }

        self.queue.stop().await;

        for stats in self.breakers.all_stats().await {
            tracing::info!(
                breaker = %stats.name,
                state = %stats.state,
                total_calls = stats.total_calls,
                rejected_calls = stats.rejected_calls,
                total_failures = stats.total_failures,
                "Circuit breaker summary"
            );
        }
    }
}

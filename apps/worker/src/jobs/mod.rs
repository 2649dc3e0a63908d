//! Background job definitions and handlers
//!
//! - Album downloads through Lidarr
//! - Download progress reconciliation against the Lidarr queue

pub mod download;
pub mod download_monitor;
pub mod lidarr;

use std::time::Duration;

use resonance_job_queue::{
    CircuitBreakerRegistry, DownloadMonitor, JobQueue, JobType, QueueResult,
};
use resonance_shared_config::LidarrConfig;

use crate::error::{WorkerError, WorkerResult};
use download::DownloadHandler;
use download_monitor::LidarrProgressSource;
use lidarr::LidarrClient;

/// Name of the circuit breaker guarding every Lidarr call
pub const LIDARR_BREAKER: &str = "lidarr";

/// Lidarr-backed pieces, present only when Lidarr is configured
pub struct LidarrJobs {
    handler: DownloadHandler,
    source: LidarrProgressSource,
    monitor_interval: Duration,
}

impl LidarrJobs {
    /// Build the Lidarr client and share one `lidarr` breaker between the
    /// handler and the progress source
    pub fn from_config(
        config: Option<&LidarrConfig>,
        breakers: &CircuitBreakerRegistry,
    ) -> WorkerResult<Self> {
        let config = config.ok_or(WorkerError::LidarrNotConfigured)?;
        let client = LidarrClient::new(config.clone())?;
        let breaker = breakers.get_or_create(LIDARR_BREAKER);

        Ok(Self {
            handler: DownloadHandler::new(client.clone(), breaker.clone()),
            source: LidarrProgressSource::new(client, breaker),
            monitor_interval: Duration::from_secs(config.monitor_interval_secs.max(1)),
        })
    }

    /// Register the `download` handler
    pub async fn register(&self, queue: &JobQueue) -> QueueResult<()> {
        let handler = self.handler.clone();
        queue
            .register_handler(JobType::Download, move |job| {
                let handler = handler.clone();
                async move { handler.handle(job).await }
            })
            .await
    }

    /// Download monitor polling Lidarr on the configured interval
    pub fn monitor(&self, queue: JobQueue) -> DownloadMonitor<LidarrProgressSource> {
        DownloadMonitor::new(queue, self.source.clone(), self.monitor_interval)
    }
}

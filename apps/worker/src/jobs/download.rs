//! Album download job
//!
//! Asks Lidarr to search for and grab an album. The job completes as soon as
//! Lidarr has accepted the search; the transfer itself is followed by the
//! download monitor through the `progress` object in the job's result.

use std::sync::Arc;

use resonance_job_queue::{
    with_progress, CircuitBreaker, HandlerError, Job, JobPayload, ProgressUpdate,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::lidarr::LidarrClient;
use crate::error::{WorkerError, WorkerResult};

/// Download job payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadJob {
    /// Lidarr album id
    pub album_id: i64,
}

impl DownloadJob {
    pub fn new(album_id: i64) -> Self {
        Self { album_id }
    }

    /// Payload map for `JobQueue::enqueue`
    pub fn to_payload(&self) -> WorkerResult<JobPayload> {
        resonance_job_queue::payload_from(self)
            .map_err(|e| WorkerError::InvalidPayload(e.to_string()))
    }
}

/// Handler for `download` jobs
#[derive(Clone)]
pub struct DownloadHandler {
    client: LidarrClient,
    breaker: Arc<CircuitBreaker>,
}

impl DownloadHandler {
    pub fn new(client: LidarrClient, breaker: Arc<CircuitBreaker>) -> Self {
        Self { client, breaker }
    }

    /// Handle one job
    pub async fn handle(&self, job: Job) -> Result<Value, HandlerError> {
        let payload: DownloadJob = job.payload_as()?;
        if payload.album_id <= 0 {
            return Err(WorkerError::InvalidPayload(format!(
                "album_id must be positive, got {}",
                payload.album_id
            ))
            .into());
        }

        Ok(self.execute(&payload).await?)
    }

    async fn execute(&self, job: &DownloadJob) -> WorkerResult<Value> {
        tracing::info!(album_id = job.album_id, "Requesting album search from Lidarr");

        let command = self
            .breaker
            .call(|| self.client.album_search(job.album_id))
            .await
            .map_err(WorkerError::from)
            .inspect_err(|e| e.log())?;

        tracing::debug!(
            album_id = job.album_id,
            command_id = command.id,
            "Lidarr accepted album search"
        );

        Ok(with_progress(
            json!({
                "album_id": job.album_id,
                "command_id": command.id,
            }),
            &ProgressUpdate::queued(),
        ))
    }
}

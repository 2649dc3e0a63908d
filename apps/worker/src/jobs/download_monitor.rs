//! Lidarr-backed progress source for the download monitor

use std::sync::Arc;

use resonance_job_queue::{CircuitBreaker, Job, MonitorError, ProgressSource, ProgressUpdate};

use super::lidarr::{LidarrClient, LidarrQueueRecord};
use crate::error::WorkerError;

/// Reads download progress for an album from Lidarr
///
/// While the album has releases in Lidarr's download queue, their sizes
/// are summed into a `downloading` update (or `failed` if any release
/// failed). Once the queue is empty, the album's track statistics decide
/// whether the download finished. Calls share the `lidarr` circuit breaker
/// with the download handler.
#[derive(Clone)]
pub struct LidarrProgressSource {
    client: LidarrClient,
    breaker: Arc<CircuitBreaker>,
}

impl LidarrProgressSource {
    pub fn new(client: LidarrClient, breaker: Arc<CircuitBreaker>) -> Self {
        Self { client, breaker }
    }

    async fn progress_for_album(&self, album_id: i64) -> Result<Option<ProgressUpdate>, WorkerError> {
        let records = self
            .breaker
            .call(|| self.client.queue_for_album(album_id))
            .await?;

        if !records.is_empty() {
            return Ok(Some(progress_from_queue(&records)));
        }

        let album = self.breaker.call(|| self.client.album(album_id)).await?;
        if album.statistics.percent_of_tracks >= 100.0 {
            let size = u64::try_from(album.statistics.size_on_disk).ok();
            return Ok(Some(ProgressUpdate::completed(size)));
        }

        // Search still running or nothing grabbed yet
        Ok(None)
    }
}

/// Collapse the queue records of one album into a single update
fn progress_from_queue(records: &[LidarrQueueRecord]) -> ProgressUpdate {
    if let Some(failed) = records.iter().find(|r| r.is_failed()) {
        let message = failed
            .error_message
            .clone()
            .or_else(|| failed.status.clone())
            .unwrap_or_else(|| "download failed".to_string());
        return ProgressUpdate::failed(message);
    }

    let total: f64 = records.iter().map(|r| r.size.max(0.0)).sum();
    let left: f64 = records.iter().map(|r| r.sizeleft.max(0.0)).sum();
    let downloaded = (total - left).max(0.0) as u64;
    let bytes_total = (total > 0.0).then_some(total as u64);

    let waiting = records.iter().all(|r| {
        r.status
            .as_deref()
            .is_some_and(|s| s.eq_ignore_ascii_case("queued") || s.eq_ignore_ascii_case("delay"))
    });
    if waiting && downloaded == 0 {
        return ProgressUpdate {
            bytes_total,
            ..ProgressUpdate::queued()
        };
    }

    ProgressUpdate::downloading(downloaded, bytes_total)
}

/// The Lidarr album a download job refers to
fn album_id_of(job: &Job) -> Result<i64, MonitorError> {
    job.result
        .as_ref()
        .and_then(|r| r.get("album_id"))
        .or_else(|| job.payload.get("album_id"))
        .and_then(|v| v.as_i64())
        .ok_or_else(|| MonitorError::Untrackable {
            job_id: job.id,
            reason: "no album_id in result or payload".to_string(),
        })
}

impl ProgressSource for LidarrProgressSource {
    async fn poll(&self, job: &Job) -> Result<Option<ProgressUpdate>, MonitorError> {
        let album_id = album_id_of(job)?;
        Ok(self.progress_for_album(album_id).await?)
    }
}

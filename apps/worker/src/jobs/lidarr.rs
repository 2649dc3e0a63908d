//! Minimal Lidarr API client
//!
//! Covers the three calls a download needs: triggering an album search,
//! reading the download queue and reading album statistics.

use std::time::Duration;

use resonance_shared_config::LidarrConfig;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{WorkerError, WorkerResult};

/// Records requested per queue page
const QUEUE_PAGE_SIZE: u32 = 1000;

/// Lidarr command response
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LidarrCommand {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub status: Option<String>,
}

/// Paged queue response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueuePage {
    #[serde(default)]
    records: Vec<LidarrQueueRecord>,
}

/// One release in Lidarr's download queue
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LidarrQueueRecord {
    pub id: i64,
    #[serde(default)]
    pub album_id: Option<i64>,
    /// Total size in bytes
    #[serde(default)]
    pub size: f64,
    /// Bytes still to download
    #[serde(default)]
    pub sizeleft: f64,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub tracked_download_state: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl LidarrQueueRecord {
    /// Whether the download client or the import gave up on this release
    pub fn is_failed(&self) -> bool {
        let status_failed = self
            .status
            .as_deref()
            .is_some_and(|s| s.eq_ignore_ascii_case("failed"));
        let import_failed = self
            .tracked_download_state
            .as_deref()
            .is_some_and(|s| s.eq_ignore_ascii_case("importFailed") || s.eq_ignore_ascii_case("failedPending"));
        status_failed || import_failed
    }
}

/// Album with on-disk statistics
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LidarrAlbum {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub statistics: AlbumStatistics,
}

/// Album statistics from Lidarr
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbumStatistics {
    /// Total tracks in the album
    #[serde(default)]
    pub total_track_count: i32,
    /// Number of tracks on disk
    #[serde(default)]
    pub track_file_count: i32,
    /// Size in bytes
    #[serde(default)]
    pub size_on_disk: i64,
    /// Percent of tracks on disk
    #[serde(default)]
    pub percent_of_tracks: f64,
}

/// Lidarr HTTP client
#[derive(Debug, Clone)]
pub struct LidarrClient {
    http: reqwest::Client,
    config: LidarrConfig,
}

impl LidarrClient {
    /// Build a client with the configured request timeout
    pub fn new(config: LidarrConfig) -> WorkerResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &LidarrConfig {
        &self.config
    }

    /// Ask Lidarr to search indexers for an album and grab the best release
    pub async fn album_search(&self, album_id: i64) -> WorkerResult<LidarrCommand> {
        let response = self
            .http
            .post(self.config.api_url("command"))
            .header("X-Api-Key", &self.config.api_key)
            .json(&json!({ "name": "AlbumSearch", "albumIds": [album_id] }))
            .send()
            .await?;

        Self::json(response).await
    }

    /// Releases currently in the download queue for `album_id`
    pub async fn queue_for_album(&self, album_id: i64) -> WorkerResult<Vec<LidarrQueueRecord>> {
        let response = self
            .http
            .get(self.config.api_url("queue"))
            .query(&[("page", 1), ("pageSize", QUEUE_PAGE_SIZE)])
            .header("X-Api-Key", &self.config.api_key)
            .send()
            .await?;

        let page: QueuePage = Self::json(response).await?;
        Ok(page
            .records
            .into_iter()
            .filter(|r| r.album_id == Some(album_id))
            .collect())
    }

    /// Fetch a single album
    pub async fn album(&self, album_id: i64) -> WorkerResult<LidarrAlbum> {
        let response = self
            .http
            .get(self.config.api_url(&format!("album/{}", album_id)))
            .header("X-Api-Key", &self.config.api_key)
            .send()
            .await?;

        Self::json(response).await
    }

    /// Check HTTP status before parsing JSON
    async fn json<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> WorkerResult<T> {
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(WorkerError::lidarr_api(status, body));
        }

        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_queue_record_minimal() {
        let record: LidarrQueueRecord = serde_json::from_value(json!({
            "id": 1,
            "albumId": 42,
            "size": 1000.0,
            "sizeleft": 250.0
        }))
        .unwrap();
        assert_eq!(record.album_id, Some(42));
        assert_eq!(record.size - record.sizeleft, 750.0);
        assert!(!record.is_failed());
    }

    #[test]
    fn test_queue_record_failure_detection() {
        let record: LidarrQueueRecord = serde_json::from_value(json!({
            "id": 1,
            "status": "completed",
            "trackedDownloadState": "importFailed",
            "errorMessage": "No files found are eligible for import"
        }))
        .unwrap();
        assert!(record.is_failed());

        let record: LidarrQueueRecord =
            serde_json::from_value(json!({"id": 2, "status": "Failed"})).unwrap();
        assert!(record.is_failed());
    }

    #[test]
    fn test_deserialize_album_without_statistics() {
        let album: LidarrAlbum =
            serde_json::from_value(json!({"id": 7, "title": "Blue Train"})).unwrap();
        assert_eq!(album.statistics.percent_of_tracks, 0.0);
    }
}

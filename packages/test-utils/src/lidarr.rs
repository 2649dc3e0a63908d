//! Mock Lidarr server for testing download jobs
//!
//! Provides a [`MockLidarrServer`] that simulates the Lidarr endpoints the
//! download handler and the download monitor talk to: album search commands,
//! the download queue and album statistics.

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Mock Lidarr server for testing download jobs
///
/// Wraps a [`wiremock::MockServer`] with convenience methods for the
/// responses a download goes through, plus common error scenarios.
///
/// # Example
///
/// ```rust,ignore
/// use resonance_test_utils::{MockLidarrServer, LidarrQueueRecordFixture};
///
/// #[tokio::test]
/// async fn test_download_progress() {
///     let server = MockLidarrServer::start().await;
///     server.mock_album_search_command(17).await;
///     server
///         .mock_queue(vec![LidarrQueueRecordFixture::downloading(1, 42, 1_000, 250)])
///         .await;
///
///     // Configure the Lidarr client with server.url() and server.api_key()
/// }
/// ```
pub struct MockLidarrServer {
    server: MockServer,
    api_key: String,
}

impl MockLidarrServer {
    /// Start a new mock Lidarr server with default API key
    pub async fn start() -> Self {
        Self::start_with_api_key("test-api-key").await
    }

    /// Start a new mock Lidarr server with custom API key
    pub async fn start_with_api_key(api_key: &str) -> Self {
        let server = MockServer::start().await;
        Self {
            server,
            api_key: api_key.to_string(),
        }
    }

    /// Get the server URL
    pub fn url(&self) -> String {
        self.server.uri()
    }

    /// Get the API key
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Requests the server has received so far
    pub async fn received_requests(&self) -> Vec<wiremock::Request> {
        self.server.received_requests().await.unwrap_or_default()
    }

    /// Drop every mounted mock and recorded request
    pub async fn reset(&self) {
        self.server.reset().await;
    }

    /// Mount a mock accepting any `AlbumSearch` command
    pub async fn mock_album_search_command(&self, command_id: i64) {
        Mock::given(method("POST"))
            .and(path("/api/v1/command"))
            .and(header("X-Api-Key", self.api_key.as_str()))
            .and(body_partial_json(json!({ "name": "AlbumSearch" })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": command_id,
                "name": "AlbumSearch",
                "status": "queued",
                "queued": "2024-01-15T10:00:00Z"
            })))
            .mount(&self.server)
            .await;
    }

    /// Mount a mock for the download queue
    pub async fn mock_queue(&self, records: Vec<LidarrQueueRecordFixture>) {
        let records_json: Vec<serde_json::Value> =
            records.iter().map(|r| r.to_json()).collect();

        Mock::given(method("GET"))
            .and(path("/api/v1/queue"))
            .and(header("X-Api-Key", self.api_key.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "page": 1,
                "pageSize": 1000,
                "totalRecords": records_json.len(),
                "records": records_json
            })))
            .mount(&self.server)
            .await;
    }

    /// Mount a mock for an empty download queue
    pub async fn mock_queue_empty(&self) {
        self.mock_queue(Vec::new()).await;
    }

    /// Mount a mock for a single album lookup
    pub async fn mock_album(&self, album: LidarrAlbumFixture) {
        Mock::given(method("GET"))
            .and(path(format!("/api/v1/album/{}", album.id)))
            .and(header("X-Api-Key", self.api_key.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(album.to_json()))
            .mount(&self.server)
            .await;
    }

    /// Mount a 404 for a single album lookup
    pub async fn mock_album_not_found(&self, album_id: i64) {
        Mock::given(method("GET"))
            .and(path(format!("/api/v1/album/{}", album_id)))
            .and(header("X-Api-Key", self.api_key.as_str()))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "message": "NotFound"
            })))
            .mount(&self.server)
            .await;
    }

    /// Mount a mock for authentication failure with a specific bad API key
    ///
    /// This mock only matches requests that use the specified invalid API key,
    /// so it does not interfere with mocks that use the valid API key.
    pub async fn mock_auth_failure(&self, bad_api_key: &str) {
        Mock::given(path_regex("^/api/v1/(command|queue|album)"))
            .and(header("X-Api-Key", bad_api_key))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": "Unauthorized"
            })))
            .mount(&self.server)
            .await;
    }

    /// Mount a mock for server error on every Lidarr endpoint
    pub async fn mock_server_error(&self, error_message: &str) {
        Mock::given(path_regex("^/api/v1/(command|queue|album)"))
            .and(header("X-Api-Key", self.api_key.as_str()))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "error": error_message
            })))
            .mount(&self.server)
            .await;
    }

    /// Mount a server error that only answers the first `times` requests
    ///
    /// Mocks mounted afterwards take over once it is used up.
    pub async fn mock_server_error_times(&self, error_message: &str, times: u64) {
        Mock::given(path_regex("^/api/v1/(command|queue|album)"))
            .and(header("X-Api-Key", self.api_key.as_str()))
            .respond_with(ResponseTemplate::new(503).set_body_json(json!({
                "error": error_message
            })))
            .up_to_n_times(times)
            .with_priority(1)
            .mount(&self.server)
            .await;
    }

    /// Mount a mock for rate limiting
    pub async fn mock_rate_limit(&self) {
        Mock::given(path_regex("^/api/v1/(command|queue|album)"))
            .and(header("X-Api-Key", self.api_key.as_str()))
            .respond_with(
                ResponseTemplate::new(429)
                    .insert_header("Retry-After", "60")
                    .set_body_json(json!({
                        "error": "Rate limit exceeded"
                    })),
            )
            .mount(&self.server)
            .await;
    }
}

/// Fixture for Lidarr download queue records
#[derive(Debug, Clone)]
pub struct LidarrQueueRecordFixture {
    pub id: i64,
    pub album_id: i64,
    pub title: String,
    pub size: f64,
    pub sizeleft: f64,
    pub status: String,
    pub tracked_download_state: String,
    pub error_message: Option<String>,
}

impl LidarrQueueRecordFixture {
    /// A grabbed release waiting for the download client
    pub fn queued(id: i64, album_id: i64, size: u64) -> Self {
        Self {
            id,
            album_id,
            title: format!("Album {} [FLAC]", album_id),
            size: size as f64,
            sizeleft: size as f64,
            status: "queued".to_string(),
            tracked_download_state: "downloading".to_string(),
            error_message: None,
        }
    }

    /// A download in flight with `size - sizeleft` bytes done
    pub fn downloading(id: i64, album_id: i64, size: u64, sizeleft: u64) -> Self {
        Self {
            sizeleft: sizeleft as f64,
            status: "downloading".to_string(),
            ..Self::queued(id, album_id, size)
        }
    }

    /// A download the client gave up on
    pub fn failed(id: i64, album_id: i64, error_message: &str) -> Self {
        Self {
            status: "failed".to_string(),
            tracked_download_state: "importFailed".to_string(),
            error_message: Some(error_message.to_string()),
            ..Self::queued(id, album_id, 0)
        }
    }

    /// Convert to JSON value
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "id": self.id,
            "albumId": self.album_id,
            "artistId": 1,
            "title": self.title,
            "size": self.size,
            "sizeleft": self.sizeleft,
            "status": self.status,
            "trackedDownloadState": self.tracked_download_state,
            "trackedDownloadStatus": if self.error_message.is_some() { "warning" } else { "ok" },
            "errorMessage": self.error_message,
            "protocol": "torrent",
            "downloadClient": "qBittorrent"
        })
    }
}

/// Fixture for creating Lidarr album responses
#[derive(Debug, Clone)]
pub struct LidarrAlbumFixture {
    pub id: i64,
    pub title: String,
    pub artist_id: i64,
    pub monitored: bool,
    pub foreign_album_id: Option<String>,
    pub release_date: Option<String>,
    pub statistics: LidarrAlbumStatisticsFixture,
}

impl LidarrAlbumFixture {
    /// Create an album fixture with every track on disk
    pub fn with_tracks(id: i64, title: &str, artist_id: i64, track_count: i32) -> Self {
        Self {
            id,
            title: title.to_string(),
            artist_id,
            monitored: true,
            foreign_album_id: Some(uuid::Uuid::new_v4().to_string()),
            release_date: Some("2024-01-15".to_string()),
            statistics: LidarrAlbumStatisticsFixture {
                total_track_count: track_count,
                track_file_count: track_count,
                size_on_disk: (track_count as i64) * 50_000_000,
                percent_of_tracks: 100.0,
            },
        }
    }

    /// Create an album fixture without tracks on disk
    pub fn without_tracks(id: i64, title: &str, artist_id: i64) -> Self {
        let mut album = Self::with_tracks(id, title, artist_id, 10);
        album.statistics.track_file_count = 0;
        album.statistics.size_on_disk = 0;
        album.statistics.percent_of_tracks = 0.0;
        album
    }

    /// Convert to JSON value
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "id": self.id,
            "title": self.title,
            "artistId": self.artist_id,
            "monitored": self.monitored,
            "foreignAlbumId": self.foreign_album_id,
            "releaseDate": self.release_date,
            "statistics": {
                "totalTrackCount": self.statistics.total_track_count,
                "trackFileCount": self.statistics.track_file_count,
                "sizeOnDisk": self.statistics.size_on_disk,
                "percentOfTracks": self.statistics.percent_of_tracks
            }
        })
    }
}

/// Fixture for Lidarr album statistics
#[derive(Debug, Clone)]
pub struct LidarrAlbumStatisticsFixture {
    pub total_track_count: i32,
    pub track_file_count: i32,
    pub size_on_disk: i64,
    pub percent_of_tracks: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_lidarr_server_starts() {
        let server = MockLidarrServer::start().await;
        assert!(!server.url().is_empty());
        assert_eq!(server.api_key(), "test-api-key");
    }

    #[tokio::test]
    async fn test_mock_album_search_command() {
        let server = MockLidarrServer::start().await;
        server.mock_album_search_command(17).await;

        let client = reqwest::Client::new();
        let response = client
            .post(format!("{}/api/v1/command", server.url()))
            .header("X-Api-Key", server.api_key())
            .json(&json!({ "name": "AlbumSearch", "albumIds": [42] }))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status().as_u16(), 201);
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["id"], 17);
        assert_eq!(server.received_requests().await.len(), 1);
    }

    #[tokio::test]
    async fn test_mock_queue_is_paged() {
        let server = MockLidarrServer::start().await;
        server
            .mock_queue(vec![
                LidarrQueueRecordFixture::downloading(1, 42, 1_000, 250),
                LidarrQueueRecordFixture::failed(2, 43, "Download client unavailable"),
            ])
            .await;

        let client = reqwest::Client::new();
        let body: serde_json::Value = client
            .get(format!("{}/api/v1/queue", server.url()))
            .header("X-Api-Key", server.api_key())
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(body["totalRecords"], 2);
        assert_eq!(body["records"][0]["albumId"], 42);
        assert_eq!(body["records"][0]["sizeleft"], 250.0);
        assert_eq!(body["records"][1]["errorMessage"], "Download client unavailable");
    }

    #[tokio::test]
    async fn test_mock_lidarr_auth_failure_does_not_interfere_with_valid_key() {
        let server = MockLidarrServer::start().await;
        server.mock_auth_failure("wrong-key").await;
        server.mock_queue_empty().await;

        let client = reqwest::Client::new();

        let valid_response = client
            .get(format!("{}/api/v1/queue", server.url()))
            .header("X-Api-Key", server.api_key())
            .send()
            .await
            .unwrap();
        assert!(valid_response.status().is_success());

        let invalid_response = client
            .get(format!("{}/api/v1/queue", server.url()))
            .header("X-Api-Key", "wrong-key")
            .send()
            .await
            .unwrap();
        assert_eq!(invalid_response.status().as_u16(), 401);
    }

    #[tokio::test]
    async fn test_transient_error_gives_way() {
        let server = MockLidarrServer::start().await;
        server.mock_queue_empty().await;
        server.mock_server_error_times("warming up", 1).await;

        let client = reqwest::Client::new();
        let url = format!("{}/api/v1/queue", server.url());
        let first = client
            .get(&url)
            .header("X-Api-Key", server.api_key())
            .send()
            .await
            .unwrap();
        assert_eq!(first.status().as_u16(), 503);

        let second = client
            .get(&url)
            .header("X-Api-Key", server.api_key())
            .send()
            .await
            .unwrap();
        assert!(second.status().is_success());
    }

    #[test]
    fn test_queue_record_fixtures() {
        let record = LidarrQueueRecordFixture::downloading(1, 42, 1_000, 250);
        assert_eq!(record.status, "downloading");
        assert_eq!(record.size, 1_000.0);

        let record = LidarrQueueRecordFixture::failed(2, 42, "stalled");
        assert_eq!(record.tracked_download_state, "importFailed");
        assert_eq!(record.to_json()["trackedDownloadStatus"], "warning");
    }

    #[test]
    fn test_lidarr_album_fixture_without_tracks() {
        let album = LidarrAlbumFixture::without_tracks(1, "A Night at the Opera", 42);
        assert_eq!(album.statistics.track_file_count, 0);
        assert_eq!(album.statistics.percent_of_tracks, 0.0);
    }

    #[test]
    fn test_lidarr_album_to_json() {
        let album = LidarrAlbumFixture::with_tracks(1, "A Night at the Opera", 42, 12);
        let json = album.to_json();

        assert_eq!(json["id"], 1);
        assert_eq!(json["title"], "A Night at the Opera");
        assert_eq!(json["artistId"], 42);
        assert_eq!(json["statistics"]["trackFileCount"], 12);
        assert_eq!(json["statistics"]["percentOfTracks"], 100.0);
    }
}

//! Shared test utilities for the Resonance workspace
//!
//! Mock implementations of external services so job handlers and the
//! download monitor can be tested without network dependencies.
//!
//! # Mock Services
//!
//! - [`MockLidarrServer`] - Mock Lidarr server for album search, download
//!   queue and album statistics
//!
//! # Example
//!
//! ```rust,ignore
//! use resonance_test_utils::{MockLidarrServer, LidarrAlbumFixture};
//!
//! #[tokio::test]
//! async fn test_with_mocks() {
//!     let lidarr = MockLidarrServer::start().await;
//!     lidarr.mock_album(LidarrAlbumFixture::with_tracks(42, "Jazz", 1, 10)).await;
//!
//!     // Use lidarr.url() and lidarr.api_key() to configure your client
//! }
//! ```

mod lidarr;

pub use lidarr::{
    LidarrAlbumFixture, LidarrAlbumStatisticsFixture, LidarrQueueRecordFixture, MockLidarrServer,
};

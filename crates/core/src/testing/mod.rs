//! Testing utilities and mock implementations.
//!
//! This module provides mock implementations of all external service traits,
//! allowing end-to-end testing of the auto-downloader without real services.
//!
//! # Example
//!
//! ```rust,ignore
//! use anidl_core::testing::{fixtures, MockMetadataProvider, MockSearcher, MockTorrentClient};
//!
//! let metadata = MockMetadataProvider::new();
//! let searcher = MockSearcher::new();
//! let torrent_client = MockTorrentClient::new();
//!
//! // Configure mock responses
//! metadata.add_media(fixtures::media_info(1, "Sample Show")).await;
//! searcher.set_results(vec![fixtures::raw_listing("[Erai-raws] Sample Show - 05 [1080p]", 10)]).await;
//!
//! // Wire into an AutoDownloader...
//! ```

mod mock_metadata;
mod mock_searcher;
mod mock_torrent_client;

pub use mock_metadata::{MockMetadataProvider, RecordedMetadataQuery};
pub use mock_searcher::MockSearcher;
pub use mock_torrent_client::{MockTorrentClient, RecordedAddTorrent, TorrentOperation};

/// Test fixtures and helper functions.
pub mod fixtures {
    use chrono::{Datelike, Utc};

    use crate::release::RawListing;
    use crate::tracking::{FuzzyDate, MediaFormat, MediaInfo};

    /// A Japanese TV series that started airing a year ago.
    pub fn media_info(id: u64, title: &str) -> MediaInfo {
        MediaInfo {
            id,
            title: title.to_string(),
            format: Some(MediaFormat::Tv),
            country_of_origin: Some("JP".to_string()),
            start_date: FuzzyDate::new(Utc::now().year() - 1, 1, 1),
        }
    }

    /// A movie that started airing a year ago.
    pub fn movie_info(id: u64, title: &str) -> MediaInfo {
        MediaInfo {
            format: Some(MediaFormat::Movie),
            ..media_info(id, title)
        }
    }

    /// Media whose start date is only partially announced.
    pub fn unannounced_media_info(id: u64, title: &str) -> MediaInfo {
        MediaInfo {
            start_date: FuzzyDate {
                year: Some(Utc::now().year() + 1),
                month: None,
                day: None,
            },
            ..media_info(id, title)
        }
    }

    /// A raw listing with a link derived from its title.
    pub fn raw_listing(title: &str, seeders: u32) -> RawListing {
        let slug: String = title
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        RawListing::new(
            title,
            format!("https://nyaa.example/download/{}.torrent", slug),
            seeders,
        )
    }

    /// A strictly formatted single-episode listing.
    pub fn episode_listing(
        group: &str,
        title: &str,
        episode: u32,
        quality: &str,
        seeders: u32,
    ) -> RawListing {
        raw_listing(
            &format!("[{}] {} - {:02} [{}]", group, title, episode, quality),
            seeders,
        )
    }

    /// A batch listing (does not match the strict pattern).
    pub fn batch_listing(group: &str, title: &str, quality: &str, seeders: u32) -> RawListing {
        raw_listing(
            &format!("[{}] {} (01-12) ({}) [Batch]", group, title, quality),
            seeders,
        )
    }
}

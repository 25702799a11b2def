//! Metadata provider integration.
//!
//! Resolves watch-list identifiers to canonical titles, formats and air dates,
//! and lists a user's watch-list entries.

mod anilist;

pub use anilist::AniListClient;

use async_trait::async_trait;
use thiserror::Error;

use crate::tracking::MediaInfo;

/// Errors that can occur when talking to the metadata provider.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Rate limit exceeded.
    #[error("Rate limit exceeded, please wait before retrying")]
    RateLimitExceeded,

    /// Media or user not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// API returned an error.
    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    /// Failed to parse response.
    #[error("Failed to parse response: {0}")]
    ParseError(String),
}

/// Source of media metadata and user watch lists.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Provider name for logging.
    fn name(&self) -> &str;

    /// Fetch title, format, origin and start date for one media id.
    async fn fetch_media(&self, id: u64) -> Result<MediaInfo, MetadataError>;

    /// Media ids on the user's lists whose names appear in `list_names`.
    async fn fetch_watch_list(
        &self,
        username: &str,
        list_names: &[String],
    ) -> Result<Vec<u64>, MetadataError>;
}

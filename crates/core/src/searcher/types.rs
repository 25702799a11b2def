use async_trait::async_trait;
use thiserror::Error;

use crate::release::RawListing;

/// Errors that can occur during search operations.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Search backend connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Search backend API error: {0}")]
    ApiError(String),

    #[error("Failed to parse search response: {0}")]
    ParseError(String),

    #[error("Request timeout")]
    Timeout,
}

impl From<reqwest::Error> for SearchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SearchError::Timeout
        } else if e.is_connect() {
            SearchError::ConnectionFailed(e.to_string())
        } else {
            SearchError::ApiError(e.to_string())
        }
    }
}

/// Trait for release search backends.
#[async_trait]
pub trait Searcher: Send + Sync {
    /// Provider name for logging/metrics.
    fn name(&self) -> &str;

    /// Search for listings matching `query`, best-seeded first.
    async fn search(&self, query: &str) -> Result<Vec<RawListing>, SearchError>;

    /// URL of a recurring feed for `query`, suitable for the download client.
    fn feed_url(&self, query: &str) -> String;
}

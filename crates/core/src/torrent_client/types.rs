//! Types for download client operations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during download client operations.
#[derive(Debug, Error)]
pub enum TorrentClientError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid torrent: {0}")]
    InvalidTorrent(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Request timeout")]
    Timeout,
}

impl From<reqwest::Error> for TorrentClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TorrentClientError::Timeout
        } else if e.is_connect() {
            TorrentClientError::ConnectionFailed(e.to_string())
        } else {
            TorrentClientError::ApiError(e.to_string())
        }
    }
}

/// State of a torrent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TorrentState {
    /// Downloading from peers.
    Downloading,
    /// Seeding to peers (including seeding with nobody connected).
    Seeding,
    /// Download or upload is paused.
    Paused,
    /// Checking file integrity.
    Checking,
    /// Queued for download.
    Queued,
    /// Downloading but no peers are sending data.
    Stalled,
    /// Error state.
    Error,
    /// Unknown state.
    Unknown,
}

impl TorrentState {
    /// Returns the string representation for logs and API responses.
    pub fn as_str(&self) -> &'static str {
        match self {
            TorrentState::Downloading => "downloading",
            TorrentState::Seeding => "seeding",
            TorrentState::Paused => "paused",
            TorrentState::Checking => "checking",
            TorrentState::Queued => "queued",
            TorrentState::Stalled => "stalled",
            TorrentState::Error => "error",
            TorrentState::Unknown => "unknown",
        }
    }
}

/// Information about a torrent in the download client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TorrentInfo {
    /// Info hash (lowercase hex).
    pub hash: String,
    /// Torrent name.
    pub name: String,
    /// Current state.
    pub state: TorrentState,
    /// Download progress (0.0 - 1.0).
    pub progress: f64,
    /// Total size in bytes.
    pub size_bytes: u64,
    /// Number of connected seeders.
    pub seeders: u32,
    /// When the torrent was added.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub added_at: Option<DateTime<Utc>>,
    /// Save path on disk.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub save_path: Option<String>,
    /// Category/label.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// Request to add a torrent by URL (`.torrent` link or magnet URI).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddTorrentRequest {
    pub url: String,
    /// Optional save path override.
    pub save_path: Option<String>,
    /// Optional category/label.
    pub category: Option<String>,
}

impl AddTorrentRequest {
    /// Create a request with default options.
    pub fn url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            save_path: None,
            category: None,
        }
    }

    /// Set the save path.
    pub fn with_save_path(mut self, path: impl Into<String>) -> Self {
        self.save_path = Some(path.into());
        self
    }

    /// Set the category.
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

/// Result of adding a torrent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddTorrentResult {
    /// Info hash, known up front only for magnet links.
    pub hash: Option<String>,
}

/// Filters for listing torrents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TorrentFilters {
    /// Filter by state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<TorrentState>,
    /// Filter by category.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl TorrentFilters {
    /// Only torrents stalled while downloading.
    pub fn stalled() -> Self {
        Self {
            state: Some(TorrentState::Stalled),
            category: None,
        }
    }

    /// Check if any filters are set.
    pub fn is_empty(&self) -> bool {
        self.state.is_none() && self.category.is_none()
    }
}

/// An RSS auto-download rule, in the download client's JSON shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRule {
    pub enabled: bool,
    /// Pattern a feed entry title must match.
    pub must_contain: String,
    /// Pattern a feed entry title must not match.
    pub must_not_contain: String,
    /// Treat both patterns as regular expressions.
    pub use_regex: bool,
    pub episode_filter: String,
    pub smart_filter: bool,
    pub previously_matched_episodes: Vec<String>,
    /// Feed URLs the rule applies to.
    pub affected_feeds: Vec<String>,
    pub ignore_days: u32,
    pub last_match: String,
    pub add_paused: bool,
    pub assigned_category: String,
    pub save_path: String,
}

impl DownloadRule {
    /// An enabled rule accepting every entry of `feed_url`.
    pub fn new(
        feed_url: impl Into<String>,
        save_path: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            enabled: true,
            must_contain: String::new(),
            must_not_contain: String::new(),
            use_regex: false,
            episode_filter: String::new(),
            smart_filter: false,
            previously_matched_episodes: Vec::new(),
            affected_feeds: vec![feed_url.into()],
            ignore_days: 0,
            last_match: String::new(),
            add_paused: false,
            assigned_category: category.into(),
            save_path: save_path.into(),
        }
    }

    /// Require a regex match; switches the rule to regex mode.
    pub fn with_must_contain(mut self, pattern: impl Into<String>) -> Self {
        self.must_contain = pattern.into();
        self.use_regex = true;
        self
    }

    /// Reject entries matching `pattern`.
    pub fn with_must_not_contain(mut self, pattern: impl Into<String>) -> Self {
        self.must_not_contain = pattern.into();
        self
    }
}

/// Trait for download client backends.
#[async_trait]
pub trait TorrentClient: Send + Sync {
    /// Backend name for logging/metrics.
    fn name(&self) -> &str;

    /// Subscribe to an RSS feed, stored under `path`.
    async fn add_feed(&self, url: &str, path: &str) -> Result<(), TorrentClientError>;

    /// Remove the feed (or folder) stored under `path`.
    async fn remove_feed(&self, path: &str) -> Result<(), TorrentClientError>;

    /// Create or replace the auto-download rule `name`.
    async fn set_rule(&self, name: &str, rule: &DownloadRule) -> Result<(), TorrentClientError>;

    /// Add a torrent for immediate download.
    async fn add_torrent(
        &self,
        request: AddTorrentRequest,
    ) -> Result<AddTorrentResult, TorrentClientError>;

    /// List torrents, optionally filtered.
    async fn list_torrents(
        &self,
        filters: &TorrentFilters,
    ) -> Result<Vec<TorrentInfo>, TorrentClientError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_torrent_state_as_str() {
        assert_eq!(TorrentState::Downloading.as_str(), "downloading");
        assert_eq!(TorrentState::Seeding.as_str(), "seeding");
        assert_eq!(TorrentState::Stalled.as_str(), "stalled");
        assert_eq!(TorrentState::Unknown.as_str(), "unknown");
    }

    #[test]
    fn test_add_torrent_request_builder() {
        let req = AddTorrentRequest::url("https://nyaa.si/download/1.torrent")
            .with_save_path("/downloads/Anime/Show")
            .with_category("Anime");

        assert_eq!(req.url, "https://nyaa.si/download/1.torrent");
        assert_eq!(req.save_path.as_deref(), Some("/downloads/Anime/Show"));
        assert_eq!(req.category.as_deref(), Some("Anime"));
    }

    #[test]
    fn test_torrent_filters() {
        assert!(TorrentFilters::default().is_empty());
        let stalled = TorrentFilters::stalled();
        assert!(!stalled.is_empty());
        assert_eq!(stalled.state, Some(TorrentState::Stalled));
    }

    #[test]
    fn test_download_rule_json_shape() {
        let rule = DownloadRule::new("https://feed", "/downloads/Anime/Show", "Anime")
            .with_must_contain(r"\] Show \(2024\) -")
            .with_must_not_contain("batch");

        let json = serde_json::to_value(&rule).unwrap();
        assert_eq!(json["enabled"], true);
        assert_eq!(json["mustContain"], r"\] Show \(2024\) -");
        assert_eq!(json["mustNotContain"], "batch");
        assert_eq!(json["useRegex"], true);
        assert_eq!(json["episodeFilter"], "");
        assert_eq!(json["smartFilter"], false);
        assert_eq!(json["affectedFeeds"][0], "https://feed");
        assert_eq!(json["ignoreDays"], 0);
        assert_eq!(json["addPaused"], false);
        assert_eq!(json["assignedCategory"], "Anime");
        assert_eq!(json["savePath"], "/downloads/Anime/Show");
    }

    #[test]
    fn test_download_rule_default_is_plain() {
        let rule = DownloadRule::new("https://feed", "/p", "Anime");
        assert!(rule.must_contain.is_empty());
        assert!(!rule.use_regex);
    }
}

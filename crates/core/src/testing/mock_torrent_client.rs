//! Mock download client for testing.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::torrent_client::{
    AddTorrentRequest, AddTorrentResult, DownloadRule, TorrentClient, TorrentClientError,
    TorrentFilters, TorrentInfo, TorrentState,
};

/// Operations that can be made to fail individually.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TorrentOperation {
    AddFeed,
    RemoveFeed,
    SetRule,
    AddTorrent,
    ListTorrents,
}

/// A recorded torrent addition for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedAddTorrent {
    /// The request that was made.
    pub request: AddTorrentRequest,
    /// When the request was made.
    pub timestamp: chrono::DateTime<Utc>,
}

/// Mock implementation of the TorrentClient trait.
///
/// Provides controllable behavior for testing:
/// - Track feeds, rules and added torrents for assertions
/// - Control the torrent list returned to stall checks
/// - Simulate failures per operation
///
/// # Example
///
/// ```rust,ignore
/// let client = MockTorrentClient::new();
///
/// client.add_feed("https://feed", "Sample Show").await?;
/// assert_eq!(client.feeds().await.get("Sample Show").unwrap(), "https://feed");
///
/// // The next rule is reported as already existing
/// client.set_next_error(
///     TorrentOperation::SetRule,
///     TorrentClientError::AlreadyExists("rule".into()),
/// ).await;
///
/// // Simulate a stalled download
/// client.add_listed_torrent("[SubsPlease] Sample Show - 05", TorrentState::Stalled).await;
/// ```
#[derive(Debug)]
pub struct MockTorrentClient {
    /// Feed URLs by path.
    feeds: Arc<RwLock<BTreeMap<String, String>>>,
    /// Paths passed to remove_feed, in call order.
    removed_feeds: Arc<RwLock<Vec<String>>>,
    /// Rules by name.
    rules: Arc<RwLock<BTreeMap<String, DownloadRule>>>,
    /// Recorded add_torrent calls.
    added: Arc<RwLock<Vec<RecordedAddTorrent>>>,
    /// Torrents returned by list_torrents.
    torrents: Arc<RwLock<Vec<TorrentInfo>>>,
    /// Pending failures by operation, each consumed by the next call.
    next_errors: Arc<RwLock<HashMap<TorrentOperation, TorrentClientError>>>,
}

impl Default for MockTorrentClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTorrentClient {
    /// Create a new mock download client.
    pub fn new() -> Self {
        Self {
            feeds: Arc::new(RwLock::new(BTreeMap::new())),
            removed_feeds: Arc::new(RwLock::new(Vec::new())),
            rules: Arc::new(RwLock::new(BTreeMap::new())),
            added: Arc::new(RwLock::new(Vec::new())),
            torrents: Arc::new(RwLock::new(Vec::new())),
            next_errors: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Subscribed feeds (path -> URL).
    pub async fn feeds(&self) -> BTreeMap<String, String> {
        self.feeds.read().await.clone()
    }

    /// Paths passed to remove_feed.
    pub async fn removed_feeds(&self) -> Vec<String> {
        self.removed_feeds.read().await.clone()
    }

    /// Stored rules (name -> rule).
    pub async fn rules(&self) -> BTreeMap<String, DownloadRule> {
        self.rules.read().await.clone()
    }

    /// Get all recorded add_torrent calls.
    pub async fn added_torrents(&self) -> Vec<RecordedAddTorrent> {
        self.added.read().await.clone()
    }

    /// Add a torrent to the list returned by list_torrents.
    pub async fn add_listed_torrent(&self, name: &str, state: TorrentState) {
        let mut torrents = self.torrents.write().await;
        let hash = format!("{:040x}", torrents.len() + 1);
        torrents.push(TorrentInfo {
            hash,
            name: name.to_string(),
            state,
            progress: 0.0,
            size_bytes: 1024 * 1024 * 500, // 500 MB
            seeders: 0,
            added_at: Some(Utc::now()),
            save_path: None,
            category: None,
        });
    }

    /// Configure the next call of `operation` to fail with the given error.
    pub async fn set_next_error(&self, operation: TorrentOperation, error: TorrentClientError) {
        self.next_errors.write().await.insert(operation, error);
    }

    async fn take_error(&self, operation: TorrentOperation) -> Result<(), TorrentClientError> {
        match self.next_errors.write().await.remove(&operation) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl TorrentClient for MockTorrentClient {
    fn name(&self) -> &str {
        "mock"
    }

    async fn add_feed(&self, url: &str, path: &str) -> Result<(), TorrentClientError> {
        self.take_error(TorrentOperation::AddFeed).await?;

        let mut feeds = self.feeds.write().await;
        if feeds.contains_key(path) {
            return Err(TorrentClientError::AlreadyExists(format!("feed {}", path)));
        }
        feeds.insert(path.to_string(), url.to_string());
        Ok(())
    }

    async fn remove_feed(&self, path: &str) -> Result<(), TorrentClientError> {
        self.removed_feeds.write().await.push(path.to_string());
        self.take_error(TorrentOperation::RemoveFeed).await?;

        match self.feeds.write().await.remove(path) {
            Some(_) => Ok(()),
            None => Err(TorrentClientError::NotFound(format!("feed {}", path))),
        }
    }

    async fn set_rule(&self, name: &str, rule: &DownloadRule) -> Result<(), TorrentClientError> {
        self.take_error(TorrentOperation::SetRule).await?;
        self.rules
            .write()
            .await
            .insert(name.to_string(), rule.clone());
        Ok(())
    }

    async fn add_torrent(
        &self,
        request: AddTorrentRequest,
    ) -> Result<AddTorrentResult, TorrentClientError> {
        self.take_error(TorrentOperation::AddTorrent).await?;
        self.added.write().await.push(RecordedAddTorrent {
            request,
            timestamp: Utc::now(),
        });
        Ok(AddTorrentResult { hash: None })
    }

    async fn list_torrents(
        &self,
        filters: &TorrentFilters,
    ) -> Result<Vec<TorrentInfo>, TorrentClientError> {
        self.take_error(TorrentOperation::ListTorrents).await?;
        Ok(self
            .torrents
            .read()
            .await
            .iter()
            .filter(|t| filters.state.is_none_or(|s| t.state == s))
            .filter(|t| {
                filters
                    .category
                    .as_ref()
                    .is_none_or(|c| t.category.as_ref() == Some(c))
            })
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_feeds_are_keyed_by_path() {
        let client = MockTorrentClient::new();
        client.add_feed("https://a", "Show").await.unwrap();
        assert!(matches!(
            client.add_feed("https://b", "Show").await,
            Err(TorrentClientError::AlreadyExists(_))
        ));

        client.remove_feed("Show").await.unwrap();
        assert!(client.feeds().await.is_empty());
        assert!(matches!(
            client.remove_feed("Show").await,
            Err(TorrentClientError::NotFound(_))
        ));
        assert_eq!(client.removed_feeds().await, vec!["Show", "Show"]);
    }

    #[tokio::test]
    async fn test_errors_are_per_operation() {
        let client = MockTorrentClient::new();
        client
            .set_next_error(
                TorrentOperation::SetRule,
                TorrentClientError::AlreadyExists("rule".to_string()),
            )
            .await;

        client.add_feed("https://a", "Show").await.unwrap();
        let rule = DownloadRule::new("https://a", "/p", "Anime");
        assert!(client.set_rule("Show", &rule).await.is_err());
        assert!(client.set_rule("Show", &rule).await.is_ok());
    }

    #[tokio::test]
    async fn test_list_filters_by_state() {
        let client = MockTorrentClient::new();
        client
            .add_listed_torrent("stalled one", TorrentState::Stalled)
            .await;
        client
            .add_listed_torrent("fine one", TorrentState::Downloading)
            .await;

        let stalled = client
            .list_torrents(&TorrentFilters::stalled())
            .await
            .unwrap();
        assert_eq!(stalled.len(), 1);
        assert_eq!(stalled[0].name, "stalled one");

        let all = client
            .list_torrents(&TorrentFilters::default())
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
    }
}

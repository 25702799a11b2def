//! Mock metadata provider for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::metadata::{MetadataError, MetadataProvider};
use crate::tracking::MediaInfo;

/// A recorded provider query for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedMetadataQuery {
    FetchMedia { id: u64 },
    FetchWatchList { username: String },
}

/// Mock implementation of the MetadataProvider trait.
///
/// Provides controllable behavior for testing:
/// - Return configurable media and watch lists
/// - Track queries for assertions
/// - Simulate failures
///
/// # Example
///
/// ```rust,ignore
/// use anidl_core::testing::{MockMetadataProvider, fixtures};
///
/// let provider = MockMetadataProvider::new();
/// provider.add_media(fixtures::media_info(21, "One Piece")).await;
/// provider.add_list_entry("alice", "Watching", 21).await;
///
/// let ids = provider.fetch_watch_list("alice", &["Watching".into()]).await?;
/// assert_eq!(ids, vec![21]);
/// ```
#[derive(Debug)]
pub struct MockMetadataProvider {
    /// Media by id.
    media: Arc<RwLock<HashMap<u64, MediaInfo>>>,
    /// (list name, media id) entries by username.
    lists: Arc<RwLock<HashMap<String, Vec<(String, u64)>>>>,
    /// Recorded queries.
    queries: Arc<RwLock<Vec<RecordedMetadataQuery>>>,
    /// If set, the next operation will fail with this error.
    next_error: Arc<RwLock<Option<MetadataError>>>,
}

impl Default for MockMetadataProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockMetadataProvider {
    /// Create a new empty mock provider.
    pub fn new() -> Self {
        Self {
            media: Arc::new(RwLock::new(HashMap::new())),
            lists: Arc::new(RwLock::new(HashMap::new())),
            queries: Arc::new(RwLock::new(Vec::new())),
            next_error: Arc::new(RwLock::new(None)),
        }
    }

    /// Add or replace media metadata.
    pub async fn add_media(&self, media: MediaInfo) {
        self.media.write().await.insert(media.id, media);
    }

    /// Put `id` on the user's list named `list`. Creates the user if needed.
    pub async fn add_list_entry(&self, username: &str, list: &str, id: u64) {
        self.lists
            .write()
            .await
            .entry(username.to_string())
            .or_default()
            .push((list.to_string(), id));
    }

    /// Register a user with no list entries.
    pub async fn add_user(&self, username: &str) {
        self.lists
            .write()
            .await
            .entry(username.to_string())
            .or_default();
    }

    /// Get recorded queries.
    pub async fn recorded_queries(&self) -> Vec<RecordedMetadataQuery> {
        self.queries.read().await.clone()
    }

    /// Number of media fetches performed.
    pub async fn media_fetch_count(&self) -> usize {
        self.queries
            .read()
            .await
            .iter()
            .filter(|q| matches!(q, RecordedMetadataQuery::FetchMedia { .. }))
            .count()
    }

    /// Configure the next operation to fail with the given error.
    pub async fn set_next_error(&self, error: MetadataError) {
        *self.next_error.write().await = Some(error);
    }

    async fn take_error(&self) -> Option<MetadataError> {
        self.next_error.write().await.take()
    }
}

#[async_trait]
impl MetadataProvider for MockMetadataProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn fetch_media(&self, id: u64) -> Result<MediaInfo, MetadataError> {
        self.queries
            .write()
            .await
            .push(RecordedMetadataQuery::FetchMedia { id });

        if let Some(error) = self.take_error().await {
            return Err(error);
        }

        self.media
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| MetadataError::NotFound(format!("Media ID {}", id)))
    }

    async fn fetch_watch_list(
        &self,
        username: &str,
        list_names: &[String],
    ) -> Result<Vec<u64>, MetadataError> {
        self.queries
            .write()
            .await
            .push(RecordedMetadataQuery::FetchWatchList {
                username: username.to_string(),
            });

        if let Some(error) = self.take_error().await {
            return Err(error);
        }

        let lists = self.lists.read().await;
        let entries = lists
            .get(username)
            .ok_or_else(|| MetadataError::NotFound(format!("User {}", username)))?;

        let mut ids = Vec::new();
        for (list, id) in entries {
            if list_names.contains(list) && !ids.contains(id) {
                ids.push(*id);
            }
        }
        Ok(ids)
    }
}

//! Mock searcher for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::release::RawListing;
use crate::searcher::{SearchError, Searcher};

/// Mock implementation of the Searcher trait.
///
/// Provides controllable behavior for testing:
/// - Return configurable listings, globally or per query
/// - Track search queries for assertions
/// - Simulate failures
///
/// # Example
///
/// ```rust,ignore
/// use anidl_core::testing::{MockSearcher, fixtures};
///
/// let searcher = MockSearcher::new();
/// searcher.set_results_for("Sample Show", vec![
///     fixtures::raw_listing("[Erai-raws] Sample Show - 05 [1080p]", 40),
/// ]).await;
///
/// let listings = searcher.search("Sample Show").await?;
/// assert_eq!(listings.len(), 1);
/// assert_eq!(searcher.recorded_searches().await, vec!["Sample Show"]);
/// ```
#[derive(Debug)]
pub struct MockSearcher {
    /// Listings returned for queries without a specific entry.
    results: Arc<RwLock<Vec<RawListing>>>,
    /// Listings by exact query.
    results_by_query: Arc<RwLock<HashMap<String, Vec<RawListing>>>>,
    /// Recorded search queries.
    searches: Arc<RwLock<Vec<String>>>,
    /// If set, the next search will fail with this error.
    next_error: Arc<RwLock<Option<SearchError>>>,
}

impl Default for MockSearcher {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSearcher {
    /// Create a new mock searcher with empty results.
    pub fn new() -> Self {
        Self {
            results: Arc::new(RwLock::new(Vec::new())),
            results_by_query: Arc::new(RwLock::new(HashMap::new())),
            searches: Arc::new(RwLock::new(Vec::new())),
            next_error: Arc::new(RwLock::new(None)),
        }
    }

    /// Set the listings returned for any query without a specific entry.
    pub async fn set_results(&self, results: Vec<RawListing>) {
        *self.results.write().await = results;
    }

    /// Set the listings returned for exactly `query`.
    pub async fn set_results_for(&self, query: &str, results: Vec<RawListing>) {
        self.results_by_query
            .write()
            .await
            .insert(query.to_string(), results);
    }

    /// Get recorded search queries.
    pub async fn recorded_searches(&self) -> Vec<String> {
        self.searches.read().await.clone()
    }

    /// Get the number of searches performed.
    pub async fn search_count(&self) -> usize {
        self.searches.read().await.len()
    }

    /// Configure the next search to fail with the given error.
    pub async fn set_next_error(&self, error: SearchError) {
        *self.next_error.write().await = Some(error);
    }
}

#[async_trait]
impl Searcher for MockSearcher {
    fn name(&self) -> &str {
        "mock"
    }

    async fn search(&self, query: &str) -> Result<Vec<RawListing>, SearchError> {
        self.searches.write().await.push(query.to_string());

        if let Some(error) = self.next_error.write().await.take() {
            return Err(error);
        }

        if let Some(results) = self.results_by_query.read().await.get(query) {
            return Ok(results.clone());
        }
        Ok(self.results.read().await.clone())
    }

    fn feed_url(&self, query: &str) -> String {
        format!("mock://feed?q={}", urlencoding::encode(query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;

    #[tokio::test]
    async fn test_per_query_results_override_default() {
        let searcher = MockSearcher::new();
        searcher
            .set_results(vec![fixtures::raw_listing("default", 1)])
            .await;
        searcher
            .set_results_for("special", vec![fixtures::raw_listing("special one", 2)])
            .await;

        assert_eq!(searcher.search("special").await.unwrap()[0].title, "special one");
        assert_eq!(searcher.search("other").await.unwrap()[0].title, "default");
        assert_eq!(searcher.recorded_searches().await, vec!["special", "other"]);
    }

    #[tokio::test]
    async fn test_next_error() {
        let searcher = MockSearcher::new();
        searcher.set_next_error(SearchError::Timeout).await;
        assert!(matches!(
            searcher.search("x").await,
            Err(SearchError::Timeout)
        ));
        assert!(searcher.search("x").await.unwrap().is_empty());
    }

    #[test]
    fn test_feed_url_encodes_query() {
        let searcher = MockSearcher::new();
        assert_eq!(searcher.feed_url("a \"b\""), "mock://feed?q=a%20%22b%22");
    }
}

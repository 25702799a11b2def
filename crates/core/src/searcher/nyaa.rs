//! Nyaa search backend implementation.
//!
//! Searches go through Nyaa's RSS endpoint, which carries seeder counts in the
//! `nyaa:` extension namespace.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::{SearchError, Searcher};
use crate::config::NyaaConfig;
use crate::metrics::record_external;
use crate::release::RawListing;

/// Nyaa search backend implementation.
pub struct NyaaSearcher {
    client: Client,
    config: NyaaConfig,
}

impl NyaaSearcher {
    /// Create a new NyaaSearcher with the given configuration.
    pub fn new(config: NyaaConfig) -> Result<Self, SearchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()?;

        Ok(Self { client, config })
    }

    fn base_url(&self) -> &str {
        self.config.url.trim_end_matches('/')
    }

    /// RSS URL listing every release for `query`.
    fn rss_url(&self, query: &str) -> String {
        format!(
            "{}/?page=rss&q={}&c={}&f={}",
            self.base_url(),
            urlencoding::encode(query),
            urlencoding::encode(&self.config.category),
            urlencoding::encode(&self.config.filter)
        )
    }

    /// Build the search URL, sorted by seeders.
    fn build_search_url(&self, query: &str) -> String {
        format!("{}&s=seeders&o=desc", self.rss_url(query))
    }

    async fn search_inner(&self, query: &str) -> Result<Vec<RawListing>, SearchError> {
        let url = self.build_search_url(query);
        debug!(query = %query, "Searching Nyaa");

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::ApiError(format!(
                "HTTP {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        let bytes = response.bytes().await?;
        let listings = parse_rss(&bytes, self.config.max_results)?;

        debug!(
            query = %query,
            results = listings.len(),
            "Nyaa search complete"
        );

        Ok(listings)
    }
}

#[async_trait]
impl Searcher for NyaaSearcher {
    fn name(&self) -> &str {
        "nyaa"
    }

    async fn search(&self, query: &str) -> Result<Vec<RawListing>, SearchError> {
        let result = self.search_inner(query).await;
        record_external("nyaa", "search", &result);
        result
    }

    fn feed_url(&self, query: &str) -> String {
        self.rss_url(query)
    }
}

/// Parse a Nyaa RSS document into at most `max_results` listings.
fn parse_rss(bytes: &[u8], max_results: usize) -> Result<Vec<RawListing>, SearchError> {
    let channel = rss::Channel::read_from(bytes)
        .map_err(|e| SearchError::ParseError(format!("Invalid RSS: {}", e)))?;

    let listings = channel
        .items()
        .iter()
        .filter_map(|item: &rss::Item| {
            let title = item.title()?;
            let link = item.link().or_else(|| item.guid().map(|g| g.value()))?;

            let seeders = item
                .extensions()
                .get("nyaa")
                .and_then(|nyaa| nyaa.get("seeders")?.first()?.value())
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(0);

            Some(RawListing::new(title, link, seeders))
        })
        .take(max_results)
        .collect();

    Ok(listings)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RSS: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<rss xmlns:atom="http://www.w3.org/2005/Atom" xmlns:nyaa="https://nyaa.si/xmlns/nyaa" version="2.0">
  <channel>
    <title>Nyaa - "sample show" - Torrent File RSS</title>
    <description>RSS Feed for "sample show"</description>
    <link>https://nyaa.si/</link>
    <item>
      <title>[Erai-raws] Sample Show - 05 [1080p]</title>
      <link>https://nyaa.si/download/1001.torrent</link>
      <guid isPermaLink="true">https://nyaa.si/view/1001</guid>
      <nyaa:seeders>120</nyaa:seeders>
      <nyaa:leechers>4</nyaa:leechers>
      <nyaa:downloads>900</nyaa:downloads>
      <nyaa:categoryId>1_2</nyaa:categoryId>
    </item>
    <item>
      <title>[SubsPlease] Sample Show (01-12) (1080p) [Batch]</title>
      <link>https://nyaa.si/download/1002.torrent</link>
      <guid isPermaLink="true">https://nyaa.si/view/1002</guid>
      <nyaa:seeders>0</nyaa:seeders>
    </item>
    <item>
      <title>Sample Show 480p no seeders field</title>
      <link>https://nyaa.si/download/1003.torrent</link>
    </item>
  </channel>
</rss>"#;

    fn test_config() -> NyaaConfig {
        NyaaConfig {
            url: "https://nyaa.example/".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_rss_reads_seeders() {
        let listings = parse_rss(SAMPLE_RSS.as_bytes(), 75).unwrap();
        assert_eq!(listings.len(), 3);
        assert_eq!(listings[0].title, "[Erai-raws] Sample Show - 05 [1080p]");
        assert_eq!(listings[0].link, "https://nyaa.si/download/1001.torrent");
        assert_eq!(listings[0].seeders, 120);
        assert_eq!(listings[1].seeders, 0);
        assert_eq!(listings[2].seeders, 0);
    }

    #[test]
    fn test_parse_rss_truncates() {
        let listings = parse_rss(SAMPLE_RSS.as_bytes(), 2).unwrap();
        assert_eq!(listings.len(), 2);
    }

    #[test]
    fn test_parse_rss_rejects_garbage() {
        let result = parse_rss(b"not xml at all", 75);
        assert!(matches!(result, Err(SearchError::ParseError(_))));
    }

    #[test]
    fn test_feed_url() {
        let searcher = NyaaSearcher::new(test_config()).unwrap();
        assert_eq!(
            searcher.feed_url("SubsPlease \"Sample Show\" 1080"),
            "https://nyaa.example/?page=rss&q=SubsPlease%20%22Sample%20Show%22%201080&c=1_2&f=0"
        );
    }

    #[test]
    fn test_search_url_sorts_by_seeders() {
        let searcher = NyaaSearcher::new(test_config()).unwrap();
        let url = searcher.build_search_url("Sample Show");
        assert!(url.starts_with("https://nyaa.example/?page=rss&q=Sample%20Show&c=1_2&f=0"));
        assert!(url.ends_with("&s=seeders&o=desc"));
    }
}

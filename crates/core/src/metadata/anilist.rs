//! AniList GraphQL client.
//!
//! AniList allows roughly 90 requests per minute; calls are serialized by the
//! metadata scheduler queue rather than throttled here.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{MetadataError, MetadataProvider};
use crate::config::AniListConfig;
use crate::metrics::record_external;
use crate::tracking::{FuzzyDate, MediaFormat, MediaInfo};

const MEDIA_QUERY: &str = "query ($id: Int) { Media (id: $id, type: ANIME) { id format title { romaji english native } countryOfOrigin startDate { year month day } } }";

const WATCH_LIST_QUERY: &str = "query ($name: String) { MediaListCollection(userName: $name, type: ANIME) { lists { name entries { id mediaId } } } }";

/// AniList API client.
pub struct AniListClient {
    client: Client,
    url: String,
}

impl AniListClient {
    /// Create a new AniList client.
    pub fn new(config: &AniListConfig) -> Result<Self, MetadataError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()?;

        Ok(Self {
            client,
            url: config.url.trim_end_matches('/').to_string(),
        })
    }

    async fn query<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<T, MetadataError> {
        let response = self
            .client
            .post(&self.url)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?;

        let status = response.status();
        if status == 429 {
            return Err(MetadataError::RateLimitExceeded);
        }
        let body = response.text().await?;
        if !status.is_success() && status != 404 {
            return Err(MetadataError::ApiError {
                status: status.as_u16(),
                message: body,
            });
        }

        parse_graphql(&body)
    }

    async fn fetch_media_inner(&self, id: u64) -> Result<MediaInfo, MetadataError> {
        debug!("AniList get media: id={}", id);
        let data: MediaData = self.query(MEDIA_QUERY, json!({ "id": id })).await?;
        data.media
            .ok_or_else(|| MetadataError::NotFound(format!("Media ID {}", id)))?
            .into_media_info()
    }

    async fn fetch_watch_list_inner(
        &self,
        username: &str,
        list_names: &[String],
    ) -> Result<Vec<u64>, MetadataError> {
        debug!("AniList get watch list: user='{}'", username);
        let data: ListCollectionData = self
            .query(WATCH_LIST_QUERY, json!({ "name": username }))
            .await?;
        let collection = data
            .collection
            .ok_or_else(|| MetadataError::NotFound(format!("User {}", username)))?;
        Ok(collection.media_ids(list_names))
    }
}

#[async_trait]
impl MetadataProvider for AniListClient {
    fn name(&self) -> &str {
        "anilist"
    }

    async fn fetch_media(&self, id: u64) -> Result<MediaInfo, MetadataError> {
        let result = self.fetch_media_inner(id).await;
        record_external("anilist", "fetch_media", &result);
        result
    }

    async fn fetch_watch_list(
        &self,
        username: &str,
        list_names: &[String],
    ) -> Result<Vec<u64>, MetadataError> {
        let result = self.fetch_watch_list_inner(username, list_names).await;
        record_external("anilist", "fetch_watch_list", &result);
        result
    }
}

// ============================================================================
// Response types
// ============================================================================

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
    #[serde(default)]
    status: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct MediaData {
    #[serde(rename = "Media")]
    media: Option<MediaNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MediaNode {
    id: u64,
    format: Option<String>,
    title: MediaTitle,
    country_of_origin: Option<String>,
    start_date: Option<FuzzyDate>,
}

#[derive(Debug, Deserialize)]
struct MediaTitle {
    romaji: Option<String>,
    english: Option<String>,
    native: Option<String>,
}

impl MediaNode {
    fn into_media_info(self) -> Result<MediaInfo, MetadataError> {
        let title = self
            .title
            .romaji
            .or(self.title.english)
            .or(self.title.native)
            .ok_or_else(|| MetadataError::ParseError(format!("Media {} has no title", self.id)))?;

        Ok(MediaInfo {
            id: self.id,
            title,
            format: self.format.as_deref().and_then(MediaFormat::parse),
            country_of_origin: self.country_of_origin,
            start_date: self.start_date.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct ListCollectionData {
    #[serde(rename = "MediaListCollection")]
    collection: Option<ListCollection>,
}

#[derive(Debug, Deserialize)]
struct ListCollection {
    #[serde(default)]
    lists: Vec<ListGroup>,
}

#[derive(Debug, Deserialize)]
struct ListGroup {
    name: Option<String>,
    #[serde(default)]
    entries: Vec<ListEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListEntry {
    media_id: u64,
}

impl ListCollection {
    /// Media ids from the named lists, in list order, without duplicates.
    fn media_ids(self, list_names: &[String]) -> Vec<u64> {
        let mut ids = Vec::new();
        for list in self.lists {
            let wanted = list
                .name
                .as_ref()
                .is_some_and(|name| list_names.iter().any(|n| n == name));
            if !wanted {
                continue;
            }
            for entry in list.entries {
                if !ids.contains(&entry.media_id) {
                    ids.push(entry.media_id);
                }
            }
        }
        ids
    }
}

fn parse_graphql<T: DeserializeOwned>(body: &str) -> Result<T, MetadataError> {
    let response: GraphQlResponse<T> = serde_json::from_str(body)
        .map_err(|e| MetadataError::ParseError(format!("Failed to parse response: {}", e)))?;

    if let Some(error) = response.errors.into_iter().next() {
        return Err(match error.status {
            Some(404) => MetadataError::NotFound(error.message),
            Some(429) => MetadataError::RateLimitExceeded,
            status => MetadataError::ApiError {
                status: status.unwrap_or(200),
                message: error.message,
            },
        });
    }

    response
        .data
        .ok_or_else(|| MetadataError::ParseError("Response has no data".to_string()))
}

//! qBittorrent Web API client implementation.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::{multipart, Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::QBittorrentConfig;
use crate::metrics::record_external;

use super::{
    AddTorrentRequest, AddTorrentResult, DownloadRule, TorrentClient, TorrentClientError,
    TorrentFilters, TorrentInfo, TorrentState,
};

/// qBittorrent client implementation.
pub struct QBittorrentClient {
    client: Client,
    config: QBittorrentConfig,
    /// Whether the cookie jar holds a session (cleared on auth failure).
    authenticated: RwLock<bool>,
}

impl QBittorrentClient {
    /// Create a new qBittorrent client.
    pub fn new(config: QBittorrentConfig) -> Result<Self, TorrentClientError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .cookie_store(true)
            .build()?;

        Ok(Self {
            client,
            config,
            authenticated: RwLock::new(false),
        })
    }

    /// Get the base URL without trailing slash.
    fn base_url(&self) -> &str {
        self.config.url.trim_end_matches('/')
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/v2{}", self.base_url(), path)
    }

    /// Login and store session cookie.
    async fn login(&self) -> Result<(), TorrentClientError> {
        let params = [
            ("username", self.config.username.as_str()),
            ("password", self.config.password.as_str()),
        ];

        let response = self
            .client
            .post(self.endpoint("/auth/login"))
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if body.contains("Ok.") {
            debug!("qBittorrent login successful");
            // Session cookie is stored by the cookie jar
            *self.authenticated.write().await = true;
            Ok(())
        } else if body.contains("Fails.") || status == StatusCode::FORBIDDEN {
            Err(TorrentClientError::AuthenticationFailed(
                "Invalid credentials".to_string(),
            ))
        } else {
            Err(TorrentClientError::AuthenticationFailed(format!(
                "Unexpected response: {}",
                body.chars().take(100).collect::<String>()
            )))
        }
    }

    /// Ensure we have a valid session, logging in if needed.
    async fn ensure_authenticated(&self) -> Result<(), TorrentClientError> {
        if *self.authenticated.read().await {
            return Ok(());
        }
        self.login().await
    }

    /// Send an authenticated request, re-authenticating once on 403.
    ///
    /// `build` is called again for the retry, so it must produce the same request.
    async fn send<F>(&self, build: F) -> Result<(StatusCode, String), TorrentClientError>
    where
        F: Fn() -> RequestBuilder,
    {
        self.ensure_authenticated().await?;

        let response = build().send().await?;
        if response.status() == StatusCode::FORBIDDEN {
            // Session expired, retry after login
            warn!("qBittorrent session expired, re-authenticating");
            *self.authenticated.write().await = false;
            self.login().await?;

            return read_response(build().send().await?).await;
        }

        read_response(response).await
    }

    async fn add_feed_inner(&self, url: &str, path: &str) -> Result<(), TorrentClientError> {
        let endpoint = self.endpoint("/rss/addFeed");
        let params = [("url", url), ("path", path)];
        let (status, body) = self
            .send(|| self.client.post(&endpoint).form(&params))
            .await?;

        match status {
            StatusCode::CONFLICT => Err(TorrentClientError::AlreadyExists(format!(
                "feed {}",
                path
            ))),
            s if s.is_success() => Ok(()),
            s => Err(api_error(s, &body)),
        }
    }

    async fn remove_feed_inner(&self, path: &str) -> Result<(), TorrentClientError> {
        let endpoint = self.endpoint("/rss/removeItem");
        let params = [("path", path)];
        let (status, body) = self
            .send(|| self.client.post(&endpoint).form(&params))
            .await?;

        match status {
            StatusCode::CONFLICT => Err(TorrentClientError::NotFound(format!("feed {}", path))),
            s if s.is_success() => Ok(()),
            s => Err(api_error(s, &body)),
        }
    }

    async fn set_rule_inner(
        &self,
        name: &str,
        rule: &DownloadRule,
    ) -> Result<(), TorrentClientError> {
        let rule_def = serde_json::to_string(rule)
            .map_err(|e| TorrentClientError::ApiError(format!("Failed to encode rule: {}", e)))?;
        let endpoint = self.endpoint("/rss/setRule");
        let params = [("ruleName", name), ("ruleDef", rule_def.as_str())];
        let (status, body) = self
            .send(|| self.client.post(&endpoint).form(&params))
            .await?;

        match status {
            StatusCode::CONFLICT => Err(TorrentClientError::AlreadyExists(format!(
                "rule {}",
                name
            ))),
            s if s.is_success() => Ok(()),
            s => Err(api_error(s, &body)),
        }
    }

    async fn add_torrent_inner(
        &self,
        request: AddTorrentRequest,
    ) -> Result<AddTorrentResult, TorrentClientError> {
        let endpoint = self.endpoint("/torrents/add");
        let save_path = request
            .save_path
            .clone()
            .unwrap_or_else(|| self.config.download_path.clone());

        let build_form = || {
            let mut form = multipart::Form::new()
                .text("urls", request.url.clone())
                .text("savepath", save_path.clone());
            if let Some(category) = &request.category {
                form = form.text("category", category.clone());
            }
            form
        };

        let (status, body) = self
            .send(|| self.client.post(&endpoint).multipart(build_form()))
            .await?;

        if status == StatusCode::UNSUPPORTED_MEDIA_TYPE {
            return Err(TorrentClientError::InvalidTorrent(request.url));
        }
        if !status.is_success() {
            return Err(api_error(status, &body));
        }
        if body.contains("Fails.") {
            return Err(TorrentClientError::ApiError(format!(
                "Torrent rejected: {}",
                request.url
            )));
        }

        Ok(AddTorrentResult {
            hash: extract_hash_from_magnet(&request.url),
        })
    }

    async fn list_torrents_inner(
        &self,
        filters: &TorrentFilters,
    ) -> Result<Vec<TorrentInfo>, TorrentClientError> {
        let mut endpoint = self.endpoint("/torrents/info");
        let mut query_parts = Vec::new();

        if let Some(filter) = filters.state.and_then(state_filter) {
            query_parts.push(format!("filter={}", filter));
        }
        if let Some(category) = &filters.category {
            query_parts.push(format!("category={}", urlencoding::encode(category)));
        }
        if !query_parts.is_empty() {
            endpoint.push('?');
            endpoint.push_str(&query_parts.join("&"));
        }

        let (status, body) = self.send(|| self.client.get(&endpoint)).await?;
        if !status.is_success() {
            return Err(api_error(status, &body));
        }

        let torrents: Vec<QBTorrentInfo> = serde_json::from_str(&body)
            .map_err(|e| TorrentClientError::ApiError(format!("Failed to parse response: {}", e)))?;

        Ok(torrents.into_iter().map(|t| t.into_torrent_info()).collect())
    }
}

async fn read_response(response: Response) -> Result<(StatusCode, String), TorrentClientError> {
    let status = response.status();
    let body = response.text().await?;
    Ok((status, body))
}

fn api_error(status: StatusCode, body: &str) -> TorrentClientError {
    TorrentClientError::ApiError(format!(
        "HTTP {}: {}",
        status,
        body.chars().take(200).collect::<String>()
    ))
}

/// qBittorrent list filter for a state, if the API has one.
fn state_filter(state: TorrentState) -> Option<&'static str> {
    match state {
        TorrentState::Downloading => Some("downloading"),
        TorrentState::Seeding => Some("seeding"),
        TorrentState::Paused => Some("paused"),
        TorrentState::Stalled => Some("stalled_downloading"),
        TorrentState::Checking => Some("checking"),
        TorrentState::Error => Some("errored"),
        TorrentState::Queued | TorrentState::Unknown => None,
    }
}

/// qBittorrent torrent info response.
#[derive(Debug, Deserialize)]
struct QBTorrentInfo {
    hash: String,
    name: String,
    state: String,
    #[serde(default)]
    progress: f64,
    #[serde(default)]
    size: i64,
    #[serde(default)]
    num_seeds: i64,
    #[serde(default)]
    added_on: i64,
    #[serde(default)]
    save_path: String,
    #[serde(default)]
    category: String,
}

impl QBTorrentInfo {
    fn into_torrent_info(self) -> TorrentInfo {
        TorrentInfo {
            hash: self.hash.to_lowercase(),
            name: self.name,
            state: parse_qb_state(&self.state),
            progress: self.progress,
            size_bytes: self.size.max(0) as u64,
            seeders: self.num_seeds.max(0) as u32,
            added_at: timestamp_to_datetime(self.added_on),
            save_path: (!self.save_path.is_empty()).then_some(self.save_path),
            category: (!self.category.is_empty()).then_some(self.category),
        }
    }
}

/// Parse qBittorrent state string to TorrentState.
fn parse_qb_state(state: &str) -> TorrentState {
    match state {
        "downloading" | "forcedDL" | "metaDL" | "forcedMetaDL" | "allocating" => {
            TorrentState::Downloading
        }
        "uploading" | "forcedUP" | "stalledUP" => TorrentState::Seeding,
        "pausedDL" | "pausedUP" | "stoppedDL" | "stoppedUP" => TorrentState::Paused,
        "checkingDL" | "checkingUP" | "checkingResumeData" | "moving" => TorrentState::Checking,
        "queuedDL" | "queuedUP" => TorrentState::Queued,
        "stalledDL" => TorrentState::Stalled,
        "error" | "missingFiles" => TorrentState::Error,
        _ => TorrentState::Unknown,
    }
}

/// Convert Unix timestamp to DateTime<Utc>.
fn timestamp_to_datetime(ts: i64) -> Option<DateTime<Utc>> {
    if ts > 0 {
        Utc.timestamp_opt(ts, 0).single()
    } else {
        None
    }
}

/// Extract info hash from a magnet URI.
fn extract_hash_from_magnet(magnet: &str) -> Option<String> {
    let (_, query) = magnet.strip_prefix("magnet:")?.split_once('?')?;
    query
        .split('&')
        .find_map(|param| param.strip_prefix("xt=urn:btih:"))
        .map(|hash| hash.to_lowercase())
}

#[async_trait]
impl TorrentClient for QBittorrentClient {
    fn name(&self) -> &str {
        "qbittorrent"
    }

    async fn add_feed(&self, url: &str, path: &str) -> Result<(), TorrentClientError> {
        let result = self.add_feed_inner(url, path).await;
        record_external("qbittorrent", "add_feed", &result);
        result
    }

    async fn remove_feed(&self, path: &str) -> Result<(), TorrentClientError> {
        let result = self.remove_feed_inner(path).await;
        record_external("qbittorrent", "remove_feed", &result);
        result
    }

    async fn set_rule(&self, name: &str, rule: &DownloadRule) -> Result<(), TorrentClientError> {
        let result = self.set_rule_inner(name, rule).await;
        record_external("qbittorrent", "set_rule", &result);
        result
    }

    async fn add_torrent(
        &self,
        request: AddTorrentRequest,
    ) -> Result<AddTorrentResult, TorrentClientError> {
        let result = self.add_torrent_inner(request).await;
        record_external("qbittorrent", "add_torrent", &result);
        result
    }

    async fn list_torrents(
        &self,
        filters: &TorrentFilters,
    ) -> Result<Vec<TorrentInfo>, TorrentClientError> {
        let result = self.list_torrents_inner(filters).await;
        record_external("qbittorrent", "list_torrents", &result);
        result
    }
}

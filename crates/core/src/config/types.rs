use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::orchestrator::DownloaderConfig;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub log_format: LogFormat,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub anilist: AniListConfig,
    #[serde(default)]
    pub nyaa: NyaaConfig,
    pub qbittorrent: QBittorrentConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub downloader: DownloaderConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Job scheduler configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchedulerConfig {
    /// Delay between consecutive jobs of the same queue, in milliseconds
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_delay_ms(),
        }
    }
}

fn default_delay_ms() -> u64 {
    10_000
}

/// AniList metadata provider configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AniListConfig {
    /// GraphQL endpoint
    #[serde(default = "default_anilist_url")]
    pub url: String,
    /// Names of the user lists to track
    #[serde(default = "default_lists")]
    pub lists: Vec<String>,
    /// Users tracked from startup
    #[serde(default)]
    pub users: Vec<String>,
    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
}

impl Default for AniListConfig {
    fn default() -> Self {
        Self {
            url: default_anilist_url(),
            lists: default_lists(),
            users: Vec::new(),
            timeout_secs: default_timeout(),
        }
    }
}

fn default_anilist_url() -> String {
    "https://graphql.anilist.co".to_string()
}

fn default_lists() -> Vec<String> {
    vec!["Watching".to_string(), "APS-Request".to_string()]
}

/// Nyaa search backend configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NyaaConfig {
    /// Nyaa base URL (e.g., "https://nyaa.si")
    #[serde(default = "default_nyaa_url")]
    pub url: String,
    /// Category filter ("1_2" = Anime, English-translated)
    #[serde(default = "default_nyaa_category")]
    pub category: String,
    /// Nyaa filter ("0" = no filter)
    #[serde(default = "default_nyaa_filter")]
    pub filter: String,
    /// Maximum results kept per search
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
}

impl Default for NyaaConfig {
    fn default() -> Self {
        Self {
            url: default_nyaa_url(),
            category: default_nyaa_category(),
            filter: default_nyaa_filter(),
            max_results: default_max_results(),
            timeout_secs: default_timeout(),
        }
    }
}

fn default_nyaa_url() -> String {
    "https://nyaa.si".to_string()
}

fn default_nyaa_category() -> String {
    "1_2".to_string()
}

fn default_nyaa_filter() -> String {
    "0".to_string()
}

fn default_max_results() -> usize {
    75
}

/// qBittorrent download client configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QBittorrentConfig {
    /// Web UI URL (e.g., "http://localhost:8080")
    pub url: String,
    pub username: String,
    pub password: String,
    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
    /// Base directory downloads are saved under
    #[serde(default = "default_download_path")]
    pub download_path: String,
    /// Category assigned to added torrents and rules
    #[serde(default = "default_category")]
    pub category: String,
}

fn default_download_path() -> String {
    "/downloads/".to_string()
}

fn default_category() -> String {
    "Anime".to_string()
}

fn default_timeout() -> u32 {
    30
}

/// Release matching configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MatchingConfig {
    /// Release groups in order of preference. "ANY" ranks every unlisted group.
    #[serde(default = "default_group_preference")]
    pub group_preference: Vec<String>,
    /// Search and rank releases; when false a plain feed is added per title
    #[serde(default = "default_strict")]
    pub strict: bool,
    /// Group used for feeds when strict matching is off
    #[serde(default = "default_fallback_group")]
    pub fallback_group: String,
    /// Quality token used for feeds when strict matching is off
    #[serde(default = "default_fallback_quality")]
    pub fallback_quality: String,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            group_preference: default_group_preference(),
            strict: default_strict(),
            fallback_group: default_fallback_group(),
            fallback_quality: default_fallback_quality(),
        }
    }
}

fn default_group_preference() -> Vec<String> {
    vec!["ANY".to_string()]
}

fn default_strict() -> bool {
    true
}

fn default_fallback_group() -> String {
    "HorribleSubs".to_string()
}

fn default_fallback_quality() -> String {
    "1080".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("anidl.db")
}

/// Metrics export configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MetricsConfig {
    /// Write the Prometheus text exposition here after every update cycle
    #[serde(default)]
    pub textfile_path: Option<PathBuf>,
}

/// Sanitized config for logging (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub log_format: LogFormat,
    pub scheduler: SchedulerConfig,
    pub anilist: AniListConfig,
    pub nyaa: NyaaConfig,
    pub qbittorrent: SanitizedQBittorrentConfig,
    pub matching: MatchingConfig,
    pub downloader: DownloaderConfig,
    pub database: DatabaseConfig,
    pub metrics: MetricsConfig,
}

/// Sanitized qBittorrent config (password hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedQBittorrentConfig {
    pub url: String,
    pub username: String,
    pub password_configured: bool,
    pub timeout_secs: u32,
    pub download_path: String,
    pub category: String,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        let qb = &config.qbittorrent;
        Self {
            log_format: config.log_format,
            scheduler: config.scheduler.clone(),
            anilist: config.anilist.clone(),
            nyaa: config.nyaa.clone(),
            qbittorrent: SanitizedQBittorrentConfig {
                url: qb.url.clone(),
                username: qb.username.clone(),
                password_configured: !qb.password.is_empty(),
                timeout_secs: qb.timeout_secs,
                download_path: qb.download_path.clone(),
                category: qb.category.clone(),
            },
            matching: config.matching.clone(),
            downloader: config.downloader.clone(),
            database: config.database.clone(),
            metrics: config.metrics.clone(),
        }
    }
}

//! Auto-downloader configuration.

use serde::{Deserialize, Serialize};

use crate::config::{Config, MatchingConfig};

/// Configuration for the watch-list auto-downloader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloaderConfig {
    /// Country codes whose titles are never set up (e.g., "CN").
    /// Matched against the metadata provider's country of origin.
    #[serde(default)]
    pub blacklisted_origins: Vec<String>,

    /// Listings whose title contains any of these words are excluded
    /// from download rules (joined into the rule's must-not-contain).
    #[serde(default)]
    pub blacklisted_title_words: Vec<String>,

    /// Hours that must pass after the start date before a title is set up.
    /// Zero sets up anything whose start date is in the past.
    #[serde(default)]
    pub required_airing_hours: u64,

    /// How often the daemon refreshes watch lists (seconds).
    #[serde(default = "default_update_interval")]
    pub update_interval_secs: u64,
}

fn default_update_interval() -> u64 {
    3600 // 1 hour
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            blacklisted_origins: Vec::new(),
            blacklisted_title_words: Vec::new(),
            required_airing_hours: 0,
            update_interval_secs: default_update_interval(),
        }
    }
}

/// Everything the auto-downloader reads from the root configuration.
#[derive(Debug, Clone)]
pub struct DownloaderSettings {
    pub downloader: DownloaderConfig,
    pub matching: MatchingConfig,
    /// Watch-list names fetched for every user.
    pub lists: Vec<String>,
    /// Base directory downloads are saved under.
    pub download_path: String,
    /// Category assigned to rules and torrents.
    pub category: String,
}

impl From<&Config> for DownloaderSettings {
    fn from(config: &Config) -> Self {
        Self {
            downloader: config.downloader.clone(),
            matching: config.matching.clone(),
            lists: config.anilist.lists.clone(),
            download_path: config.qbittorrent.download_path.clone(),
            category: config.qbittorrent.category.clone(),
        }
    }
}

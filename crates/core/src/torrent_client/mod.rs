//! Download client abstraction.
//!
//! This module provides a `TorrentClient` trait for subscribing to RSS feeds,
//! managing auto-download rules and adding torrents, with a qBittorrent backend.

mod qbittorrent;
mod types;

pub use qbittorrent::QBittorrentClient;
pub use types::*;

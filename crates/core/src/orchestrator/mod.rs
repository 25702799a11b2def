//! Watch-list auto-downloader.
//!
//! Turns the items on tracked users' watch lists into download-client RSS
//! rules (or direct downloads for batches), then watches for stalled
//! downloads. All outbound work is paced through the job scheduler:
//! - **Metadata queue**: watch lists and per-item metadata
//! - **Search queue**: release searches, setup and stall checks

mod config;
mod rules;
mod runner;
mod types;

pub use config::{DownloaderConfig, DownloaderSettings};
pub use rules::{feed_query, folder_name, must_not_contain, sanitize_path_component, save_path};
pub use runner::AutoDownloader;
pub use types::{OrchestratorError, ResolutionEntries, SetupOutcome};

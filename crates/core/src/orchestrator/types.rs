//! Types for the auto-downloader.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::release::RawListing;

/// Errors that can occur during orchestration.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Watch item not tracked.
    #[error("watch item not found: {0}")]
    NotFound(u64),

    /// Item lacks data the operation needs.
    #[error("missing data for watch item {id}: {what}")]
    MissingData { id: u64, what: &'static str },

    /// Metadata provider error.
    #[error("metadata provider error: {0}")]
    Metadata(#[from] crate::metadata::MetadataError),

    /// Searcher error.
    #[error("searcher error: {0}")]
    Searcher(#[from] crate::searcher::SearchError),

    /// Download client error.
    #[error("torrent client error: {0}")]
    TorrentClient(#[from] crate::torrent_client::TorrentClientError),

    /// A queued job ended without reporting back.
    #[error("queued job was dropped before completing")]
    JobDropped,
}

/// What a single auto-download setup attempt did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SetupOutcome {
    /// Item was set up before; nothing to do.
    AlreadySetup,
    /// Item is blacklisted and never downloaded.
    Blacklisted,
    /// Start date not fully announced yet.
    AwaitingStartDate,
    /// Not aired long enough; retried on a later cycle.
    Deferred { until: DateTime<Utc> },
    /// Feed and rule added from the manual query.
    Manual { accepted: bool },
    /// Feed and strict rule added for the best episodic release.
    Feed { accepted: bool },
    /// Best release was a batch and was added directly.
    Batch { accepted: bool },
    /// Feed and rule added without searching.
    Fallback { accepted: bool },
    /// Search produced nothing usable.
    NoResults,
}

impl SetupOutcome {
    /// Whether the item is now set up.
    pub fn is_setup(&self) -> bool {
        match self {
            SetupOutcome::AlreadySetup | SetupOutcome::Blacklisted => true,
            SetupOutcome::Manual { accepted }
            | SetupOutcome::Feed { accepted }
            | SetupOutcome::Batch { accepted }
            | SetupOutcome::Fallback { accepted } => *accepted,
            SetupOutcome::AwaitingStartDate
            | SetupOutcome::Deferred { .. }
            | SetupOutcome::NoResults => false,
        }
    }

    /// Label for the setup outcome counter, if the attempt did any work.
    pub(crate) fn metric_label(&self) -> Option<&'static str> {
        match self {
            SetupOutcome::AlreadySetup
            | SetupOutcome::Blacklisted
            | SetupOutcome::AwaitingStartDate => None,
            SetupOutcome::Deferred { .. } => Some("deferred"),
            SetupOutcome::NoResults => Some("no_results"),
            SetupOutcome::Manual { accepted: true } => Some("manual"),
            SetupOutcome::Feed { accepted: true } => Some("feed"),
            SetupOutcome::Batch { accepted: true } => Some("batch"),
            SetupOutcome::Fallback { accepted: true } => Some("fallback"),
            _ => Some("rejected"),
        }
    }
}

/// Candidates offered to the user for resolving an item by hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionEntries {
    /// The query that was searched.
    pub search_term: String,
    /// Listings with at least one seeder.
    pub results: Vec<RawListing>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_outcome_is_setup() {
        assert!(SetupOutcome::AlreadySetup.is_setup());
        assert!(SetupOutcome::Blacklisted.is_setup());
        assert!(SetupOutcome::Feed { accepted: true }.is_setup());
        assert!(!SetupOutcome::Batch { accepted: false }.is_setup());
        assert!(!SetupOutcome::NoResults.is_setup());
        assert!(!SetupOutcome::Deferred { until: Utc::now() }.is_setup());
    }

    #[test]
    fn test_setup_outcome_metric_label() {
        assert_eq!(SetupOutcome::AlreadySetup.metric_label(), None);
        assert_eq!(SetupOutcome::Blacklisted.metric_label(), None);
        assert_eq!(
            SetupOutcome::Manual { accepted: true }.metric_label(),
            Some("manual")
        );
        assert_eq!(
            SetupOutcome::Fallback { accepted: false }.metric_label(),
            Some("rejected")
        );
        assert_eq!(SetupOutcome::NoResults.metric_label(), Some("no_results"));
    }

    #[test]
    fn test_setup_outcome_serialization() {
        let json = serde_json::to_string(&SetupOutcome::Feed { accepted: true }).unwrap();
        assert_eq!(json, r#"{"type":"feed","accepted":true}"#);
    }

    #[test]
    fn test_resolution_entries_serialization() {
        let entries = ResolutionEntries {
            search_term: "Sample Show".to_string(),
            results: vec![RawListing::new("[G] Sample Show - 01 [720p]", "link", 3)],
        };
        let json = serde_json::to_value(&entries).unwrap();
        assert_eq!(json["search_term"], "Sample Show");
        assert_eq!(json["results"][0]["seeders"], 3);
    }
}

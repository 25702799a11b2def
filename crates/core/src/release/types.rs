//! Types shared by the release parser and ranker.

use serde::{Deserialize, Serialize};

/// Episode number recorded for listings that could not be matched strictly.
pub const BATCH_EPISODE: i32 = -1;

/// One raw listing as returned by a feed or search provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawListing {
    /// Free-text listing title.
    pub title: String,
    /// Torrent link or other download identifier.
    pub link: String,
    /// Seeders reported by the provider.
    pub seeders: u32,
}

impl RawListing {
    pub fn new(title: impl Into<String>, link: impl Into<String>, seeders: u32) -> Self {
        Self {
            title: title.into(),
            link: link.into(),
            seeders,
        }
    }
}

/// Structured view of a single listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingRecord {
    /// Torrent link or other download identifier.
    pub link: String,
    /// Release group, empty when the listing carries none.
    pub group: String,
    /// The unmodified listing title.
    pub original_title: String,
    /// Parsed (or normalized) title.
    pub title: String,
    /// Two-digit episode number, or [`BATCH_EPISODE`].
    pub episode: i32,
    /// Quality score, higher is better.
    pub quality: u32,
    /// Whether the listing is assumed to bundle several episodes.
    pub is_batch: bool,
    /// Seeders reported by the provider.
    pub seeders: u32,
}

/// The winner of a ranking pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestCandidate {
    pub record: ListingRecord,
    /// The winner has no seeders, so a download is likely to stall.
    pub stall_risk: bool,
}

impl BestCandidate {
    pub fn new(record: ListingRecord) -> Self {
        let stall_risk = record.seeders == 0;
        Self { record, stall_risk }
    }
}

/// Outcome of a ranking pass: the winner, or `None` for an empty candidate set.
pub type RankingResult = Option<BestCandidate>;

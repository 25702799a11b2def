use std::cmp::Ordering;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Mutex, PoisonError};

use tracing::{debug, warn};

use crate::metrics::RANKING_OUTCOMES;

use super::parser::parse_listing;
use super::types::{BestCandidate, ListingRecord, RankingResult, RawListing};

static NEXT_PREFERENCE_VERSION: AtomicU64 = AtomicU64::new(1);

fn next_preference_version() -> u64 {
    NEXT_PREFERENCE_VERSION.fetch_add(1, AtomicOrdering::Relaxed)
}

/// Ordered list of preferred release groups.
///
/// Every list gets a process-unique version, bumped on replacement, so caches
/// derived from the list can tell when they are stale.
#[derive(Debug, Clone)]
pub struct GroupPreference {
    groups: Vec<String>,
    version: u64,
}

impl GroupPreference {
    /// Entry standing in for every group not named explicitly.
    pub const WILDCARD: &'static str = "ANY";

    pub fn new(groups: Vec<String>) -> Self {
        Self {
            groups,
            version: next_preference_version(),
        }
    }

    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Replace the list contents.
    pub fn replace(&mut self, groups: Vec<String>) {
        self.groups = groups;
        self.version = next_preference_version();
    }

    /// Index of `group` in the list.
    pub fn position(&self, group: &str) -> Option<usize> {
        self.groups.iter().position(|g| g == group)
    }
}

/// Memoized rank for groups missing from a preference list.
///
/// Computed on first use as the index of [`GroupPreference::WILDCARD`] and
/// keyed by the list version; a lookup with a different version recomputes.
#[derive(Debug, Default)]
pub struct DefaultRankCache {
    slot: Mutex<Option<(u64, Option<usize>)>>,
}

impl DefaultRankCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default rank for `preference`, `None` when the list has no wildcard.
    pub fn get(&self, preference: &GroupPreference) -> Option<usize> {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        match *slot {
            Some((version, rank)) if version == preference.version() => rank,
            _ => {
                let rank = preference.position(GroupPreference::WILDCARD);
                *slot = Some((preference.version(), rank));
                rank
            }
        }
    }

    /// Version the cached value was computed for, if any.
    pub fn cached_version(&self) -> Option<u64> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .map(|(version, _)| version)
    }
}

/// Distance between the canonical title and a candidate title.
///
/// The primary term is the absolute difference in character length of the
/// lower-cased titles. When the lengths match exactly, every differing
/// character position adds `1 / length`, which separates titles that only
/// differ in a season number.
pub fn title_closeness(canonical: &str, candidate: &str) -> f64 {
    let canonical: Vec<char> = canonical.to_lowercase().chars().collect();
    let candidate: Vec<char> = candidate.to_lowercase().chars().collect();

    let mut error = canonical.len().abs_diff(candidate.len()) as f64;
    if error == 0.0 && !canonical.is_empty() {
        let per_char = 1.0 / canonical.len() as f64;
        let differing = canonical
            .iter()
            .zip(candidate.iter())
            .filter(|(a, b)| a != b)
            .count();
        error += differing as f64 * per_char;
    }
    error
}

/// A record with its precomputed sort keys.
struct Scored {
    group_rank: usize,
    closeness: f64,
    record: ListingRecord,
}

/// Picks the best release for a title using a fixed sequence of tie-breaks:
/// group preference, title closeness, quality, batch over single episode,
/// then seeders.
#[derive(Debug)]
pub struct CandidateRanker {
    preference: GroupPreference,
    default_rank: DefaultRankCache,
}

impl CandidateRanker {
    pub fn new(preference: GroupPreference) -> Self {
        Self {
            preference,
            default_rank: DefaultRankCache::new(),
        }
    }

    pub fn preference(&self) -> &GroupPreference {
        &self.preference
    }

    /// Swap the preference list. The default rank is recomputed on next use.
    pub fn set_preference(&mut self, groups: Vec<String>) {
        self.preference.replace(groups);
    }

    /// Rank of a group; lower is better.
    ///
    /// Groups absent from the list share the wildcard rank. Without a
    /// wildcard they sort after every listed group.
    fn group_rank(&self, group: &str) -> usize {
        self.preference
            .position(group)
            .or_else(|| self.default_rank.get(&self.preference))
            .unwrap_or(usize::MAX)
    }

    fn compare(lhs: &Scored, rhs: &Scored) -> Ordering {
        lhs.group_rank
            .cmp(&rhs.group_rank)
            .then_with(|| lhs.closeness.total_cmp(&rhs.closeness))
            .then_with(|| rhs.record.quality.cmp(&lhs.record.quality))
            .then_with(|| rhs.record.is_batch.cmp(&lhs.record.is_batch))
            .then_with(|| rhs.record.seeders.cmp(&lhs.record.seeders))
    }

    /// Sort already-parsed records best first.
    pub fn rank_records(
        &self,
        canonical_title: &str,
        records: Vec<ListingRecord>,
    ) -> Vec<ListingRecord> {
        let mut scored: Vec<Scored> = records
            .into_iter()
            .map(|record| Scored {
                group_rank: self.group_rank(&record.group),
                closeness: title_closeness(canonical_title, &record.title),
                record,
            })
            .collect();

        scored.sort_by(Self::compare);
        scored.into_iter().map(|s| s.record).collect()
    }

    /// Parse and sort raw listings best first. Listings that fail to parse are dropped.
    pub fn rank_all(&self, canonical_title: &str, listings: &[RawListing]) -> Vec<ListingRecord> {
        let records = listings
            .iter()
            .filter_map(|l| parse_listing(&l.link, &l.title, l.seeders))
            .collect();
        self.rank_records(canonical_title, records)
    }

    /// Choose the single best listing for `canonical_title`.
    ///
    /// Returns `None` when nothing usable remains after parsing.
    pub fn resolve_best_candidate(
        &self,
        canonical_title: &str,
        listings: &[RawListing],
    ) -> RankingResult {
        let Some(best) = self.rank_all(canonical_title, listings).into_iter().next() else {
            debug!(title = canonical_title, "No usable listings to rank");
            RANKING_OUTCOMES.with_label_values(&["empty"]).inc();
            return None;
        };

        let best = BestCandidate::new(best);
        if best.stall_risk {
            warn!(
                title = canonical_title,
                listing = %best.record.original_title,
                "Best listing has no seeders, download may stall"
            );
            RANKING_OUTCOMES.with_label_values(&["zero_seeders"]).inc();
        } else {
            RANKING_OUTCOMES.with_label_values(&["picked"]).inc();
        }

        debug!(
            title = canonical_title,
            group = %best.record.group,
            listing = %best.record.title,
            batch = best.record.is_batch,
            quality = best.record.quality,
            "Picked best listing"
        );
        Some(best)
    }
}

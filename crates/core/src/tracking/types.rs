//! Tracking state types.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Media format as reported by the metadata provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MediaFormat {
    Tv,
    TvShort,
    Movie,
    Special,
    Ova,
    Ona,
    Music,
}

impl MediaFormat {
    /// Returns the provider's string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaFormat::Tv => "TV",
            MediaFormat::TvShort => "TV_SHORT",
            MediaFormat::Movie => "MOVIE",
            MediaFormat::Special => "SPECIAL",
            MediaFormat::Ova => "OVA",
            MediaFormat::Ona => "ONA",
            MediaFormat::Music => "MUSIC",
        }
    }

    /// Parse the provider's string representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "TV" => Some(MediaFormat::Tv),
            "TV_SHORT" => Some(MediaFormat::TvShort),
            "MOVIE" => Some(MediaFormat::Movie),
            "SPECIAL" => Some(MediaFormat::Special),
            "OVA" => Some(MediaFormat::Ova),
            "ONA" => Some(MediaFormat::Ona),
            "MUSIC" => Some(MediaFormat::Music),
            _ => None,
        }
    }
}

/// A date whose parts may be individually unknown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuzzyDate {
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub day: Option<u32>,
}

impl FuzzyDate {
    pub fn new(year: i32, month: u32, day: u32) -> Self {
        Self {
            year: Some(year),
            month: Some(month),
            day: Some(day),
        }
    }

    /// Whether year, month and day are all known.
    pub fn is_confirmed(&self) -> bool {
        self.year.is_some() && self.month.is_some() && self.day.is_some()
    }

    /// The calendar date, if every part is known and valid.
    pub fn to_naive_date(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year?, self.month?, self.day?)
    }
}

/// Tracking record for one watch-list item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchItem {
    /// Metadata provider identifier.
    pub id: u64,
    /// Canonical title, unknown until metadata is fetched.
    pub title: Option<String>,
    pub format: Option<MediaFormat>,
    /// First air date.
    pub start_date: Option<FuzzyDate>,
    /// Manual search query overriding ranking.
    pub manual: Option<String>,
    /// All auto-download steps completed; the item is not revisited.
    pub is_setup: bool,
    /// The last search produced nothing usable.
    pub no_results: bool,
    /// Excluded from downloading. Always implies `is_setup`.
    pub is_blacklisted: bool,
    /// Substring looked for in the download client's stalled torrents.
    pub observe: Option<String>,
    /// A matching torrent was seen stalled.
    pub is_stalled: bool,
    /// When the item becomes eligible for download, if deferred.
    pub download_time: Option<DateTime<Utc>>,
}

impl WatchItem {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            title: None,
            format: None,
            start_date: None,
            manual: None,
            is_setup: false,
            no_results: false,
            is_blacklisted: false,
            observe: None,
            is_stalled: false,
            download_time: None,
        }
    }

    /// Title for logging, falling back to the id.
    pub fn display_title(&self) -> String {
        self.title
            .clone()
            .unwrap_or_else(|| format!("#{}", self.id))
    }

    pub fn is_start_date_confirmed(&self) -> bool {
        self.start_date.is_some_and(|d| d.is_confirmed())
    }

    /// Title, format and a confirmed start date are all known.
    pub fn is_all_data_loaded(&self) -> bool {
        self.title.is_some() && self.format.is_some() && self.is_start_date_confirmed()
    }

    /// Item still needs an auto-download attempt.
    pub fn needs_setup(&self) -> bool {
        !self.is_setup && !self.is_blacklisted && self.is_all_data_loaded()
    }

    pub fn is_movie(&self) -> bool {
        self.format == Some(MediaFormat::Movie)
    }

    /// All auto-download steps succeeded.
    pub fn mark_setup(&mut self) {
        self.is_setup = true;
        self.no_results = false;
        self.is_stalled = false;
    }

    /// Never download this item.
    pub fn blacklist(&mut self) {
        self.is_blacklisted = true;
        self.is_setup = true;
    }

    /// Use `rule` as the search query on the next attempt.
    pub fn set_manual_rule(&mut self, rule: &str) {
        let rule = rule.trim();
        self.manual = (!rule.is_empty()).then(|| rule.to_string());
        // Blacklisted items stay set up.
        self.is_setup = self.is_blacklisted;
        self.no_results = false;
    }

    /// Return to the default, untried state. The blacklist flag survives.
    pub fn reset(&mut self) {
        self.is_setup = self.is_blacklisted;
        self.no_results = false;
        self.manual = None;
        self.observe = None;
        self.is_stalled = false;
    }

    /// Stop auto-downloading and wait for user input.
    pub fn resolve(&mut self) {
        self.is_setup = true;
        self.no_results = true;
        self.manual = None;
        self.observe = None;
        self.is_stalled = false;
    }
}

/// A metadata provider user whose lists are tracked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedUser {
    pub username: String,
    pub last_updated: Option<DateTime<Utc>>,
}

impl TrackedUser {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            last_updated: None,
        }
    }
}

/// Metadata for one item as returned by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub id: u64,
    pub title: String,
    pub format: Option<MediaFormat>,
    pub country_of_origin: Option<String>,
    pub start_date: FuzzyDate,
}

/// Complete tracking state, as persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackingSnapshot {
    pub items: Vec<WatchItem>,
    pub users: Vec<TrackedUser>,
    pub last_updated: Option<DateTime<Utc>>,
}

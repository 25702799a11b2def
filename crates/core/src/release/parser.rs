use once_cell::sync::Lazy;
use regex_lite::Regex;

use super::normalize::normalize_title;
use super::quality::score_quality;
use super::types::{ListingRecord, BATCH_EPISODE};

/// `[group] title - NN [quality]` or `[group] title - SxxENN (quality)`.
static STRICT_LISTING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\[(.+?)\]\s+(.+?)\s+-\s+(?:S\d\dE)?(\d\d)\s+[\[\(](.+?)[\]\)]").unwrap()
});

static LEADING_GROUP: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\[(.+?)\]").unwrap());

/// Parse one raw listing into a structured record.
///
/// Listings following the common single-episode convention are parsed
/// strictly. Anything else is assumed to be a batch release: the title is
/// normalized and the whole string is scored for quality.
///
/// Returns `None` for blank titles, which carry nothing to match against.
pub fn parse_listing(link: &str, raw_title: &str, seeders: u32) -> Option<ListingRecord> {
    if raw_title.trim().is_empty() {
        return None;
    }

    if let Some(caps) = STRICT_LISTING.captures(raw_title) {
        let episode = caps[3].parse::<i32>().ok()?;
        return Some(ListingRecord {
            link: link.to_string(),
            group: caps[1].to_string(),
            original_title: raw_title.to_string(),
            title: caps[2].to_string(),
            episode,
            quality: score_quality(&caps[4]),
            is_batch: false,
            seeders,
        });
    }

    let group = LEADING_GROUP
        .captures(raw_title)
        .map(|caps| caps[1].to_string())
        .unwrap_or_default();

    Some(ListingRecord {
        link: link.to_string(),
        group,
        original_title: raw_title.to_string(),
        title: normalize_title(raw_title),
        episode: BATCH_EPISODE,
        quality: score_quality(raw_title),
        is_batch: true,
        seeders,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strict_episode_listing() {
        let record = parse_listing("link", "[Erai-raws] Sample Show - 05 [1080p]", 12).unwrap();
        assert_eq!(record.group, "Erai-raws");
        assert_eq!(record.title, "Sample Show");
        assert_eq!(record.episode, 5);
        assert_eq!(record.quality, 1080);
        assert!(!record.is_batch);
        assert_eq!(record.seeders, 12);
        assert_eq!(record.link, "link");
        assert_eq!(record.original_title, "[Erai-raws] Sample Show - 05 [1080p]");
    }

    #[test]
    fn test_strict_season_episode_listing() {
        let record =
            parse_listing("l", "[SubsPlease] Other Show - S02E11 (720p) [ABCD1234].mkv", 3)
                .unwrap();
        assert_eq!(record.group, "SubsPlease");
        assert_eq!(record.title, "Other Show");
        assert_eq!(record.episode, 11);
        assert_eq!(record.quality, 720);
        assert!(!record.is_batch);
    }

    #[test]
    fn test_strict_is_case_insensitive() {
        let record = parse_listing("l", "[grp] Show - s01e03 [BD 1080p]", 0).unwrap();
        assert_eq!(record.episode, 3);
        assert_eq!(record.quality, 11_080);
        assert!(!record.is_batch);
    }

    #[test]
    fn test_fallback_batch_listing() {
        let record =
            parse_listing("l", "[Judas] Sample Show (Season 1) [BD 1080p][HEVC][Batch]", 40)
                .unwrap();
        assert_eq!(record.group, "Judas");
        assert_eq!(record.title, "Sample Show");
        assert_eq!(record.episode, BATCH_EPISODE);
        assert_eq!(record.quality, 11_080);
        assert!(record.is_batch);
    }

    #[test]
    fn test_fallback_without_group() {
        let record = parse_listing("l", "Sample Show 01-12 720p.mkv", 1).unwrap();
        assert_eq!(record.group, "");
        assert_eq!(record.title, "Sample Show  720p");
        assert_eq!(record.quality, 720);
        assert!(record.is_batch);
        assert_eq!(record.episode, -1);
    }

    #[test]
    fn test_single_digit_episode_is_not_strict() {
        let record = parse_listing("l", "[G] Show - 5 [1080p]", 1).unwrap();
        assert!(record.is_batch);
        assert_eq!(record.episode, BATCH_EPISODE);
    }

    #[test]
    fn test_blank_title_is_a_miss() {
        assert!(parse_listing("l", "", 1).is_none());
        assert!(parse_listing("l", "   ", 1).is_none());
    }
}

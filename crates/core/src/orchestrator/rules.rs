//! Helpers for building feed queries, download rules and save paths.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeDelta, TimeZone, Utc};

/// Make `name` safe to use as a single path component on any platform.
pub fn sanitize_path_component(name: &str) -> String {
    sanitize_filename::sanitize(name)
}

/// Feed path and folder name for a title. Falls back to the media id when
/// nothing of the title survives sanitizing.
pub fn folder_name(title: &str, id: u64) -> String {
    let name = sanitize_path_component(title);
    if name.trim().is_empty() {
        id.to_string()
    } else {
        name
    }
}

/// Directory a title is downloaded into. `folder` must already be sanitized.
pub fn save_path(download_path: &str, folder: &str, is_movie: bool) -> String {
    let kind = if is_movie { "Anime Movie" } else { "Anime" };
    format!("{}/{}/{}", download_path.trim_end_matches('/'), kind, folder)
}

/// Feed search query from its space-separated parts. Empty parts are skipped.
pub fn feed_query(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Wrap a title in quotes so the search matches it as a phrase.
pub fn quoted(title: &str) -> String {
    format!("\"{}\"", title)
}

/// Regex accepting only episodes of exactly `title`, e.g. `[Group] Title - 05`.
pub fn strict_must_contain(title: &str) -> String {
    escape_parens(&format!(r"\] {} -", title))
}

fn escape_parens(pattern: &str) -> String {
    pattern.replace('(', r"\(").replace(')', r"\)")
}

/// Alternation of words a rule must reject. Strict rules also reject batches.
pub fn must_not_contain(blacklisted_words: &[String], strict: bool) -> String {
    let mut words: Vec<&str> = blacklisted_words.iter().map(String::as_str).collect();
    if strict {
        words.push("batch");
    }
    words.join("|")
}

/// Keep at most the first three words of a search term.
pub fn shorten_search_term(term: &str) -> &str {
    match term.match_indices(' ').nth(2) {
        Some((idx, _)) if idx > 0 => &term[..idx],
        _ => term,
    }
}

/// When an item starting on `start_date` may be set up.
///
/// Episodes often appear the evening before the announced date, so the clock
/// starts at midnight UTC of the previous day.
pub fn eligible_at(start_date: NaiveDate, required_airing_hours: u64) -> DateTime<Utc> {
    let day_before = start_date.pred_opt().unwrap_or(start_date);
    let midnight = Utc.from_utc_datetime(&day_before.and_time(NaiveTime::MIN));
    i64::try_from(required_airing_hours)
        .ok()
        .and_then(TimeDelta::try_hours)
        .and_then(|delay| midnight.checked_add_signed(delay))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

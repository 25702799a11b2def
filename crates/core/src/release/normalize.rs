use once_cell::sync::Lazy;
use regex_lite::Regex;

static PARENTHESIZED: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(.+?\)").unwrap());
static BRACKETED: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[.+?\]").unwrap());
static BATCH_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)batch").unwrap());
static EPISODE_RANGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d\d-\d\d").unwrap());
static EXTENSION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\..{3}$").unwrap());

/// Strip noise tokens from a raw listing title to approximate the canonical title.
///
/// Steps run in a fixed order: underscores become spaces, then parenthesized
/// groups, bracketed groups, the word "batch", `NN-NN` episode ranges and a
/// trailing three character extension are removed, and the result is trimmed.
pub fn normalize_title(raw: &str) -> String {
    let cleaned = raw.replace('_', " ");
    let cleaned = PARENTHESIZED.replace_all(&cleaned, "");
    let cleaned = BRACKETED.replace_all(&cleaned, "");
    let cleaned = BATCH_WORD.replace_all(&cleaned, "");
    let cleaned = EPISODE_RANGE.replace_all(&cleaned, "");
    let cleaned = EXTENSION.replace(&cleaned, "");
    cleaned.trim().to_string()
}

/// Replace every character that is not an ASCII letter, digit or whitespace
/// with a space. Search providers choke on punctuation in titles.
pub fn relaxed_title(title: &str) -> String {
    title
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_groups_and_extension() {
        assert_eq!(
            normalize_title("[SubGroup] Some_Show (2019) [1080p].mkv"),
            "Some Show"
        );
    }

    #[test]
    fn test_normalize_removes_batch_and_range() {
        assert_eq!(
            normalize_title("[Group] Another Show 01-12 BATCH [720p]"),
            "Another Show"
        );
        assert_eq!(normalize_title("Another Show (Batch)"), "Another Show");
    }

    #[test]
    fn test_normalize_keeps_plain_title() {
        assert_eq!(normalize_title("  Plain Title  "), "Plain Title");
    }

    #[test]
    fn test_normalize_extension_only_at_end() {
        // A dot in the middle is left alone
        assert_eq!(normalize_title("Dr. Stone"), "Dr. Stone");
        assert_eq!(normalize_title("Dr. Stone.mp4"), "Dr. Stone");
    }

    #[test]
    fn test_relaxed_title() {
        assert_eq!(relaxed_title("Re:Zero - Season 2!"), "Re Zero   Season 2 ");
        assert_eq!(relaxed_title("Haikyuu!! TO THE TOP"), "Haikyuu   TO THE TOP");
    }
}

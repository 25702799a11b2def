/// Bonus for Blu-ray sourced releases. Larger than any resolution bonus so
/// every Blu-ray release outranks every other release.
const BLURAY_BONUS: u32 = 10_000;

/// Resolution tokens in priority order; only the first match counts.
const RESOLUTIONS: [u32; 3] = [1080, 720, 480];

/// Score free-text quality tokens.
pub fn score_quality(text: &str) -> u32 {
    let mut quality = 0;

    if text.contains("BD") || text.contains("BluRay") {
        quality += BLURAY_BONUS;
    }

    if let Some(resolution) = RESOLUTIONS
        .iter()
        .find(|r| text.contains(r.to_string().as_str()))
    {
        quality += resolution;
    }

    quality
}

/// Resolution part of a quality score, `None` when no resolution was detected.
pub fn resolution_of(quality: u32) -> Option<u32> {
    match quality % BLURAY_BONUS {
        0 => None,
        r => Some(r),
    }
}

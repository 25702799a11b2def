use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - At least one watch list name is configured
/// - Service URLs are http(s)
/// - Nyaa result limit is not 0
/// - Group preference entries are not blank
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.anilist.lists.is_empty() {
        return Err(ConfigError::ValidationError(
            "anilist.lists cannot be empty".to_string(),
        ));
    }

    for (name, url) in [
        ("anilist.url", &config.anilist.url),
        ("nyaa.url", &config.nyaa.url),
        ("qbittorrent.url", &config.qbittorrent.url),
    ] {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::ValidationError(format!(
                "{} must be an http(s) URL, got {:?}",
                name, url
            )));
        }
    }

    if config.nyaa.max_results == 0 {
        return Err(ConfigError::ValidationError(
            "nyaa.max_results cannot be 0".to_string(),
        ));
    }

    if config
        .matching
        .group_preference
        .iter()
        .any(|g| g.trim().is_empty())
    {
        return Err(ConfigError::ValidationError(
            "matching.group_preference cannot contain blank entries".to_string(),
        ));
    }

    if config.qbittorrent.download_path.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "qbittorrent.download_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Search budget and per-source result cap are positive
/// - Size ranges are non-negative
/// - Proxy URL parses
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    // Server validation
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    // Engine validation
    if config.engine.effective_timeout_secs() == 0 {
        return Err(ConfigError::ValidationError(
            "engine timeout leaves no time to search".to_string(),
        ));
    }
    if config.engine.max_results == 0 {
        return Err(ConfigError::ValidationError(
            "engine.max_results must be at least 1".to_string(),
        ));
    }

    // Filter validation
    let ranges = [
        ("filters.size", &config.filters.size),
        ("filters.movies", &config.filters.movies),
        ("filters.seasons", &config.filters.seasons),
        ("filters.episodes", &config.filters.episodes),
    ];
    for (name, range) in ranges {
        if range.min_gb < 0.0 || range.max_gb < 0.0 {
            return Err(ConfigError::ValidationError(format!(
                "{} cannot be negative",
                name
            )));
        }
    }

    // Fetch validation
    if config.fetch.timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "fetch.timeout_secs cannot be 0".to_string(),
        ));
    }
    if let Some(proxy) = config.fetch.proxy_url.as_deref().filter(|p| !p.is_empty()) {
        url::Url::parse(proxy).map_err(|e| {
            ConfigError::ValidationError(format!("fetch.proxy_url is invalid: {}", e))
        })?;
    }

    Ok(())
}

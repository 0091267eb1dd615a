use super::{types::Config, ConfigError};

/// Validate configuration.
/// Currently validates:
/// - Poll interval is non-zero
/// - Download path is non-empty
/// - Journal capacity is non-zero
/// - External extraction timeout is non-zero
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.manager.poll_interval_ms == 0 {
        return Err(ConfigError::ValidationError(
            "manager.poll_interval_ms cannot be 0".to_string(),
        ));
    }

    if config.manager.journal_capacity == 0 {
        return Err(ConfigError::ValidationError(
            "manager.journal_capacity cannot be 0".to_string(),
        ));
    }

    if config.engine.download_path.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "engine.download_path cannot be empty".to_string(),
        ));
    }

    if config.extractor.external_timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "extractor.external_timeout_secs cannot be 0".to_string(),
        ));
    }

    Ok(())
}

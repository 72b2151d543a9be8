//! Configuration loading and validation.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::BirdlensConfig;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Load configuration from a YAML file.
pub fn load_config(path: &Path) -> Result<BirdlensConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: BirdlensConfig = serde_yaml::from_str(&content)?;
    validate_config(&config)?;
    Ok(config)
}

/// Load configuration, falling back to defaults when the file does not exist.
pub fn load_config_or_default(path: &Path) -> Result<BirdlensConfig, ConfigError> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        return Ok(BirdlensConfig::default());
    }
    load_config(path)
}

fn validate_config(config: &BirdlensConfig) -> Result<(), ConfigError> {
    if config.api.host.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "api.host must not be empty".to_string(),
        ));
    }

    if config.api.timeout_secs == 0 {
        return Err(ConfigError::Invalid(
            "api.timeout_secs must be > 0".to_string(),
        ));
    }

    if config.api.max_pages_fallback == 0 {
        return Err(ConfigError::Invalid(
            "api.max_pages_fallback must be > 0".to_string(),
        ));
    }

    if config.planner.model.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "planner.model must not be empty".to_string(),
        ));
    }

    Ok(())
}

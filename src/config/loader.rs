//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::params::set_default_params;
use crate::config::schema::CommConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Why a configuration document was rejected.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

/// Parse and validate a configuration document.
pub fn parse_config(content: &str) -> Result<CommConfig, ConfigError> {
    let config: CommConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<CommConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config = parse_config(&content)?;

    tracing::debug!(path = ?path, "Configuration loaded");
    Ok(config)
}

/// Load a configuration file and install its `[connection]` section as the
/// library-wide connection defaults.
pub fn load_and_apply(path: &Path) -> Result<CommConfig, ConfigError> {
    let config = load_config(path)?;
    set_default_params(&config.connection);
    Ok(config)
}

//! Configuration parsing and validation for powerwardd
//!
//! Supports TOML configuration with:
//! - Versioned schema
//! - Managed-host connection descriptor, with environment overrides for credentials
//! - Daily operating window in a named timezone
//! - Retry and shutdown policies
//! - Validation with clear error messages

mod schema;
mod settings;
mod validation;

pub use schema::*;
pub use settings::*;
pub use validation::*;

use std::path::Path;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation failed: {errors:?}")]
    ValidationFailed { errors: Vec<ValidationError> },

    #[error("Unsupported config version: {0}")]
    UnsupportedVersion(u32),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Current supported config version
pub const CURRENT_CONFIG_VERSION: u32 = 1;

/// Load and validate configuration from a TOML file, with environment overrides
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<Settings> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate configuration from a TOML string, with environment overrides
pub fn parse_config(content: &str) -> ConfigResult<Settings> {
    parse_config_with_env(content, |var| std::env::var(var).ok())
}

/// Parse and validate configuration, reading overrides through `lookup`
pub fn parse_config_with_env(
    content: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> ConfigResult<Settings> {
    let mut raw: RawConfig = toml::from_str(content)?;

    if raw.config_version != CURRENT_CONFIG_VERSION {
        return Err(ConfigError::UnsupportedVersion(raw.config_version));
    }

    apply_env_overrides(&mut raw, lookup);

    let errors = validate_config(&raw);
    if !errors.is_empty() {
        return Err(ConfigError::ValidationFailed { errors });
    }

    // Validation guarantees every required field converts
    Settings::from_raw(raw).ok_or(ConfigError::ValidationFailed { errors: Vec::new() })
}

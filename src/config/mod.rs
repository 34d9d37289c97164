//! Configuration loading and management.
//!
//! This module is split into logical submodules:
//! - [`types`]: config struct definitions (Config and its sections)
//! - [`defaults`]: default values for optional fields
//! - [`validation`]: startup validation collecting every error at once

mod defaults;
mod types;
mod validation;

pub use types::{
    AsrConfig, BlobConfig, BrokerConfig, ClassifierConfig, Config, CoordConfig, DatabaseConfig,
    EmailConfig, LogFormat, SearchConfig, ServerConfig, UpstreamConfig,
};
pub use validation::{ValidationError, validate};

use std::path::Path;
use thiserror::Error;

/// Errors from loading a config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

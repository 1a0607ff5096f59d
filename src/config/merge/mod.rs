//! Merge policy: defaults first, later sources override earlier ones.

pub mod service;

use super::FsConfig;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError};

/// Builder seeded with the serialized defaults, so every key has a value.
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let defaults = Config::try_from(&FsConfig::default())?;
    Ok(Config::builder().add_source(defaults))
}

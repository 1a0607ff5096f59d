//! MergeService: orchestrates sources, applies merge policy, deserializes to FsConfig.

use crate::config::sources::{environment, file};
use crate::config::FsConfig;
use config::ConfigError;
use std::path::Path;

use super::builder_with_defaults;

/// Merge service for config composition.
pub struct MergeService;

impl MergeService {
    /// Load config from the optional user file and the environment.
    /// Precedence: defaults (lowest) -> user file -> environment (highest).
    pub fn load(user_file: Option<&Path>) -> Result<FsConfig, ConfigError> {
        let builder = builder_with_defaults()?;
        let builder = match user_file {
            Some(path) => file::add_to_builder(builder, path, false)?,
            None => builder,
        };
        let builder = environment::add_to_builder(builder)?;

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Load config from a specific file with environment overlay.
    pub fn load_from_file(path: &Path) -> Result<FsConfig, ConfigError> {
        let builder = builder_with_defaults()?;
        let builder = file::add_to_builder(builder, path, true)?;
        let builder = environment::add_to_builder(builder)?;

        let config = builder.build()?;
        config.try_deserialize()
    }
}

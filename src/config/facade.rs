//! ConfigLoader facade delegating to merge service.

use super::merge::service::MergeService;
use super::FsConfig;
use config::ConfigError;
use std::path::{Path, PathBuf};

/// Configuration loader facade.
pub struct ConfigLoader;

impl ConfigLoader {
    /// User config file path (`<config dir>/revfs/config.toml`), if the platform has one.
    pub fn user_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "revfs", "revfs")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load configuration from the user config file and environment.
    pub fn load() -> Result<FsConfig, ConfigError> {
        MergeService::load(Self::user_config_path().as_deref())
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> Result<FsConfig, ConfigError> {
        MergeService::load_from_file(path)
    }

    /// Create default configuration.
    pub fn default() -> FsConfig {
        FsConfig::default()
    }
}

//! Configuration
//!
//! Settings are layered: built-in defaults, then the user config file
//! (`<config dir>/revfs/config.toml`) or an explicit file, then `REVFS_*`
//! environment variables with `__` separating nested keys
//! (`REVFS_CACHE__PAGES=128`).

pub mod facade;
pub mod merge;
pub mod sources;

use crate::atomic::{AtomicInit, InitOnce};
use crate::cache::CacheGeometry;
use crate::error::InitError;
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::OnceLock;

pub use facade::ConfigLoader;

/// Node revision cache keys are blake3 digests of the node id.
pub const NODE_CACHE_KEY_LEN: usize = 32;

/// Node revision cache settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache immutable node revisions read through the filesystem (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Maximum number of pages
    #[serde(default = "default_pages")]
    pub pages: usize,

    /// Node revisions per page
    #[serde(default = "default_entries_per_page")]
    pub entries_per_page: usize,
}

fn default_true() -> bool {
    true
}

fn default_pages() -> usize {
    64
}

fn default_entries_per_page() -> usize {
    16
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            pages: default_pages(),
            entries_per_page: default_entries_per_page(),
        }
    }
}

impl CacheConfig {
    pub fn geometry(&self) -> CacheGeometry {
        CacheGeometry {
            key_len: NODE_CACHE_KEY_LEN,
            pages: self.pages,
            entries_per_page: self.entries_per_page,
        }
    }
}

/// Which backing store to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    #[default]
    Sled,
}

/// Storage settings
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// Repository directory for the sled backend
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Root configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FsConfig {
    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

static GLOBAL_INIT: InitOnce = AtomicInit::new();
static GLOBAL: OnceLock<FsConfig> = OnceLock::new();

/// Process-wide configuration, loaded from the standard sources on first use.
///
/// A load failure is remembered and returned to every later caller.
pub fn global() -> Result<&'static FsConfig, InitError> {
    GLOBAL_INIT.init_once(|| {
        let config = ConfigLoader::load().map_err(|e| InitError::Config(e.to_string()))?;
        let _ = GLOBAL.set(config);
        Ok(())
    })?;
    GLOBAL
        .get()
        .ok_or_else(|| InitError::Failed("global configuration was not recorded".to_string()))
}

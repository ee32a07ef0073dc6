//! Configuration surface.

use serde::Serialize;
use std::path::{Path, PathBuf};

/// Default cache directory name, relative to the working directory.
pub const DEFAULT_CACHE_DIR: &str = ".cosmorun_cache";

const DEFAULT_MAX_ENTRIES: u64 = 1000;
const DEFAULT_MAX_SIZE_BYTES: u64 = 100 * 1024 * 1024;
const DEFAULT_TIMEOUT_SECONDS: u64 = 3600;

#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub enabled: bool,
    /// 0 means unlimited, for symmetry with `max_size_bytes`.
    pub max_entries: u64,
    /// 0 means unlimited.
    pub max_size_bytes: u64,
    /// 0 means no age-based eviction.
    pub timeout_seconds: u64,
    #[serde(skip)]
    pub cache_root: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            enabled: true,
            max_entries: DEFAULT_MAX_ENTRIES,
            max_size_bytes: DEFAULT_MAX_SIZE_BYTES,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            cache_root: PathBuf::from(DEFAULT_CACHE_DIR),
        }
    }
}

impl Config {
    pub fn with_cache_root(root: impl Into<PathBuf>) -> Self {
        Config {
            cache_root: root.into(),
            ..Default::default()
        }
    }

    pub fn objects_dir(&self) -> PathBuf {
        self.cache_root.join("objects")
    }

    pub fn index_path(&self) -> PathBuf {
        self.cache_root.join("index.db")
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }
}

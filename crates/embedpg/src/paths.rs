//! Resolves the directories one instance works in.

use std::env::consts::EXE_SUFFIX;
use std::path::{Path, PathBuf};

use embedpg_config::Config;

use crate::cache::CacheEntry;

const DEFAULT_RUNTIME_DIR: &str = "extracted";
const DEFAULT_DATA_DIR: &str = "data";

/// Cache entry plus runtime, data and binaries directories for one instance.
///
/// Unset directories default relative to the cache entry: the runtime
/// directory is `<cache dir>/extracted`, data lives in `<runtime>/data` and
/// binaries are extracted straight into the runtime directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPaths {
    cache_entry: CacheEntry,
    runtime: PathBuf,
    data: PathBuf,
    binaries: PathBuf,
}

impl ResolvedPaths {
    /// Applies configured overrides on top of the defaults.
    #[must_use]
    pub fn resolve(config: &Config, cache_entry: CacheEntry) -> Self {
        let runtime = config.runtime_path().map_or_else(
            || {
                cache_entry
                    .path()
                    .parent()
                    .unwrap_or_else(|| Path::new("."))
                    .join(DEFAULT_RUNTIME_DIR)
            },
            Path::to_path_buf,
        );
        let data = config
            .data_path()
            .map_or_else(|| runtime.join(DEFAULT_DATA_DIR), Path::to_path_buf);
        let binaries = config
            .binaries_path()
            .map_or_else(|| runtime.clone(), Path::to_path_buf);
        Self {
            cache_entry,
            runtime,
            data,
            binaries,
        }
    }

    /// Cached archive location.
    #[must_use]
    pub const fn cache_entry(&self) -> &CacheEntry {
        &self.cache_entry
    }

    /// Scratch directory recreated on every start.
    #[must_use]
    pub fn runtime_dir(&self) -> &Path {
        &self.runtime
    }

    /// Cluster data directory.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data
    }

    /// Directory holding `bin/`.
    #[must_use]
    pub fn binaries_dir(&self) -> &Path {
        &self.binaries
    }
}

/// Path of engine executable `name` under `binaries/bin`.
pub(crate) fn executable(binaries: &Path, name: &str) -> PathBuf {
    binaries.join("bin").join(format!("{name}{EXE_SUFFIX}"))
}

//! Locates downloaded binary bundles in the on-disk cache.

use std::path::{Path, PathBuf};

use embedpg_config::PostgresVersion;

use crate::platform::Platform;

const ARTIFACT_PREFIX: &str = "embedded-postgres-binaries";

/// Identifies one bundle: engine version plus host platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    version: PostgresVersion,
    platform: Platform,
}

impl CacheKey {
    /// Creates a key for `version` on `platform`.
    #[must_use]
    pub const fn new(version: PostgresVersion, platform: Platform) -> Self {
        Self { version, platform }
    }

    /// Key for `version` on the running host.
    #[must_use]
    pub fn for_host(version: PostgresVersion) -> Self {
        Self::new(version, Platform::current())
    }

    /// Engine version.
    #[must_use]
    pub const fn version(&self) -> &PostgresVersion {
        &self.version
    }

    /// Target platform.
    #[must_use]
    pub const fn platform(&self) -> &Platform {
        &self.platform
    }

    /// Maven artifact identifier, e.g. `embedded-postgres-binaries-linux-amd64`.
    #[must_use]
    pub fn artifact_id(&self) -> String {
        format!("{ARTIFACT_PREFIX}-{}", self.platform)
    }

    /// File name of the cached archive.
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{}-{}.txz", self.artifact_id(), self.version)
    }
}

/// Root directory of the bundle cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheLocator {
    directory: PathBuf,
}

impl CacheLocator {
    /// Uses `directory` as the cache root.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    /// Cache root.
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Cache entry for `key`.
    #[must_use]
    pub fn entry(&self, key: &CacheKey) -> CacheEntry {
        CacheEntry::new(self.directory.join(key.file_name()))
    }
}

/// Location of one cached archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    path: PathBuf,
}

impl CacheEntry {
    /// Wraps an explicit archive path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Archive path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a regular file is present at the archive path.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.metadata().is_ok_and(|metadata| metadata.is_file())
    }
}

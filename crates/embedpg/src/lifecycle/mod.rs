//! Composes the lifecycle steps into `start` and `stop`.

mod builder;
mod instance;

pub use builder::EmbeddedPostgresBuilder;
pub use instance::EmbeddedPostgres;

use std::sync::Arc;

use embedpg_config::Config;
use tracing::info;

use crate::PostgresError;
use crate::acquire::{AcquisitionLock, BinaryAcquirer};
use crate::cache::{CacheEntry, CacheKey, CacheLocator};
use crate::extract::TarXzExtractor;
use crate::fetch::MavenFetcher;

/// Target used for lifecycle telemetry.
pub const LIFECYCLE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::lifecycle");

/// Downloads the configured bundle into the cache without starting anything.
///
/// Returns the cache entry, which holds a complete archive on success.
///
/// # Errors
///
/// Returns [`PostgresError::AcquisitionFailed`] when the download fails.
pub fn warm_cache(config: &Config) -> Result<CacheEntry, PostgresError> {
    let key = CacheKey::for_host(config.version());
    let entry = CacheLocator::new(config.cache_path()).entry(&key);
    let acquirer = BinaryAcquirer::new(
        Arc::new(MavenFetcher::new(config.binary_repository_url())),
        Arc::new(TarXzExtractor),
        AcquisitionLock::process_wide(),
    );
    let downloaded = acquirer.warm(&key, &entry)?;
    info!(
        target: LIFECYCLE_TARGET,
        cache = %entry.path().display(),
        downloaded,
        "binary cache warmed"
    );
    Ok(entry)
}

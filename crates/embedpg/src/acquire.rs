//! Serialises binary acquisition across every instance in the process.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use once_cell::sync::Lazy;
use tracing::{debug, info};

use crate::cache::{CacheEntry, CacheKey};
use crate::error::AcquisitionError;
use crate::extract::Extract;
use crate::fetch::{ACQUIRE_TARGET, RemoteFetch};

static PROCESS_LOCK: Lazy<AcquisitionLock> = Lazy::new(AcquisitionLock::new);

/// Mutual exclusion for the check-fetch-extract sequence.
///
/// Every instance in a process shares [`AcquisitionLock::process_wide`].
/// Tests can hand out private locks to keep unrelated cases independent.
#[derive(Debug, Clone, Default)]
pub struct AcquisitionLock(Arc<Mutex<()>>);

impl AcquisitionLock {
    /// Creates a lock not shared with anyone else.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock shared by the whole process.
    #[must_use]
    pub fn process_wide() -> Self {
        PROCESS_LOCK.clone()
    }

    /// Whether both handles guard the same critical section.
    #[must_use]
    pub fn shares_with(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    fn hold(&self) -> MutexGuard<'_, ()> {
        // Guarded state lives on disk; poisoning carries no information.
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// How the binaries directory came to be populated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquisition {
    /// `bin` was already present; nothing was touched.
    AlreadyExtracted,
    /// The cached archive was extracted.
    ExtractedFromCache,
    /// The archive was downloaded, cached, then extracted.
    Downloaded,
}

/// Ensures engine binaries are present in a binaries directory.
#[derive(Clone)]
pub struct BinaryAcquirer {
    fetcher: Arc<dyn RemoteFetch>,
    extractor: Arc<dyn Extract>,
    lock: AcquisitionLock,
}

impl BinaryAcquirer {
    /// Combines the collaborators used for acquisition.
    #[must_use]
    pub fn new(
        fetcher: Arc<dyn RemoteFetch>,
        extractor: Arc<dyn Extract>,
        lock: AcquisitionLock,
    ) -> Self {
        Self {
            fetcher,
            extractor,
            lock,
        }
    }

    /// Lock this acquirer serialises on.
    #[must_use]
    pub const fn lock(&self) -> &AcquisitionLock {
        &self.lock
    }

    /// Makes `<binaries>/bin` exist, fetching and extracting as needed.
    ///
    /// The existence checks and all side effects happen while the lock is
    /// held.
    ///
    /// # Errors
    ///
    /// Propagates fetch or extraction failures.
    pub fn acquire(
        &self,
        key: &CacheKey,
        entry: &CacheEntry,
        binaries: &Path,
    ) -> Result<Acquisition, AcquisitionError> {
        let _guard = self.lock.hold();
        if binaries.join("bin").exists() {
            debug!(
                target: ACQUIRE_TARGET,
                binaries = %binaries.display(),
                "binaries already extracted"
            );
            return Ok(Acquisition::AlreadyExtracted);
        }
        let outcome = if entry.exists() {
            Acquisition::ExtractedFromCache
        } else {
            info!(
                target: ACQUIRE_TARGET,
                version = %key.version(),
                platform = %key.platform(),
                "binary archive not cached"
            );
            self.fetcher.fetch(key, entry)?;
            Acquisition::Downloaded
        };
        self.extractor.extract(entry.path(), binaries)?;
        Ok(outcome)
    }

    /// Downloads the archive for `key` unless it is already cached.
    ///
    /// Returns `true` when a download happened.
    ///
    /// # Errors
    ///
    /// Propagates fetch failures.
    pub fn warm(&self, key: &CacheKey, entry: &CacheEntry) -> Result<bool, AcquisitionError> {
        let _guard = self.lock.hold();
        if entry.exists() {
            return Ok(false);
        }
        self.fetcher.fetch(key, entry)?;
        Ok(true)
    }
}

impl std::fmt::Debug for BinaryAcquirer {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("BinaryAcquirer")
            .field("lock", &self.lock)
            .finish_non_exhaustive()
    }
}

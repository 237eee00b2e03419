//! Downloads binary bundles from a Maven repository into the cache.

use std::fs;
use std::io::{self, Cursor, Write};
use std::path::Path;
use std::thread;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::Client;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::cache::{CacheEntry, CacheKey};
use crate::error::AcquisitionError;

/// Target used for acquisition telemetry.
pub const ACQUIRE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::acquire");

const GROUP_PATH: &str = "io/zonky/test/postgres";
const BUNDLE_SUFFIX: &str = ".txz";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(600);
const MAX_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_millis(500);

/// Retrieves the archive for a key and stores it at a cache entry.
pub trait RemoteFetch: Send + Sync {
    /// Downloads the bundle for `key` into `entry`.
    ///
    /// On success the entry holds a complete archive. On failure nothing
    /// is left at the entry path.
    ///
    /// # Errors
    ///
    /// Returns an [`AcquisitionError`] describing why the bundle is missing.
    fn fetch(&self, key: &CacheKey, entry: &CacheEntry) -> Result<(), AcquisitionError>;
}

/// Fetches `embedded-postgres-binaries` jars over HTTP.
#[derive(Debug, Clone)]
pub struct MavenFetcher {
    client: Client,
    repository: String,
}

impl MavenFetcher {
    /// Creates a fetcher rooted at `repository`, e.g. `https://repo1.maven.org/maven2`.
    pub fn new(repository: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        let repository = repository.into().trim_end_matches('/').to_owned();
        Self { client, repository }
    }

    /// Full URL of the jar for `key`.
    #[must_use]
    pub fn artifact_url(&self, key: &CacheKey) -> String {
        let artifact = key.artifact_id();
        let version = key.version();
        format!(
            "{}/{GROUP_PATH}/{artifact}/{version}/{artifact}-{version}.jar",
            self.repository
        )
    }

    fn download_with_retry(&self, key: &CacheKey, url: &str) -> Result<Vec<u8>, AcquisitionError> {
        let mut attempt = 1;
        loop {
            match self.download(key, url) {
                Ok(content) => return Ok(content),
                Err(error @ AcquisitionError::VersionNotFound { .. }) => return Err(error),
                Err(error) if attempt >= MAX_ATTEMPTS => return Err(error),
                Err(error) => {
                    warn!(
                        target: ACQUIRE_TARGET,
                        attempt,
                        url,
                        error = %error,
                        "download attempt failed, retrying"
                    );
                    attempt += 1;
                    thread::sleep(RETRY_DELAY);
                }
            }
        }
    }

    fn download(&self, key: &CacheKey, url: &str) -> Result<Vec<u8>, AcquisitionError> {
        let response = self.client.get(url).send().map_err(|source| AcquisitionError::Http {
            url: url.to_owned(),
            source,
        })?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(AcquisitionError::VersionNotFound {
                version: key.version().to_string(),
                url: url.to_owned(),
            });
        }
        if !status.is_success() {
            return Err(AcquisitionError::HttpStatus {
                url: url.to_owned(),
                status: status.as_u16(),
            });
        }
        let bytes = response.bytes().map_err(|source| AcquisitionError::Http {
            url: url.to_owned(),
            source,
        })?;
        Ok(bytes.to_vec())
    }

    /// Published digest next to the jar, if the repository serves one.
    fn published_checksum(&self, url: &str) -> Option<String> {
        let checksum_url = format!("{url}.sha256");
        let response = self.client.get(&checksum_url).send().ok()?;
        if !response.status().is_success() {
            debug!(target: ACQUIRE_TARGET, url = %checksum_url, "no published checksum");
            return None;
        }
        let body = response.text().ok()?;
        parse_checksum(&body)
    }
}

impl RemoteFetch for MavenFetcher {
    fn fetch(&self, key: &CacheKey, entry: &CacheEntry) -> Result<(), AcquisitionError> {
        let url = self.artifact_url(key);
        info!(
            target: ACQUIRE_TARGET,
            url = %url,
            cache = %entry.path().display(),
            "downloading engine binaries"
        );
        let jar = self.download_with_retry(key, &url)?;
        verify_checksum(&url, &jar, self.published_checksum(&url).as_deref())?;
        store_bundle(&url, &jar, entry)?;
        info!(
            target: ACQUIRE_TARGET,
            bytes = jar.len(),
            cache = %entry.path().display(),
            "engine binaries cached"
        );
        Ok(())
    }
}

/// First whitespace-separated token of a `.sha256` file, lowercased.
pub(crate) fn parse_checksum(body: &str) -> Option<String> {
    body.split_whitespace()
        .next()
        .filter(|digest| digest.len() == 64 && digest.chars().all(|ch| ch.is_ascii_hexdigit()))
        .map(str::to_ascii_lowercase)
}

pub(crate) fn verify_checksum(
    url: &str,
    content: &[u8],
    expected: Option<&str>,
) -> Result<(), AcquisitionError> {
    let Some(expected) = expected else {
        return Ok(());
    };
    let actual = hex::encode(Sha256::digest(content));
    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(AcquisitionError::ChecksumMismatch {
            url: url.to_owned(),
            expected: expected.to_owned(),
            actual,
        })
    }
}

/// Copies the `.txz` member of `jar` to `entry` via a sibling temp file.
pub(crate) fn store_bundle(url: &str, jar: &[u8], entry: &CacheEntry) -> Result<(), AcquisitionError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(jar)).map_err(|source| {
        AcquisitionError::Jar {
            url: url.to_owned(),
            source,
        }
    })?;
    let index = (0..archive.len())
        .find(|index| {
            archive
                .name_for_index(*index)
                .is_some_and(|name| name.ends_with(BUNDLE_SUFFIX))
        })
        .ok_or_else(|| AcquisitionError::MissingBundle {
            url: url.to_owned(),
        })?;
    let mut bundle = archive.by_index(index).map_err(|source| AcquisitionError::Jar {
        url: url.to_owned(),
        source,
    })?;
    write_atomically(entry.path(), |file| io::copy(&mut bundle, file).map(|_| ()))
        .map_err(|source| AcquisitionError::CacheWrite {
            path: entry.path().to_path_buf(),
            source,
        })
}

fn write_atomically<F>(path: &Path, fill: F) -> io::Result<()>
where
    F: FnOnce(&mut NamedTempFile) -> io::Result<()>,
{
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;
    let mut temp = NamedTempFile::new_in(parent)?;
    fill(&mut temp)?;
    temp.flush()?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|error| error.error)?;
    Ok(())
}

//! Unpacks cached `.txz` bundles into the binaries directory.

use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use xz2::read::XzDecoder;

use crate::error::AcquisitionError;
use crate::fetch::ACQUIRE_TARGET;

const STAGING_PREFIX: &str = ".embedpg-extract-";
const BIN_DIR: &str = "bin";

/// Unpacks an archive into a destination directory.
pub trait Extract: Send + Sync {
    /// Extracts `archive` into `destination`.
    ///
    /// # Errors
    ///
    /// Returns an [`AcquisitionError`] when the archive cannot be unpacked.
    fn extract(&self, archive: &Path, destination: &Path) -> Result<(), AcquisitionError>;
}

/// Extracts xz-compressed tarballs.
///
/// Entries are unpacked into a staging directory beside the destination
/// and then moved into place with `bin` last, so the presence of
/// `<destination>/bin` implies a complete extraction.
#[derive(Debug, Clone, Copy, Default)]
pub struct TarXzExtractor;

impl Extract for TarXzExtractor {
    fn extract(&self, archive: &Path, destination: &Path) -> Result<(), AcquisitionError> {
        let extract_error = |source: io::Error| AcquisitionError::Extract {
            archive: archive.to_path_buf(),
            destination: destination.to_path_buf(),
            source,
        };
        let parent = destination
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent).map_err(extract_error)?;
        let staging = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(parent)
            .map_err(extract_error)?;

        let file = File::open(archive).map_err(|source| AcquisitionError::ArchiveRead {
            path: archive.to_path_buf(),
            source,
        })?;
        let mut tarball = tar::Archive::new(XzDecoder::new(BufReader::new(file)));
        let mut unpacked = 0_usize;
        for entry in tarball.entries().map_err(extract_error)? {
            let mut entry = entry.map_err(extract_error)?;
            let entry_path = entry.path().map_err(extract_error)?.into_owned();
            if !entry.unpack_in(staging.path()).map_err(extract_error)? {
                return Err(AcquisitionError::UnsafeEntry {
                    archive: archive.to_path_buf(),
                    entry: entry_path,
                });
            }
            unpacked += 1;
        }
        debug!(
            target: ACQUIRE_TARGET,
            archive = %archive.display(),
            entries = unpacked,
            "archive unpacked into staging directory"
        );

        if !staging.path().join(BIN_DIR).is_dir() {
            return Err(AcquisitionError::MissingBinaries {
                archive: archive.to_path_buf(),
            });
        }
        promote(staging.path(), destination).map_err(extract_error)?;
        info!(
            target: ACQUIRE_TARGET,
            archive = %archive.display(),
            destination = %destination.display(),
            "engine binaries extracted"
        );
        Ok(())
    }
}

/// Moves every top-level staging entry into `destination`, `bin` last.
fn promote(staging: &Path, destination: &Path) -> io::Result<()> {
    fs::create_dir_all(destination)?;
    let mut deferred: Option<PathBuf> = None;
    for item in fs::read_dir(staging)? {
        let item = item?;
        if item.file_name() == BIN_DIR {
            deferred = Some(item.path());
            continue;
        }
        replace(&item.path(), &destination.join(item.file_name()))?;
    }
    if let Some(bin) = deferred {
        replace(&bin, &destination.join(BIN_DIR))?;
    }
    Ok(())
}

fn replace(from: &Path, to: &Path) -> io::Result<()> {
    match fs::symlink_metadata(to) {
        Ok(metadata) if metadata.is_dir() => fs::remove_dir_all(to)?,
        Ok(_) => fs::remove_file(to)?,
        Err(error) if error.kind() == io::ErrorKind::NotFound => {}
        Err(error) => return Err(error),
    }
    fs::rename(from, to)
}

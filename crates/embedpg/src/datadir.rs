//! Decides whether an existing data directory can be reused.

use std::fs;
use std::path::Path;

use embedpg_config::PostgresVersion;

/// Marker file written by the bootstrap command.
pub const VERSION_MARKER: &str = "PG_VERSION";

/// Whether `data_dir` holds a cluster compatible with `version`.
///
/// The marker records only the release series (`16`, or `9.6` for old
/// releases). Marker and configured version are split on `.` and the
/// shorter list must equal the start of the longer one, so marker `16`
/// accepts `16.9.0` and marker `15.2` accepts a configured `15`. A missing,
/// unreadable or empty marker makes the directory non-reusable.
#[must_use]
pub fn is_reusable(data_dir: &Path, version: &PostgresVersion) -> bool {
    let Ok(content) = fs::read_to_string(data_dir.join(VERSION_MARKER)) else {
        return false;
    };
    let marker = content.trim_end_matches(['\n', '\r']);
    !marker.is_empty() && components_agree(marker, version.as_str())
}

fn components_agree(marker: &str, version: &str) -> bool {
    let marker_parts: Vec<&str> = marker.split('.').collect();
    let version_parts: Vec<&str> = version.split('.').collect();
    marker_parts
        .iter()
        .zip(&version_parts)
        .all(|(left, right)| left == right)
}

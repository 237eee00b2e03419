use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::logging::LogFormat;

/// Default TCP port the engine listens on.
pub const DEFAULT_PORT: u16 = 5432;

/// Default database, role and password.
pub const DEFAULT_DATABASE: &str = "postgres";

/// Default role used to bootstrap the cluster.
pub const DEFAULT_USERNAME: &str = "postgres";

/// Default password for [`DEFAULT_USERNAME`].
pub const DEFAULT_PASSWORD: &str = "postgres";

/// Default upper bound on process start plus readiness.
pub const DEFAULT_START_TIMEOUT: Duration = Duration::from_secs(15);

/// Default Maven repository hosting the binary bundles.
pub const DEFAULT_REPOSITORY_URL: &str = "https://repo1.maven.org/maven2";

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default log filter expression used by the binaries.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Default logging format for the binaries.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Directory holding downloaded binary archives when no cache path is set.
///
/// Prefers the per-user cache directory and falls back to the system
/// temporary directory on hosts without one.
#[must_use]
pub fn default_cache_directory() -> PathBuf {
    let mut dir = dirs::cache_dir().unwrap_or_else(env::temp_dir);
    dir.push("embedpg");
    dir
}

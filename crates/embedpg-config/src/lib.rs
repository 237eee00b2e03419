//! Shared configuration for the embedded `PostgreSQL` lifecycle.
//!
//! [`Config`] is layered by `ortho_config`: built-in defaults, then an
//! optional configuration file (`--config-path` or `EMBEDPG_CONFIG_PATH`),
//! then `EMBEDPG_*` environment variables, then command-line flags. Every
//! field is optional so each layer only overrides what it names; the
//! accessor methods apply the built-in defaults such as [`DEFAULT_PORT`].
//!
//! Library callers usually skip loading altogether and build a value with
//! the `with_*` methods:
//!
//! ```rust
//! use embedpg_config::{Config, PostgresVersion};
//!
//! let config = Config::default()
//!     .with_version(PostgresVersion::new(PostgresVersion::V15))
//!     .with_port(15432)
//!     .with_database("orders");
//! assert_eq!(config.port(), 15432);
//! ```

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use ortho_config::{OrthoConfig, OrthoError};
use serde::{Deserialize, Serialize};

mod defaults;
mod logging;
mod validation;
mod version;

pub use defaults::{
    DEFAULT_DATABASE, DEFAULT_LOG_FILTER, DEFAULT_PASSWORD, DEFAULT_PORT, DEFAULT_REPOSITORY_URL,
    DEFAULT_START_TIMEOUT, DEFAULT_USERNAME, default_cache_directory, default_log_filter,
    default_log_format,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use validation::ConfigError;
pub use version::PostgresVersion;

/// Configuration for one embedded engine instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "EMBEDPG")]
pub struct Config {
    /// Engine release to download and run.
    pub engine_version: Option<String>,
    /// TCP port the engine listens on.
    pub port: Option<u16>,
    /// Application database created on fresh data directories.
    pub database: Option<String>,
    /// Role created by the bootstrap command.
    pub username: Option<String>,
    /// Password for [`Config::username`].
    pub password: Option<String>,
    /// Locale passed to the bootstrap command.
    pub locale: Option<String>,
    /// Encoding passed to the bootstrap command.
    pub encoding: Option<String>,
    /// Directory holding downloaded binary archives.
    pub cache_path: Option<PathBuf>,
    /// Scratch directory recreated on every start.
    pub runtime_path: Option<PathBuf>,
    /// Cluster data directory.
    pub data_path: Option<PathBuf>,
    /// Directory the binary archive is extracted into.
    pub binaries_path: Option<PathBuf>,
    /// Base URL of the Maven repository hosting the bundles.
    pub binary_repository_url: Option<String>,
    /// Milliseconds allowed for process start plus readiness.
    pub start_timeout_ms: Option<u64>,
    /// Server settings forwarded as `-c key=value`.
    #[serde(default)]
    pub start_parameters: Vec<String>,
    /// Spawns the engine in its own process group on Unix.
    pub own_process_group: Option<bool>,
    /// `tracing` filter expression for the binaries.
    pub log_filter: Option<String>,
    /// Output format for the binaries' telemetry.
    pub log_format: Option<LogFormat>,
}

impl Config {
    /// Loads configuration from the process arguments, environment and files.
    ///
    /// # Errors
    ///
    /// Returns the loader error when any layer fails to parse.
    pub fn load_from_args<I>(args: I) -> Result<Self, Arc<OrthoError>>
    where
        I: IntoIterator<Item = OsString>,
    {
        let args: Vec<OsString> = args.into_iter().collect();
        Self::load_from_iter(args)
    }

    /// Engine release to run.
    #[must_use]
    pub fn version(&self) -> PostgresVersion {
        self.engine_version
            .as_deref()
            .map(PostgresVersion::new)
            .unwrap_or_default()
    }

    /// TCP port the engine listens on.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }

    /// Application database name.
    #[must_use]
    pub fn database(&self) -> &str {
        self.database.as_deref().unwrap_or(DEFAULT_DATABASE)
    }

    /// Bootstrap role.
    #[must_use]
    pub fn username(&self) -> &str {
        self.username.as_deref().unwrap_or(DEFAULT_USERNAME)
    }

    /// Bootstrap role password.
    #[must_use]
    pub fn password(&self) -> &str {
        self.password.as_deref().unwrap_or(DEFAULT_PASSWORD)
    }

    /// Locale for the bootstrap command, if any.
    #[must_use]
    pub fn locale(&self) -> Option<&str> {
        self.locale.as_deref().filter(|value| !value.is_empty())
    }

    /// Encoding for the bootstrap command, if any.
    #[must_use]
    pub fn encoding(&self) -> Option<&str> {
        self.encoding.as_deref().filter(|value| !value.is_empty())
    }

    /// Directory holding downloaded archives.
    #[must_use]
    pub fn cache_path(&self) -> PathBuf {
        self.cache_path
            .clone()
            .unwrap_or_else(default_cache_directory)
    }

    /// Explicit runtime directory, if configured.
    #[must_use]
    pub fn runtime_path(&self) -> Option<&Path> {
        self.runtime_path.as_deref()
    }

    /// Explicit data directory, if configured.
    #[must_use]
    pub fn data_path(&self) -> Option<&Path> {
        self.data_path.as_deref()
    }

    /// Explicit binaries directory, if configured.
    #[must_use]
    pub fn binaries_path(&self) -> Option<&Path> {
        self.binaries_path.as_deref()
    }

    /// Base URL of the binary repository.
    #[must_use]
    pub fn binary_repository_url(&self) -> &str {
        self.binary_repository_url
            .as_deref()
            .unwrap_or(DEFAULT_REPOSITORY_URL)
            .trim_end_matches('/')
    }

    /// Upper bound on process start plus readiness.
    #[must_use]
    pub fn start_timeout(&self) -> Duration {
        self.start_timeout_ms
            .map_or(DEFAULT_START_TIMEOUT, Duration::from_millis)
    }

    /// Well-formed `key=value` server settings, in declaration order.
    ///
    /// Malformed entries are skipped here; [`Config::validate`] reports them.
    pub fn start_parameters(&self) -> impl Iterator<Item = (&str, &str)> {
        self.start_parameters
            .iter()
            .filter_map(|entry| validation::parse_parameter(entry))
    }

    /// Whether the engine gets its own process group.
    #[must_use]
    pub fn own_process_group(&self) -> bool {
        self.own_process_group.unwrap_or(false)
    }

    /// Log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER)
    }

    /// Log output format.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format.unwrap_or_else(default_log_format)
    }

    /// Sets the engine release.
    #[must_use]
    pub fn with_version(mut self, version: PostgresVersion) -> Self {
        self.engine_version = Some(version.to_string());
        self
    }

    /// Sets the listening port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets the application database.
    #[must_use]
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Sets the bootstrap role.
    #[must_use]
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Sets the bootstrap role password.
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Sets the bootstrap locale.
    #[must_use]
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    /// Sets the bootstrap encoding.
    #[must_use]
    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = Some(encoding.into());
        self
    }

    /// Sets the archive cache directory.
    #[must_use]
    pub fn with_cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_path = Some(path.into());
        self
    }

    /// Sets the runtime directory.
    #[must_use]
    pub fn with_runtime_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.runtime_path = Some(path.into());
        self
    }

    /// Sets the data directory.
    #[must_use]
    pub fn with_data_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_path = Some(path.into());
        self
    }

    /// Sets the binaries directory.
    #[must_use]
    pub fn with_binaries_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.binaries_path = Some(path.into());
        self
    }

    /// Sets the binary repository base URL.
    #[must_use]
    pub fn with_binary_repository_url(mut self, url: impl Into<String>) -> Self {
        self.binary_repository_url = Some(url.into());
        self
    }

    /// Sets the start timeout, truncated to whole milliseconds.
    ///
    /// Timeouts beyond `u64::MAX` milliseconds saturate.
    #[must_use]
    pub fn with_start_timeout(mut self, timeout: Duration) -> Self {
        self.start_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Adds a server setting forwarded as `-c key=value`.
    #[must_use]
    pub fn with_start_parameter(mut self, key: &str, value: &str) -> Self {
        self.start_parameters.push(format!("{key}={value}"));
        self
    }

    /// Runs the engine in its own process group.
    #[must_use]
    pub fn with_own_process_group(mut self, enabled: bool) -> Self {
        self.own_process_group = Some(enabled);
        self
    }
}

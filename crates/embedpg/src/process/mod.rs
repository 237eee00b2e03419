//! Controls the engine server process through `pg_ctl`.

use std::path::{Path, PathBuf};

use embedpg_config::Config;

use crate::deadline::Deadline;
use crate::log::BufferedLog;
use crate::paths::{ResolvedPaths, executable};
use crate::PostgresError;

mod command;
mod pg_ctl;
mod status;


pub(crate) use command::{describe, run_logged};
pub use pg_ctl::{DEFAULT_STOP_TIMEOUT, PgCtl};
pub use status::{ServerStatus, StatusReport, parse_status_line};

/// Target used for process telemetry.
pub const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process");

/// Where a controller believes its server is in the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControllerState {
    /// No server launched by this controller is running.
    #[default]
    NotRunning,
    /// A start command is in flight.
    Starting,
    /// The start command reported success.
    Running,
    /// A stop command is in flight.
    Stopping,
}

/// Everything a controller needs to launch one server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    binaries: PathBuf,
    data: PathBuf,
    port: u16,
    parameters: Vec<(String, String)>,
    own_process_group: bool,
}

impl ServerSettings {
    /// Settings for a server using `binaries/bin` on `data`, listening on `port`.
    pub fn new(binaries: impl Into<PathBuf>, data: impl Into<PathBuf>, port: u16) -> Self {
        Self {
            binaries: binaries.into(),
            data: data.into(),
            port,
            parameters: Vec::new(),
            own_process_group: false,
        }
    }

    /// Derives settings from configuration and resolved directories.
    #[must_use]
    pub fn from_config(config: &Config, paths: &ResolvedPaths) -> Self {
        let settings = Self::new(paths.binaries_dir(), paths.data_dir(), config.port())
            .with_own_process_group(config.own_process_group());
        config
            .start_parameters()
            .fold(settings, |settings, (key, value)| {
                settings.with_parameter(key, value)
            })
    }

    /// Adds a `-c key=value` server setting.
    #[must_use]
    pub fn with_parameter(mut self, key: &str, value: &str) -> Self {
        self.parameters.push((key.to_owned(), value.to_owned()));
        self
    }

    /// Spawns the server in its own process group on Unix.
    #[must_use]
    pub const fn with_own_process_group(mut self, enabled: bool) -> Self {
        self.own_process_group = enabled;
        self
    }

    /// Path of an engine executable such as `pg_ctl`.
    #[must_use]
    pub fn executable(&self, name: &str) -> PathBuf {
        executable(&self.binaries, name)
    }

    /// Cluster data directory.
    #[must_use]
    pub fn data_path(&self) -> &Path {
        &self.data
    }

    /// Listening port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Whether the server gets its own process group.
    #[must_use]
    pub const fn own_process_group(&self) -> bool {
        self.own_process_group
    }

    /// Option string handed to the server via `pg_ctl -o`.
    #[must_use]
    pub fn server_options(&self) -> String {
        let mut options = format!("-p {}", self.port);
        for (key, value) in &self.parameters {
            options.push_str(" -c ");
            options.push_str(key);
            options.push('=');
            options.push_str(&quote_value(value));
        }
        options
    }
}

/// Quotes a setting value for the shell `pg_ctl` launches the server from.
fn quote_value(value: &str) -> String {
    let plain = !value.is_empty()
        && value
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || "_-.,:/+@%".contains(ch));
    if plain {
        value.to_owned()
    } else {
        format!("'{}'", value.replace('\'', r"'\''"))
    }
}

/// Starts, stops and inspects one engine server.
pub trait ServerControl: Send {
    /// Launches the server and waits until it reports started or `deadline`
    /// elapses.
    ///
    /// # Errors
    ///
    /// Returns [`PostgresError::SpawnFailed`] when the start command fails and
    /// [`PostgresError::StartupTimeout`] when it outlives the deadline.
    fn start(
        &mut self,
        settings: &ServerSettings,
        deadline: Deadline,
        log: &BufferedLog,
    ) -> Result<(), PostgresError>;

    /// Requests a graceful shutdown and waits for it.
    ///
    /// # Errors
    ///
    /// Returns [`PostgresError::StopFailed`] when the stop command fails.
    fn stop(&mut self, settings: &ServerSettings, log: &BufferedLog) -> Result<(), PostgresError>;

    /// Reports whether a server is running on the data directory.
    ///
    /// # Errors
    ///
    /// Returns [`PostgresError::Status`] when the status command cannot run.
    fn status(&self, settings: &ServerSettings) -> Result<StatusReport, PostgresError>;

    /// Controller's own view of the server lifecycle.
    fn state(&self) -> ControllerState;
}

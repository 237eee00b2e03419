use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;

use embedpg_config::Config;
use tracing::{info, warn};

use super::LIFECYCLE_TARGET;
use super::builder::EmbeddedPostgresBuilder;
use crate::PostgresError;
use crate::acquire::BinaryAcquirer;
use crate::cache::{CacheKey, CacheLocator};
use crate::connection::ConnectionTarget;
use crate::database::DatabaseCreator;
use crate::datadir::is_reusable;
use crate::deadline::Deadline;
use crate::init::{InitDatabase, InitSettings};
use crate::log::{BufferedLog, SharedSink};
use crate::paths::ResolvedPaths;
use crate::platform::Platform;
use crate::port::ensure_port_available;
use crate::process::{ServerControl, ServerSettings, ServerStatus};
use crate::readiness::{HealthProbe, wait_until_ready};

const PASSWORD_FILE: &str = "pwfile";

pub(super) struct Collaborators {
    pub(super) acquirer: BinaryAcquirer,
    pub(super) initializer: Arc<dyn InitDatabase>,
    pub(super) controller: Box<dyn ServerControl>,
    pub(super) probe: Arc<dyn HealthProbe>,
    pub(super) creator: Arc<dyn DatabaseCreator>,
    pub(super) sink: SharedSink,
}

/// State held while the engine is started.
struct Session {
    settings: ServerSettings,
    log: BufferedLog,
}

/// One embedded engine instance.
///
/// `start` and `stop` alternate: starting a started instance fails with
/// [`PostgresError::AlreadyStarted`] and stopping an instance that is not
/// started fails with [`PostgresError::NotStarted`]. The started flag only
/// follows those calls; it does not track the server process itself.
pub struct EmbeddedPostgres {
    config: Config,
    key: CacheKey,
    paths: ResolvedPaths,
    collaborators: Collaborators,
    session: Option<Session>,
}

impl EmbeddedPostgres {
    /// Instance using the production collaborators.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self::builder(config).build()
    }

    /// Builder for an instance with replaced collaborators.
    #[must_use]
    pub fn builder(config: Config) -> EmbeddedPostgresBuilder {
        EmbeddedPostgresBuilder::new(config)
    }

    pub(super) fn assemble(config: Config, platform: Platform, collaborators: Collaborators) -> Self {
        let key = CacheKey::new(config.version(), platform);
        let entry = CacheLocator::new(config.cache_path()).entry(&key);
        let paths = ResolvedPaths::resolve(&config, entry);
        Self {
            config,
            key,
            paths,
            collaborators,
            session: None,
        }
    }

    /// Configuration this instance runs with.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Directories this instance uses.
    #[must_use]
    pub const fn paths(&self) -> &ResolvedPaths {
        &self.paths
    }

    /// Whether `start` succeeded without a later `stop`.
    #[must_use]
    pub const fn is_started(&self) -> bool {
        self.session.is_some()
    }

    /// libpq connection string for the configured database.
    #[must_use]
    pub fn connection_string(&self) -> String {
        ConnectionTarget::from_config(&self.config).connection_string()
    }

    /// Acquires binaries, prepares the data directory, starts the server and
    /// waits until it answers queries.
    ///
    /// A failure after the server came up stops it again before returning.
    ///
    /// # Errors
    ///
    /// Returns the first failing step's error. When stopping after a late
    /// failure also fails, both are returned in
    /// [`PostgresError::RollbackFailed`].
    pub fn start(&mut self) -> Result<(), PostgresError> {
        if self.session.is_some() {
            return Err(PostgresError::AlreadyStarted);
        }
        self.config.validate()?;
        ensure_port_available(self.config.port())?;
        let mut log = BufferedLog::new(self.collaborators.sink.clone())
            .map_err(|source| PostgresError::Logger { source })?;
        info!(
            target: LIFECYCLE_TARGET,
            version = %self.key.version(),
            port = self.config.port(),
            data = %self.paths.data_dir().display(),
            "starting embedded postgres"
        );

        self.clean_runtime()?;
        self.collaborators.acquirer.acquire(
            &self.key,
            self.paths.cache_entry(),
            self.paths.binaries_dir(),
        )?;
        let runtime = self.paths.runtime_dir();
        fs::create_dir_all(runtime)
            .map_err(|source| PostgresError::filesystem("create runtime directory", runtime, source))?;

        let reuse = is_reusable(self.paths.data_dir(), self.key.version());
        if reuse {
            info!(
                target: LIFECYCLE_TARGET,
                data = %self.paths.data_dir().display(),
                "reusing existing data directory"
            );
        } else if let Err(error) = self.initialise(&log) {
            flush_quietly(&mut log);
            return Err(error);
        }

        let deadline = Deadline::after(self.config.start_timeout());
        let settings = ServerSettings::from_config(&self.config, &self.paths);
        if let Err(error) = self.collaborators.controller.start(&settings, deadline, &log) {
            flush_quietly(&mut log);
            return Err(self.clean_up_failed_start(error, &settings, &log));
        }
        flush_quietly(&mut log);
        self.session = Some(Session { settings, log });

        let target = ConnectionTarget::from_config(&self.config);
        if !reuse {
            if let Err(error) = self.collaborators.creator.create(&target, deadline) {
                return Err(self.roll_back(error));
            }
        }
        if let Err(error) = wait_until_ready(self.collaborators.probe.as_ref(), &target, deadline) {
            return Err(self.roll_back(error));
        }
        info!(
            target: LIFECYCLE_TARGET,
            port = self.config.port(),
            database = self.config.database(),
            "embedded postgres is ready"
        );
        Ok(())
    }

    /// Stops the server and flushes its remaining output.
    ///
    /// The instance counts as stopped afterwards even when the stop command
    /// fails. A server that already exited is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`PostgresError::NotStarted`] when the instance is not started
    /// and [`PostgresError::StopFailed`] when the stop command fails.
    pub fn stop(&mut self) -> Result<(), PostgresError> {
        let Some(mut session) = self.session.take() else {
            return Err(PostgresError::NotStarted);
        };
        let outcome = self.stop_server(&session);
        flush_quietly(&mut session.log);
        outcome
    }

    /// Asks the engine whether a server is running on the data directory.
    ///
    /// # Errors
    ///
    /// Returns [`PostgresError::Status`] when the status command cannot run.
    pub fn status(&self) -> Result<ServerStatus, PostgresError> {
        let settings = ServerSettings::from_config(&self.config, &self.paths);
        let report = self.collaborators.controller.status(&settings)?;
        if self.is_started() && !report.status.is_running() {
            warn!(
                target: LIFECYCLE_TARGET,
                data = %self.paths.data_dir().display(),
                "instance is started but no server is running"
            );
        }
        Ok(report.status)
    }

    /// Removes leftovers of a previous run from the runtime directory.
    ///
    /// The directory is removed outright unless it holds the binaries or
    /// the data directory; those are kept so the acquisition short-circuit
    /// and data reuse can see them.
    fn clean_runtime(&self) -> Result<(), PostgresError> {
        let runtime = self.paths.runtime_dir();
        let holds_state = self.paths.binaries_dir().starts_with(runtime)
            || self.paths.data_dir().starts_with(runtime);
        let (target, operation) = if holds_state {
            (runtime.join(PASSWORD_FILE), "remove stale password file")
        } else {
            (runtime.to_path_buf(), "clean runtime directory")
        };
        remove_if_present(&target)
            .map_err(|source| PostgresError::filesystem(operation, &target, source))
    }

    fn initialise(&self, log: &BufferedLog) -> Result<(), PostgresError> {
        let data = self.paths.data_dir();
        remove_if_present(data)
            .map_err(|source| PostgresError::filesystem("remove stale data directory", data, source))?;
        let settings = InitSettings::from_config(&self.config, &self.paths);
        self.collaborators.initializer.init(&settings, log)
    }

    /// Stops a server that may have come up despite a failed start.
    fn clean_up_failed_start(
        &mut self,
        cause: PostgresError,
        settings: &ServerSettings,
        log: &BufferedLog,
    ) -> PostgresError {
        let timed_out = matches!(cause, PostgresError::StartupTimeout { .. });
        let running = match self.collaborators.controller.status(settings) {
            Ok(report) => report.status.is_running(),
            Err(error) => {
                warn!(target: LIFECYCLE_TARGET, %error, "status query after failed start failed");
                timed_out
            }
        };
        if !running {
            return cause;
        }
        warn!(target: LIFECYCLE_TARGET, %cause, "stopping server left behind by failed start");
        match self.collaborators.controller.stop(settings, log) {
            Ok(()) => cause,
            Err(rollback) => PostgresError::RollbackFailed {
                cause: Box::new(cause),
                rollback: Box::new(rollback),
            },
        }
    }

    fn roll_back(&mut self, cause: PostgresError) -> PostgresError {
        warn!(target: LIFECYCLE_TARGET, %cause, "start failed after server launch, stopping");
        match self.stop() {
            Ok(()) => cause,
            Err(rollback) => PostgresError::RollbackFailed {
                cause: Box::new(cause),
                rollback: Box::new(rollback),
            },
        }
    }

    fn stop_server(&mut self, session: &Session) -> Result<(), PostgresError> {
        match self.collaborators.controller.status(&session.settings) {
            Ok(report) if !report.status.is_running() => {
                info!(target: LIFECYCLE_TARGET, "server already stopped");
                return Ok(());
            }
            Ok(_) => {}
            Err(error) => {
                warn!(target: LIFECYCLE_TARGET, %error, "status query failed, stopping anyway");
            }
        }
        self.collaborators
            .controller
            .stop(&session.settings, &session.log)
    }
}

impl Drop for EmbeddedPostgres {
    fn drop(&mut self) {
        if self.session.is_none() {
            return;
        }
        if let Err(error) = self.stop() {
            warn!(target: LIFECYCLE_TARGET, %error, "failed to stop server on drop");
        }
    }
}

impl std::fmt::Debug for EmbeddedPostgres {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("EmbeddedPostgres")
            .field("key", &self.key)
            .field("paths", &self.paths)
            .field("started", &self.is_started())
            .finish_non_exhaustive()
    }
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    let result = match fs::symlink_metadata(path) {
        Ok(metadata) if metadata.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(error) => Err(error),
    };
    match result {
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

fn flush_quietly(log: &mut BufferedLog) {
    if let Err(error) = log.flush() {
        warn!(target: LIFECYCLE_TARGET, %error, "failed to flush engine log");
    }
}

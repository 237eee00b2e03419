//! Engine operations behind each subcommand.

use std::io::Write;

use embedpg::{EmbeddedPostgres, ServerStatus, warm_cache};
use embedpg_config::Config;
use tracing::info;

use crate::shutdown::{ShutdownSignal, SystemShutdownSignal, signal_label};
use crate::{AppError, CLI_TARGET};

/// Work performed for a parsed subcommand.
pub(crate) trait Operations {
    /// Starts the engine, waits for shutdown, then stops it.
    fn start(&self, config: &Config, stdout: &mut dyn Write) -> Result<(), AppError>;
    /// Reports whether an engine runs against the configured data directory.
    fn status(&self, config: &Config, stdout: &mut dyn Write) -> Result<(), AppError>;
    /// Downloads the configured bundle into the cache.
    fn fetch(&self, config: &Config, stdout: &mut dyn Write) -> Result<(), AppError>;
}

/// Operations backed by real engine binaries.
pub(crate) struct SystemOperations<S = SystemShutdownSignal> {
    shutdown: S,
}

impl SystemOperations {
    pub(crate) const fn new() -> Self {
        Self {
            shutdown: SystemShutdownSignal,
        }
    }
}

impl<S: ShutdownSignal> SystemOperations<S> {
    #[cfg(test)]
    pub(crate) const fn with_shutdown(shutdown: S) -> Self {
        Self { shutdown }
    }

    #[cfg(test)]
    pub(crate) const fn shutdown(&self) -> &S {
        &self.shutdown
    }

    fn serve(&self, postgres: &EmbeddedPostgres, stdout: &mut dyn Write) -> Result<(), AppError> {
        writeln!(stdout, "{}", postgres.connection_string())
            .and_then(|()| stdout.flush())
            .map_err(AppError::Output)?;
        info!(
            target: CLI_TARGET,
            port = postgres.config().port(),
            "engine running; waiting for shutdown signal"
        );
        let signal = self.shutdown.wait()?;
        info!(
            target: CLI_TARGET,
            signal = signal.map(signal_label),
            "stop requested, shutting the engine down"
        );
        Ok(())
    }
}

impl<S: ShutdownSignal> Operations for SystemOperations<S> {
    fn start(&self, config: &Config, stdout: &mut dyn Write) -> Result<(), AppError> {
        let mut postgres = EmbeddedPostgres::new(config.clone());
        postgres.start()?;
        let served = self.serve(&postgres, stdout);
        let stopped = postgres.stop();
        match (served, stopped) {
            (Ok(()), Ok(())) => Ok(()),
            (Err(AppError::Shutdown(wait)), Err(stop)) => Err(AppError::Interrupted { wait, stop }),
            (Err(error), _) => Err(error),
            (Ok(()), Err(stop)) => Err(stop.into()),
        }
    }

    fn status(&self, config: &Config, stdout: &mut dyn Write) -> Result<(), AppError> {
        let postgres = EmbeddedPostgres::new(config.clone());
        let line = match postgres.status()? {
            ServerStatus::Running { pid } => format!("running (pid {pid})"),
            ServerStatus::NotRunning => String::from("not running"),
        };
        writeln!(stdout, "{line}").map_err(AppError::Output)
    }

    fn fetch(&self, config: &Config, stdout: &mut dyn Write) -> Result<(), AppError> {
        let entry = warm_cache(config)?;
        writeln!(stdout, "{}", entry.path().display()).map_err(AppError::Output)
    }
}

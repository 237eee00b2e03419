use std::process::{Command, Stdio};
use std::time::Duration;

use tracing::{info, warn};

use super::command::{describe, run_logged};
use super::status::StatusReport;
use super::{ControllerState, PROCESS_TARGET, ServerControl, ServerSettings};
use crate::PostgresError;
use crate::deadline::Deadline;
use crate::error::{CommandFailure, StartupStage};
use crate::log::BufferedLog;

/// Upper bound `pg_ctl stop` waits for the server to exit.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(60);

const STOP_GRACE: Duration = Duration::from_secs(5);

/// [`ServerControl`] backed by the bundled `pg_ctl` executable.
#[derive(Debug, Clone)]
pub struct PgCtl {
    state: ControllerState,
    stop_timeout: Duration,
}

impl PgCtl {
    /// Controller using [`DEFAULT_STOP_TIMEOUT`].
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: ControllerState::NotRunning,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }

    /// Overrides how long a graceful stop may take.
    #[must_use]
    pub const fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    fn start_command(settings: &ServerSettings, deadline: Deadline) -> Command {
        let mut command = Command::new(settings.executable("pg_ctl"));
        command
            .arg("start")
            .arg("-w")
            .arg("-t")
            .arg(outlasting_seconds(deadline.remaining()).to_string())
            .arg("-D")
            .arg(settings.data_path())
            .arg("-o")
            .arg(settings.server_options());
        #[cfg(unix)]
        if settings.own_process_group() {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }
        command
    }

    fn stop_command(&self, settings: &ServerSettings) -> Command {
        let mut command = Command::new(settings.executable("pg_ctl"));
        command
            .arg("stop")
            .arg("-w")
            .arg("-m")
            .arg("fast")
            .arg("-t")
            .arg(whole_seconds(self.stop_timeout).to_string())
            .arg("-D")
            .arg(settings.data_path());
        command
    }

    fn status_command(settings: &ServerSettings) -> Command {
        let mut command = Command::new(settings.executable("pg_ctl"));
        command.arg("status").arg("-D").arg(settings.data_path());
        command
    }
}

impl Default for PgCtl {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerControl for PgCtl {
    fn start(
        &mut self,
        settings: &ServerSettings,
        deadline: Deadline,
        log: &BufferedLog,
    ) -> Result<(), PostgresError> {
        let mut command = Self::start_command(settings, deadline);
        self.state = ControllerState::Starting;
        info!(
            target: PROCESS_TARGET,
            port = settings.port(),
            data = %settings.data_path().display(),
            "starting engine server"
        );
        match run_logged(&mut command, log, Some(deadline.remaining())) {
            Ok(()) => {
                self.state = ControllerState::Running;
                info!(target: PROCESS_TARGET, port = settings.port(), "engine server started");
                Ok(())
            }
            Err(CommandFailure::TimedOut { .. }) => {
                self.state = ControllerState::NotRunning;
                Err(PostgresError::StartupTimeout {
                    stage: StartupStage::ServerStart,
                    timeout: deadline.timeout(),
                    last_error: None,
                })
            }
            Err(CommandFailure::Exit { .. }) if deadline.expired() => {
                self.state = ControllerState::NotRunning;
                Err(PostgresError::StartupTimeout {
                    stage: StartupStage::ServerStart,
                    timeout: deadline.timeout(),
                    last_error: log
                        .unflushed()
                        .ok()
                        .map(|output| output.trim().to_owned())
                        .filter(|output| !output.is_empty()),
                })
            }
            Err(failure) => {
                self.state = ControllerState::NotRunning;
                Err(PostgresError::SpawnFailed {
                    command: describe(&command),
                    failure,
                    output: log.unflushed().unwrap_or_default(),
                })
            }
        }
    }

    fn stop(&mut self, settings: &ServerSettings, log: &BufferedLog) -> Result<(), PostgresError> {
        let mut command = self.stop_command(settings);
        let previous = self.state;
        self.state = ControllerState::Stopping;
        info!(
            target: PROCESS_TARGET,
            data = %settings.data_path().display(),
            "stopping engine server"
        );
        match run_logged(&mut command, log, Some(self.stop_timeout + STOP_GRACE)) {
            Ok(()) => {
                self.state = ControllerState::NotRunning;
                info!(target: PROCESS_TARGET, "engine server stopped");
                Ok(())
            }
            Err(failure) => {
                self.state = previous;
                warn!(target: PROCESS_TARGET, error = %failure, "engine server did not stop");
                Err(PostgresError::StopFailed {
                    command: describe(&command),
                    failure,
                    output: log.unflushed().unwrap_or_default(),
                })
            }
        }
    }

    fn status(&self, settings: &ServerSettings) -> Result<StatusReport, PostgresError> {
        let mut command = Self::status_command(settings);
        command.stdin(Stdio::null());
        let output = command
            .output()
            .map_err(|source| PostgresError::Status {
                command: describe(&command),
                source,
            })?;
        // A non-zero exit only means "not running" or "no data directory".
        Ok(StatusReport::from_output(
            String::from_utf8_lossy(&output.stdout).into_owned(),
        ))
    }

    fn state(&self) -> ControllerState {
        self.state
    }
}

fn whole_seconds(duration: Duration) -> u64 {
    duration.as_secs().max(1)
}

/// `pg_ctl -t` budget that ends strictly after `remaining`.
///
/// The start deadline is enforced by killing `pg_ctl`, so its own wait must
/// never expire first.
fn outlasting_seconds(remaining: Duration) -> u64 {
    remaining.as_secs().saturating_add(1)
}

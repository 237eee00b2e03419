use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::PROCESS_TARGET;
use crate::error::CommandFailure;
use crate::log::BufferedLog;

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Runs `command` with output captured in `log`, optionally bounded by `timeout`.
///
/// A command that outlives its budget is killed.
pub(crate) fn run_logged(
    command: &mut Command,
    log: &BufferedLog,
    timeout: Option<Duration>,
) -> Result<(), CommandFailure> {
    let (stdout, stderr) = log
        .stdio()
        .map_err(|source| CommandFailure::Launch { source })?;
    command.stdin(Stdio::null()).stdout(stdout).stderr(stderr);
    debug!(target: PROCESS_TARGET, command = %describe(command), "running engine command");
    let mut child = command
        .spawn()
        .map_err(|source| CommandFailure::Launch { source })?;
    let status = match timeout {
        Some(timeout) => wait_with_timeout(&mut child, timeout)?,
        None => child
            .wait()
            .map_err(|source| CommandFailure::Wait { source })?,
    };
    if status.success() {
        Ok(())
    } else {
        Err(CommandFailure::Exit { status })
    }
}

fn wait_with_timeout(child: &mut Child, timeout: Duration) -> Result<ExitStatus, CommandFailure> {
    let started = Instant::now();
    loop {
        if let Some(status) = child
            .try_wait()
            .map_err(|source| CommandFailure::Wait { source })?
        {
            return Ok(status);
        }
        if started.elapsed() >= timeout {
            terminate(child);
            return Err(CommandFailure::TimedOut { timeout });
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn terminate(child: &mut Child) {
    if let Err(error) = child.kill() {
        warn!(target: PROCESS_TARGET, pid = child.id(), %error, "failed to kill engine command");
        return;
    }
    if let Err(error) = child.wait() {
        warn!(target: PROCESS_TARGET, pid = child.id(), %error, "failed to reap engine command");
    }
}

/// Renders a command line for error messages.
pub(crate) fn describe(command: &Command) -> String {
    std::iter::once(command.get_program())
        .chain(command.get_args())
        .map(|part| part.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}

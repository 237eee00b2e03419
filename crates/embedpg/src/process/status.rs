//! Interprets `pg_ctl status` output.

const PROGRAM_PREFIX: &str = "pg_ctl: ";
const RUNNING_PREFIX: &str = "server is running (PID: ";

/// Whether a server owns the data directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerStatus {
    /// A server with this PID is running.
    Running {
        /// Server process identifier.
        pid: u32,
    },
    /// No server is running.
    NotRunning,
}

impl ServerStatus {
    /// Whether a server is running.
    #[must_use]
    pub const fn is_running(self) -> bool {
        matches!(self, Self::Running { .. })
    }
}

/// Parsed status together with the raw command output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    /// Parsed status.
    pub status: ServerStatus,
    /// Everything the status command printed.
    pub output: String,
}

impl StatusReport {
    /// Builds a report from raw status output.
    #[must_use]
    pub fn from_output(output: String) -> Self {
        let status = output
            .lines()
            .next()
            .and_then(parse_status_line)
            .map_or(ServerStatus::NotRunning, |pid| ServerStatus::Running { pid });
        Self { status, output }
    }
}

/// Extracts the PID from `pg_ctl: server is running (PID: N)`.
///
/// Any other line yields `None`.
#[must_use]
pub fn parse_status_line(line: &str) -> Option<u32> {
    let line = line.trim();
    let line = line.strip_prefix(PROGRAM_PREFIX).unwrap_or(line);
    let pid = line.strip_prefix(RUNNING_PREFIX)?.strip_suffix(')')?;
    pid.trim().parse::<u32>().ok().filter(|pid| *pid != 0)
}

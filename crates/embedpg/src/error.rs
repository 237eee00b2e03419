//! Defines the unified error surface for the engine lifecycle.

use std::error::Error as StdError;
use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

use thiserror::Error;

use embedpg_config::ConfigError;

/// Boxed error reported by pluggable collaborators.
pub type BoxedError = Box<dyn StdError + Send + Sync>;

/// Why an engine helper command (`initdb`, `pg_ctl`) did not succeed.
#[derive(Debug, Error)]
pub enum CommandFailure {
    /// The executable could not be launched.
    #[error("failed to launch: {source}")]
    Launch {
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
    /// The command ran but reported failure.
    #[error("exited with {status}")]
    Exit {
        /// Exit status reported by the OS.
        status: ExitStatus,
    },
    /// The command was still running when its time budget ran out.
    #[error("did not finish within {timeout:?}")]
    TimedOut {
        /// Budget the command exceeded.
        timeout: Duration,
    },
    /// Polling the child for completion failed.
    #[error("failed to wait for exit: {source}")]
    Wait {
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
}

/// Errors raised while fetching or unpacking engine binaries.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    /// The repository has no bundle for the requested version.
    #[error("no version found matching {version} at {url}")]
    VersionNotFound {
        /// Requested engine version.
        version: String,
        /// URL that returned 404.
        url: String,
    },
    /// The HTTP request itself failed.
    #[error("request to {url} failed: {source}")]
    Http {
        /// Requested URL.
        url: String,
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },
    /// The server answered with a non-success status.
    #[error("request to {url} returned status {status}")]
    HttpStatus {
        /// Requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },
    /// The downloaded bytes did not match the published digest.
    #[error("downloaded checksums do not match for {url}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Requested URL.
        url: String,
        /// Published SHA-256 digest.
        expected: String,
        /// Digest of the received bytes.
        actual: String,
    },
    /// The downloaded jar could not be read as a zip archive.
    #[error("archive retrieved from {url} is not a readable jar: {source}")]
    Jar {
        /// Requested URL.
        url: String,
        /// Underlying zip error.
        #[source]
        source: zip::result::ZipError,
    },
    /// The jar held no `.txz` bundle.
    #[error("cannot find binary in archive retrieved from {url}")]
    MissingBundle {
        /// Requested URL.
        url: String,
    },
    /// Writing the cache entry failed.
    #[error("failed to write cache entry '{path}': {source}")]
    CacheWrite {
        /// Cache entry path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Opening the cached archive failed.
    #[error("failed to read archive '{path}': {source}")]
    ArchiveRead {
        /// Archive path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// An archive entry pointed outside the extraction root.
    #[error("archive '{archive}' entry '{entry}' escapes the extraction root")]
    UnsafeEntry {
        /// Archive path.
        archive: PathBuf,
        /// Offending entry path.
        entry: PathBuf,
    },
    /// Unpacking or moving extracted files failed.
    #[error("failed to extract '{archive}' into '{destination}': {source}")]
    Extract {
        /// Archive path.
        archive: PathBuf,
        /// Extraction target.
        destination: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The archive unpacked cleanly but holds no `bin` directory.
    #[error("archive '{archive}' does not contain a bin directory")]
    MissingBinaries {
        /// Archive path.
        archive: PathBuf,
    },
}

/// Stage of startup that ran out of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupStage {
    /// Waiting for the server process to come up.
    ServerStart,
    /// Waiting for the server to accept connections.
    Readiness,
}

impl std::fmt::Display for StartupStage {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ServerStart => formatter.write_str("the server process to start"),
            Self::Readiness => formatter.write_str("the database to become available"),
        }
    }
}

/// Errors surfaced by [`EmbeddedPostgres`](crate::EmbeddedPostgres).
#[derive(Debug, Error)]
pub enum PostgresError {
    /// The configuration cannot drive an engine instance.
    #[error("invalid configuration: {source}")]
    InvalidConfig {
        /// Validation failure.
        #[from]
        source: ConfigError,
    },
    /// Something already listens on the configured port.
    #[error("process already listening on port {port}")]
    PortUnavailable {
        /// Configured port.
        port: u16,
        /// Bind error.
        #[source]
        source: io::Error,
    },
    /// The buffered engine log could not be created.
    #[error("unable to create logger: {source}")]
    Logger {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Copying buffered engine output into the sink failed.
    #[error("failed to flush engine log: {source}")]
    LogFlush {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// A filesystem step of the lifecycle failed.
    #[error("unable to {operation} '{path}': {source}")]
    Filesystem {
        /// What the lifecycle was doing.
        operation: &'static str,
        /// Path involved.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Fetching or extracting the binaries failed.
    #[error("failed to acquire engine binaries: {source}")]
    AcquisitionFailed {
        /// Underlying acquisition error.
        #[from]
        source: AcquisitionError,
    },
    /// The bootstrap command failed.
    #[error("unable to init database using '{command}': {failure}\n{output}")]
    InitializationFailed {
        /// Rendered command line.
        command: String,
        /// How the command failed.
        #[source]
        failure: CommandFailure,
        /// Output captured from the command.
        output: String,
    },
    /// The server process could not be started.
    #[error("could not start postgres using '{command}': {failure}\n{output}")]
    SpawnFailed {
        /// Rendered command line.
        command: String,
        /// How the command failed.
        #[source]
        failure: CommandFailure,
        /// Output captured from the command.
        output: String,
    },
    /// The start deadline elapsed.
    #[error("timed out after {timeout:?} waiting for {stage}{}", describe_last_error(.last_error.as_deref()))]
    StartupTimeout {
        /// Stage that was still pending.
        stage: StartupStage,
        /// Configured start timeout.
        timeout: Duration,
        /// Most recent probe failure, when polling.
        last_error: Option<String>,
    },
    /// Creating the application database failed.
    #[error("unable to connect to create database with custom name {database}: {source}")]
    DatabaseCreationFailed {
        /// Database that could not be created.
        database: String,
        /// Underlying client error.
        #[source]
        source: BoxedError,
    },
    /// The graceful stop command failed.
    #[error("could not stop postgres using '{command}': {failure}\n{output}")]
    StopFailed {
        /// Rendered command line.
        command: String,
        /// How the command failed.
        #[source]
        failure: CommandFailure,
        /// Output captured from the command.
        output: String,
    },
    /// The status query could not be launched.
    #[error("failed to query server status using '{command}': {source}")]
    Status {
        /// Rendered command line.
        command: String,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
    /// `start` was called on a running instance.
    #[error("server is already started")]
    AlreadyStarted,
    /// `stop` was called on an instance that was never started.
    #[error("server has not been started")]
    NotStarted,
    /// A late start failure triggered a rollback stop, which failed too.
    #[error("{cause}; stopping the server afterwards also failed: {rollback}")]
    RollbackFailed {
        /// Failure that triggered the rollback.
        cause: Box<PostgresError>,
        /// Failure of the rollback stop.
        rollback: Box<PostgresError>,
    },
}

impl PostgresError {
    pub(crate) fn filesystem(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Filesystem {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Failure that started the chain, looking through rollback wrappers.
    #[must_use]
    pub fn root_cause(&self) -> &Self {
        match self {
            Self::RollbackFailed { cause, .. } => cause.root_cause(),
            other => other,
        }
    }
}

fn describe_last_error(last_error: Option<&str>) -> String {
    last_error.map_or_else(String::new, |error| format!(" (last error: {error})"))
}

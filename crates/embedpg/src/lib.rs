//! Embedded `PostgreSQL` lifecycle management.
//!
//! [`EmbeddedPostgres`] runs a real `PostgreSQL` server as a child process for
//! tests and local tooling. Starting an instance walks a fixed sequence:
//!
//! 1. check the configured port is free, before anything touches disk;
//! 2. make the engine binaries available, downloading the platform bundle
//!    into a shared cache and extracting it under a process-wide lock so
//!    concurrent instances never fetch or unpack the same bundle twice;
//! 3. reuse the data directory when its `PG_VERSION` marker matches the
//!    configured release, otherwise recreate it with `initdb`;
//! 4. launch the server with `pg_ctl` under the start deadline;
//! 5. create the application database on fresh clusters;
//! 6. poll with `SELECT 1` until the server accepts queries.
//!
//! A failure in the last two steps stops the server again. If that stop
//! fails too, [`PostgresError::RollbackFailed`] reports both failures.
//!
//! Every step sits behind a small trait ([`RemoteFetch`], [`Extract`],
//! [`InitDatabase`], [`ServerControl`], [`HealthProbe`],
//! [`DatabaseCreator`]) so the sequence can be exercised without a network
//! or a real server; see [`EmbeddedPostgres::builder`].
//!
//! Engine output is captured in a [`BufferedLog`] and forwarded to a sink,
//! by default as `tracing` events on [`ENGINE_TARGET`].

mod acquire;
mod cache;
mod connection;
mod database;
mod datadir;
mod deadline;
mod error;
mod extract;
mod fetch;
mod init;
mod lifecycle;
mod log;
mod paths;
mod platform;
mod port;
mod process;
mod readiness;

pub use acquire::{Acquisition, AcquisitionLock, BinaryAcquirer};
pub use cache::{CacheEntry, CacheKey, CacheLocator};
pub use connection::{ConnectionTarget, LOCALHOST};
pub use database::{DatabaseCreator, MAINTENANCE_DATABASE, PostgresDatabaseCreator, create_statement};
pub use datadir::{VERSION_MARKER, is_reusable};
pub use deadline::Deadline;
pub use embedpg_config::{Config, PostgresVersion};
pub use error::{AcquisitionError, BoxedError, CommandFailure, PostgresError, StartupStage};
pub use extract::{Extract, TarXzExtractor};
pub use fetch::{ACQUIRE_TARGET, MavenFetcher, RemoteFetch};
pub use init::{InitDatabase, InitDb, InitSettings};
pub use lifecycle::{EmbeddedPostgres, EmbeddedPostgresBuilder, LIFECYCLE_TARGET, warm_cache};
pub use log::{BufferedLog, ENGINE_TARGET, LogSink, SharedSink, TracingSink};
pub use paths::ResolvedPaths;
pub use platform::Platform;
pub use port::ensure_port_available;
pub use process::{
    ControllerState, DEFAULT_STOP_TIMEOUT, PROCESS_TARGET, PgCtl, ServerControl, ServerSettings,
    ServerStatus, StatusReport, parse_status_line,
};
pub use readiness::{HealthProbe, POLL_INTERVAL, PostgresProbe, wait_until_ready};

#[cfg(test)]
mod tests;

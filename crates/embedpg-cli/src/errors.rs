//! Error types for the CLI runtime.

use std::io;
use std::sync::Arc;

use embedpg::PostgresError;
use thiserror::Error;

use crate::shutdown::ShutdownError;
use crate::telemetry::TelemetryError;

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error("failed to load configuration: {0}")]
    LoadConfiguration(Arc<ortho_config::OrthoError>),
    #[error("{0}")]
    CliUsage(clap::Error),
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    #[error(transparent)]
    Postgres(#[from] PostgresError),
    #[error(transparent)]
    Shutdown(#[from] ShutdownError),
    #[error("failed to write output: {0}")]
    Output(#[source] io::Error),
    /// The engine ran and was stopped, but waiting for the signal failed first.
    #[error("{wait}; the engine was stopped but reported: {stop}")]
    Interrupted {
        wait: ShutdownError,
        stop: PostgresError,
    },
}

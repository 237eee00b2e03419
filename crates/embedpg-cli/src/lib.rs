//! Command-line runtime for the embedded `PostgreSQL` lifecycle.
//!
//! Leading configuration flags feed the layered [`Config`] loader; the rest
//! selects a subcommand:
//!
//! - `start` runs the engine in the foreground until a termination signal
//!   arrives, printing the connection string once it is ready.
//! - `status` reports whether an engine runs against the data directory.
//! - `fetch` downloads the binary bundle into the cache.

use std::ffi::OsString;
use std::io::Write;
use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::{Parser, Subcommand};
use embedpg_config::Config;

mod config;
mod errors;
mod operations;
mod shutdown;
pub mod telemetry;

use config::{ConfigLoader, OrthoConfigLoader, split_config_arguments};
pub(crate) use errors::AppError;
use operations::{Operations, SystemOperations};
pub use shutdown::ShutdownError;

/// Target used for CLI telemetry.
pub const CLI_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::cli");

#[derive(Debug, Parser)]
#[command(
    name = "embedpg",
    version,
    about = "Runs a disposable PostgreSQL engine from cached binaries",
    after_help = "Configuration flags such as --port or --data-path must precede the subcommand."
)]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
enum CliCommand {
    /// Start the engine and keep it running until interrupted.
    Start,
    /// Report whether the engine is running.
    Status,
    /// Download the binary bundle into the cache.
    Fetch,
}

/// Runs the CLI using the provided arguments and IO handles.
#[must_use]
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    run_with(args, stdout, stderr, &OrthoConfigLoader, &SystemOperations::new())
}

pub(crate) fn run_with<I, W, E, L, O>(
    args: I,
    stdout: &mut W,
    stderr: &mut E,
    loader: &L,
    operations: &O,
) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
    L: ConfigLoader,
    O: Operations,
{
    let args: Vec<OsString> = args.into_iter().collect();
    let split = split_config_arguments(&args);

    let cli = match Cli::try_parse_from(split.command_arguments(&args)) {
        Ok(cli) => cli,
        Err(error) if is_informational(error.kind()) => {
            let _ = write!(stdout, "{}", error.render());
            return ExitCode::SUCCESS;
        }
        Err(error) => return report(stderr, &AppError::CliUsage(error)),
    };

    let result = loader.load(&split.config_arguments).and_then(|config| {
        telemetry::initialise(&config)?;
        dispatch(cli.command, &config, operations, stdout)
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => report(stderr, &error),
    }
}

fn dispatch<O: Operations>(
    command: CliCommand,
    config: &Config,
    operations: &O,
    stdout: &mut dyn Write,
) -> Result<(), AppError> {
    match command {
        CliCommand::Start => operations.start(config, stdout),
        CliCommand::Status => operations.status(config, stdout),
        CliCommand::Fetch => operations.fetch(config, stdout),
    }
}

const fn is_informational(kind: ErrorKind) -> bool {
    matches!(kind, ErrorKind::DisplayHelp | ErrorKind::DisplayVersion)
}

fn report<E: Write>(stderr: &mut E, error: &AppError) -> ExitCode {
    let _ = writeln!(stderr, "{}", error.to_string().trim_end());
    ExitCode::FAILURE
}

#[cfg(test)]
mod tests;

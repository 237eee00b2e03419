//! Command-line entrypoint for running an embedded `PostgreSQL` engine.
//!
//! The binary delegates to [`embedpg_cli::run`], which loads configuration,
//! parses the subcommand and drives the engine lifecycle.

use std::io::{self, StderrLock, StdoutLock};
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stdout: StdoutLock<'_> = io::stdout().lock();
    let mut stderr: StderrLock<'_> = io::stderr().lock();
    embedpg_cli::run(std::env::args_os(), &mut stdout, &mut stderr)
}

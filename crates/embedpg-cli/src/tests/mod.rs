//! Unit tests for argument handling and subcommand dispatch.

use std::cell::{Cell, RefCell};
use std::ffi::OsString;
use std::io::Write;
use std::net::{Ipv4Addr, TcpListener};
use std::process::ExitCode;

use embedpg::PostgresError;
use embedpg_config::Config;
use rstest::{fixture, rstest};
use tempfile::TempDir;

use crate::config::ConfigLoader;
use crate::operations::{Operations, SystemOperations};
use crate::shutdown::{ShutdownError, ShutdownSignal};
use crate::{AppError, CliCommand, run_with};

/// Loader that records the forwarded flags and returns a fixed port.
#[derive(Default)]
struct StubLoader {
    seen: RefCell<Vec<OsString>>,
}

impl ConfigLoader for StubLoader {
    fn load(&self, args: &[OsString]) -> Result<Config, AppError> {
        self.seen.replace(args.to_vec());
        Ok(Config::default().with_port(6123))
    }
}

#[derive(Default)]
struct RecordingOperations {
    invoked: RefCell<Vec<(CliCommand, u16)>>,
    fail: bool,
}

impl RecordingOperations {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    fn record(
        &self,
        command: CliCommand,
        config: &Config,
        stdout: &mut dyn Write,
    ) -> Result<(), AppError> {
        self.invoked.borrow_mut().push((command, config.port()));
        if self.fail {
            return Err(AppError::Postgres(PostgresError::NotStarted));
        }
        writeln!(stdout, "{command:?} done").map_err(AppError::Output)
    }
}

impl Operations for RecordingOperations {
    fn start(&self, config: &Config, stdout: &mut dyn Write) -> Result<(), AppError> {
        self.record(CliCommand::Start, config, stdout)
    }

    fn status(&self, config: &Config, stdout: &mut dyn Write) -> Result<(), AppError> {
        self.record(CliCommand::Status, config, stdout)
    }

    fn fetch(&self, config: &Config, stdout: &mut dyn Write) -> Result<(), AppError> {
        self.record(CliCommand::Fetch, config, stdout)
    }
}

/// Shutdown signal that counts waits instead of blocking.
#[derive(Default)]
struct CountingShutdown {
    waits: Cell<usize>,
}

impl ShutdownSignal for CountingShutdown {
    fn wait(&self) -> Result<Option<std::os::raw::c_int>, ShutdownError> {
        self.waits.set(self.waits.get() + 1);
        Ok(None)
    }
}

struct Outcome {
    code: ExitCode,
    stdout: String,
    stderr: String,
}

fn invoke<L: ConfigLoader, O: Operations>(args: &[&str], loader: &L, operations: &O) -> Outcome {
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let code = run_with(
        args.iter().map(OsString::from),
        &mut stdout,
        &mut stderr,
        loader,
        operations,
    );
    Outcome {
        code,
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
    }
}

#[fixture]
fn loader() -> StubLoader {
    StubLoader::default()
}

#[rstest]
#[case("start", CliCommand::Start)]
#[case("status", CliCommand::Status)]
#[case("fetch", CliCommand::Fetch)]
fn subcommands_reach_their_operation(
    loader: StubLoader,
    #[case] subcommand: &str,
    #[case] expected: CliCommand,
) {
    let operations = RecordingOperations::default();
    let outcome = invoke(&["embedpg", subcommand], &loader, &operations);

    assert_eq!(outcome.code, ExitCode::SUCCESS);
    assert_eq!(*operations.invoked.borrow(), vec![(expected, 6123)]);
    assert_eq!(outcome.stdout, format!("{expected:?} done\n"));
    assert!(outcome.stderr.is_empty());
}

#[rstest]
fn configuration_flags_reach_the_loader_only(loader: StubLoader) {
    let operations = RecordingOperations::default();
    let outcome = invoke(
        &["embedpg", "--port", "7000", "--log-filter=debug", "status"],
        &loader,
        &operations,
    );

    assert_eq!(outcome.code, ExitCode::SUCCESS);
    let seen: Vec<String> = loader
        .seen
        .borrow()
        .iter()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect();
    assert_eq!(seen, ["embedpg", "--port", "7000", "--log-filter=debug"]);
}

#[rstest]
fn unknown_subcommand_fails_without_loading(loader: StubLoader) {
    let operations = RecordingOperations::default();
    let outcome = invoke(&["embedpg", "serve"], &loader, &operations);

    assert_eq!(outcome.code, ExitCode::FAILURE);
    assert!(outcome.stderr.contains("serve"), "{}", outcome.stderr);
    assert!(loader.seen.borrow().is_empty());
    assert!(operations.invoked.borrow().is_empty());
}

#[rstest]
fn help_goes_to_stdout_and_succeeds(loader: StubLoader) {
    let operations = RecordingOperations::default();
    let outcome = invoke(&["embedpg", "--help"], &loader, &operations);

    assert_eq!(outcome.code, ExitCode::SUCCESS);
    assert!(outcome.stdout.contains("fetch"), "{}", outcome.stdout);
    assert!(outcome.stderr.is_empty());
}

#[rstest]
fn operation_errors_are_reported_on_stderr(loader: StubLoader) {
    let operations = RecordingOperations::failing();
    let outcome = invoke(&["embedpg", "start"], &loader, &operations);

    assert_eq!(outcome.code, ExitCode::FAILURE);
    assert_eq!(outcome.stderr, "server has not been started\n");
}

/// Loader returning a configuration that points at an occupied port.
struct BusyPortLoader {
    dir: TempDir,
    port: u16,
}

impl ConfigLoader for BusyPortLoader {
    fn load(&self, _args: &[OsString]) -> Result<Config, AppError> {
        Ok(Config::default()
            .with_port(self.port)
            .with_cache_path(self.dir.path().join("cache")))
    }
}

#[test]
fn start_on_a_busy_port_never_waits_for_shutdown() {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).expect("bind");
    let loader = BusyPortLoader {
        dir: TempDir::new().expect("temp dir"),
        port: listener.local_addr().expect("addr").port(),
    };
    let operations = SystemOperations::with_shutdown(CountingShutdown::default());

    let outcome = invoke(&["embedpg", "start"], &loader, &operations);

    assert_eq!(outcome.code, ExitCode::FAILURE);
    assert!(
        outcome.stderr.contains("already listening on port"),
        "{}",
        outcome.stderr
    );
    assert_eq!(operations_waits(&operations), 0);
    assert!(!loader.dir.path().join("cache").exists());
}

fn operations_waits(operations: &SystemOperations<CountingShutdown>) -> usize {
    operations.shutdown().waits.get()
}

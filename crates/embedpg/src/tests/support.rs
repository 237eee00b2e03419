//! Recording doubles and fixtures shared by the test suites.

use std::fs;
use std::io::{self, Write};
use std::net::{Ipv4Addr, TcpListener};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use embedpg_config::PostgresVersion;
use xz2::write::XzEncoder;

use crate::cache::{CacheEntry, CacheKey};
use crate::connection::ConnectionTarget;
use crate::database::DatabaseCreator;
use crate::deadline::Deadline;
use crate::error::{AcquisitionError, BoxedError, CommandFailure, StartupStage};
use crate::extract::Extract;
use crate::fetch::RemoteFetch;
use crate::init::{InitDatabase, InitSettings};
use crate::log::BufferedLog;
use crate::platform::Platform;
use crate::process::{ControllerState, ServerControl, ServerSettings, ServerStatus, StatusReport};
use crate::readiness::HealthProbe;
use crate::PostgresError;

pub(crate) fn test_key() -> CacheKey {
    CacheKey::new(
        PostgresVersion::new("16.9.0"),
        Platform::new("linux", "amd64"),
    )
}

/// Port nothing listens on at the time of the call.
pub(crate) fn free_port() -> u16 {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).expect("bind ephemeral port");
    listener.local_addr().expect("local addr").port()
}

fn launch_failure(message: &str) -> CommandFailure {
    CommandFailure::Launch {
        source: io::Error::other(message.to_owned()),
    }
}

pub(crate) struct ArchiveMember {
    path: &'static str,
    content: &'static str,
    mode: u32,
}

impl ArchiveMember {
    pub(crate) const fn file(path: &'static str, content: &'static str) -> Self {
        Self {
            path,
            content,
            mode: 0o644,
        }
    }

    pub(crate) const fn executable(path: &'static str, content: &'static str) -> Self {
        Self {
            path,
            content,
            mode: 0o755,
        }
    }
}

/// Writes an xz-compressed tarball holding `members`.
pub(crate) fn write_txz(path: &Path, members: &[ArchiveMember]) {
    let file = fs::File::create(path).expect("create archive");
    let mut builder = tar::Builder::new(XzEncoder::new(file, 6));
    for member in members {
        let mut header = tar::Header::new_gnu();
        header.set_size(member.content.len() as u64);
        header.set_mode(member.mode);
        header.set_cksum();
        builder
            .append_data(&mut header, member.path, member.content.as_bytes())
            .expect("append archive member");
    }
    let encoder = builder.into_inner().expect("finish tar stream");
    encoder.finish().expect("finish xz stream");
}

/// Cloneable in-memory writer.
#[derive(Clone, Default)]
pub(crate) struct MemorySink(Arc<Mutex<Vec<u8>>>);

impl MemorySink {
    pub(crate) fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().expect("sink lock")).into_owned()
    }
}

impl Write for MemorySink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().expect("sink lock").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Fetcher that writes a placeholder archive and counts calls.
#[derive(Default)]
pub(crate) struct RecordingFetcher {
    calls: AtomicUsize,
    delay: Duration,
    missing: bool,
}

impl RecordingFetcher {
    pub(crate) fn slow() -> Self {
        Self {
            delay: Duration::from_millis(50),
            ..Self::default()
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            missing: true,
            ..Self::default()
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RemoteFetch for RecordingFetcher {
    fn fetch(&self, key: &CacheKey, entry: &CacheEntry) -> Result<(), AcquisitionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        thread::sleep(self.delay);
        if self.missing {
            return Err(AcquisitionError::VersionNotFound {
                version: key.version().to_string(),
                url: String::from("http://repo.invalid/missing.jar"),
            });
        }
        let parent = entry.path().parent().expect("entry parent");
        fs::create_dir_all(parent).expect("create cache dir");
        fs::write(entry.path(), b"archive").expect("write cache entry");
        Ok(())
    }
}

/// Extractor that creates `bin/` and counts calls.
#[derive(Default)]
pub(crate) struct RecordingExtractor {
    calls: AtomicUsize,
}

impl RecordingExtractor {
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Extract for RecordingExtractor {
    fn extract(&self, archive: &Path, destination: &Path) -> Result<(), AcquisitionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(archive.is_file(), "extract called before the archive was cached");
        thread::sleep(Duration::from_millis(20));
        fs::create_dir_all(destination.join("bin")).expect("create bin dir");
        Ok(())
    }
}

/// Initializer that writes a version marker, or fails with captured output.
pub(crate) struct RecordingInitializer {
    calls: AtomicUsize,
    marker: &'static str,
    fail: bool,
}

impl RecordingInitializer {
    pub(crate) const fn writing(marker: &'static str) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            marker,
            fail: false,
        }
    }

    pub(crate) const fn failing() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            marker: "",
            fail: true,
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl InitDatabase for RecordingInitializer {
    fn init(&self, settings: &InitSettings, log: &BufferedLog) -> Result<(), PostgresError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(
            !settings.data_path().exists(),
            "stale data directory should be removed before bootstrap"
        );
        if self.fail {
            log.append(b"initdb: error: could not create directory\n")
                .expect("append to log");
            return Err(PostgresError::InitializationFailed {
                command: String::from("initdb"),
                failure: launch_failure("exit status 1"),
                output: log.unflushed().unwrap_or_default(),
            });
        }
        fs::create_dir_all(settings.data_path()).expect("create data dir");
        fs::write(settings.data_path().join("PG_VERSION"), format!("{}\n", self.marker))
            .expect("write marker");
        log.append(b"Success. You can now start the database server\n")
            .expect("append to log");
        Ok(())
    }
}

/// How a [`FakeServer`] reacts to start requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum StartBehaviour {
    #[default]
    Succeed,
    FailToSpawn,
    TimeOut {
        leaves_running: bool,
    },
}

#[derive(Debug, Default)]
pub(crate) struct FakeServerState {
    pub(crate) running: bool,
    pub(crate) starts: usize,
    pub(crate) stops: usize,
    pub(crate) status_queries: usize,
    pub(crate) start_behaviour: StartBehaviour,
    pub(crate) fail_stop: bool,
    pub(crate) last_settings: Option<ServerSettings>,
}

/// In-memory server controller; clones share state.
#[derive(Clone, Default)]
pub(crate) struct FakeServer {
    state: Arc<Mutex<FakeServerState>>,
    lifecycle: Arc<Mutex<ControllerState>>,
}

impl FakeServer {
    pub(crate) fn with_start(behaviour: StartBehaviour) -> Self {
        let server = Self::default();
        server.inspect().start_behaviour = behaviour;
        server
    }

    pub(crate) fn failing_stop() -> Self {
        let server = Self::default();
        server.inspect().fail_stop = true;
        server
    }

    pub(crate) fn inspect(&self) -> MutexGuard<'_, FakeServerState> {
        self.state.lock().expect("fake server lock")
    }

    /// Simulates the server exiting behind the orchestrator's back.
    pub(crate) fn crash(&self) {
        self.inspect().running = false;
    }

    fn set_lifecycle(&self, state: ControllerState) {
        *self.lifecycle.lock().expect("lifecycle lock") = state;
    }
}

impl ServerControl for FakeServer {
    fn start(
        &mut self,
        settings: &ServerSettings,
        deadline: Deadline,
        log: &BufferedLog,
    ) -> Result<(), PostgresError> {
        let mut state = self.inspect();
        state.starts += 1;
        state.last_settings = Some(settings.clone());
        let behaviour = state.start_behaviour;
        match behaviour {
            StartBehaviour::Succeed => {
                state.running = true;
                drop(state);
                log.append(b"server started\n").expect("append to log");
                self.set_lifecycle(ControllerState::Running);
                Ok(())
            }
            StartBehaviour::FailToSpawn => {
                drop(state);
                self.set_lifecycle(ControllerState::NotRunning);
                Err(PostgresError::SpawnFailed {
                    command: String::from("pg_ctl start"),
                    failure: launch_failure("no such file"),
                    output: String::new(),
                })
            }
            StartBehaviour::TimeOut { leaves_running } => {
                state.running = leaves_running;
                drop(state);
                self.set_lifecycle(ControllerState::NotRunning);
                Err(PostgresError::StartupTimeout {
                    stage: StartupStage::ServerStart,
                    timeout: deadline.timeout(),
                    last_error: None,
                })
            }
        }
    }

    fn stop(&mut self, _settings: &ServerSettings, _log: &BufferedLog) -> Result<(), PostgresError> {
        let mut state = self.inspect();
        state.stops += 1;
        if state.fail_stop {
            return Err(PostgresError::StopFailed {
                command: String::from("pg_ctl stop"),
                failure: launch_failure("permission denied"),
                output: String::new(),
            });
        }
        state.running = false;
        drop(state);
        self.set_lifecycle(ControllerState::NotRunning);
        Ok(())
    }

    fn status(&self, _settings: &ServerSettings) -> Result<StatusReport, PostgresError> {
        let mut state = self.inspect();
        state.status_queries += 1;
        let status = if state.running {
            ServerStatus::Running { pid: 4242 }
        } else {
            ServerStatus::NotRunning
        };
        Ok(StatusReport {
            status,
            output: String::new(),
        })
    }

    fn state(&self) -> ControllerState {
        *self.lifecycle.lock().expect("lifecycle lock")
    }
}

/// Probe failing a fixed number of times before succeeding.
pub(crate) struct ScriptedProbe {
    failures_left: AtomicUsize,
    calls: AtomicUsize,
}

impl ScriptedProbe {
    pub(crate) const fn ready_after(failures: usize) -> Self {
        Self {
            failures_left: AtomicUsize::new(failures),
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) const fn never_ready() -> Self {
        Self::ready_after(usize::MAX)
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl HealthProbe for ScriptedProbe {
    fn probe(&self, _target: &ConnectionTarget) -> Result<(), BoxedError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures_left.load(Ordering::SeqCst);
        if remaining == 0 {
            return Ok(());
        }
        self.failures_left.store(remaining.saturating_sub(1), Ordering::SeqCst);
        Err("connection refused".into())
    }
}

/// Creator recording requested databases.
#[derive(Default)]
pub(crate) struct RecordingCreator {
    databases: Mutex<Vec<String>>,
    fail: bool,
}

impl RecordingCreator {
    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub(crate) fn databases(&self) -> Vec<String> {
        self.databases.lock().expect("creator lock").clone()
    }
}

impl DatabaseCreator for RecordingCreator {
    fn create(&self, target: &ConnectionTarget, _deadline: Deadline) -> Result<(), PostgresError> {
        self.databases
            .lock()
            .expect("creator lock")
            .push(target.database().to_owned());
        if self.fail {
            return Err(PostgresError::DatabaseCreationFailed {
                database: target.database().to_owned(),
                source: "permission denied to create database".into(),
            });
        }
        Ok(())
    }
}

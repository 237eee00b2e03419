//! Drives the production helper-command collaborators against a bundle of
//! shell scripts standing in for `initdb` and `pg_ctl`.
#![cfg(unix)]

use std::fs;
use std::io::{self, Write};
use std::net::{Ipv4Addr, TcpListener};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use embedpg::{
    AcquisitionError, AcquisitionLock, BoxedError, CacheEntry, CacheKey, Config,
    ConnectionTarget, DatabaseCreator, Deadline, EmbeddedPostgres, HealthProbe, Platform,
    PostgresError, RemoteFetch, ServerStatus,
};
use rstest::{fixture, rstest};
use tempfile::TempDir;
use xz2::write::XzEncoder;

const INITDB: &str = r#"#!/bin/sh
data=""
while [ $# -gt 0 ]; do
  case "$1" in -D) data="$2"; shift ;; esac
  shift
done
mkdir -p "$data" && printf '16\n' > "$data/PG_VERSION" && echo "Success. initdb done"
"#;

const PG_CTL: &str = r#"#!/bin/sh
cmd="$1"; shift
data=""
while [ $# -gt 0 ]; do
  case "$1" in -D) data="$2"; shift ;; esac
  shift
done
case "$cmd" in
  start) echo "$$" > "$data/postmaster.pid"; echo "server started" ;;
  stop) rm -f "$data/postmaster.pid"; echo "server stopped" ;;
  status)
    if [ -f "$data/postmaster.pid" ]; then
      echo "pg_ctl: server is running (PID: $(cat "$data/postmaster.pid"))"
      exit 0
    fi
    echo "pg_ctl: no server running"
    exit 3 ;;
esac
"#;

/// Fetcher producing an xz tarball of the scripts.
#[derive(Default)]
struct ScriptBundleFetcher {
    calls: AtomicUsize,
}

impl RemoteFetch for ScriptBundleFetcher {
    fn fetch(&self, _key: &CacheKey, entry: &CacheEntry) -> Result<(), AcquisitionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let write_error = |source: io::Error| AcquisitionError::CacheWrite {
            path: entry.path().to_path_buf(),
            source,
        };
        if let Some(parent) = entry.path().parent() {
            fs::create_dir_all(parent).map_err(write_error)?;
        }
        let file = fs::File::create(entry.path()).map_err(write_error)?;
        let mut builder = tar::Builder::new(XzEncoder::new(file, 6));
        for (name, script) in [("bin/initdb", INITDB), ("bin/pg_ctl", PG_CTL)] {
            let mut header = tar::Header::new_gnu();
            header.set_size(script.len() as u64);
            header.set_mode(0o755);
            header.set_cksum();
            builder
                .append_data(&mut header, name, script.as_bytes())
                .map_err(write_error)?;
        }
        builder
            .into_inner()
            .and_then(XzEncoder::finish)
            .map_err(write_error)?;
        Ok(())
    }
}

/// Probe that treats the pid file as readiness.
struct PidFileProbe {
    data: std::path::PathBuf,
}

impl HealthProbe for PidFileProbe {
    fn probe(&self, _target: &ConnectionTarget) -> Result<(), BoxedError> {
        if self.data.join("postmaster.pid").is_file() {
            Ok(())
        } else {
            Err("no pid file".into())
        }
    }
}

#[derive(Default)]
struct NamesCreated(Mutex<Vec<String>>);

impl DatabaseCreator for NamesCreated {
    fn create(&self, target: &ConnectionTarget, _deadline: Deadline) -> Result<(), PostgresError> {
        self.0
            .lock()
            .expect("creator lock")
            .push(target.database().to_owned());
        Ok(())
    }
}

#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().expect("sink lock")).into_owned()
    }
}

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().expect("sink lock").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct Bundle {
    dir: TempDir,
    fetcher: Arc<ScriptBundleFetcher>,
    creator: Arc<NamesCreated>,
    sink: Captured,
    port: u16,
}

impl Bundle {
    fn data(&self) -> std::path::PathBuf {
        self.dir.path().join("data")
    }

    fn instance(&self) -> EmbeddedPostgres {
        let config = Config::default()
            .with_port(self.port)
            .with_database("inventory")
            .with_cache_path(self.dir.path().join("cache"))
            .with_data_path(self.data())
            .with_start_timeout(std::time::Duration::from_secs(5));
        EmbeddedPostgres::builder(config)
            .with_platform(Platform::new("linux", "amd64"))
            .with_fetcher(self.fetcher.clone())
            .with_acquisition_lock(AcquisitionLock::new())
            .with_probe(Arc::new(PidFileProbe { data: self.data() }))
            .with_database_creator(self.creator.clone())
            .with_log_sink(self.sink.clone())
            .build()
    }
}

#[fixture]
fn bundle() -> Bundle {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).expect("bind");
    let port = listener.local_addr().expect("addr").port();
    Bundle {
        dir: TempDir::new().expect("temp dir"),
        fetcher: Arc::new(ScriptBundleFetcher::default()),
        creator: Arc::new(NamesCreated::default()),
        sink: Captured::default(),
        port,
    }
}

fn pid_file(data: &Path) -> bool {
    data.join("postmaster.pid").is_file()
}

#[rstest]
fn full_lifecycle_runs_the_bundled_scripts(bundle: Bundle) {
    let mut postgres = bundle.instance();

    postgres.start().expect("start");

    assert!(pid_file(&bundle.data()));
    assert_eq!(
        fs::read_to_string(bundle.data().join("PG_VERSION")).expect("marker"),
        "16\n"
    );
    assert!(matches!(
        postgres.status().expect("status"),
        ServerStatus::Running { .. }
    ));
    assert_eq!(
        *bundle.creator.0.lock().expect("creator lock"),
        vec![String::from("inventory")]
    );

    postgres.stop().expect("stop");

    assert!(!pid_file(&bundle.data()));
    let log = bundle.sink.text();
    assert!(log.contains("initdb done"), "{log}");
    assert!(log.contains("server started"), "{log}");
    assert!(log.contains("server stopped"), "{log}");
}

#[rstest]
fn second_run_reuses_binaries_and_data(bundle: Bundle) {
    {
        let mut first = bundle.instance();
        first.start().expect("first start");
        first.stop().expect("first stop");
    }
    fs::write(bundle.data().join("marker.txt"), "kept").expect("write marker");

    let mut second = bundle.instance();
    second.start().expect("second start");

    assert_eq!(bundle.fetcher.calls.load(Ordering::SeqCst), 1);
    assert!(bundle.data().join("marker.txt").exists());
    assert_eq!(bundle.creator.0.lock().expect("creator lock").len(), 1);
    second.stop().expect("second stop");
}

#[rstest]
fn dropping_the_instance_stops_the_scripted_server(bundle: Bundle) {
    let mut postgres = bundle.instance();
    postgres.start().expect("start");
    assert!(pid_file(&bundle.data()));

    drop(postgres);

    assert!(!pid_file(&bundle.data()));
}

//! Bootstraps a fresh cluster with `initdb`.

use std::ffi::OsString;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

use embedpg_config::Config;
use tracing::{info, warn};

use crate::PostgresError;
use crate::log::BufferedLog;
use crate::paths::{ResolvedPaths, executable};
use crate::process::{PROCESS_TARGET, describe, run_logged};

const PASSWORD_FILE: &str = "pwfile";

/// Inputs for bootstrapping one cluster.
#[derive(Clone, PartialEq, Eq)]
pub struct InitSettings {
    binaries: PathBuf,
    runtime: PathBuf,
    data: PathBuf,
    username: String,
    password: String,
    locale: Option<String>,
    encoding: Option<String>,
}

impl InitSettings {
    /// Derives bootstrap inputs from configuration and resolved directories.
    #[must_use]
    pub fn from_config(config: &Config, paths: &ResolvedPaths) -> Self {
        Self {
            binaries: paths.binaries_dir().to_path_buf(),
            runtime: paths.runtime_dir().to_path_buf(),
            data: paths.data_dir().to_path_buf(),
            username: config.username().to_owned(),
            password: config.password().to_owned(),
            locale: config.locale().map(str::to_owned),
            encoding: config.encoding().map(str::to_owned),
        }
    }

    /// Cluster data directory.
    #[must_use]
    pub fn data_path(&self) -> &Path {
        &self.data
    }

    /// Bootstrap role.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    fn password_file(&self) -> PathBuf {
        self.runtime.join(PASSWORD_FILE)
    }
}

impl fmt::Debug for InitSettings {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("InitSettings")
            .field("binaries", &self.binaries)
            .field("runtime", &self.runtime)
            .field("data", &self.data)
            .field("username", &self.username)
            .field("locale", &self.locale)
            .field("encoding", &self.encoding)
            .finish_non_exhaustive()
    }
}

/// Creates a cluster in an empty data directory.
pub trait InitDatabase: Send + Sync {
    /// Bootstraps the cluster described by `settings`.
    ///
    /// # Errors
    ///
    /// Returns [`PostgresError::InitializationFailed`] when the bootstrap
    /// command fails, with its captured output attached.
    fn init(&self, settings: &InitSettings, log: &BufferedLog) -> Result<(), PostgresError>;
}

/// [`InitDatabase`] backed by the bundled `initdb` executable.
#[derive(Debug, Clone, Copy, Default)]
pub struct InitDb;

impl InitDb {
    fn command(settings: &InitSettings, password_file: &Path) -> Command {
        let mut command = Command::new(executable(&settings.binaries, "initdb"));
        let mut password_arg = OsString::from("--pwfile=");
        password_arg.push(password_file);
        command
            .arg("-A")
            .arg("password")
            .arg("-U")
            .arg(&settings.username)
            .arg("-D")
            .arg(&settings.data)
            .arg(password_arg);
        if let Some(locale) = &settings.locale {
            command.arg(format!("--locale={locale}"));
        }
        if let Some(encoding) = &settings.encoding {
            command.arg(format!("--encoding={encoding}"));
        }
        command
    }
}

impl InitDatabase for InitDb {
    fn init(&self, settings: &InitSettings, log: &BufferedLog) -> Result<(), PostgresError> {
        let password_file = settings.password_file();
        write_password_file(&password_file, &settings.password).map_err(|source| {
            PostgresError::filesystem("write password file", &password_file, source)
        })?;
        let mut command = Self::command(settings, &password_file);
        info!(
            target: PROCESS_TARGET,
            data = %settings.data.display(),
            username = %settings.username,
            "initialising data directory"
        );
        let outcome = run_logged(&mut command, log, None);
        if let Err(error) = fs::remove_file(&password_file) {
            warn!(
                target: PROCESS_TARGET,
                path = %password_file.display(),
                %error,
                "failed to remove password file"
            );
        }
        outcome.map_err(|failure| PostgresError::InitializationFailed {
            command: describe(&command),
            failure,
            output: log.unflushed().unwrap_or_default(),
        })
    }
}

fn write_password_file(path: &Path, password: &str) -> io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(password.as_bytes())?;
    file.sync_all()
}

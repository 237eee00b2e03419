use std::io::Write;
use std::sync::Arc;

use embedpg_config::Config;

use super::instance::{Collaborators, EmbeddedPostgres};
use crate::acquire::{AcquisitionLock, BinaryAcquirer};
use crate::database::{DatabaseCreator, PostgresDatabaseCreator};
use crate::extract::{Extract, TarXzExtractor};
use crate::fetch::{MavenFetcher, RemoteFetch};
use crate::init::{InitDatabase, InitDb};
use crate::log::SharedSink;
use crate::platform::Platform;
use crate::process::{PgCtl, ServerControl};
use crate::readiness::{HealthProbe, PostgresProbe};

/// Assembles an [`EmbeddedPostgres`] with replaceable collaborators.
///
/// Anything not supplied falls back to the production implementation:
/// Maven downloads, tar.xz extraction, the process-wide acquisition lock,
/// `initdb`, `pg_ctl`, a `SELECT 1` probe and `CREATE DATABASE`.
pub struct EmbeddedPostgresBuilder {
    config: Config,
    platform: Option<Platform>,
    fetcher: Option<Arc<dyn RemoteFetch>>,
    extractor: Option<Arc<dyn Extract>>,
    lock: Option<AcquisitionLock>,
    initializer: Option<Arc<dyn InitDatabase>>,
    controller: Option<Box<dyn ServerControl>>,
    probe: Option<Arc<dyn HealthProbe>>,
    creator: Option<Arc<dyn DatabaseCreator>>,
    sink: Option<SharedSink>,
}

impl EmbeddedPostgresBuilder {
    pub(crate) fn new(config: Config) -> Self {
        Self {
            config,
            platform: None,
            fetcher: None,
            extractor: None,
            lock: None,
            initializer: None,
            controller: None,
            probe: None,
            creator: None,
            sink: None,
        }
    }

    /// Overrides the host platform used to pick a bundle.
    #[must_use]
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Replaces the remote fetch collaborator.
    #[must_use]
    pub fn with_fetcher(mut self, fetcher: Arc<dyn RemoteFetch>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Replaces the decompression collaborator.
    #[must_use]
    pub fn with_extractor(mut self, extractor: Arc<dyn Extract>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Serialises acquisition on `lock` instead of the process-wide lock.
    #[must_use]
    pub fn with_acquisition_lock(mut self, lock: AcquisitionLock) -> Self {
        self.lock = Some(lock);
        self
    }

    /// Replaces the bootstrap collaborator.
    #[must_use]
    pub fn with_initializer(mut self, initializer: Arc<dyn InitDatabase>) -> Self {
        self.initializer = Some(initializer);
        self
    }

    /// Replaces the server process controller.
    #[must_use]
    pub fn with_server_control(mut self, controller: Box<dyn ServerControl>) -> Self {
        self.controller = Some(controller);
        self
    }

    /// Replaces the readiness probe.
    #[must_use]
    pub fn with_probe(mut self, probe: Arc<dyn HealthProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Replaces the database creator.
    #[must_use]
    pub fn with_database_creator(mut self, creator: Arc<dyn DatabaseCreator>) -> Self {
        self.creator = Some(creator);
        self
    }

    /// Sends engine output to `sink` instead of `tracing`.
    #[must_use]
    pub fn with_log_sink(self, sink: impl Write + Send + 'static) -> Self {
        self.with_shared_sink(SharedSink::new(sink))
    }

    /// Sends engine output to an already shared sink.
    #[must_use]
    pub fn with_shared_sink(mut self, sink: SharedSink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Finishes the instance. Nothing runs until [`EmbeddedPostgres::start`].
    #[must_use]
    pub fn build(self) -> EmbeddedPostgres {
        let fetcher = self.fetcher.unwrap_or_else(|| {
            Arc::new(MavenFetcher::new(self.config.binary_repository_url()))
        });
        let extractor = self
            .extractor
            .unwrap_or_else(|| Arc::new(TarXzExtractor));
        let lock = self.lock.unwrap_or_else(AcquisitionLock::process_wide);
        EmbeddedPostgres::assemble(
            self.config,
            self.platform.unwrap_or_else(Platform::current),
            Collaborators {
                acquirer: BinaryAcquirer::new(fetcher, extractor, lock),
                initializer: self.initializer.unwrap_or_else(|| Arc::new(InitDb)),
                controller: self
                    .controller
                    .unwrap_or_else(|| Box::new(PgCtl::new())),
                probe: self
                    .probe
                    .unwrap_or_else(|| Arc::new(PostgresProbe::new())),
                creator: self
                    .creator
                    .unwrap_or_else(|| Arc::new(PostgresDatabaseCreator)),
                sink: self.sink.unwrap_or_default(),
            },
        )
    }
}

impl std::fmt::Debug for EmbeddedPostgresBuilder {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("EmbeddedPostgresBuilder")
            .field("config", &self.config)
            .field("platform", &self.platform)
            .finish_non_exhaustive()
    }
}

//! Polls a started server until it accepts queries.

use std::thread;
use std::time::Duration;

use postgres::NoTls;
use tracing::{debug, info};

use crate::PostgresError;
use crate::connection::ConnectionTarget;
use crate::deadline::Deadline;
use crate::error::{BoxedError, StartupStage};
use crate::lifecycle::LIFECYCLE_TARGET;

/// Delay between readiness probes.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Runs one readiness check.
pub trait HealthProbe: Send + Sync {
    /// Succeeds when `target` answers a trivial query.
    ///
    /// # Errors
    ///
    /// Returns the connection or query failure.
    fn probe(&self, target: &ConnectionTarget) -> Result<(), BoxedError>;
}

/// Connects with the `postgres` client and runs `SELECT 1`.
#[derive(Debug, Clone, Copy)]
pub struct PostgresProbe {
    connect_timeout: Duration,
}

impl PostgresProbe {
    /// Probe with a one second connect timeout.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            connect_timeout: CONNECT_TIMEOUT,
        }
    }
}

impl Default for PostgresProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthProbe for PostgresProbe {
    fn probe(&self, target: &ConnectionTarget) -> Result<(), BoxedError> {
        let mut client = target.client_config(self.connect_timeout).connect(NoTls)?;
        client.simple_query("SELECT 1")?;
        client.close()?;
        Ok(())
    }
}

/// Probes `target` every [`POLL_INTERVAL`] until it answers or `deadline`
/// expires.
///
/// # Errors
///
/// Returns [`PostgresError::StartupTimeout`] carrying the last probe error.
pub fn wait_until_ready(
    probe: &dyn HealthProbe,
    target: &ConnectionTarget,
    deadline: Deadline,
) -> Result<(), PostgresError> {
    let mut attempts: u32 = 0;
    loop {
        attempts += 1;
        let last_error = match probe.probe(target) {
            Ok(()) => {
                info!(
                    target: LIFECYCLE_TARGET,
                    port = target.port(),
                    attempts,
                    "database is ready"
                );
                return Ok(());
            }
            Err(error) => error.to_string(),
        };
        debug!(target: LIFECYCLE_TARGET, attempts, error = %last_error, "database not ready");
        if deadline.expired() {
            return Err(PostgresError::StartupTimeout {
                stage: StartupStage::Readiness,
                timeout: deadline.timeout(),
                last_error: Some(last_error),
            });
        }
        thread::sleep(POLL_INTERVAL.min(deadline.remaining()));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use mockall::mock;

    use super::*;

    mock! {
        Probe {}
        impl HealthProbe for Probe {
            fn probe(&self, target: &ConnectionTarget) -> Result<(), BoxedError>;
        }
    }

    fn target() -> ConnectionTarget {
        ConnectionTarget::new(5432, "postgres", "postgres", "postgres")
    }

    #[test]
    fn returns_once_probe_succeeds() {
        let calls = AtomicU32::new(0);
        let mut probe = MockProbe::new();
        probe.expect_probe().times(3).returning(move |_| {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err("connection refused".into())
            } else {
                Ok(())
            }
        });

        wait_until_ready(&probe, &target(), Deadline::after(Duration::from_secs(5)))
            .expect("ready on third probe");
    }

    #[test]
    fn expiry_reports_last_probe_error() {
        let mut probe = MockProbe::new();
        probe
            .expect_probe()
            .returning(|_| Err("the database system is starting up".into()));

        let result = wait_until_ready(
            &probe,
            &target(),
            Deadline::after(Duration::from_millis(250)),
        );

        let Err(PostgresError::StartupTimeout {
            stage, last_error, ..
        }) = result
        else {
            panic!("expected a readiness timeout");
        };
        assert_eq!(stage, StartupStage::Readiness);
        assert_eq!(
            last_error.as_deref(),
            Some("the database system is starting up")
        );
    }

    #[test]
    fn expired_deadline_still_probes_once() {
        let mut probe = MockProbe::new();
        probe.expect_probe().times(1).returning(|_| Ok(()));
        wait_until_ready(&probe, &target(), Deadline::after(Duration::ZERO))
            .expect("probe succeeds immediately");
    }
}

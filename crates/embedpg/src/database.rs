//! Creates the application database on a freshly initialised cluster.

use postgres::NoTls;
use tracing::info;

use crate::PostgresError;
use crate::connection::ConnectionTarget;
use crate::deadline::Deadline;
use crate::lifecycle::LIFECYCLE_TARGET;

/// Database every cluster has after bootstrap.
pub const MAINTENANCE_DATABASE: &str = "postgres";

/// Creates the database named by a connection target.
pub trait DatabaseCreator: Send + Sync {
    /// Creates `target.database()`.
    ///
    /// # Errors
    ///
    /// Returns [`PostgresError::DatabaseCreationFailed`] on connection or
    /// statement failure.
    fn create(&self, target: &ConnectionTarget, deadline: Deadline) -> Result<(), PostgresError>;
}

/// Issues `CREATE DATABASE` through the maintenance database.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDatabaseCreator;

impl DatabaseCreator for PostgresDatabaseCreator {
    fn create(&self, target: &ConnectionTarget, deadline: Deadline) -> Result<(), PostgresError> {
        let database = target.database();
        if database == MAINTENANCE_DATABASE {
            return Ok(());
        }
        let failure = |source: postgres::Error| PostgresError::DatabaseCreationFailed {
            database: database.to_owned(),
            source: Box::new(source),
        };
        let admin = target.with_database(MAINTENANCE_DATABASE);
        let connect_timeout = deadline.remaining().max(std::time::Duration::from_secs(1));
        let mut client = admin
            .client_config(connect_timeout)
            .connect(NoTls)
            .map_err(failure)?;
        client
            .batch_execute(&create_statement(database))
            .map_err(failure)?;
        info!(target: LIFECYCLE_TARGET, database, "application database created");
        Ok(())
    }
}

/// `CREATE DATABASE` with the name as a quoted identifier.
#[must_use]
pub fn create_statement(database: &str) -> String {
    format!("CREATE DATABASE \"{}\"", database.replace('"', "\"\""))
}

//! Client connection parameters for a running instance.

use std::fmt;
use std::time::Duration;

use embedpg_config::Config;

/// Host the engine listens on.
pub const LOCALHOST: &str = "localhost";

/// Where and as whom to connect to an instance.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionTarget {
    port: u16,
    username: String,
    password: String,
    database: String,
}

impl ConnectionTarget {
    /// Target for `database` on `localhost:port`.
    pub fn new(
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            port,
            username: username.into(),
            password: password.into(),
            database: database.into(),
        }
    }

    /// Target for the configured application database.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.port(),
            config.username(),
            config.password(),
            config.database(),
        )
    }

    /// Same server and credentials, different database.
    #[must_use]
    pub fn with_database(&self, database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            ..self.clone()
        }
    }

    /// Listening port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Role name.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Database name.
    #[must_use]
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Client configuration for the `postgres` crate.
    #[must_use]
    pub fn client_config(&self, connect_timeout: Duration) -> postgres::Config {
        let mut config = postgres::Config::new();
        config
            .host(LOCALHOST)
            .port(self.port)
            .user(&self.username)
            .password(&self.password)
            .dbname(&self.database)
            .connect_timeout(connect_timeout);
        config
    }

    /// libpq keyword/value connection string with TLS disabled.
    #[must_use]
    pub fn connection_string(&self) -> String {
        format!(
            "host={LOCALHOST} port={} user={} password={} dbname={} sslmode=disable",
            self.port,
            quote_value(&self.username),
            quote_value(&self.password),
            quote_value(&self.database),
        )
    }
}

impl fmt::Debug for ConnectionTarget {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ConnectionTarget")
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .finish()
    }
}

fn quote_value(value: &str) -> String {
    if !value.is_empty() && !value.contains([' ', '\'', '\\', '\t', '\n']) {
        return value.to_owned();
    }
    let escaped = value.replace('\\', r"\\").replace('\'', r"\'");
    format!("'{escaped}'")
}

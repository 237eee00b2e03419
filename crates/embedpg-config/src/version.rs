//! Engine versions published as embeddable binary bundles.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A `PostgreSQL` release identifier such as `16.9.0`.
///
/// The value is compared against the `PG_VERSION` marker of an existing
/// data directory, which only records the major version. A data directory
/// is therefore compatible with every minor release of the same major.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct PostgresVersion(String);

impl PostgresVersion {
    /// Latest 17.x bundle.
    pub const V17: &'static str = "17.5.0";
    /// Latest 16.x bundle.
    pub const V16: &'static str = "16.9.0";
    /// Latest 15.x bundle.
    pub const V15: &'static str = "15.13.0";
    /// Latest 14.x bundle.
    pub const V14: &'static str = "14.18.0";
    /// Latest 13.x bundle.
    pub const V13: &'static str = "13.21.0";
    /// Latest 12.x bundle.
    pub const V12: &'static str = "12.22.0";

    /// Wraps a version string without validation.
    #[must_use]
    pub fn new(version: impl Into<String>) -> Self {
        Self(version.into())
    }

    /// Borrows the version text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Leading numeric component, e.g. `16` for `16.9.0`.
    #[must_use]
    pub fn major(&self) -> &str {
        self.0.split('.').next().unwrap_or_default()
    }
}

impl Default for PostgresVersion {
    fn default() -> Self {
        Self::new(Self::V16)
    }
}

impl fmt::Display for PostgresVersion {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

impl FromStr for PostgresVersion {
    type Err = std::convert::Infallible;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(value.trim()))
    }
}

impl AsRef<str> for PostgresVersion {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

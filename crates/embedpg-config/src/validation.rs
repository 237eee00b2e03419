//! Sanity checks applied before any lifecycle step runs.

use thiserror::Error;

use crate::Config;

/// Configuration values that cannot drive an engine instance.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Port zero would let the OS pick a port the caller cannot know.
    #[error("port must be between 1 and 65535")]
    InvalidPort,
    /// A zero timeout fails every start before it begins.
    #[error("start timeout must be greater than zero")]
    ZeroStartTimeout,
    /// A start parameter was not of the form `key=value`.
    #[error("start parameter '{entry}' must be of the form key=value")]
    MalformedStartParameter {
        /// The offending entry.
        entry: String,
    },
    /// The credentials would produce an unusable bootstrap role.
    #[error("username must not be empty")]
    EmptyUsername,
}

impl Config {
    /// Checks the configuration for values that cannot start an engine.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] encountered.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port() == 0 {
            return Err(ConfigError::InvalidPort);
        }
        if self.start_timeout().is_zero() {
            return Err(ConfigError::ZeroStartTimeout);
        }
        if self.username().is_empty() {
            return Err(ConfigError::EmptyUsername);
        }
        if let Some(entry) = self
            .start_parameters
            .iter()
            .find(|entry| parse_parameter(entry).is_none())
        {
            return Err(ConfigError::MalformedStartParameter {
                entry: entry.clone(),
            });
        }
        Ok(())
    }
}

pub(crate) fn parse_parameter(entry: &str) -> Option<(&str, &str)> {
    let (key, value) = entry.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key, value.trim()))
}

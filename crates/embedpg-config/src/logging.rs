//! Output formats for CLI telemetry and the engine lines it relays.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// How the CLI renders its own events and the `embedpg::postgres` lines
/// copied from the engine log.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// Flattened JSON objects, one per event, for log collectors.
    #[default]
    Json,
    /// One line per event.
    Compact,
    /// Multi-line events with source locations, for watching a start by hand.
    Pretty,
}

impl LogFormat {
    /// Whether events carry the emitting file and line.
    #[must_use]
    pub const fn shows_source_location(self) -> bool {
        matches!(self, Self::Pretty)
    }
}

/// Errors encountered while parsing a [`LogFormat`] from text.
pub type LogFormatParseError = strum::ParseError;

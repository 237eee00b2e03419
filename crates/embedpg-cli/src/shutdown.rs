//! Holds a foreground `start` open until the operator ends it.
//!
//! Any of [`STOP_SIGNALS`] ends the wait; the caller then stops the engine
//! with a fast shutdown so the data directory is left consistent.

use std::io;
use std::os::raw::c_int;

use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::Signals;
use thiserror::Error;

/// Signals that stop a foreground engine: supervisor termination, Ctrl-C,
/// Ctrl-\ and a closed terminal.
pub(crate) const STOP_SIGNALS: [c_int; 4] = [SIGTERM, SIGINT, SIGQUIT, SIGHUP];

/// Source of the request to stop a foreground engine.
pub(crate) trait ShutdownSignal {
    /// Blocks until the engine should be stopped, returning the signal
    /// number when one was delivered.
    fn wait(&self) -> Result<Option<c_int>, ShutdownError>;
}

/// Failure to listen for stop requests.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// Registering the stop signal handlers failed.
    #[error("cannot listen for stop signals, engine left without a shutdown path: {source}")]
    Register {
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
}

/// Waits for one of [`STOP_SIGNALS`] to reach the process.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct SystemShutdownSignal;

impl ShutdownSignal for SystemShutdownSignal {
    fn wait(&self) -> Result<Option<c_int>, ShutdownError> {
        let mut signals =
            Signals::new(STOP_SIGNALS).map_err(|source| ShutdownError::Register { source })?;
        Ok(signals.forever().next())
    }
}

pub(crate) const fn signal_label(signal: c_int) -> &'static str {
    match signal {
        SIGTERM => "SIGTERM",
        SIGINT => "SIGINT",
        SIGQUIT => "SIGQUIT",
        SIGHUP => "SIGHUP",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_stop_signal_has_a_label() {
        for signal in STOP_SIGNALS {
            assert_ne!(signal_label(signal), "unknown");
        }
        assert_eq!(signal_label(SIGINT), "SIGINT");
    }
}

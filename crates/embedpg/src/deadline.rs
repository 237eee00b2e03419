//! Shared start deadline threaded through process start and readiness.

use std::time::{Duration, Instant};

/// Point in time after which startup gives up.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    timeout: Duration,
}

impl Deadline {
    /// Starts a deadline that expires `timeout` from now.
    #[must_use]
    pub fn after(timeout: Duration) -> Self {
        Self {
            started: Instant::now(),
            timeout,
        }
    }

    /// Total budget this deadline was created with.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Time left before expiry, saturating at zero.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.timeout.saturating_sub(self.started.elapsed())
    }

    /// Whether the budget is used up.
    #[must_use]
    pub fn expired(&self) -> bool {
        self.remaining().is_zero()
    }
}

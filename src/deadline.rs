// Deadline: a point in time a caller is no longer willing to wait past,
// threaded into the execution and refresh hot path so a slow backing Store
// can't hang a request indefinitely.
//
// ## Rust Learning Notes:
//
// ### `tokio::time::Instant` over `std::time::Instant`
// The refresh/background-ticker code already runs on the Tokio clock
// (`tokio::time::interval_at`); using the same clock here means a deadline
// constructed in a test with `tokio::time::pause()` advances consistently
// with everything else measuring elapsed time, rather than drifting against
// a second, unrelated wall clock.

use tokio::time::{Duration, Instant};

use crate::{Error, Result};

/// A single point in time a caller-issued request must complete by.
/// `Option<Deadline>` is threaded through the call chain rather than a bare
/// `Deadline`, since not every caller (the bundled admin CLI, most unit
/// tests) wants to opt into one.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    /// A deadline `timeout` from now.
    pub fn after(timeout: Duration) -> Self {
        Deadline { at: Instant::now() + timeout }
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.at
    }

    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    /// Returns `Err(Error::DeadlineExceeded)` once the deadline has passed,
    /// `Ok(())` otherwise. Called at the boundaries between awaits on the
    /// execution/refresh hot path rather than inside every individual Store
    /// method — see `DESIGN.md` for the scoping decision.
    pub fn check(&self) -> Result<()> {
        if self.is_expired() {
            Err(Error::DeadlineExceeded)
        } else {
            Ok(())
        }
    }
}

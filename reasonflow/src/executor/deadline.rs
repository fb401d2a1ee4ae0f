//! Wall-clock bound for one executor run.

use crate::core::Failure;
use std::time::Duration;
use tokio::time::Instant;

/// A wall-clock limit measured from the moment a run starts.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    limit: Duration,
}

impl Deadline {
    /// Starts the clock now.
    #[must_use]
    pub fn start(limit: Duration) -> Self {
        Self {
            started: Instant::now(),
            limit,
        }
    }

    /// Time since the run started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Time left before the limit, zero once expired.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.limit.saturating_sub(self.elapsed())
    }

    /// Returns true once the limit is reached.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.elapsed() >= self.limit
    }

    /// Gets the configured limit.
    #[must_use]
    pub const fn limit(&self) -> Duration {
        self.limit
    }

    /// Fails with a termination error carrying `last_observation` once expired.
    pub fn check(&self, last_observation: Option<&str>) -> Result<(), Failure> {
        if !self.is_expired() {
            return Ok(());
        }
        Err(Failure::termination(format!(
            "wall-clock limit of {:.1}s exceeded after {:.1}s",
            self.limit.as_secs_f64(),
            self.elapsed().as_secs_f64()
        ))
        .with_partial(serde_json::json!({ "last_observation": last_observation })))
    }
}

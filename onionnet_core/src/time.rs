//! Functions to work with time

use std::time::{Duration, Instant};

/// Returns an `Instant` corresponding to "now". Respects paused tokio time.
pub fn clock_now() -> Instant {
    tokio::time::Instant::now().into_std()
}

/// Returns the amount of time elapsed since `since`.
pub fn clock_elapsed(since: Instant) -> Duration {
    clock_now().saturating_duration_since(since)
}

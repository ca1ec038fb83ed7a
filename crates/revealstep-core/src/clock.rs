#![forbid(unsafe_code)]

//! Host-driven time.

use core::time::Duration;

/// Deterministic monotonic clock controlled by the host.
///
/// The engine never reads wall-clock time; the host sets or advances this
/// clock before asking the engine to fire deferred work.
#[derive(Debug, Default, Clone)]
pub struct DeterministicClock {
    now: Duration,
}

impl DeterministicClock {
    /// Create a clock starting at `0`.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            now: Duration::ZERO,
        }
    }

    /// Set current monotonic time. Moving backwards is ignored.
    pub fn set(&mut self, now: Duration) {
        self.now = self.now.max(now);
    }

    /// Advance monotonic time by `dt`.
    pub fn advance(&mut self, dt: Duration) {
        self.now = self.now.saturating_add(dt);
    }

    #[must_use]
    pub const fn now(&self) -> Duration {
        self.now
    }
}

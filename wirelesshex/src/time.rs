//! Clock abstraction for the polling state machines.
//!
//! The session loops block on "packet ready, line ready, or deadline"; the
//! deadline side comes from a [`Clock`] so tests can drive timeouts
//! deterministically instead of sleeping.

use std::time::Instant;

/// Source of monotonic time.
pub trait Clock {
    /// Current instant.
    fn now(&self) -> Instant;
}

/// The process monotonic clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

//! Platform abstraction trait definitions.

use std::fmt::Debug;
use std::time::{Duration, Instant};

/// A monotonic clock used to timestamp region start and stop events.
///
/// Implementations must be cheap to call, as the clock is read twice for every
/// region that is entered and left.
#[cfg_attr(test, mockall::automock)]
pub(crate) trait Clock: Debug + Send + Sync + 'static {
    /// Returns the current reading of the clock.
    fn now(&self) -> Instant;

    /// Time elapsed since `start`, according to this clock.
    fn elapsed(&self, start: Instant) -> Duration {
        self.difference(start, self.now())
    }

    /// Time between two readings of this clock.
    ///
    /// Returns zero if `end` is earlier than `start`.
    fn difference(&self, start: Instant, end: Instant) -> Duration {
        end.saturating_duration_since(start)
    }
}

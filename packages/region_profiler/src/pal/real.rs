//! Real clock implementation backed by the operating system monotonic clock.

use std::time::Instant;

use crate::pal::Clock;

/// Reads time via `std::time::Instant`.
#[derive(Clone, Debug)]
pub(crate) struct RealClock;

impl Clock for RealClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

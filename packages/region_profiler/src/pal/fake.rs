//! Fake clock implementation for testing.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::pal::Clock;

#[derive(Debug)]
struct FakeClockState {
    origin: Instant,
    offset: Duration,
}

/// Clock that only moves when a test tells it to.
///
/// Clones share the same underlying time, so a test can keep one clone and advance
/// time while the code under test reads from another.
#[derive(Clone, Debug)]
pub(crate) struct FakeClock {
    state: Arc<Mutex<FakeClockState>>,
}

impl FakeClock {
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeClockState {
                origin: Instant::now(),
                offset: Duration::ZERO,
            })),
        }
    }

    /// Moves the clock forward, affecting all clones.
    pub(crate) fn advance(&self, duration: Duration) {
        let mut state = self.state.lock();

        state.offset = state
            .offset
            .checked_add(duration)
            .expect("fake clock advanced beyond Duration::MAX - this indicates a broken test");
    }

    /// Moves the clock forward by a number of milliseconds.
    pub(crate) fn advance_millis(&self, millis: u64) {
        self.advance(Duration::from_millis(millis));
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        let state = self.state.lock();

        state.origin + state.offset
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn does_not_move_by_itself() {
        let clock = FakeClock::new();

        let first = clock.now();
        std::thread::sleep(Duration::from_millis(2));

        assert_eq!(clock.now(), first);
    }

    #[test]
    fn clones_share_time() {
        let clock1 = FakeClock::new();
        let clock2 = clock1.clone();

        let start = clock2.now();
        clock1.advance_millis(150);

        assert_eq!(clock2.elapsed(start), Duration::from_millis(150));
    }

    #[test]
    fn advances_from_other_threads_are_visible() {
        let clock = FakeClock::new();
        let start = clock.now();

        std::thread::scope(|s| {
            s.spawn(|| clock.advance(Duration::from_nanos(250)));
        });

        assert_eq!(clock.elapsed(start), Duration::from_nanos(250));
    }

    #[test]
    fn difference_saturates_when_reversed() {
        let clock = FakeClock::new();

        let earlier = clock.now();
        clock.advance_millis(5);
        let later = clock.now();

        assert_eq!(clock.difference(later, earlier), Duration::ZERO);
        assert_eq!(clock.difference(earlier, later), Duration::from_millis(5));
    }
}

//! Clock facade for switching between real and test implementations.

use std::time::Instant;

#[cfg(test)]
use std::sync::Arc;

#[cfg(test)]
use parking_lot::Mutex;

#[cfg(test)]
use crate::pal::{FakeClock, MockClock};
use crate::pal::{Clock, RealClock};

/// Dispatches clock reads to the real clock or, in tests, to a fake or mock clock.
#[derive(Clone, Debug)]
pub(crate) enum ClockFacade {
    Real(RealClock),

    #[cfg(test)]
    Fake(FakeClock),

    #[cfg(test)]
    Mock(Arc<Mutex<MockClock>>),
}

impl ClockFacade {
    pub(crate) const fn real() -> Self {
        Self::Real(RealClock)
    }

    #[cfg(test)]
    pub(crate) fn fake(clock: FakeClock) -> Self {
        Self::Fake(clock)
    }

    #[cfg(test)]
    pub(crate) fn mock(clock: MockClock) -> Self {
        Self::Mock(Arc::new(Mutex::new(clock)))
    }
}

impl Clock for ClockFacade {
    fn now(&self) -> Instant {
        match self {
            Self::Real(clock) => clock.now(),
            #[cfg(test)]
            Self::Fake(clock) => clock.now(),
            #[cfg(test)]
            Self::Mock(clock) => clock.lock().now(),
        }
    }
}

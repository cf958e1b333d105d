//! Platform abstraction layer for the monotonic clock.
//!
//! This allows switching between the real clock (`std::time::Instant`) and fake
//! or mock clocks for testing purposes.

mod abstractions;
mod facade;
#[cfg(test)]
mod fake;
mod real;

pub(crate) use abstractions::*;
pub(crate) use facade::*;
#[cfg(test)]
pub(crate) use fake::*;
pub(crate) use real::*;

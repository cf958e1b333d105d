//! A process-wide default registry for programs that do not want to pass one around.
//!
//! Every thread lazily creates its own profiler in a thread-local slot, so the free functions
//! never synchronize with other threads. When a thread exits, its profiler is stopped and its
//! summary is published to a process-wide list, from which [`produce_report()`] reads.

use std::cell::RefCell;
use std::num::NonZero;
use std::thread;

use parking_lot::Mutex;
use tracing::debug;

use crate::pal::ClockFacade;
use crate::registry::{ThreadSummary, reduce};
use crate::registry_builder::DEFAULT_ROOT_NAME;
use crate::{Error, Profiler, Report, Result};

/// Summaries of the threads that have exited after using the default registry.
///
/// Only locked when a thread exits and when a report is produced.
static FINISHED: Mutex<Vec<ThreadSummary>> = Mutex::new(Vec::new());

thread_local! {
    /// The profiler of the current thread, created on first use.
    static LOCAL_PROFILER: ThreadProfiler = const {
        ThreadProfiler {
            profiler: RefCell::new(None),
        }
    };
}

#[derive(Debug)]
struct ThreadProfiler {
    profiler: RefCell<Option<Profiler>>,
}

impl ThreadProfiler {
    fn with<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut Profiler) -> R,
    {
        let mut slot = self.profiler.borrow_mut();

        let profiler = slot.get_or_insert_with(|| {
            let mut profiler = Profiler::new(DEFAULT_ROOT_NAME);
            profiler
                .start()
                .expect("a newly created profiler is never already started");

            debug!(
                thread = ?thread::current().id(),
                "started default profiler for thread"
            );

            profiler
        });

        f(profiler)
    }

    fn capture(&self) -> Option<ThreadSummary> {
        self.profiler
            .borrow_mut()
            .as_mut()
            .map(ThreadSummary::capture)
    }
}

impl Drop for ThreadProfiler {
    fn drop(&mut self) {
        if let Some(profiler) = self.profiler.get_mut() {
            FINISHED.lock().push(ThreadSummary::capture(profiler));
        }
    }
}

/// Steps down into the sub-region `name` on the current thread's default profiler.
///
/// The profiler is created and started on first use by each thread.
///
/// # Errors
///
/// See [`Profiler::enter()`].
///
/// # Examples
///
/// ```
/// # fn main() -> region_profiler::Result<()> {
/// region_profiler::enter("load")?;
/// std::hint::black_box((0..1000).sum::<u64>());
/// region_profiler::leave()?;
/// # Ok(())
/// # }
/// ```
pub fn enter(name: &str) -> Result<()> {
    LOCAL_PROFILER.with(|local| local.with(|profiler| profiler.enter(name)))
}

/// Steps down through several nested sub-regions on the current thread's default profiler.
///
/// # Errors
///
/// See [`Profiler::enter_path()`].
pub fn enter_path(names: &[&str]) -> Result<()> {
    LOCAL_PROFILER.with(|local| local.with(|profiler| profiler.enter_path(names)))
}

/// Steps up one level on the current thread's default profiler.
///
/// # Errors
///
/// See [`Profiler::leave()`].
pub fn leave() -> Result<()> {
    LOCAL_PROFILER.with(|local| local.with(Profiler::leave))
}

/// Steps up `n` levels on the current thread's default profiler.
///
/// # Errors
///
/// See [`Profiler::leave_n()`].
pub fn leave_n(n: usize) -> Result<()> {
    LOCAL_PROFILER.with(|local| local.with(|profiler| profiler.leave_n(n)))
}

/// Runs `f` inside the sub-region `name` of the current thread's default profiler.
///
/// `f` may use the free functions to enter nested regions, as long as it returns to the region
/// it was called in.
///
/// # Errors
///
/// See [`LocalProfiler::measure()`][crate::LocalProfiler::measure].
pub fn measure<F, R>(name: &str, f: F) -> Result<R>
where
    F: FnOnce() -> R,
{
    let region = LOCAL_PROFILER.with(|local| {
        local.with(|profiler| {
            profiler.enter(name)?;
            Ok::<_, Error>(profiler.current_region())
        })
    })?;

    let result = f();

    LOCAL_PROFILER.with(|local| {
        local.with(|profiler| {
            if profiler.current_region() != region {
                return Err(Error::UnbalancedRegion {
                    region: name.to_string(),
                });
            }
            profiler.leave()
        })
    })?;

    Ok(result)
}

/// Discards the trace information of the current thread's default profiler, e.g. to exclude a
/// warm-up phase.
pub fn restart() {
    LOCAL_PROFILER.with(|local| local.with(Profiler::restart));
}

/// Combines the default profilers into one report.
///
/// The report covers every thread that has used the default profiler and exited, plus the
/// calling thread, whose profiler is stopped. Threads that are still running are not included,
/// so join the instrumented threads before calling this. Scoped threads are not enough: a scope
/// can end before the exiting threads have published their profilers.
///
/// See [`Registry::produce_report()`][crate::Registry::produce_report].
///
/// # Errors
///
/// See [`Registry::produce_report()`][crate::Registry::produce_report].
///
/// # Panics
///
/// Panics if `threshold` is not within `0.0..=1.0`.
pub fn produce_report(
    threshold: f64,
    normalization_count: Option<NonZero<usize>>,
) -> Result<Report> {
    let mut summaries = FINISHED.lock().clone();
    summaries.extend(LOCAL_PROFILER.with(ThreadProfiler::capture));

    reduce(
        DEFAULT_ROOT_NAME,
        &ClockFacade::real(),
        summaries,
        threshold,
        normalization_count,
    )
}

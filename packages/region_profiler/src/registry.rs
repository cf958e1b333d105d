//! Per-thread profilers and their reduction into one report.

use std::cell::RefCell;
use std::num::NonZero;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use thread_local::ThreadLocal;
use tracing::debug;

use crate::pal::{Clock, ClockFacade};
use crate::{Error, Profiler, RegistryBuilder, Report, ReportNode, Result};

/// Owns one [`Profiler`] per thread and combines their trees into one [`Report`].
///
/// Each thread obtains its profiler via [`local()`][Self::local]. The profiler is confined to
/// that thread: the handle borrows it without any lock or atomic operation, so the hot path of
/// one thread never waits for another.
///
/// The reduction operations ([`produce_report()`][1], [`stop_all()`][Self::stop_all] and
/// [`restart_all()`][Self::restart_all]) take the registry by exclusive reference. The borrow
/// checker thereby guarantees that no thread still holds a handle while they run, which in
/// practice means that the instrumented threads have been joined or their scope has ended.
///
/// [1]: Self::produce_report
#[derive(Debug)]
pub struct Registry {
    root_name: Box<str>,
    clock: ClockFacade,

    // Profilers outlive their threads, so a report can be produced after the threads are joined.
    slots: ThreadLocal<RefCell<ThreadSlot>>,

    // Only touched when a thread registers, never on the hot path.
    registered: AtomicUsize,
}

impl Registry {
    /// Creates a registry whose profilers use the default root name (`"root"`).
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Starts building a registry with custom settings.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub(crate) fn new_inner(root_name: Box<str>, clock: ClockFacade) -> Self {
        Self {
            root_name,
            clock,
            slots: ThreadLocal::new(),
            registered: AtomicUsize::new(0),
        }
    }

    /// The name of the root region of every profiler in the registry.
    #[must_use]
    pub fn root_name(&self) -> &str {
        &self.root_name
    }

    /// Returns the profiler of the current thread, creating and starting it on first use.
    ///
    /// Calling this again on the same thread returns a handle to the same profiler. The handle
    /// cannot be sent to other threads.
    #[must_use]
    pub fn local(&self) -> LocalProfiler<'_> {
        let thread_id = thread::current().id();

        let slot = self.slots.get_or(|| {
            RefCell::new(ThreadSlot {
                owner: thread_id,
                profiler: self.register(thread_id),
                exited: Vec::new(),
            })
        });

        // A slot in use on this thread already belongs to it.
        if let Ok(mut slot) = slot.try_borrow_mut() {
            if slot.owner != thread_id {
                let fresh = self.register(thread_id);
                let previous = std::mem::replace(&mut slot.profiler, fresh);
                slot.exited.push(previous);
                slot.owner = thread_id;
            }
        }

        LocalProfiler { slot }
    }

    /// Number of threads that have a profiler in this registry.
    #[must_use]
    pub fn thread_count(&self) -> usize {
        self.registered.load(Ordering::Relaxed)
    }

    /// Stops the profilers of all threads. Profilers that are already stopped are unaffected.
    pub fn stop_all(&mut self) {
        for profiler in self.profilers_mut() {
            profiler.stop();
        }
    }

    /// Discards the trace information of all threads, e.g. to exclude a warm-up phase.
    pub fn restart_all(&mut self) {
        for profiler in self.profilers_mut() {
            profiler.restart();
        }
    }

    /// Stops all profilers and combines their trees into one report.
    ///
    /// The trees of all threads are fused by summing the time of matching regions. If
    /// `normalization_count` is given, every value is divided by it afterwards, for example to
    /// report the time per thread or per processed item. The report renders regions that take
    /// at least `threshold` (a fraction of the root value) of the total.
    ///
    /// A registry without any profilers produces an empty report.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FuseMismatch`] if the threads did not execute the same instrumented
    /// code paths.
    ///
    /// # Panics
    ///
    /// Panics if `threshold` is not within `0.0..=1.0`.
    pub fn produce_report(
        &mut self,
        threshold: f64,
        normalization_count: Option<NonZero<usize>>,
    ) -> Result<Report> {
        let summaries = self.profilers_mut().map(ThreadSummary::capture).collect();

        reduce(
            &self.root_name,
            &self.clock,
            summaries,
            threshold,
            normalization_count,
        )
    }

    fn register(&self, thread_id: ThreadId) -> Profiler {
        let mut profiler = Profiler::with_clock(self.root_name.clone(), self.clock.clone());
        profiler
            .start()
            .expect("a newly created profiler is never already started");

        self.registered.fetch_add(1, Ordering::Relaxed);

        debug!(
            thread = ?thread_id,
            profiler = &*self.root_name,
            "registered profiler for thread"
        );

        profiler
    }

    fn profilers_mut(&mut self) -> impl Iterator<Item = &mut Profiler> {
        self.slots.iter_mut().flat_map(|slot| {
            let slot = slot.get_mut();
            slot.exited.iter_mut().chain(std::iter::once(&mut slot.profiler))
        })
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// The profiler of the thread that currently owns a slot of the registry.
///
/// Slots are recycled once their thread exits, so a slot also keeps the profilers of the
/// exited threads that used it before.
#[derive(Debug)]
struct ThreadSlot {
    owner: ThreadId,
    profiler: Profiler,
    exited: Vec<Profiler>,
}

/// What the reduction phase needs from the profiler of one thread.
#[derive(Clone, Debug)]
pub(crate) struct ThreadSummary {
    tree: ReportNode,
    measured_time: Duration,
    session_start: Option<Instant>,
    session_stop: Option<Instant>,
}

impl ThreadSummary {
    /// Stops the profiler and takes a snapshot of its tree.
    pub(crate) fn capture(profiler: &mut Profiler) -> Self {
        let tree = profiler.performance_tree();
        let regions = profiler.regions();

        Self {
            tree,
            measured_time: regions.total(regions.root()),
            session_start: profiler.session_start(),
            session_stop: profiler.session_stop(),
        }
    }
}

/// Fuses the trees of all threads and summarizes the run.
///
/// # Panics
///
/// Panics if `threshold` is not within `0.0..=1.0`.
pub(crate) fn reduce(
    root_name: &str,
    clock: &ClockFacade,
    summaries: Vec<ThreadSummary>,
    threshold: f64,
    normalization_count: Option<NonZero<usize>>,
) -> Result<Report> {
    assert!(
        (0.0..=1.0).contains(&threshold),
        "report threshold must be a fraction between 0 and 1, got {threshold}"
    );

    let thread_count = summaries.len();
    let mut trees = Vec::with_capacity(thread_count);
    let mut measured_time = Duration::ZERO;
    let mut earliest_start: Option<Instant> = None;
    let mut latest_stop: Option<Instant> = None;

    for summary in summaries {
        measured_time = measured_time.saturating_add(summary.measured_time);

        if let Some(start) = summary.session_start {
            earliest_start = Some(earliest_start.map_or(start, |earliest| earliest.min(start)));
        }

        if let Some(stop) = summary.session_stop {
            latest_stop = Some(latest_stop.map_or(stop, |latest| latest.max(stop)));
        }

        trees.push(summary.tree);
    }

    let wall_time = match (earliest_start, latest_stop) {
        (Some(start), Some(stop)) => clock.difference(start, stop),
        _ => Duration::ZERO,
    };

    let fused =
        ReportNode::fuse_all(trees)?.unwrap_or_else(|| ReportNode::leaf(root_name, 0.0));

    #[expect(
        clippy::cast_precision_loss,
        reason = "normalization counts are far below the precision limit of f64"
    )]
    let factor = normalization_count.map_or(1.0, |count| (count.get() as f64).recip());
    let regions = fused.scale(factor);

    debug!(
        threads = thread_count,
        wall_time = ?wall_time,
        measured_time = ?measured_time,
        "produced report"
    );

    Ok(Report::new(
        regions,
        thread_count,
        wall_time,
        measured_time,
        normalization_count,
        threshold,
    ))
}

/// Handle to the profiler of the current thread, obtained from [`Registry::local()`].
///
/// The handle borrows the profiler of its thread from the registry. It is cheap to copy and
/// cannot leave the thread, so every operation is a plain call on the thread's own profiler.
#[derive(Clone, Copy, Debug)]
pub struct LocalProfiler<'r> {
    slot: &'r RefCell<ThreadSlot>,
}

impl LocalProfiler<'_> {
    /// Steps down into the sub-region `name` of the current region.
    ///
    /// See [`Profiler::enter()`].
    ///
    /// # Errors
    ///
    /// See [`Profiler::enter()`].
    pub fn enter(&self, name: &str) -> Result<()> {
        self.slot.borrow_mut().profiler.enter(name)
    }

    /// Steps down through several nested sub-regions in one call.
    ///
    /// See [`Profiler::enter_path()`].
    ///
    /// # Errors
    ///
    /// See [`Profiler::enter_path()`].
    pub fn enter_path(&self, names: &[&str]) -> Result<()> {
        self.slot.borrow_mut().profiler.enter_path(names)
    }

    /// Steps up one level.
    ///
    /// # Errors
    ///
    /// See [`Profiler::leave()`].
    pub fn leave(&self) -> Result<()> {
        self.slot.borrow_mut().profiler.leave()
    }

    /// Steps up `n` levels in one call.
    ///
    /// # Errors
    ///
    /// See [`Profiler::leave_n()`].
    pub fn leave_n(&self, n: usize) -> Result<()> {
        self.slot.borrow_mut().profiler.leave_n(n)
    }

    /// Runs `f` inside the sub-region `name`.
    ///
    /// The profiler is not borrowed while `f` runs, so `f` may use this handle (or a copy of it)
    /// to enter nested regions, as long as it returns to the region it was called in.
    ///
    /// # Errors
    ///
    /// Returns an error if the region cannot be entered or left. Returns
    /// [`Error::UnbalancedRegion`] if `f` did not return to the region; nothing is left in that
    /// case.
    pub fn measure<F, R>(&self, name: &str, f: F) -> Result<R>
    where
        F: FnOnce() -> R,
    {
        let region = {
            let mut slot = self.slot.borrow_mut();
            slot.profiler.enter(name)?;
            slot.profiler.current_region()
        };

        let result = f();

        let mut slot = self.slot.borrow_mut();
        if slot.profiler.current_region() != region {
            return Err(Error::UnbalancedRegion {
                region: name.to_string(),
            });
        }
        slot.profiler.leave()?;

        Ok(result)
    }

    /// Runs `f` with exclusive access to the underlying profiler.
    ///
    /// # Panics
    ///
    /// Panics if the profiler is already in use, e.g. if `f` uses this handle (or any other
    /// handle to the same profiler).
    pub fn with<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut Profiler) -> R,
    {
        let mut slot = self
            .slot
            .try_borrow_mut()
            .expect("the profiler is already in use on this thread");

        f(&mut slot.profiler)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::sync::Barrier;

    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;
    use crate::OTHER_REGION_NAME;
    use crate::pal::FakeClock;

    assert_impl_all!(Registry: Send, Sync);
    assert_not_impl_any!(LocalProfiler<'static>: Send, Sync);

    const TOLERANCE: f64 = 1e-9;

    fn fake_registry() -> (Registry, FakeClock) {
        let clock = FakeClock::new();
        let registry = Registry::builder()
            .clock(ClockFacade::fake(clock.clone()))
            .build();
        (registry, clock)
    }

    fn assert_seconds(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < TOLERANCE,
            "{actual} != {expected}"
        );
    }

    fn run_worker(registry: &Registry, clock: &FakeClock) {
        thread::scope(|s| {
            s.spawn(|| {
                let profiler = registry.local();

                profiler.enter("X").unwrap();
                clock.advance_millis(3);
                profiler.leave().unwrap();

                profiler.enter("Y").unwrap();
                clock.advance_millis(2);
                profiler.leave().unwrap();
            });
        });
    }

    #[test]
    fn local_is_created_once_per_thread() {
        let (registry, _clock) = fake_registry();

        let first = registry.local();
        let second = registry.local();

        assert!(std::ptr::eq(first.slot, second.slot));
        assert_eq!(registry.thread_count(), 1);
        assert!(first.with(|profiler| profiler.is_activated()));
    }

    #[test]
    fn every_thread_gets_its_own_profiler() {
        let (registry, clock) = fake_registry();

        run_worker(&registry, &clock);
        run_worker(&registry, &clock);

        assert_eq!(registry.thread_count(), 2);
    }

    #[test]
    fn busy_profiler_does_not_hold_up_other_threads() {
        let (registry, _clock) = fake_registry();
        let barrier = Barrier::new(2);

        thread::scope(|s| {
            s.spawn(|| {
                registry.local().with(|profiler| {
                    profiler.enter("held").unwrap();

                    // The other thread works while this profiler is exclusively borrowed.
                    barrier.wait();
                    barrier.wait();

                    profiler.leave().unwrap();
                });
            });

            s.spawn(|| {
                barrier.wait();

                let profiler = registry.local();
                profiler.enter("held").unwrap();
                profiler.leave().unwrap();

                barrier.wait();
            });
        });

        assert_eq!(registry.thread_count(), 2);
    }

    #[test]
    fn report_fuses_and_normalizes_thread_trees() {
        let (mut registry, clock) = fake_registry();

        // The first worker starts at 0 ms, the second at 5 ms. Both stop at 10 ms, so the first
        // has 5 ms of untracked time while the second has none.
        run_worker(&registry, &clock);
        run_worker(&registry, &clock);

        let report = registry.produce_report(0.0, NonZero::new(2)).unwrap();
        let regions = report.regions();

        assert_eq!(report.thread_count(), 2);
        assert_eq!(report.wall_time(), Duration::from_millis(10));
        assert_eq!(report.measured_time(), Duration::from_millis(15));
        assert_seconds(report.efficiency(), 75.0);

        assert_seconds(regions.value(), 0.0075);
        assert_seconds(regions.child("X").unwrap().value(), 0.003);
        assert_seconds(regions.child("Y").unwrap().value(), 0.002);
        assert_seconds(regions.time_in_other(), 0.0025);
    }

    #[test]
    fn report_without_normalization_sums_threads() {
        let (mut registry, clock) = fake_registry();

        run_worker(&registry, &clock);
        run_worker(&registry, &clock);

        let report = registry.produce_report(0.0, None).unwrap();

        assert_seconds(report.regions().child("X").unwrap().value(), 0.006);
        assert!(report.normalization().is_none());
    }

    #[test]
    fn report_rejects_divergent_threads() {
        let (mut registry, clock) = fake_registry();

        run_worker(&registry, &clock);
        thread::scope(|s| {
            s.spawn(|| {
                registry.local().measure("Z", || clock.advance_millis(1)).unwrap();
            });
        });

        assert!(matches!(
            registry.produce_report(0.0, None),
            Err(Error::FuseMismatch { .. })
        ));
    }

    #[test]
    fn empty_registry_produces_empty_report() {
        let (mut registry, _clock) = fake_registry();

        let report = registry.produce_report(0.1, None).unwrap();

        assert!(report.is_empty());
        assert_eq!(report.thread_count(), 0);
        assert_eq!(report.regions().name(), "root");
        assert!(report.regions().children().is_empty());
    }

    #[test]
    fn stop_all_stops_every_profiler() {
        let (mut registry, _clock) = fake_registry();
        registry.local().enter("a").unwrap();

        registry.stop_all();

        let profiler = registry.local();
        assert!(profiler.with(|profiler| profiler.is_in_root()));
        assert!(matches!(
            profiler.enter("a"),
            Err(Error::NotActivated { .. })
        ));
    }

    #[test]
    fn restart_all_discards_warm_up() {
        let (mut registry, clock) = fake_registry();

        registry
            .local()
            .measure("warm_up", || clock.advance_millis(7))
            .unwrap();
        registry.restart_all();
        registry
            .local()
            .measure("work", || clock.advance_millis(4))
            .unwrap();

        let report = registry.produce_report(0.0, None).unwrap();

        assert!(report.regions().child("warm_up").is_none());
        assert_seconds(report.regions().value(), 0.004);
        assert_eq!(report.wall_time(), Duration::from_millis(4));
    }

    #[test]
    fn measure_allows_nested_use_of_the_handle() {
        let (mut registry, clock) = fake_registry();

        {
            let profiler = registry.local();

            profiler
                .measure("outer", || {
                    profiler
                        .measure("inner", || clock.advance_millis(2))
                        .unwrap();
                })
                .unwrap();
        }

        let report = registry.produce_report(0.0, None).unwrap();
        let outer = report.regions().child("outer").unwrap();

        assert_seconds(outer.child("inner").unwrap().value(), 0.002);
        assert!(outer.child(OTHER_REGION_NAME).is_none());
    }

    #[test]
    fn measure_rejects_closure_that_does_not_return_to_its_region() {
        let (registry, _clock) = fake_registry();
        let profiler = registry.local();

        let result = profiler.measure("a", || profiler.enter("b").unwrap());

        assert_eq!(
            result,
            Err(Error::UnbalancedRegion {
                region: "a".to_string()
            })
        );
        assert_eq!(profiler.with(|profiler| profiler.depth()), 2);
    }

    #[test]
    fn leave_n_and_enter_path_delegate() {
        let (registry, _clock) = fake_registry();
        let profiler = registry.local();

        profiler.enter_path(&["a", "b", "c"]).unwrap();
        assert_eq!(profiler.with(|profiler| profiler.depth()), 3);

        assert_eq!(
            profiler.leave_n(4),
            Err(Error::StackUnderflow {
                requested: 4,
                depth: 3
            })
        );

        profiler.leave_n(3).unwrap();
        assert!(profiler.with(|profiler| profiler.is_in_root()));
    }

    #[test]
    #[should_panic]
    fn with_panics_on_reentrant_use() {
        let (registry, _clock) = fake_registry();
        let profiler = registry.local();

        profiler.with(|_| profiler.with(|_| ()));
    }

    #[test]
    #[should_panic]
    fn produce_report_rejects_invalid_threshold() {
        let (mut registry, _clock) = fake_registry();

        let _report = registry.produce_report(-0.5, None);
    }
}

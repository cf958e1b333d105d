//! The per-thread region tracker.

use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::pal::{Clock, ClockFacade};
use crate::{Error, RegionId, RegionTree, ReportNode, Result};

/// Tracks the time spent in named, nested regions of code on one thread.
///
/// The profiler is a stack machine: [`enter()`][Self::enter] steps down into a named sub-region
/// of the current region and [`leave()`][Self::leave] steps back up. Entering the same name at
/// the same place again (e.g. on every iteration of a loop) reuses the existing region, so the
/// region accumulates the time of all its iterations.
///
/// A profiler is meant to be driven by a single thread. Use a
/// [`Registry`][crate::Registry] to give every worker thread its own profiler and to combine
/// their trees into one report.
///
/// # Examples
///
/// ```
/// use region_profiler::Profiler;
///
/// # fn main() -> region_profiler::Result<()> {
/// let mut profiler = Profiler::new("root");
/// profiler.start()?;
///
/// for _ in 0..10 {
///     profiler.enter("step")?;
///
///     profiler.enter("integrate")?;
///     std::hint::black_box((0..1000).sum::<u64>());
///     profiler.leave()?;
///
///     profiler.leave()?;
/// }
///
/// let tree = profiler.performance_tree();
/// assert_eq!(tree.children()[0].name(), "step");
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Profiler {
    regions: RegionTree,
    current: RegionId,
    depth: usize,
    activated: bool,
    session_start: Option<Instant>,
    session_stop: Option<Instant>,
}

impl Profiler {
    /// Creates an idle profiler whose root region has the given name.
    ///
    /// The profiler does not track anything until [`start()`][Self::start] is called.
    #[must_use]
    pub fn new(name: impl Into<Box<str>>) -> Self {
        Self::with_clock(name, ClockFacade::real())
    }

    pub(crate) fn with_clock(name: impl Into<Box<str>>, clock: ClockFacade) -> Self {
        let regions = RegionTree::new(name, clock);
        let current = regions.root();

        Self {
            regions,
            current,
            depth: 0,
            activated: false,
            session_start: None,
            session_stop: None,
        }
    }

    /// The name of the profiler, which is also the name of its root region.
    #[must_use]
    pub fn name(&self) -> &str {
        self.regions.get(self.regions.root()).name()
    }

    /// Starts (activates) the profiler and the timer of the root region.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyActivated`] if the profiler is already running.
    pub fn start(&mut self) -> Result<()> {
        if self.activated {
            return Err(Error::AlreadyActivated {
                profiler: self.name().to_string(),
            });
        }

        let root = self.regions.root();
        self.regions.start_time(root)?;

        self.session_start = Some(self.regions.clock().now());
        self.session_stop = None;
        self.activated = true;

        debug!(profiler = self.name(), "profiler started");

        Ok(())
    }

    /// Steps down into the sub-region `name` of the current region, starting its timer.
    ///
    /// The sub-region is created on first use.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotActivated`] if the profiler is not running and
    /// [`Error::ReservedName`] if `name` is reserved for untracked time.
    pub fn enter(&mut self, name: &str) -> Result<()> {
        self.ensure_activated()?;

        let region = self.regions.subregion(self.current, name)?;
        self.regions.start_time(region)?;
        self.current = region;
        self.depth = self.depth.wrapping_add(1);

        Ok(())
    }

    /// Steps down through several nested sub-regions in one call.
    ///
    /// Equivalent to calling [`enter()`][Self::enter] for each name in order, except that all
    /// names are validated before anything is entered.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotActivated`] if the profiler is not running and
    /// [`Error::ReservedName`] if any of the names is reserved for untracked time. In both cases
    /// no region is entered.
    pub fn enter_path(&mut self, names: &[&str]) -> Result<()> {
        self.ensure_activated()?;

        if let Some(reserved) = names.iter().find(|name| **name == crate::OTHER_REGION_NAME) {
            return Err(Error::ReservedName {
                name: (*reserved).to_string(),
            });
        }

        for name in names {
            self.enter(name)?;
        }

        Ok(())
    }

    /// Steps up one level, stopping the timer of the current region.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotActivated`] if the profiler is not running and
    /// [`Error::StackUnderflow`] if the current region is the root. The profiler state is
    /// unchanged on error.
    pub fn leave(&mut self) -> Result<()> {
        self.leave_n(1)
    }

    /// Steps up `n` levels in one call.
    ///
    /// This is atomic: if fewer than `n` levels are open, nothing is left.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotActivated`] if the profiler is not running and
    /// [`Error::StackUnderflow`] if `n` exceeds the current depth. The profiler state is
    /// unchanged on error.
    pub fn leave_n(&mut self, n: usize) -> Result<()> {
        self.ensure_activated()?;

        if n > self.depth {
            return Err(Error::StackUnderflow {
                requested: n,
                depth: self.depth,
            });
        }

        for _ in 0..n {
            self.regions.end_time(self.current)?;
            self.current = self
                .regions
                .get(self.current)
                .parent()
                .expect("depth was validated, so every region left has a parent");
            self.depth = self.depth.wrapping_sub(1);
        }

        Ok(())
    }

    /// Runs `f` inside the sub-region `name`, leaving the region when `f` returns.
    ///
    /// `f` may enter and leave nested regions but must return with the profiler back in the
    /// region it was called in.
    ///
    /// # Errors
    ///
    /// Returns an error if the region cannot be entered or left. Returns
    /// [`Error::UnbalancedRegion`] if `f` did not return to the region; nothing is left in that
    /// case.
    pub fn measure<F, R>(&mut self, name: &str, f: F) -> Result<R>
    where
        F: FnOnce(&mut Self) -> R,
    {
        self.enter(name)?;
        let region = self.current;

        let result = f(self);

        if self.current != region {
            return Err(Error::UnbalancedRegion {
                region: name.to_string(),
            });
        }

        self.leave()?;

        Ok(result)
    }

    /// Stops (deactivates) the profiler.
    ///
    /// The time of the root region is accumulated. Regions that are still open are closed
    /// without accumulating their final open interval. Stopping a profiler that is not running
    /// has no effect.
    pub fn stop(&mut self) {
        if !self.activated {
            debug!(profiler = self.name(), "profiler already stopped");
            return;
        }

        if self.depth > 0 {
            warn!(
                profiler = self.name(),
                depth = self.depth,
                "profiler stopped with regions still open; their final intervals are not counted"
            );
        }

        let root = self.regions.root();
        while self.current != root {
            self.regions.abandon(self.current);
            self.current = self
                .regions
                .get(self.current)
                .parent()
                .expect("only the root region has no parent");
        }
        self.depth = 0;

        self.regions
            .end_time(root)
            .expect("the root region is open whenever the profiler is running");

        self.session_stop = Some(self.regions.clock().now());
        self.activated = false;

        debug!(profiler = self.name(), "profiler stopped");
    }

    /// Discards all trace information and restarts the timer of the root region.
    ///
    /// The activation state is preserved. If the profiler is running, the session start is
    /// reset to now, so that the wall time covers only the new measurement window.
    pub fn restart(&mut self) {
        let root = self.regions.root();
        self.regions.clear(root);
        self.current = root;
        self.depth = 0;

        if self.activated {
            self.session_start = Some(self.regions.clock().now());
        }

        debug!(profiler = self.name(), "profiler restarted");
    }

    /// Time between the start and the stop of the most recent session.
    ///
    /// Returns `None` if the profiler has not been stopped since it was last started.
    #[must_use]
    pub fn wall_time(&self) -> Option<Duration> {
        match (self.session_start, self.session_stop) {
            (Some(start), Some(stop)) => Some(self.regions.clock().difference(start, stop)),
            _ => None,
        }
    }

    /// Stops the profiler if it is running, then converts its region tree into a report tree.
    #[must_use]
    pub fn performance_tree(&mut self) -> ReportNode {
        self.stop();
        ReportNode::from_regions(&self.regions)
    }

    /// Whether the profiler is running.
    #[must_use]
    pub fn is_activated(&self) -> bool {
        self.activated
    }

    /// Whether the current region is the root region.
    #[must_use]
    pub fn is_in_root(&self) -> bool {
        self.current == self.regions.root()
    }

    /// Number of regions currently open below the root.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// The identifier of the region the profiler is currently in.
    #[must_use]
    pub fn current_region(&self) -> RegionId {
        self.current
    }

    /// The tree of regions recorded by the profiler.
    #[must_use]
    pub fn regions(&self) -> &RegionTree {
        &self.regions
    }

    /// The moment the profiler was last started, if it ever was.
    #[must_use]
    pub fn session_start(&self) -> Option<Instant> {
        self.session_start
    }

    /// The moment the profiler was last stopped, if it has been stopped since its last start.
    #[must_use]
    pub fn session_stop(&self) -> Option<Instant> {
        self.session_stop
    }

    fn ensure_activated(&self) -> Result<()> {
        if self.activated {
            Ok(())
        } else {
            Err(Error::NotActivated {
                profiler: self.name().to_string(),
            })
        }
    }
}

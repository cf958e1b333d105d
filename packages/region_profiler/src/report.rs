//! Summary of a multi-threaded profiling run.

use std::fmt;
use std::num::NonZero;
use std::time::Duration;

use serde_json::{Value, json};

use crate::{ReportNode, to_structured, write_tree};

/// The fused region tree of all threads of a [`Registry`][crate::Registry], together with
/// figures about the run as a whole.
///
/// For human-readable output, use the `Display` implementation or
/// [`print_to_stdout()`][Self::print_to_stdout]. For machine-readable output, use
/// [`to_json()`][Self::to_json] or inspect the tree via [`regions()`][Self::regions].
///
/// # Examples
///
/// ```
/// use region_profiler::Registry;
///
/// # fn main() -> region_profiler::Result<()> {
/// let mut registry = Registry::new();
/// registry.local().measure("solve", || std::hint::black_box(42))?;
///
/// let report = registry.produce_report(0.01, None)?;
///
/// assert_eq!(report.thread_count(), 1);
/// assert!(report.regions().child("solve").is_some());
/// report.print_to_stdout();
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct Report {
    regions: ReportNode,
    thread_count: usize,
    wall_time: Duration,
    measured_time: Duration,
    normalization: Option<NonZero<usize>>,
    threshold: f64,
}

impl Report {
    pub(crate) fn new(
        regions: ReportNode,
        thread_count: usize,
        wall_time: Duration,
        measured_time: Duration,
        normalization: Option<NonZero<usize>>,
        threshold: f64,
    ) -> Self {
        Self {
            regions,
            thread_count,
            wall_time,
            measured_time,
            normalization,
            threshold,
        }
    }

    /// The fused (and, if requested, normalized) region tree of all threads.
    #[must_use]
    pub fn regions(&self) -> &ReportNode {
        &self.regions
    }

    /// Number of threads whose trees were fused.
    #[must_use]
    pub fn thread_count(&self) -> usize {
        self.thread_count
    }

    /// Time from the earliest start to the latest stop of any thread's profiler.
    #[must_use]
    pub fn wall_time(&self) -> Duration {
        self.wall_time
    }

    /// Sum of the root region time of all threads, before normalization.
    #[must_use]
    pub fn measured_time(&self) -> Duration {
        self.measured_time
    }

    /// How much of the available thread time was measured, in percent.
    ///
    /// This is the measured time divided by the wall time of all threads together. A value well
    /// below 100 means that threads started late, finished early or were idle outside their
    /// root region. Zero if there were no threads or no wall time.
    #[must_use]
    pub fn efficiency(&self) -> f64 {
        let wall_seconds = self.wall_time.as_secs_f64();

        if self.thread_count == 0 || wall_seconds <= 0.0 {
            return 0.0;
        }

        #[expect(
            clippy::cast_precision_loss,
            reason = "thread counts are far below the precision limit of f64"
        )]
        let threads = self.thread_count as f64;

        100.0 * self.measured_time.as_secs_f64() / (threads * wall_seconds)
    }

    /// The count every value in [`regions()`][Self::regions] was divided by, if any.
    #[must_use]
    pub fn normalization(&self) -> Option<NonZero<usize>> {
        self.normalization
    }

    /// Fraction of the root value below which regions are folded when rendering.
    #[must_use]
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// The report as a structured value for machine consumption.
    ///
    /// The value holds `threads`, `wall_time` (seconds), `efficiency` (percent) and `regions`,
    /// the structured form of the region tree (see [`to_structured()`][crate::to_structured]).
    #[must_use]
    pub fn to_json(&self) -> Value {
        json!({
            "threads": self.thread_count,
            "wall_time": self.wall_time.as_secs_f64(),
            "efficiency": self.efficiency(),
            "regions": to_structured(&self.regions),
        })
    }

    /// Prints the report to stdout.
    ///
    /// Prints nothing if no thread was profiled.
    #[cfg_attr(test, mutants::skip)] // Too difficult to test stdout output reliably - manually tested.
    pub fn print_to_stdout(&self) {
        if self.is_empty() {
            return;
        }
        println!("{self}");
    }

    /// Whether no thread was profiled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.thread_count == 0
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return writeln!(f, "No regions profiled.");
        }

        writeln!(f, "Threads:    {}", self.thread_count)?;
        writeln!(f, "Wall time:  {:.3} s", self.wall_time.as_secs_f64())?;
        writeln!(f, "Efficiency: {:.1}%", self.efficiency())?;

        if let Some(count) = self.normalization {
            writeln!(f, "Normalized by {count}")?;
        }

        writeln!(f)?;
        write_tree(&self.regions, self.threshold, f)
    }
}

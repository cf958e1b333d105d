#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Measure where the time goes in multi-threaded, loop-heavy programs by marking named regions
//! of code on each worker thread.
//!
//! Every thread gets its own [`Profiler`], a stack machine that accumulates the time spent in a
//! tree of named, nested regions. Entering the same name at the same place again (e.g. on every
//! iteration of a time-stepping loop) reuses the existing region, so the tree stays as small as
//! the instrumented code and the hot path never allocates after the first iteration.
//!
//! When the work is done, the per-thread trees are converted into immutable [`ReportNode`]
//! trees, fused into one tree with the summed time of all threads, optionally normalized by a
//! unit count and rendered as text or as a structured value.
//!
//! # Instrumenting one thread
//!
//! ```
//! use region_profiler::{Profiler, render};
//!
//! # fn main() -> region_profiler::Result<()> {
//! let mut profiler = Profiler::new("root");
//! profiler.start()?;
//!
//! for _ in 0..3 {
//!     profiler.enter("step")?;
//!
//!     profiler.measure("integrate", |_| {
//!         std::hint::black_box((0..10_000).sum::<u64>());
//!     })?;
//!
//!     profiler.leave()?;
//! }
//!
//! let tree = profiler.performance_tree();
//! println!("{}", render(&tree, 0.01));
//! # Ok(())
//! # }
//! ```
//!
//! # Instrumenting many threads
//!
//! A [`Registry`] hands every thread its own profiler and combines their trees once all threads
//! are done. The threads must execute the same instrumented code paths, otherwise their trees
//! cannot be fused.
//!
//! ```
//! use std::num::NonZero;
//! use std::thread;
//!
//! use region_profiler::Registry;
//!
//! # fn main() -> region_profiler::Result<()> {
//! let mut registry = Registry::new();
//!
//! thread::scope(|s| {
//!     for _ in 0..4 {
//!         s.spawn(|| -> region_profiler::Result<()> {
//!             let profiler = registry.local();
//!
//!             profiler.measure("work", || {
//!                 std::hint::black_box((0..10_000).sum::<u64>());
//!             })
//!         });
//!     }
//! });
//!
//! let report = registry.produce_report(0.01, NonZero::new(4))?;
//! assert_eq!(report.thread_count(), 4);
//! println!("{report}");
//! # Ok(())
//! # }
//! ```
//!
//! The registry must be borrowed exclusively to produce the report, so the borrow checker
//! ensures that no thread is still recording into it.
//!
//! For programs that do not want to pass a registry around, the free functions [`enter()`],
//! [`leave()`], [`measure()`] and [`produce_report()`] operate on process-wide default
//! profilers. Each thread publishes its profiler when it exits.
//!
//! # Untracked time
//!
//! Time spent in a region outside all of its sub-regions is reported as a synthetic child named
//! `"other"`. The name is reserved: regions cannot be called `"other"`.

mod convert;
mod default_registry;
mod error;
mod fusion;
mod pal;
mod profiler;
mod region;
mod registry;
mod registry_builder;
mod render;
mod report;
mod report_node;

pub use default_registry::*;
pub use error::{Error, Result, TreeSide};
pub use profiler::Profiler;
pub use region::{Region, RegionId, RegionTree};
pub use registry::{LocalProfiler, Registry};
pub use registry_builder::RegistryBuilder;
pub use render::{render, to_structured, write_tree};
pub use report::Report;
pub use report_node::ReportNode;

/// Name of the synthetic report node that holds the time spent directly in a region, outside
/// all of its sub-regions. Regions cannot use this name.
pub const OTHER_REGION_NAME: &str = "other";

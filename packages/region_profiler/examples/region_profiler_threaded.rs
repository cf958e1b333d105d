//! Profiling a multi-threaded time-stepping loop with `region_profiler`.
//!
//! Every worker thread runs the same simulation loop on its own slice of the work. The
//! per-thread profiles are fused into one report, normalized per thread.
//!
//! Run with: `cargo run --example region_profiler_threaded`

use std::hint::black_box;
use std::num::NonZero;
use std::thread;

use region_profiler::{LocalProfiler, Registry};

const THREAD_COUNT: usize = 4;
const STEPS: usize = 20;

fn main() -> region_profiler::Result<()> {
    let mut registry = Registry::builder().root_name("simulation").build();

    thread::scope(|s| {
        for _ in 0..THREAD_COUNT {
            s.spawn(|| {
                worker(&registry.local()).expect("every worker runs the same instrumented loop");
            });
        }
    });

    let report = registry.produce_report(0.01, NonZero::new(THREAD_COUNT))?;

    println!("=== Time per thread ===");
    report.print_to_stdout();

    println!("=== Percentage of total ===");
    let total = report.regions().value();
    let percent = report.regions().scale(100.0 / total);
    println!("{}", serde_json::to_string_pretty(&percent).unwrap_or_default());

    Ok(())
}

fn worker(profiler: &LocalProfiler<'_>) -> region_profiler::Result<()> {
    profiler.measure("setup", || spin(20_000))?;

    for _ in 0..STEPS {
        profiler.enter("step")?;

        profiler.measure("integrate", || spin(200_000))?;
        profiler.measure("exchange", || spin(50_000))?;

        // Time outside of the sub-regions shows up as "other".
        spin(10_000);

        profiler.leave()?;
    }

    Ok(())
}

fn spin(iterations: u64) {
    black_box((0..iterations).fold(0_u64, u64::wrapping_add));
}

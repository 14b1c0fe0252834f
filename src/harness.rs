//! Setup-once, time-the-loop benchmark runner.
//!
//! A [`Benchmark`] builds an immutable context in [`Benchmark::setup`], outside the timed
//! region, and [`Benchmark::iterate`] is then called repeatedly against it. Outputs are passed
//! through [`black_box`] and dropped; the first failed iteration ends the run. With
//! [`Budget::Duration`] the iteration count is grown between rounds until one round lasts at
//! least the requested time, the way Go's `testing.B` does.

use crate::BenchError;
use log::{debug, info};
use serde::Serialize;
use std::{
    fmt,
    hint::black_box,
    time::{Duration, Instant},
};

/// Iteration counts never exceed this.
pub const MAX_ITERATIONS: u64 = 1_000_000_000;

pub trait Benchmark {
    type Context;
    type Output;

    fn name(&self) -> &str;

    /// One-time preparation. Any error here aborts the benchmark before timing starts.
    fn setup(&self) -> Result<Self::Context, BenchError>;

    /// One timed iteration.
    fn iterate(&self, context: &Self::Context) -> Result<Self::Output, BenchError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Budget {
    /// Exactly this many iterations (at least one).
    Iterations(u64),
    /// Grow the iteration count until a round takes at least this long.
    Duration(Duration),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BenchReport {
    pub name: String,
    pub iterations: u64,
    pub elapsed: Duration,
}

impl BenchReport {
    pub fn ns_per_iter(&self) -> f64 {
        self.elapsed.as_nanos() as f64 / self.iterations.max(1) as f64
    }
}

impl fmt::Display for BenchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<24}\t{:>10}\t{:>14.0} ns/op", self.name, self.iterations, self.ns_per_iter())
    }
}

pub fn run<B: Benchmark + ?Sized>(bench: &B, budget: Budget) -> Result<BenchReport, BenchError> {
    let context = bench.setup()?;
    info!("{}: setup complete", bench.name());

    let (iterations, elapsed) = match budget {
        Budget::Iterations(n) => {
            let n = n.max(1);
            (n, time_iterations(bench, &context, n)?)
        },
        Budget::Duration(target) => {
            let mut n = 1;
            let mut elapsed = time_iterations(bench, &context, n)?;
            while elapsed < target && n < MAX_ITERATIONS {
                n = predict_iterations(target, n, elapsed);
                debug!("{}: {elapsed:?} after previous round, trying {n} iterations", bench.name());
                elapsed = time_iterations(bench, &context, n)?;
            }
            (n, elapsed)
        },
    };

    Ok(BenchReport { name: bench.name().to_owned(), iterations, elapsed })
}

fn time_iterations<B: Benchmark + ?Sized>(
    bench: &B,
    context: &B::Context,
    n: u64,
) -> Result<Duration, BenchError> {
    let start = Instant::now();
    for _ in 0..n {
        black_box(bench.iterate(black_box(context))?);
    }
    Ok(start.elapsed())
}

/// Next round's count: the linear prediction for `target` plus 20%, at most 100x and at least
/// one more than `last`.
fn predict_iterations(target: Duration, last: u64, elapsed: Duration) -> u64 {
    let prev_ns = elapsed.as_nanos().max(1);
    let mut n = target.as_nanos() * u128::from(last) / prev_ns;
    n += n / 5;
    n = n.min(100 * u128::from(last));
    n = n.max(u128::from(last) + 1);
    n.min(u128::from(MAX_ITERATIONS)) as u64
}

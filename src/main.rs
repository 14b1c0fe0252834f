use clap::Parser;
use log::error;
use rusty_facebench::{
    cases::{HaarBenchmark, PicoBenchmark},
    harness::{self, BenchReport, Benchmark, Budget},
    BenchError,
};
use std::{process, time::Duration};

/// Times the Haar cascade and pixel-comparison cascade face detectors on `sample.jpg`.
///
/// Inputs are read from the working directory: `sample.jpg`,
/// `haarcascade_frontalface_default.xml` and `facefinder.bin`.
#[derive(Parser, Debug)]
#[command(name = "facebench")]
struct Args {
    /// Only run benchmarks whose name contains this string.
    #[arg(long, default_value = "")]
    bench: String,

    /// Run exactly this many timed iterations instead of scaling to --benchtime.
    #[arg(long)]
    iterations: Option<u64>,

    /// Minimum timed duration of the final round, in seconds.
    #[arg(long, default_value_t = 1.0)]
    benchtime: f64,

    /// Print one JSON object per benchmark instead of the tabular line.
    #[arg(long)]
    json: bool,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let budget = match args.iterations {
        Some(n) => Budget::Iterations(n),
        None => match Duration::try_from_secs_f64(args.benchtime) {
            Ok(target) => Budget::Duration(target),
            Err(e) => {
                error!("Invalid --benchtime {}: {e}", args.benchtime);
                process::exit(2);
            },
        },
    };

    run_selected(&HaarBenchmark::default(), &args, budget);
    run_selected(&PicoBenchmark::default(), &args, budget);
}

fn run_selected<B: Benchmark>(bench: &B, args: &Args, budget: Budget) {
    if !bench.name().contains(&args.bench) {
        return;
    }
    match harness::run(bench, budget) {
        Ok(report) => print_report(&report, args.json),
        Err(e) => fatal(bench.name(), &e),
    }
}

fn print_report(report: &BenchReport, json: bool) {
    if !json {
        println!("{report}");
        return;
    }
    match serde_json::to_string(report) {
        Ok(line) => println!("{line}"),
        Err(e) => {
            error!("Cannot serialize report for {}: {e}", report.name);
            process::exit(1);
        },
    }
}

fn fatal(name: &str, e: &BenchError) -> ! {
    error!("{name}: {e}");
    process::exit(1);
}

//! Memory Trace Benchmark Harness
//!
//! Command-line driver for the memory-trace tool chain. It uses the
//! mem-trace library and adds:
//! - Octane benchmark orchestration (plain, instrumented, logging runs)
//! - Timing and heap statistics from GC traces
//! - Lifetime-analysis invocation over the captured trace
//! - Text and JSON reports
//! - Trace inspection

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

mod config;
mod driver;
mod inspect;
mod loc;
mod memory;
mod report;
mod runner;
mod stats;

use driver::{BenchmarkDriver, RunOptions};
use report::RunReport;
use runner::ProcessRunner;

/// Memory Trace Bench - run benchmarks under the memory tracer
#[derive(Parser, Debug)]
#[command(name = "mem-bench")]
#[command(about = "Benchmark and inspect memory-trace logging", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbosity level (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run Octane benchmarks uninstrumented, instrumented and under each logging configuration
    Run(RunArgs),

    /// Summarize captured trace files
    Inspect(InspectArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Directory in which to place instrumented files and traces
    #[arg(long, value_name = "DIR")]
    output_dir: PathBuf,

    /// Directory holding the Octane benchmarks
    #[arg(value_name = "BENCH_DIR")]
    bench_dir: PathBuf,

    /// Number of runs per configuration
    #[arg(long, default_value_t = 5)]
    timing_runs: usize,

    /// Number of lifetime-analysis runs
    #[arg(long, default_value_t = 3)]
    enhanced_runs: usize,

    /// Run a particular benchmark (can be repeated)
    #[arg(long, value_name = "NAME")]
    run_bench: Vec<String>,

    /// Don't measure memory usage
    #[arg(long)]
    no_mem_usage: bool,

    /// Use websocket-based logging
    #[arg(long)]
    websocket: bool,

    /// Path to harness configuration (TOML)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Also write a JSON report to this file
    #[arg(long, value_name = "FILE")]
    json: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct InspectArgs {
    /// Trace files to summarize
    #[arg(value_name = "TRACE", required = true)]
    traces: Vec<PathBuf>,
}

fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose, cli.quiet);

    log::info!("Memory Trace Bench v{}", env!("CARGO_PKG_VERSION"));
    log::debug!("Using trace library v{}", mem_trace::VERSION);

    match cli.command {
        Command::Run(args) => run_mode(args, cli.verbose > 0),
        Command::Inspect(args) => inspect_mode(args),
    }
}

fn run_mode(args: RunArgs, verbose: bool) -> Result<()> {
    let config = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from: {:?}", path);
            config::load_config(path)?
        }
        None => config::BenchConfig::default(),
    };

    let benchmarks = config.selected_benchmarks(&args.run_bench);
    if benchmarks.is_empty() {
        anyhow::bail!("No benchmark matches {:?}", args.run_bench);
    }

    let options = RunOptions {
        output_dir: args.output_dir,
        bench_dir: args.bench_dir,
        timing_runs: args.timing_runs,
        enhanced_runs: args.enhanced_runs,
        measure_memory: !args.no_mem_usage,
        websocket: args.websocket,
        verbose,
    };
    let mut driver = BenchmarkDriver::new(config, options, ProcessRunner)?;

    let mut results = Vec::with_capacity(benchmarks.len());
    for bench in &benchmarks {
        let result = driver.run_bench(bench)?;
        for line in result.report_lines() {
            println!("{}", line);
        }
        results.push(result);
    }

    if let Some(path) = &args.json {
        RunReport::new(results).write_json(path)?;
    }
    Ok(())
}

fn inspect_mode(args: InspectArgs) -> Result<()> {
    let inspections = inspect::inspect_traces(&args.traces);
    let failed = inspections.iter().filter(|i| i.summary.is_err()).count();

    for inspection in &inspections {
        for line in inspect::inspection_lines(inspection) {
            println!("{}", line);
        }
    }

    if failed > 0 {
        anyhow::bail!("{} of {} traces could not be decoded", failed, inspections.len());
    }
    Ok(())
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_defaults() {
        let cli = Cli::parse_from(["mem-bench", "run", "--output-dir", "out", "octane"]);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.timing_runs, 5);
        assert_eq!(args.enhanced_runs, 3);
        assert!(args.run_bench.is_empty());
        assert_eq!(args.bench_dir, PathBuf::from("octane"));
    }

    #[test]
    fn test_repeatable_run_bench() {
        let cli = Cli::parse_from([
            "mem-bench", "-vv", "run", "--output-dir", "out", "--run-bench", "richards",
            "--run-bench", "zlib", "--no-mem-usage", "octane",
        ]);
        assert_eq!(cli.verbose, 2);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.run_bench, vec!["richards", "zlib"]);
        assert!(args.no_mem_usage);
    }

    #[test]
    fn test_output_dir_required() {
        assert!(Cli::try_parse_from(["mem-bench", "run", "octane"]).is_err());
        assert!(Cli::try_parse_from(["mem-bench", "inspect"]).is_err());
    }
}

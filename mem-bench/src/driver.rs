//! Benchmark orchestration
//!
//! For each benchmark, in order:
//! 1. timed plain runs
//! 2. source line count of the inputs
//! 3. plain heap usage
//! 4. instrumentation into `<output>/<bench>_inst`
//! 5. timed rounds of the instrumented script, alone and under every logging
//!    configuration (logging runs use the instrumented directory as cwd)
//! 6. heap usage of each of those
//! 7. size of the trace left by the last configuration
//! 8. timed lifetime-analysis runs over that trace
//!
//! Runs are strictly sequential.

use crate::config::{AnalysisConfig, BenchConfig, ToolPaths};
use crate::loc;
use crate::memory::{GcTraceParser, MemUsage};
use crate::report::{AnalysisStats, BenchResult, ConfigStats};
use crate::runner::{CommandOutput, CommandRunner, Invocation};
use crate::stats::Stats;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Name of the trace file the logging analysis writes
pub const TRACE_FILE: &str = "mem-trace";

/// Name of the lifetime analysis output
pub const ENHANCED_TRACE_FILE: &str = "enhanced-trace";

/// Per-run options from the command line
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub output_dir: PathBuf,
    pub bench_dir: PathBuf,
    pub timing_runs: usize,
    pub enhanced_runs: usize,
    pub measure_memory: bool,
    pub websocket: bool,
    pub verbose: bool,
}

/// Runs benchmarks through a [`CommandRunner`]
pub struct BenchmarkDriver<R: CommandRunner> {
    config: BenchConfig,
    tools: ToolPaths,
    options: RunOptions,
    runner: R,
    gc_parser: GcTraceParser,
}

impl<R: CommandRunner> BenchmarkDriver<R> {
    /// Relative paths in `options` and the tool table are resolved against
    /// the current directory.
    pub fn new(config: BenchConfig, options: RunOptions, runner: R) -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to read current directory")?;
        Self::with_base_dir(config, options, runner, &cwd)
    }

    pub fn with_base_dir(
        config: BenchConfig,
        mut options: RunOptions,
        runner: R,
        base: &Path,
    ) -> Result<Self> {
        options.output_dir = absolute(base, &options.output_dir);
        options.bench_dir = absolute(base, &options.bench_dir);
        let tools = config.tools.resolved(base);
        let gc_parser = GcTraceParser::new().context("Failed to compile GC line pattern")?;
        Ok(Self {
            config,
            tools,
            options,
            runner,
            gc_parser,
        })
    }

    /// Run one benchmark end to end
    pub fn run_bench(&mut self, bench: &str) -> Result<BenchResult> {
        log::info!("Running benchmark {}", bench);
        let inputs = self.config.input_files(bench);
        let entry = inputs
            .first()
            .with_context(|| format!("Benchmark {} has no input files", bench))?
            .clone();

        let bench_script = self.options.bench_dir.join(format!("{}.js", bench));
        let plain = self.node(vec![path_arg(&bench_script)]);
        let normal = self.time_runs(&plain, self.options.timing_runs)?;
        log::debug!(
            "{}: plain runs {:.2} +/- {:.2} ms (min {:.2}, max {:.2})",
            bench,
            normal.amean(),
            normal.stddev(),
            normal.min(),
            normal.max()
        );

        let loc = loc::count_files(&self.options.bench_dir, &inputs)?;
        let heap = self.mem_usage(vec![path_arg(&bench_script)], None)?;

        let (instrumentation_ms, inst_dir) = self.instrument(bench, &inputs)?;

        let script = inst_dir.join(&entry);
        let direct_args = vec![path_arg(&self.tools.direct_driver), path_arg(&script)];
        let direct = self.node(direct_args.clone());
        let logging: Vec<Vec<String>> = self
            .config
            .analysis
            .iter()
            .map(|analysis| self.logging_args(analysis, &inst_dir, &script))
            .collect();

        let mut direct_timing = Stats::new();
        let mut analysis_timing = vec![Stats::new(); logging.len()];
        for round in 0..self.options.timing_runs {
            log::debug!("{}: timing round {}", bench, round + 1);
            direct_timing.push(self.timed(&direct)?);
            for (args, timing) in logging.iter().zip(analysis_timing.iter_mut()) {
                let run = self.node(args.clone()).current_dir(&inst_dir);
                timing.push(self.timed(&run)?);
            }
        }

        let direct_mem = self.mem_usage(direct_args, None)?;
        let names: Vec<String> = self.config.analysis.iter().map(|a| a.name.clone()).collect();
        let mut analysis = Vec::with_capacity(logging.len());
        for ((args, timing), name) in logging.into_iter().zip(analysis_timing).zip(names) {
            let mem_usage = self.mem_usage(args, Some(&inst_dir))?;
            analysis.push(AnalysisStats {
                name,
                stats: ConfigStats { timing, mem_usage },
            });
        }

        let trace = inst_dir.join(TRACE_FILE);
        let trace_size = match fs::metadata(&trace) {
            Ok(meta) => meta.len() as i64,
            Err(_) => {
                log::warn!("{}: no trace at {:?}", bench, trace);
                -1
            }
        };
        let enhanced_trace = self.enhanced_trace(&inst_dir)?;

        Ok(BenchResult {
            bench: bench.to_string(),
            loc,
            uninstrumented: ConfigStats {
                timing: normal,
                mem_usage: heap,
            },
            instrumentation_ms,
            just_instrumented: ConfigStats {
                timing: direct_timing,
                mem_usage: direct_mem,
            },
            analysis,
            trace_size,
            enhanced_trace,
        })
    }

    fn node(&self, args: Vec<String>) -> Invocation {
        Invocation::new(&self.config.node)
            .args(self.config.node_flags.iter().cloned())
            .args(args)
    }

    fn run(&mut self, invocation: &Invocation) -> Result<CommandOutput> {
        self.runner
            .run(invocation)
            .with_context(|| format!("Benchmark command failed: {}", invocation))
    }

    fn timed(&mut self, invocation: &Invocation) -> Result<f64> {
        let start = Instant::now();
        self.run(invocation)?;
        Ok(start.elapsed().as_secs_f64() * 1000.0)
    }

    fn time_runs(&mut self, invocation: &Invocation, runs: usize) -> Result<Stats> {
        let mut stats = Stats::new();
        for _ in 0..runs {
            stats.push(self.timed(invocation)?);
        }
        Ok(stats)
    }

    fn mem_usage(&mut self, args: Vec<String>, cwd: Option<&Path>) -> Result<MemUsage> {
        if !self.options.measure_memory {
            return Ok(MemUsage::DISABLED);
        }
        let mut invocation = self
            .node(vec![
                "--gc-global".to_string(),
                "--expose-gc".to_string(),
                "--trace-gc".to_string(),
                path_arg(&self.tools.mem_harness),
            ])
            .args(args);
        if let Some(dir) = cwd {
            invocation = invocation.current_dir(dir);
        }
        let output = self.run(&invocation)?;
        Ok(self.gc_parser.parse(&output.stdout))
    }

    fn instrument(&mut self, bench: &str, inputs: &[String]) -> Result<(f64, PathBuf)> {
        let start = Instant::now();
        let inst_dir = self.options.output_dir.join(format!("{}_inst", bench));
        fs::create_dir_all(&inst_dir)
            .with_context(|| format!("Failed to create output directory: {:?}", inst_dir))?;

        let mut args = vec![
            path_arg(&self.tools.instrumenter),
            "--outputDir".to_string(),
            path_arg(&inst_dir),
        ];
        if self.options.verbose {
            args.push("--verbose".to_string());
        }
        args.extend(inputs.iter().map(|f| path_arg(&self.options.bench_dir.join(f))));
        let invocation = self.node(args);
        self.run(&invocation)?;

        let elapsed = start.elapsed().as_secs_f64() * 1000.0;
        log::info!("{}: instrumented in {:.0} ms", bench, elapsed);
        Ok((elapsed, inst_dir))
    }

    fn logging_args(&self, analysis: &AnalysisConfig, inst_dir: &Path, script: &Path) -> Vec<String> {
        let mut args = vec![
            path_arg(&self.tools.direct_driver),
            "--analysis".to_string(),
            path_arg(&self.tools.logging_analysis),
            "--initParam".to_string(),
        ];
        if self.options.websocket {
            args.push(format!("appDir:{}", inst_dir.display()));
        } else {
            args.push("syncFS:true".to_string());
        }
        for param in &analysis.init_params {
            args.push("--initParam".to_string());
            args.push(param.clone());
        }
        args.push(path_arg(script));
        args
    }

    fn enhanced_trace(&mut self, inst_dir: &Path) -> Result<Stats> {
        let invocation = Invocation::new(&self.tools.lifetime_analysis)
            .args(["--no-progress", "--ref", "--trace"])
            .args([path_arg(&inst_dir.join(TRACE_FILE))])
            .env("LIFETIME_ANALYSIS_OPTS", self.config.lifetime_analysis_opts.clone())
            .stdout_to(inst_dir.join(ENHANCED_TRACE_FILE));
        self.time_runs(&invocation, self.options.enhanced_runs)
    }
}

fn absolute(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn path_arg(path: &Path) -> String {
    path.display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::CommandError;

    /// Records invocations; logging runs leave a trace in their cwd
    #[derive(Default)]
    struct FakeRunner {
        invocations: Vec<Invocation>,
        fail_on: Option<String>,
    }

    impl CommandRunner for FakeRunner {
        fn run(&mut self, invocation: &Invocation) -> Result<CommandOutput, CommandError> {
            self.invocations.push(invocation.clone());
            if let Some(needle) = &self.fail_on {
                if invocation.args.iter().any(|a| a.contains(needle.as_str())) {
                    return Err(CommandError::Failed {
                        command: invocation.to_string(),
                        code: 1,
                        stderr: "boom".to_string(),
                    });
                }
            }
            if let Some(cwd) = &invocation.cwd {
                if invocation.args.iter().any(|a| a == "--analysis") {
                    fs::write(cwd.join(TRACE_FILE), vec![24u8; 10]).unwrap();
                }
            }
            let stdout = if invocation.args.iter().any(|a| a == "--trace-gc") {
                "  5 ms: Scavenge 8.0 (9.0) -> 3.5 (9.0) MB\n".to_string()
            } else {
                String::new()
            };
            Ok(CommandOutput {
                stdout,
                stderr: String::new(),
            })
        }
    }

    struct Fixture {
        dir: tempfile::TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let bench_dir = dir.path().join("octane");
            fs::create_dir_all(&bench_dir).unwrap();
            fs::write(bench_dir.join("richards.js"), "// Richards\nfunction run() {\n}\n").unwrap();
            fs::write(bench_dir.join("zlib.js"), "a();\n").unwrap();
            fs::write(bench_dir.join("zlib-data.js"), "b();\nc();\n").unwrap();
            Self { dir }
        }

        fn options(&self) -> RunOptions {
            RunOptions {
                output_dir: PathBuf::from("out"),
                bench_dir: PathBuf::from("octane"),
                timing_runs: 2,
                enhanced_runs: 1,
                measure_memory: true,
                websocket: false,
                verbose: false,
            }
        }

        fn driver(&self, config: BenchConfig, options: RunOptions) -> BenchmarkDriver<FakeRunner> {
            BenchmarkDriver::with_base_dir(config, options, FakeRunner::default(), self.dir.path())
                .unwrap()
        }
    }

    fn two_configs() -> BenchConfig {
        BenchConfig {
            analysis: vec![
                AnalysisConfig::new("asciiFS", &["asciiFS:true"]),
                AnalysisConfig::new("best", &[]),
            ],
            ..BenchConfig::default()
        }
    }

    #[test]
    fn test_run_order_and_results() {
        let fixture = Fixture::new();
        let mut driver = fixture.driver(two_configs(), fixture.options());
        let result = driver.run_bench("richards").unwrap();

        let root = fixture.dir.path();
        let inst_dir = root.join("out/richards_inst");
        let calls = &driver.runner.invocations;
        // 2 plain + 1 heap + 1 instrument + 2 * (1 direct + 2 logging)
        // + 1 direct heap + 2 logging heap + 1 enhanced
        assert_eq!(calls.len(), 14);

        assert_eq!(calls[0].args, vec!["--harmony".to_string(), path_arg(&root.join("octane/richards.js"))]);
        assert!(calls[2].args.contains(&"--trace-gc".to_string()));
        assert!(calls[3].args.contains(&"--outputDir".to_string()));
        assert!(calls[3].args.contains(&path_arg(&inst_dir)));

        let ascii = &calls[5];
        assert_eq!(ascii.cwd.as_deref(), Some(inst_dir.as_path()));
        assert_eq!(
            ascii.args[1..],
            [
                path_arg(&root.join(ToolPaths::default().direct_driver)),
                "--analysis".to_string(),
                path_arg(&root.join(ToolPaths::default().logging_analysis)),
                "--initParam".to_string(),
                "syncFS:true".to_string(),
                "--initParam".to_string(),
                "asciiFS:true".to_string(),
                path_arg(&inst_dir.join("richards.js")),
            ]
        );
        // The direct run does not change directory
        assert!(calls[4].cwd.is_none());

        let enhanced = calls.last().unwrap();
        assert_eq!(
            enhanced.env,
            vec![("LIFETIME_ANALYSIS_OPTS".to_string(), "-ea -Xmx2G -Dtesting=no".to_string())]
        );
        assert_eq!(enhanced.stdout_to, Some(inst_dir.join(ENHANCED_TRACE_FILE)));
        assert_eq!(enhanced.args[3], path_arg(&inst_dir.join(TRACE_FILE)));

        assert_eq!(result.loc, 2);
        assert_eq!(result.uninstrumented.timing.len(), 2);
        assert_eq!(result.just_instrumented.timing.len(), 2);
        assert_eq!(result.analysis.len(), 2);
        assert_eq!(result.analysis[1].name, "best");
        assert_eq!(result.analysis[1].stats.mem_usage.max_heap, 8.0);
        assert_eq!(result.trace_size, 10);
        assert_eq!(result.enhanced_trace.len(), 1);
    }

    #[test]
    fn test_multi_file_bench_uses_entry_script() {
        let fixture = Fixture::new();
        let config = BenchConfig {
            analysis: vec![AnalysisConfig::new("best", &[])],
            ..BenchConfig::default()
        };
        let mut options = fixture.options();
        options.timing_runs = 1;
        options.measure_memory = false;
        options.websocket = true;
        let mut driver = fixture.driver(config, options);
        let result = driver.run_bench("zlib").unwrap();

        let root = fixture.dir.path();
        let inst_dir = root.join("out/zlib_inst");
        let calls = &driver.runner.invocations;
        // No heap runs: 1 plain + 1 instrument + 1 direct + 1 logging + 1 enhanced
        assert_eq!(calls.len(), 5);
        assert!(calls[1].args.ends_with(&[
            path_arg(&root.join("octane/zlib.js")),
            path_arg(&root.join("octane/zlib-data.js")),
        ]));
        assert_eq!(calls[2].args.last(), Some(&path_arg(&inst_dir.join("zlib.js"))));
        assert!(calls[3].args.contains(&format!("appDir:{}", inst_dir.display())));

        assert_eq!(result.loc, 3);
        assert_eq!(result.uninstrumented.mem_usage, MemUsage::DISABLED);
    }

    #[test]
    fn test_missing_trace_is_minus_one() {
        let fixture = Fixture::new();
        let config = BenchConfig {
            analysis: Vec::new(),
            ..BenchConfig::default()
        };
        let mut driver = fixture.driver(config, fixture.options());
        let result = driver.run_bench("richards").unwrap();
        assert_eq!(result.trace_size, -1);
    }

    #[test]
    fn test_failed_command_aborts_with_context() {
        let fixture = Fixture::new();
        let mut driver = fixture.driver(two_configs(), fixture.options());
        driver.runner.fail_on = Some("--outputDir".to_string());

        let err = driver.run_bench("richards").unwrap_err();
        assert!(format!("{:#}", err).contains("boom"));
        // Nothing ran after the failing instrumentation step
        assert_eq!(driver.runner.invocations.len(), 4);
    }
}

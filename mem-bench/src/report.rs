//! Benchmark results and the per-benchmark report block

use crate::memory::MemUsage;
use crate::stats::Stats;
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::fs;
use std::path::Path;

/// Separator printed after each benchmark
pub const SEPARATOR: &str = "====================================";

/// Timings and heap usage of one way of running a benchmark
#[derive(Debug, Clone, Serialize)]
pub struct ConfigStats {
    pub timing: Stats,
    pub mem_usage: MemUsage,
}

/// Results of one logging configuration
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisStats {
    pub name: String,
    #[serde(flatten)]
    pub stats: ConfigStats,
}

/// Everything measured for one benchmark
#[derive(Debug, Clone, Serialize)]
pub struct BenchResult {
    pub bench: String,
    pub loc: usize,
    pub uninstrumented: ConfigStats,
    pub instrumentation_ms: f64,
    pub just_instrumented: ConfigStats,
    pub analysis: Vec<AnalysisStats>,
    /// Size of the final trace in bytes, `-1` if none was written
    pub trace_size: i64,
    pub enhanced_trace: Stats,
}

impl BenchResult {
    /// The report block for this benchmark, one line per entry
    pub fn report_lines(&self) -> Vec<String> {
        let normal = &self.uninstrumented.timing;
        let direct = &self.just_instrumented.timing;
        let mut lines = vec![
            self.bench.clone(),
            format!("LOC {}", self.loc),
            format!("uninstrumented mean running time {:.2}", normal.amean()),
            format!("uninstrumented heap usage {}", self.uninstrumented.mem_usage),
            format!("instrumentation time {}", self.instrumentation_ms.round()),
            format!("just instrumented mean running time {:.2}", direct.amean()),
            format!("just instrumented overhead {:.2}X", direct.overhead_vs(normal)),
            format!("just instrumented heap usage {}", self.just_instrumented.mem_usage),
        ];
        for analysis in &self.analysis {
            let timing = &analysis.stats.timing;
            let name = &analysis.name;
            lines.push(format!("{} logging analysis mean running time {:.2}", name, timing.amean()));
            lines.push(format!("{} logging analysis overhead {:.2}X", name, timing.overhead_vs(normal)));
            lines.push(format!("{} logging analysis heap usage {}", name, analysis.stats.mem_usage));
            lines.push(format!(
                "{} logging analysis overhead vs just instrumented {:.2}X",
                name,
                timing.overhead_vs(direct)
            ));
        }
        lines.push(format!("trace size {:.2}MB", self.trace_size as f64 / 1_000_000.0));
        lines.push(format!("enhanced trace {:.2}", self.enhanced_trace.amean()));
        lines.push(SEPARATOR.to_string());
        lines
    }
}

/// Machine-readable record of a whole harness run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub generated_at: DateTime<Local>,
    pub harness_version: String,
    pub benchmarks: Vec<BenchResult>,
}

impl RunReport {
    pub fn new(benchmarks: Vec<BenchResult>) -> Self {
        Self {
            generated_at: Local::now(),
            harness_version: env!("CARGO_PKG_VERSION").to_string(),
            benchmarks,
        }
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize report")?;
        fs::write(path, json).with_context(|| format!("Failed to write report: {:?}", path))?;
        log::info!("Wrote JSON report to {:?}", path);
        Ok(())
    }
}

//! Harness configuration
//!
//! Everything has a default matching the Octane suite layout, so a config
//! file is only needed to point at different tools or benchmarks.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Harness configuration (loaded from a TOML file)
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BenchConfig {
    /// JavaScript engine executable
    pub node: PathBuf,
    /// Flags passed to every engine run
    pub node_flags: Vec<String>,
    pub tools: ToolPaths,
    /// `LIFETIME_ANALYSIS_OPTS` for the lifetime analysis
    pub lifetime_analysis_opts: String,
    /// Benchmarks, in run order
    pub benchmarks: Vec<String>,
    /// Benchmarks split across several files; the first is the entry script
    pub multi_file: BTreeMap<String, Vec<String>>,
    /// Logging configurations, in run order. The last one's trace is kept.
    pub analysis: Vec<AnalysisConfig>,
}

/// Scripts and executables the harness drives
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ToolPaths {
    pub direct_driver: PathBuf,
    pub logging_analysis: PathBuf,
    pub instrumenter: PathBuf,
    pub lifetime_analysis: PathBuf,
    pub mem_harness: PathBuf,
}

/// A named logging configuration: extra `--initParam` values on top of the base ones
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AnalysisConfig {
    pub name: String,
    #[serde(default)]
    pub init_params: Vec<String>,
}

impl AnalysisConfig {
    pub fn new(name: &str, init_params: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            init_params: init_params.iter().map(|p| p.to_string()).collect(),
        }
    }
}

fn default_benchmarks() -> Vec<String> {
    [
        "richards",
        "deltablue",
        "crypto",
        "raytrace",
        "earley-boyer",
        "regexp",
        "splay",
        "navier-stokes",
        "pdfjs",
        "gbemu",
        "code-load",
        "box2d",
        "zlib",
        "typescript",
    ]
    .iter()
    .map(|b| b.to_string())
    .collect()
}

fn default_multi_file() -> BTreeMap<String, Vec<String>> {
    let mut multi = BTreeMap::new();
    multi.insert(
        "gbemu".to_string(),
        vec!["gbemu.js".to_string(), "gbemu-part2.js".to_string()],
    );
    multi.insert(
        "zlib".to_string(),
        vec!["zlib.js".to_string(), "zlib-data.js".to_string()],
    );
    multi
}

fn default_analysis() -> Vec<AnalysisConfig> {
    vec![
        AnalysisConfig::new("asciiFS", &["asciiFS:true"]),
        AnalysisConfig::new("hiddenProp", &["useHiddenProp:true"]),
        AnalysisConfig::new("allUses", &["allUses:true"]),
        AnalysisConfig::new("allPutfields", &["allPutfields:true"]),
        AnalysisConfig::new("best", &[]),
    ]
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            node: PathBuf::from("node"),
            node_flags: vec!["--harmony".to_string()],
            tools: ToolPaths::default(),
            lifetime_analysis_opts: "-ea -Xmx2G -Dtesting=no".to_string(),
            benchmarks: default_benchmarks(),
            multi_file: default_multi_file(),
            analysis: default_analysis(),
        }
    }
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            direct_driver: PathBuf::from("node_modules/jalangi/src/js/commands/direct2.js"),
            logging_analysis: PathBuf::from("bin/LoggingAnalysis.js"),
            instrumenter: PathBuf::from("drivers/memTraceDriver.js"),
            lifetime_analysis: PathBuf::from(
                "lifetime-analysis/build/install/lifetime-analysis/bin/lifetime-analysis",
            ),
            mem_harness: PathBuf::from("drivers/memHarness.js"),
        }
    }
}

impl ToolPaths {
    /// Resolve relative tool paths against `base`.
    ///
    /// Logging runs change working directory, so every path handed to a
    /// child process must be absolute.
    pub fn resolved(&self, base: &Path) -> Self {
        let resolve = |p: &PathBuf| if p.is_absolute() { p.clone() } else { base.join(p) };
        Self {
            direct_driver: resolve(&self.direct_driver),
            logging_analysis: resolve(&self.logging_analysis),
            instrumenter: resolve(&self.instrumenter),
            lifetime_analysis: resolve(&self.lifetime_analysis),
            mem_harness: resolve(&self.mem_harness),
        }
    }
}

impl BenchConfig {
    /// Input files of a benchmark, relative to the benchmark directory
    pub fn input_files(&self, bench: &str) -> Vec<String> {
        self.multi_file
            .get(bench)
            .cloned()
            .unwrap_or_else(|| vec![format!("{}.js", bench)])
    }

    /// Benchmarks to run: all of them, or those named in `only` (in suite order)
    pub fn selected_benchmarks(&self, only: &[String]) -> Vec<String> {
        self.benchmarks
            .iter()
            .filter(|b| only.is_empty() || only.contains(b))
            .cloned()
            .collect()
    }
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<BenchConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: BenchConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    if config.analysis.is_empty() {
        anyhow::bail!("Config file {:?} defines no analysis configurations", path);
    }
    Ok(config)
}

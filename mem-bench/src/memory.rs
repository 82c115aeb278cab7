//! Heap usage from the engine's GC trace
//!
//! With `--trace-gc` every collection prints a line such as
//! `   123 ms: Mark-sweep 12.3 (45.6) -> 7.8 (40.1) MB, ...`. The largest
//! before-size is the peak heap; the largest after-size is the floor the
//! live data never went below.

use regex::Regex;
use serde::Serialize;
use std::fmt;

/// Minimum and maximum heap in MB. `-1` when no collection ran.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MemUsage {
    pub min_heap: f64,
    pub max_heap: f64,
}

impl MemUsage {
    /// Reported when heap measurement is turned off
    pub const DISABLED: MemUsage = MemUsage {
        min_heap: 0.0,
        max_heap: 0.0,
    };

    /// No GC line was seen
    pub const UNKNOWN: MemUsage = MemUsage {
        min_heap: -1.0,
        max_heap: -1.0,
    };
}

impl fmt::Display for MemUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}MB--{:.1}MB", self.min_heap, self.max_heap)
    }
}

const GC_LINE: &str = r"(.*)ms: [\w-]+ ([\d.]+) \([\d.]+\) -> ([\d.]+) \([\d.]+\) MB";

/// Scans `--trace-gc` output for heap sizes
#[derive(Debug, Clone)]
pub struct GcTraceParser {
    line: Regex,
}

impl GcTraceParser {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            line: Regex::new(GC_LINE)?,
        })
    }

    pub fn parse(&self, output: &str) -> MemUsage {
        let mut usage = MemUsage::UNKNOWN;
        let mut collections = 0usize;
        for caps in output.lines().filter_map(|line| self.line.captures(line)) {
            let (Ok(before), Ok(after)) = (caps[2].parse::<f64>(), caps[3].parse::<f64>()) else {
                continue;
            };
            collections += 1;
            usage.max_heap = usage.max_heap.max(before);
            usage.min_heap = usage.min_heap.max(after);
        }
        log::debug!("Parsed {} GC lines: {}", collections, usage);
        usage
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_gc_trace() {
        let output = "\
[1234:0x1]       12 ms: Scavenge 2.1 (4.0) -> 1.8 (5.0) MB, 0.5 / 0.0 ms
benchmark output
[1234:0x1]      250 ms: Mark-sweep 30.5 (40.0) -> 12.25 (38.0) MB, 8.1 / 0.0 ms
[1234:0x1]      300 ms: Scavenge 14.0 (38.0) -> 13.0 (38.0) MB, 0.4 / 0.0 ms
";
        let usage = GcTraceParser::new().unwrap().parse(output);
        assert_eq!(usage.max_heap, 30.5);
        assert_eq!(usage.min_heap, 13.0);
    }

    #[test]
    fn test_no_gc_lines() {
        let parser = GcTraceParser::new().unwrap();
        assert_eq!(parser.parse("Richards: 1234\nScore: 99\n"), MemUsage::UNKNOWN);
    }

    #[test]
    fn test_display() {
        let usage = MemUsage {
            min_heap: 1.24,
            max_heap: 30.0,
        };
        assert_eq!(usage.to_string(), "1.2MB--30.0MB");
        assert_eq!(MemUsage::DISABLED.to_string(), "0.0MB--0.0MB");
        assert_eq!(MemUsage::UNKNOWN.to_string(), "-1.0MB---1.0MB");
    }
}

//! `inspect` subcommand: summarize captured traces

use mem_trace::{LogEntryKind, TraceReader, TraceSummary};
use rayon::prelude::*;
use std::path::{Path, PathBuf};

/// Summary of one trace file, or why it could not be read
#[derive(Debug)]
pub struct Inspection {
    pub path: PathBuf,
    pub summary: mem_trace::Result<TraceSummary>,
}

/// Decode every trace, several at a time
pub fn inspect_traces(paths: &[PathBuf]) -> Vec<Inspection> {
    paths
        .par_iter()
        .map(|path| Inspection {
            path: path.clone(),
            summary: summarize(path),
        })
        .collect()
}

fn summarize(path: &Path) -> mem_trace::Result<TraceSummary> {
    let reader = TraceReader::open(path)?;
    log::debug!("{:?}: {:?} encoding", path, reader.format());
    TraceSummary::from_reader(reader)
}

/// Human-readable lines for one inspection
pub fn inspection_lines(inspection: &Inspection) -> Vec<String> {
    let mut lines = vec![inspection.path.display().to_string()];
    let summary = match &inspection.summary {
        Ok(summary) => summary,
        Err(e) => {
            lines.push(format!("  error: {}", e));
            return lines;
        }
    };

    lines.push(format!("  entries {}", summary.total));
    for kind in LogEntryKind::ALL {
        let count = summary.count(kind);
        if count > 0 {
            lines.push(format!("  {:<22} {}", kind.name(), count));
        }
    }
    lines.push(format!(
        "  objects {} (functions {})",
        summary.allocated_objects, summary.functions
    ));
    if summary.truncated {
        lines.push("  truncated: last record incomplete".to_string());
    }
    if summary.adjacency_violations.is_empty() {
        lines.push("  prototype ids: ok".to_string());
    } else {
        for v in &summary.adjacency_violations {
            lines.push(format!("  {}", v));
        }
    }
    lines
}

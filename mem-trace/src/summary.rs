//! Trace statistics and consistency checks
//!
//! Used by the harness to report on captured traces and by tests to verify
//! that a recorder produced a well-formed stream.

use crate::entry::{LogEntry, LogEntryKind};
use crate::reader::TraceReader;
use crate::types::{ObjectId, Result};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// A function whose implicit prototype id is unusable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum AdjacencyViolation {
    /// Another record allocated the function's `id + 1`
    Reused {
        function: ObjectId,
        prototype: ObjectId,
        reused_by: LogEntryKind,
    },
    /// The function took the largest id, leaving none for its prototype
    NoRoom { function: ObjectId },
}

impl fmt::Display for AdjacencyViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdjacencyViolation::Reused {
                function,
                prototype,
                reused_by,
            } => write!(
                f,
                "prototype id {} of function {} reused by {}",
                prototype, function, reused_by
            ),
            AdjacencyViolation::NoRoom { function } => {
                write!(f, "function {} leaves no id for its prototype", function)
            }
        }
    }
}

/// Per-kind counts of a trace
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TraceSummary {
    pub total: u64,
    pub per_kind: BTreeMap<LogEntryKind, u64>,
    pub allocated_objects: u64,
    pub functions: u64,
    /// The trace ended in an incomplete record
    pub truncated: bool,
    pub adjacency_violations: Vec<AdjacencyViolation>,
}

impl TraceSummary {
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a LogEntry>) -> Self {
        let mut summary = TraceSummary::default();
        let mut allocations = HashMap::new();
        let mut functions = Vec::new();

        for entry in entries {
            summary.observe(entry, &mut allocations, &mut functions);
        }
        summary.adjacency_violations = adjacency_violations(&allocations, &functions);
        summary
    }

    /// Drain a reader, stopping at the first corrupt record
    pub fn from_reader(mut reader: TraceReader) -> Result<Self> {
        let mut summary = TraceSummary::default();
        let mut allocations = HashMap::new();
        let mut functions = Vec::new();

        for entry in reader.by_ref() {
            summary.observe(&entry?, &mut allocations, &mut functions);
        }
        summary.truncated = reader.is_truncated();
        summary.adjacency_violations = adjacency_violations(&allocations, &functions);
        Ok(summary)
    }

    pub fn count(&self, kind: LogEntryKind) -> u64 {
        self.per_kind.get(&kind).copied().unwrap_or(0)
    }

    fn observe(
        &mut self,
        entry: &LogEntry,
        allocations: &mut HashMap<ObjectId, LogEntryKind>,
        functions: &mut Vec<ObjectId>,
    ) {
        let kind = entry.kind();
        self.total += 1;
        *self.per_kind.entry(kind).or_insert(0) += 1;

        if let Some(obj) = entry.allocated_object() {
            self.allocated_objects += 1;
            allocations.insert(obj, kind);
            if kind == LogEntryKind::CreateFun {
                self.functions += 1;
                functions.push(obj);
            }
        }
    }
}

/// Every function's `id + 1` must never be allocated by another record
pub fn check_prototype_adjacency(entries: &[LogEntry]) -> Vec<AdjacencyViolation> {
    TraceSummary::from_entries(entries).adjacency_violations
}

fn adjacency_violations(
    allocations: &HashMap<ObjectId, LogEntryKind>,
    functions: &[ObjectId],
) -> Vec<AdjacencyViolation> {
    functions
        .iter()
        .filter_map(|&function| match function.prototype() {
            Some(prototype) => allocations
                .get(&prototype)
                .map(|&reused_by| AdjacencyViolation::Reused {
                    function,
                    prototype,
                    reused_by,
                }),
            None => Some(AdjacencyViolation::NoRoom { function }),
        })
        .collect()
}

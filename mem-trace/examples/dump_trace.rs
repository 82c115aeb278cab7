//! Standalone trace dump tool
//!
//! Prints every record of a memory trace (binary or ASCII), followed by
//! per-kind counts.
//!
//! Usage:
//!   dump_trace <trace-file> [--limit <count>] [--kind <KIND>]
//!
//! Example:
//!   dump_trace out/richards_inst/mem-trace --kind CALL --limit 100

use mem_trace::{LogEntry, LogEntryKind, TraceReader};
use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;

fn describe(entry: &LogEntry) -> String {
    match entry {
        LogEntry::Call {
            iid,
            fun,
            enter_iid,
            fun_script,
        } => format!("call at {} of #{} (enters {} in script {})", iid, fun, enter_iid, fun_script),
        LogEntry::CreateFun { iid, enter_iid, obj } => match obj.prototype() {
            Some(proto) => format!(
                "function #{} (prototype #{}) at {}, enters {}",
                obj, proto, iid, enter_iid
            ),
            None => format!("function #{} (no prototype id) at {}, enters {}", obj, iid, enter_iid),
        },
        LogEntry::PutField { base, prop, val, .. } => format!("#{}.{} = #{}", base, prop, val),
        other => format!("{:?}", other),
    }
}

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <trace-file> [--limit <count>] [--kind <KIND>]", args[0]);
        std::process::exit(1);
    }

    let path = PathBuf::from(&args[1]);
    let mut limit = None;
    let mut only = None;
    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--limit" if i + 1 < args.len() => {
                limit = args[i + 1].parse::<usize>().ok();
                i += 2;
            }
            "--kind" if i + 1 < args.len() => {
                only = LogEntryKind::ALL
                    .into_iter()
                    .find(|k| k.name().eq_ignore_ascii_case(&args[i + 1]));
                i += 2;
            }
            other => {
                eprintln!("Unknown argument: {}", other);
                std::process::exit(1);
            }
        }
    }

    let reader = match TraceReader::open(&path) {
        Ok(reader) => reader,
        Err(e) => {
            eprintln!("Cannot open {:?}: {}", path, e);
            std::process::exit(1);
        }
    };
    println!("=== {:?} ({:?}) ===", path, reader.format());

    let mut counts: BTreeMap<LogEntryKind, usize> = BTreeMap::new();
    let mut printed = 0;
    for (index, entry) in reader.enumerate() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                eprintln!("Corrupt record #{}: {}", index, e);
                break;
            }
        };
        *counts.entry(entry.kind()).or_insert(0) += 1;
        if only.map_or(true, |k| k == entry.kind()) && limit.map_or(true, |l| printed < l) {
            println!("{:>8} {:<22} {}", index, entry.kind().name(), describe(&entry));
            printed += 1;
        }
    }

    println!("\n=== SUMMARY ===");
    for (kind, count) in &counts {
        println!("  {:<22} {}", kind.name(), count);
    }
}

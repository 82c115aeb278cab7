//! On-disk traces: every record kind through both encodings, encoding
//! auto-detection and truncated captures.

use mem_trace::*;
use std::fs;
use std::path::Path;

fn sample_entries() -> Vec<LogEntry> {
    let source = SourceId::new(ScriptId(2), Iid(40));
    vec![
        LogEntry::Declare { iid: Iid(1), name: "x".into(), obj: ObjectId(1) },
        LogEntry::CreateObj { iid: Iid(2), obj: ObjectId(1) },
        LogEntry::CreateFun { iid: Iid(3), enter_iid: Iid(17), obj: ObjectId(2) },
        LogEntry::PutField { iid: Iid(4), base: ObjectId(1), prop: "fn".into(), val: ObjectId(2) },
        LogEntry::Write { iid: Iid(5), name: "y".into(), obj: ObjectId::NONE },
        LogEntry::LastUse { obj: ObjectId(1), timestamp: 1_700_000_000_123, source },
        LogEntry::FunctionEnter { iid: Iid(17), fun: ObjectId(2) },
        LogEntry::FunctionExit { iid: Iid(17) },
        LogEntry::TopLevelFlush { loc: FlushLoc::Source(source) },
        LogEntry::UpdateIid { obj: ObjectId(1), new_iid: Iid(8) },
        LogEntry::Debug { call_iid: Iid(9), obj: ObjectId(1) },
        LogEntry::Return { obj: ObjectId(2) },
        LogEntry::CreateDomNode { iid: Iid::INIT_DOM_TRAVERSAL, obj: ObjectId(4) },
        LogEntry::AddDomChild { parent: ObjectId(4), child: ObjectId(5) },
        LogEntry::RemoveDomChild { parent: ObjectId(4), child: ObjectId(5) },
        LogEntry::AddToChildSet { iid: Iid::UNKNOWN, parent: ObjectId(4), name: "childNodes".into(), child: ObjectId(5) },
        LogEntry::RemoveFromChildSet { iid: Iid::UNKNOWN, parent: ObjectId(4), name: "childNodes".into(), child: ObjectId(5) },
        LogEntry::DomRoot { obj: ObjectId(4) },
        LogEntry::Call { iid: Iid(10), fun: ObjectId(2), enter_iid: Iid(17), fun_script: ScriptId(2) },
        LogEntry::ScriptEnter { iid: Iid(11), script: ScriptId(3), filename: "dir/app é.js".into() },
        LogEntry::ScriptExit { iid: Iid(11) },
        LogEntry::FreeVars { iid: Iid(12), vars: FreeVars::Names(vec!["a".into(), "b".into()]) },
        LogEntry::FreeVars { iid: Iid(13), vars: FreeVars::Any },
        LogEntry::SourceMapping { iid: Iid(14), start_line: 1, start_column: 0, end_line: 3, end_column: 12 },
        LogEntry::UpdateCurrentScript { script: ScriptId(3) },
        LogEntry::TopLevelFlush { loc: FlushLoc::AlreadyFlushed },
        LogEntry::EndLastUse,
    ]
}

fn write_trace(path: &Path, format: TraceFormat, entries: &[LogEntry]) {
    // Small batches so the file is written across several flushes
    let config = TraceConfig::new().with_format(format).with_max_buf_size(64);
    let mut writer = TraceWriter::create(path, &config).unwrap();
    for entry in entries {
        writer.append(entry).unwrap();
    }
    writer.finish().unwrap();
}

#[test]
fn test_every_kind_survives_both_encodings() {
    let dir = tempfile::tempdir().unwrap();
    let entries = sample_entries();
    let kinds: std::collections::HashSet<_> = entries.iter().map(LogEntry::kind).collect();
    assert_eq!(kinds.len(), LogEntryKind::ALL.len());

    for format in [TraceFormat::Binary, TraceFormat::Ascii] {
        let path = dir.path().join(format!("{:?}.trace", format));
        write_trace(&path, format, &entries);

        let mut reader = TraceReader::open(&path).unwrap();
        assert_eq!(reader.format(), format);
        assert_eq!(reader.read_all().unwrap(), entries);
        assert!(!reader.is_truncated());
    }
}

#[test]
fn test_ascii_trace_is_line_per_record() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ascii.trace");
    write_trace(&path, TraceFormat::Ascii, &sample_entries());

    let text = fs::read_to_string(&path).unwrap();
    assert_eq!(text.lines().count(), sample_entries().len());
    assert!(text.lines().all(|line| line.starts_with('[')));
    assert!(text.ends_with('\n'));
}

#[test]
fn test_killed_process_leaves_readable_prefix() {
    let dir = tempfile::tempdir().unwrap();
    let mut entries = sample_entries();
    entries.push(LogEntry::Write { iid: Iid(99), name: "tail".into(), obj: ObjectId(1) });

    for format in [TraceFormat::Binary, TraceFormat::Ascii] {
        let path = dir.path().join(format!("{:?}-killed.trace", format));
        write_trace(&path, format, &entries);
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() - 3]).unwrap();

        let mut reader = TraceReader::open(&path).unwrap();
        let prefix = reader.read_all().unwrap();
        assert!(reader.is_truncated());
        assert_eq!(prefix.len(), entries.len() - 1);
        assert_eq!(prefix[..], entries[..entries.len() - 1]);
    }
}

#[test]
fn test_summary_of_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("summary.trace");
    write_trace(&path, TraceFormat::Binary, &sample_entries());

    let summary = TraceSummary::from_reader(TraceReader::open(&path).unwrap()).unwrap();
    assert_eq!(summary.total, sample_entries().len() as u64);
    assert_eq!(summary.count(LogEntryKind::FreeVars), 2);
    assert_eq!(summary.functions, 1);
    assert!(!summary.truncated);

    let json = serde_json::to_value(&summary).unwrap();
    assert_eq!(json["per_kind"]["CALL"], 1);
}

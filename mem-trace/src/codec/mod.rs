//! Trace encodings (binary, ASCII)
//!
//! Both encodings carry the same record sequence. The field layout of every
//! kind is written down once, in [`read_fields`] and [`write_fields`]; each
//! codec only supplies the primitive field readers and writers.
//!
//! - binary: one discriminant byte followed by big-endian fields (the default
//!   `mem-trace` file)
//! - ascii: one JSON array `[discriminant, field, ...]` per line
//!
//! Both are self-delimiting, so a decoder can tell a cleanly finished trace
//! from one whose last record was cut off.

use crate::entry::{LogEntry, LogEntryKind};
use crate::types::{FlushLoc, FreeVars, Iid, ObjectId, Result, ScriptId, SourceId};
use serde::{Deserialize, Serialize};
use std::io::{self, Read};

pub mod ascii;
pub mod binary;

// Re-export codec types
pub use ascii::{AsciiDecoder, AsciiEncoder};
pub use binary::{BinaryDecoder, BinaryEncoder};

/// On-disk encoding of a trace
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceFormat {
    #[default]
    Binary,
    Ascii,
}

impl TraceFormat {
    /// Detect the encoding from the first byte of a trace.
    ///
    /// ASCII traces start with `[`, which is never a valid binary discriminant.
    pub fn detect(first_byte: Option<u8>) -> Self {
        match first_byte {
            Some(b'[') => TraceFormat::Ascii,
            _ => TraceFormat::Binary,
        }
    }

    /// Encoder for this format
    pub fn encoder(self) -> Box<dyn EntryEncoder> {
        match self {
            TraceFormat::Binary => Box::new(BinaryEncoder),
            TraceFormat::Ascii => Box::new(AsciiEncoder),
        }
    }
}

/// Appends the encoded form of an entry to a byte buffer
pub trait EntryEncoder {
    fn encode(&self, entry: &LogEntry, out: &mut Vec<u8>) -> Result<()>;
}

/// Outcome of decoding one record
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// A complete record
    Entry(LogEntry),
    /// Clean end of input
    End,
    /// Input ended in the middle of a record
    Truncated,
}

/// Decodes records one at a time from an underlying reader
pub trait EntryDecoder {
    fn decode_next(&mut self) -> Result<Decoded>;

    /// Byte offset of the next undecoded record
    fn offset(&self) -> u64;
}

/// Primitive field readers a codec provides
pub(crate) trait FieldSource {
    fn int(&mut self) -> Result<i32>;
    fn uint(&mut self) -> Result<u32>;
    fn long(&mut self) -> Result<i64>;
    fn string(&mut self) -> Result<String>;
    fn free_vars(&mut self) -> Result<FreeVars>;

    fn iid(&mut self) -> Result<Iid> {
        self.int().map(Iid)
    }

    fn obj(&mut self) -> Result<ObjectId> {
        self.uint().map(ObjectId)
    }

    fn script(&mut self) -> Result<ScriptId> {
        self.int().map(ScriptId)
    }

    fn source_id(&mut self) -> Result<SourceId> {
        self.string()?.parse()
    }

    fn flush_loc(&mut self) -> Result<FlushLoc> {
        self.string()?.parse()
    }
}

/// Primitive field writers a codec provides
pub(crate) trait FieldSink {
    fn int(&mut self, value: i32) -> Result<()>;
    fn uint(&mut self, value: u32) -> Result<()>;
    fn long(&mut self, value: i64) -> Result<()>;
    fn string(&mut self, value: &str) -> Result<()>;
    fn free_vars(&mut self, value: &FreeVars) -> Result<()>;
}

/// Read the fields of a record of the given kind, in wire order
pub(crate) fn read_fields<S: FieldSource>(kind: LogEntryKind, src: &mut S) -> Result<LogEntry> {
    let entry = match kind {
        LogEntryKind::Declare => LogEntry::Declare {
            iid: src.iid()?,
            name: src.string()?,
            obj: src.obj()?,
        },
        LogEntryKind::CreateObj => LogEntry::CreateObj {
            iid: src.iid()?,
            obj: src.obj()?,
        },
        LogEntryKind::CreateFun => LogEntry::CreateFun {
            iid: src.iid()?,
            enter_iid: src.iid()?,
            obj: src.obj()?,
        },
        LogEntryKind::Putfield => LogEntry::PutField {
            iid: src.iid()?,
            base: src.obj()?,
            prop: src.string()?,
            val: src.obj()?,
        },
        LogEntryKind::Write => LogEntry::Write {
            iid: src.iid()?,
            name: src.string()?,
            obj: src.obj()?,
        },
        LogEntryKind::LastUse => LogEntry::LastUse {
            obj: src.obj()?,
            timestamp: src.long()?,
            source: src.source_id()?,
        },
        LogEntryKind::FunctionEnter => LogEntry::FunctionEnter {
            iid: src.iid()?,
            fun: src.obj()?,
        },
        LogEntryKind::FunctionExit => LogEntry::FunctionExit { iid: src.iid()? },
        LogEntryKind::TopLevelFlush => LogEntry::TopLevelFlush {
            loc: src.flush_loc()?,
        },
        LogEntryKind::UpdateIid => LogEntry::UpdateIid {
            obj: src.obj()?,
            new_iid: src.iid()?,
        },
        LogEntryKind::Debug => LogEntry::Debug {
            call_iid: src.iid()?,
            obj: src.obj()?,
        },
        LogEntryKind::Return => LogEntry::Return { obj: src.obj()? },
        LogEntryKind::CreateDomNode => LogEntry::CreateDomNode {
            iid: src.iid()?,
            obj: src.obj()?,
        },
        LogEntryKind::AddDomChild => LogEntry::AddDomChild {
            parent: src.obj()?,
            child: src.obj()?,
        },
        LogEntryKind::RemoveDomChild => LogEntry::RemoveDomChild {
            parent: src.obj()?,
            child: src.obj()?,
        },
        LogEntryKind::AddToChildSet => LogEntry::AddToChildSet {
            iid: src.iid()?,
            parent: src.obj()?,
            name: src.string()?,
            child: src.obj()?,
        },
        LogEntryKind::RemoveFromChildSet => LogEntry::RemoveFromChildSet {
            iid: src.iid()?,
            parent: src.obj()?,
            name: src.string()?,
            child: src.obj()?,
        },
        LogEntryKind::DomRoot => LogEntry::DomRoot { obj: src.obj()? },
        LogEntryKind::Call => LogEntry::Call {
            iid: src.iid()?,
            fun: src.obj()?,
            enter_iid: src.iid()?,
            fun_script: src.script()?,
        },
        LogEntryKind::ScriptEnter => LogEntry::ScriptEnter {
            iid: src.iid()?,
            script: src.script()?,
            filename: src.string()?,
        },
        LogEntryKind::ScriptExit => LogEntry::ScriptExit { iid: src.iid()? },
        LogEntryKind::FreeVars => LogEntry::FreeVars {
            iid: src.iid()?,
            vars: src.free_vars()?,
        },
        LogEntryKind::SourceMapping => LogEntry::SourceMapping {
            iid: src.iid()?,
            start_line: src.int()?,
            start_column: src.int()?,
            end_line: src.int()?,
            end_column: src.int()?,
        },
        LogEntryKind::UpdateCurrentScript => LogEntry::UpdateCurrentScript {
            script: src.script()?,
        },
        LogEntryKind::EndLastUse => LogEntry::EndLastUse,
    };
    Ok(entry)
}

/// Write the fields of a record (without its discriminant), in wire order
pub(crate) fn write_fields<S: FieldSink>(entry: &LogEntry, sink: &mut S) -> Result<()> {
    match entry {
        LogEntry::Declare { iid, name, obj } | LogEntry::Write { iid, name, obj } => {
            sink.int(iid.0)?;
            sink.string(name)?;
            sink.uint(obj.0)
        }
        LogEntry::CreateObj { iid, obj } | LogEntry::CreateDomNode { iid, obj } => {
            sink.int(iid.0)?;
            sink.uint(obj.0)
        }
        LogEntry::CreateFun { iid, enter_iid, obj } => {
            sink.int(iid.0)?;
            sink.int(enter_iid.0)?;
            sink.uint(obj.0)
        }
        LogEntry::PutField {
            iid,
            base,
            prop,
            val,
        } => {
            sink.int(iid.0)?;
            sink.uint(base.0)?;
            sink.string(prop)?;
            sink.uint(val.0)
        }
        LogEntry::LastUse {
            obj,
            timestamp,
            source,
        } => {
            sink.uint(obj.0)?;
            sink.long(*timestamp)?;
            sink.string(&source.to_string())
        }
        LogEntry::FunctionEnter { iid, fun } => {
            sink.int(iid.0)?;
            sink.uint(fun.0)
        }
        LogEntry::FunctionExit { iid } | LogEntry::ScriptExit { iid } => sink.int(iid.0),
        LogEntry::TopLevelFlush { loc } => sink.string(&loc.to_string()),
        LogEntry::UpdateIid { obj, new_iid } => {
            sink.uint(obj.0)?;
            sink.int(new_iid.0)
        }
        LogEntry::Debug { call_iid, obj } => {
            sink.int(call_iid.0)?;
            sink.uint(obj.0)
        }
        LogEntry::Return { obj } | LogEntry::DomRoot { obj } => sink.uint(obj.0),
        LogEntry::AddDomChild { parent, child } | LogEntry::RemoveDomChild { parent, child } => {
            sink.uint(parent.0)?;
            sink.uint(child.0)
        }
        LogEntry::AddToChildSet {
            iid,
            parent,
            name,
            child,
        }
        | LogEntry::RemoveFromChildSet {
            iid,
            parent,
            name,
            child,
        } => {
            sink.int(iid.0)?;
            sink.uint(parent.0)?;
            sink.string(name)?;
            sink.uint(child.0)
        }
        LogEntry::Call {
            iid,
            fun,
            enter_iid,
            fun_script,
        } => {
            sink.int(iid.0)?;
            sink.uint(fun.0)?;
            sink.int(enter_iid.0)?;
            sink.int(fun_script.0)
        }
        LogEntry::ScriptEnter {
            iid,
            script,
            filename,
        } => {
            sink.int(iid.0)?;
            sink.int(script.0)?;
            sink.string(filename)
        }
        LogEntry::FreeVars { iid, vars } => {
            sink.int(iid.0)?;
            sink.free_vars(vars)
        }
        LogEntry::SourceMapping {
            iid,
            start_line,
            start_column,
            end_line,
            end_column,
        } => {
            sink.int(iid.0)?;
            sink.int(*start_line)?;
            sink.int(*start_column)?;
            sink.int(*end_line)?;
            sink.int(*end_column)
        }
        LogEntry::UpdateCurrentScript { script } => sink.int(script.0),
        LogEntry::EndLastUse => Ok(()),
    }
}

/// Reader wrapper that tracks how many bytes have been consumed
pub(crate) struct CountingReader<R> {
    inner: R,
    position: u64,
}

impl<R> CountingReader<R> {
    pub(crate) fn new(inner: R) -> Self {
        Self { inner, position: 0 }
    }

    pub(crate) fn position(&self) -> u64 {
        self.position
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.position += n as u64;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_detection() {
        assert_eq!(TraceFormat::detect(Some(b'[')), TraceFormat::Ascii);
        assert_eq!(TraceFormat::detect(Some(0)), TraceFormat::Binary);
        assert_eq!(TraceFormat::detect(Some(24)), TraceFormat::Binary);
        assert_eq!(TraceFormat::detect(None), TraceFormat::Binary);
    }

    #[test]
    fn test_counting_reader() {
        let mut reader = CountingReader::new(&b"abcdef"[..]);
        let mut buf = [0u8; 4];
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(reader.position(), 4);
    }
}

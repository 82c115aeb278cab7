//! ASCII trace encoding
//!
//! One record per line, as a JSON array whose first element is the kind
//! discriminant: `[2,5,9,12]` is `CREATE_FUN(iid 5, enter 9, obj 12)`.
//! Free-variable lists are JSON arrays, or the string `"ANY"`.
//! A last line without a terminating newline is a truncated record.

use super::{read_fields, write_fields, Decoded, EntryDecoder, EntryEncoder, FieldSink, FieldSource};
use crate::entry::{LogEntry, LogEntryKind};
use crate::types::{FreeVars, Result, TraceError};
use serde_json::Value;
use std::io::BufRead;

const ANY_FREE_VARS: &str = "ANY";

/// Encoder for the ASCII format
#[derive(Debug, Clone, Copy, Default)]
pub struct AsciiEncoder;

impl EntryEncoder for AsciiEncoder {
    fn encode(&self, entry: &LogEntry, out: &mut Vec<u8>) -> Result<()> {
        let mut sink = JsonSink {
            values: vec![Value::from(entry.kind().code())],
        };
        write_fields(entry, &mut sink)?;
        serde_json::to_writer(&mut *out, &Value::Array(sink.values))
            .map_err(|e| TraceError::Encode(e.to_string()))?;
        out.push(b'\n');
        Ok(())
    }
}

struct JsonSink {
    values: Vec<Value>,
}

impl FieldSink for JsonSink {
    fn int(&mut self, value: i32) -> Result<()> {
        self.values.push(Value::from(value));
        Ok(())
    }

    fn uint(&mut self, value: u32) -> Result<()> {
        self.values.push(Value::from(value));
        Ok(())
    }

    fn long(&mut self, value: i64) -> Result<()> {
        self.values.push(Value::from(value));
        Ok(())
    }

    fn string(&mut self, value: &str) -> Result<()> {
        self.values.push(Value::from(value));
        Ok(())
    }

    fn free_vars(&mut self, value: &FreeVars) -> Result<()> {
        let encoded = match value {
            FreeVars::Any => Value::from(ANY_FREE_VARS),
            FreeVars::Names(names) => Value::from(names.clone()),
        };
        self.values.push(encoded);
        Ok(())
    }
}

/// Decoder for the ASCII format
pub struct AsciiDecoder<R> {
    reader: R,
    offset: u64,
    line: Vec<u8>,
}

impl<R: BufRead> AsciiDecoder<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            offset: 0,
            line: Vec::new(),
        }
    }

    fn parse_line(&self, offset: u64) -> Result<LogEntry> {
        let invalid = |reason: String| TraceError::InvalidRecord { offset, reason };

        let values: Vec<Value> =
            serde_json::from_slice(&self.line).map_err(|e| invalid(e.to_string()))?;
        let mut values = values.into_iter();

        let code = values
            .next()
            .and_then(|v| v.as_u64())
            .ok_or_else(|| invalid("missing kind discriminant".to_string()))?;
        let kind = u8::try_from(code)
            .ok()
            .and_then(LogEntryKind::from_code)
            .ok_or(TraceError::UnknownKind { kind: code, offset })?;

        let mut fields = JsonFields { values, offset };
        let entry = read_fields(kind, &mut fields)?;
        if fields.values.next().is_some() {
            return Err(invalid(format!("extra fields after {}", kind)));
        }
        Ok(entry)
    }
}

impl<R: BufRead> EntryDecoder for AsciiDecoder<R> {
    fn decode_next(&mut self) -> Result<Decoded> {
        loop {
            let offset = self.offset;
            self.line.clear();
            let n = self.reader.read_until(b'\n', &mut self.line)?;
            if n == 0 {
                return Ok(Decoded::End);
            }
            self.offset += n as u64;

            if self.line.last() != Some(&b'\n') {
                return Ok(Decoded::Truncated);
            }
            if self.line.iter().all(|b| b.is_ascii_whitespace()) {
                continue;
            }
            return self.parse_line(offset).map(Decoded::Entry);
        }
    }

    fn offset(&self) -> u64 {
        self.offset
    }
}

struct JsonFields {
    values: std::vec::IntoIter<Value>,
    offset: u64,
}

impl JsonFields {
    fn next_value(&mut self, expected: &str) -> Result<Value> {
        self.values.next().ok_or_else(|| TraceError::InvalidRecord {
            offset: self.offset,
            reason: format!("missing {} field", expected),
        })
    }

    fn mismatch(&self, expected: &str, found: &Value) -> TraceError {
        TraceError::InvalidRecord {
            offset: self.offset,
            reason: format!("expected {}, found {}", expected, found),
        }
    }
}

impl FieldSource for JsonFields {
    fn int(&mut self) -> Result<i32> {
        let value = self.next_value("integer")?;
        value
            .as_i64()
            .and_then(|v| i32::try_from(v).ok())
            .ok_or_else(|| self.mismatch("32-bit integer", &value))
    }

    fn uint(&mut self) -> Result<u32> {
        let value = self.next_value("object id")?;
        value
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| self.mismatch("object id", &value))
    }

    fn long(&mut self) -> Result<i64> {
        let value = self.next_value("timestamp")?;
        value
            .as_i64()
            .ok_or_else(|| self.mismatch("timestamp", &value))
    }

    fn string(&mut self) -> Result<String> {
        match self.next_value("string")? {
            Value::String(s) => Ok(s),
            other => Err(self.mismatch("string", &other)),
        }
    }

    fn free_vars(&mut self) -> Result<FreeVars> {
        match self.next_value("free variables")? {
            Value::String(s) if s == ANY_FREE_VARS => Ok(FreeVars::Any),
            Value::Array(items) => {
                let mut names = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::String(name) => names.push(name),
                        other => return Err(self.mismatch("variable name", &other)),
                    }
                }
                Ok(FreeVars::Names(names))
            }
            other => Err(self.mismatch("free variable list", &other)),
        }
    }
}

//! Binary trace encoding
//!
//! Record layout: one discriminant byte, then the fields of the kind in wire
//! order. Integers are 4-byte big-endian, timestamps 8-byte big-endian,
//! strings a `u32` byte length followed by UTF-8 bytes. Free-variable lists are
//! an `i32` count (`-1` for "any") followed by the names.

use super::{read_fields, write_fields, CountingReader, Decoded, EntryDecoder, EntryEncoder, FieldSink, FieldSource};
use crate::entry::{LogEntry, LogEntryKind};
use crate::types::{FreeVars, Result, TraceError};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read};

/// Count written for `FreeVars::Any`
const ANY_FREE_VARS: i32 = -1;

/// Encoder for the binary format
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryEncoder;

impl EntryEncoder for BinaryEncoder {
    fn encode(&self, entry: &LogEntry, out: &mut Vec<u8>) -> Result<()> {
        out.push(entry.kind().code());
        write_fields(entry, &mut BinarySink { out })
    }
}

struct BinarySink<'a> {
    out: &'a mut Vec<u8>,
}

impl FieldSink for BinarySink<'_> {
    fn int(&mut self, value: i32) -> Result<()> {
        self.out.write_i32::<BigEndian>(value)?;
        Ok(())
    }

    fn uint(&mut self, value: u32) -> Result<()> {
        self.out.write_u32::<BigEndian>(value)?;
        Ok(())
    }

    fn long(&mut self, value: i64) -> Result<()> {
        self.out.write_i64::<BigEndian>(value)?;
        Ok(())
    }

    fn string(&mut self, value: &str) -> Result<()> {
        let len = u32::try_from(value.len())
            .map_err(|_| TraceError::Encode(format!("string of {} bytes", value.len())))?;
        self.out.write_u32::<BigEndian>(len)?;
        self.out.extend_from_slice(value.as_bytes());
        Ok(())
    }

    fn free_vars(&mut self, value: &FreeVars) -> Result<()> {
        match value {
            FreeVars::Any => self.int(ANY_FREE_VARS),
            FreeVars::Names(names) => {
                let count = i32::try_from(names.len())
                    .map_err(|_| TraceError::Encode(format!("{} free variables", names.len())))?;
                self.int(count)?;
                for name in names {
                    self.string(name)?;
                }
                Ok(())
            }
        }
    }
}

/// Decoder for the binary format
pub struct BinaryDecoder<R> {
    reader: CountingReader<R>,
}

impl<R: Read> BinaryDecoder<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: CountingReader::new(reader),
        }
    }

    /// Read the discriminant byte; `None` at a clean end of input
    fn read_tag(&mut self) -> Result<Option<u8>> {
        let mut tag = [0u8; 1];
        loop {
            match self.reader.read(&mut tag) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(tag[0])),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl<R: Read> EntryDecoder for BinaryDecoder<R> {
    fn decode_next(&mut self) -> Result<Decoded> {
        let offset = self.reader.position();
        let tag = match self.read_tag()? {
            Some(tag) => tag,
            None => return Ok(Decoded::End),
        };
        let kind = LogEntryKind::from_code(tag).ok_or(TraceError::UnknownKind {
            kind: tag as u64,
            offset,
        })?;

        let mut fields = BinaryFields {
            reader: &mut self.reader,
            offset,
        };
        match read_fields(kind, &mut fields) {
            Ok(entry) => {
                log::trace!("Decoded {} at offset {}", kind, offset);
                Ok(Decoded::Entry(entry))
            }
            Err(TraceError::Io(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                Ok(Decoded::Truncated)
            }
            Err(e) => Err(e),
        }
    }

    fn offset(&self) -> u64 {
        self.reader.position()
    }
}

struct BinaryFields<'a, R> {
    reader: &'a mut CountingReader<R>,
    offset: u64,
}

impl<R: Read> FieldSource for BinaryFields<'_, R> {
    fn int(&mut self) -> Result<i32> {
        Ok(self.reader.read_i32::<BigEndian>()?)
    }

    fn uint(&mut self) -> Result<u32> {
        Ok(self.reader.read_u32::<BigEndian>()?)
    }

    fn long(&mut self) -> Result<i64> {
        Ok(self.reader.read_i64::<BigEndian>()?)
    }

    fn string(&mut self) -> Result<String> {
        let len = self.reader.read_u32::<BigEndian>()? as u64;
        // Read through `take` so a corrupt length cannot force a huge allocation
        let mut bytes = Vec::new();
        (&mut *self.reader).take(len).read_to_end(&mut bytes)?;
        if (bytes.len() as u64) < len {
            return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
        }
        String::from_utf8(bytes).map_err(|e| TraceError::InvalidString {
            offset: self.offset,
            reason: e.to_string(),
        })
    }

    fn free_vars(&mut self) -> Result<FreeVars> {
        let count = self.int()?;
        if count == ANY_FREE_VARS {
            return Ok(FreeVars::Any);
        }
        if count < 0 {
            return Err(TraceError::InvalidRecord {
                offset: self.offset,
                reason: format!("negative free variable count {}", count),
            });
        }
        let mut names = Vec::new();
        for _ in 0..count {
            names.push(self.string()?);
        }
        Ok(FreeVars::Names(names))
    }
}

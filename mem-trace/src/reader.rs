//! Trace reader API
//!
//! This module provides the primary interface for consuming traces. A
//! [`TraceReader`] lazily decodes records in order, auto-detecting the
//! encoding when opened from a file.
//!
//! Two ways a trace can end early are handled differently:
//! - a truncated trailing record (the traced process was killed) ends the
//!   iteration cleanly; [`TraceReader::is_truncated`] reports it
//! - an unknown kind discriminant means ordering guarantees are lost from that
//!   point on: the error is yielded once and the iterator is exhausted

use crate::codec::{AsciiDecoder, BinaryDecoder, Decoded, EntryDecoder, TraceFormat};
use crate::entry::LogEntry;
use crate::types::Result;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Iterator over the entries of a trace
pub struct TraceReader {
    decoder: Box<dyn EntryDecoder>,
    format: TraceFormat,
    entries_read: u64,
    truncated: bool,
    done: bool,
}

impl TraceReader {
    /// Open a trace file, detecting its encoding from the first byte
    ///
    /// # Example
    /// ```no_run
    /// use mem_trace::TraceReader;
    /// use std::path::Path;
    ///
    /// let reader = TraceReader::open(Path::new("mem-trace")).unwrap();
    /// for entry in reader {
    ///     match entry {
    ///         Ok(entry) => println!("{:?}", entry),
    ///         Err(e) => eprintln!("Corrupt trace: {}", e),
    ///     }
    /// }
    /// ```
    pub fn open(path: &Path) -> Result<Self> {
        log::info!("Opening trace: {:?}", path);
        let mut reader = BufReader::new(File::open(path)?);
        let format = TraceFormat::detect(reader.fill_buf()?.first().copied());
        log::debug!("Detected {:?} trace encoding", format);
        Ok(Self::new(reader, format))
    }

    /// Read a trace of a known encoding from any buffered reader
    pub fn new<R: BufRead + 'static>(reader: R, format: TraceFormat) -> Self {
        let decoder: Box<dyn EntryDecoder> = match format {
            TraceFormat::Binary => Box::new(BinaryDecoder::new(reader)),
            TraceFormat::Ascii => Box::new(AsciiDecoder::new(reader)),
        };
        Self {
            decoder,
            format,
            entries_read: 0,
            truncated: false,
            done: false,
        }
    }

    pub fn format(&self) -> TraceFormat {
        self.format
    }

    /// True once the reader stopped at an incomplete trailing record
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn entries_read(&self) -> u64 {
        self.entries_read
    }

    /// Decode every remaining entry, failing on the first corrupt record
    pub fn read_all(&mut self) -> Result<Vec<LogEntry>> {
        self.by_ref().collect()
    }
}

impl Iterator for TraceReader {
    type Item = Result<LogEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.decoder.decode_next() {
            Ok(Decoded::Entry(entry)) => {
                self.entries_read += 1;
                Some(Ok(entry))
            }
            Ok(Decoded::End) => {
                self.done = true;
                None
            }
            Ok(Decoded::Truncated) => {
                log::warn!(
                    "Trace truncated after {} entries (offset {})",
                    self.entries_read,
                    self.decoder.offset()
                );
                self.truncated = true;
                self.done = true;
                None
            }
            Err(e) => {
                log::error!("Corrupt trace after {} entries: {}", self.entries_read, e);
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

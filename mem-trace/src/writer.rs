//! Buffered trace writer
//!
//! Entries are encoded into an in-memory batch and handed to the sink once the
//! batch reaches the configured threshold. The threshold only decides *when*
//! bytes reach the sink: every appended entry is written, in append order.
//!
//! A failed sink write poisons the writer. Bytes of the failed batch are
//! dropped rather than retried, so the sink never sees a record twice.

use crate::codec::{EntryEncoder, TraceFormat};
use crate::config::TraceConfig;
use crate::entry::LogEntry;
use crate::types::{Result, TraceError};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Ordered, append-only writer of log entries
pub struct TraceWriter<W: Write> {
    sink: W,
    encoder: Box<dyn EntryEncoder>,
    format: TraceFormat,
    buf: Vec<u8>,
    max_buf_size: usize,
    entries_written: u64,
    bytes_flushed: u64,
    poisoned: bool,
}

impl TraceWriter<File> {
    /// Create (or truncate) a trace file
    pub fn create(path: &Path, config: &TraceConfig) -> Result<Self> {
        log::info!("Creating {:?} trace file: {:?}", config.format, path);
        let file = File::create(path)?;
        Ok(Self::new(file, config))
    }
}

impl<W: Write> TraceWriter<W> {
    pub fn new(sink: W, config: &TraceConfig) -> Self {
        Self {
            sink,
            encoder: config.format.encoder(),
            format: config.format,
            buf: Vec::with_capacity(config.max_buf_size.min(crate::entry::MAX_BUF_SIZE)),
            max_buf_size: config.max_buf_size,
            entries_written: 0,
            bytes_flushed: 0,
            poisoned: false,
        }
    }

    /// Append one entry
    pub fn append(&mut self, entry: &LogEntry) -> Result<()> {
        if self.poisoned {
            return Err(TraceError::WriterPoisoned);
        }
        self.encoder.encode(entry, &mut self.buf)?;
        self.entries_written += 1;
        if self.buf.len() >= self.max_buf_size {
            self.flush_buffer()?;
        }
        Ok(())
    }

    /// Hand buffered bytes to the sink and flush it
    pub fn flush(&mut self) -> Result<()> {
        self.flush_buffer()?;
        self.sink.flush()?;
        Ok(())
    }

    /// Flush everything and return the sink
    pub fn finish(mut self) -> Result<W> {
        self.flush()?;
        log::info!(
            "Trace finished: {} entries, {} bytes",
            self.entries_written,
            self.bytes_flushed
        );
        Ok(self.sink)
    }

    pub fn format(&self) -> TraceFormat {
        self.format
    }

    pub fn entries_written(&self) -> u64 {
        self.entries_written
    }

    /// Bytes encoded but not yet handed to the sink
    pub fn buffered_bytes(&self) -> usize {
        self.buf.len()
    }

    pub fn get_ref(&self) -> &W {
        &self.sink
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    fn flush_buffer(&mut self) -> Result<()> {
        if self.poisoned {
            return Err(TraceError::WriterPoisoned);
        }
        if self.buf.is_empty() {
            return Ok(());
        }
        log::debug!("Flushing {} buffered trace bytes", self.buf.len());
        let written = self.sink.write_all(&self.buf);
        let len = self.buf.len() as u64;
        self.buf.clear();
        if let Err(e) = written {
            log::error!("Trace sink failed, dropping a batch of {} bytes: {}", len, e);
            self.poisoned = true;
            return Err(e.into());
        }
        self.bytes_flushed += len;
        Ok(())
    }
}

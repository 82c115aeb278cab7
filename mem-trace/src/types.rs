//! Core types for the memory trace library
//!
//! This module defines the identifiers carried by log entries (instruction ids,
//! object ids, script ids and the composite `script:iid` source ids) together
//! with the error type shared by the codecs, the reader and the recorder.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Result type for trace operations
pub type Result<T> = std::result::Result<T, TraceError>;

/// Timestamp carried by `LAST_USE` records (logical or wall-clock ms)
pub type Timestamp = i64;

/// Static identifier of an instrumentation site (source location)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Iid(pub i32);

impl Iid {
    /// Unknown location. Also used for records emitted by mutation observers.
    pub const UNKNOWN: Iid = Iid(-1);

    /// Synthetic site of the initial DOM traversal that attaches mutation observers
    pub const INIT_DOM_TRAVERSAL: Iid = Iid(-2);

    /// True for the unknown-location sentinel
    pub fn is_unknown(self) -> bool {
        self == Self::UNKNOWN
    }
}

impl fmt::Display for Iid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier assigned to a tracked runtime object when it is first seen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(pub u32);

impl ObjectId {
    /// Written where a record refers to a primitive (non-object) value
    pub const NONE: ObjectId = ObjectId(0);

    /// Id of the prototype object allocated together with a function.
    ///
    /// `CREATE_FUN` never records it: it is always the function id plus one.
    /// `None` for the largest id, which leaves no room for a prototype.
    pub fn prototype(self) -> Option<ObjectId> {
        self.0.checked_add(1).map(ObjectId)
    }

    pub fn is_none(self) -> bool {
        self == Self::NONE
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a loaded script
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScriptId(pub i32);

impl fmt::Display for ScriptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Composite source location `script:iid`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId {
    pub script: ScriptId,
    pub iid: Iid,
}

impl SourceId {
    pub fn new(script: ScriptId, iid: Iid) -> Self {
        Self { script, iid }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.script, self.iid)
    }
}

impl FromStr for SourceId {
    type Err = TraceError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || TraceError::InvalidSourceId(s.to_string());
        let (script, iid) = s.split_once(':').ok_or_else(invalid)?;
        let script = script.parse::<i32>().map_err(|_| invalid())?;
        let iid = iid.parse::<i32>().map_err(|_| invalid())?;
        Ok(SourceId::new(ScriptId(script), Iid(iid)))
    }
}

/// Wire text of the sentinel flush location for sources that were already flushed
pub const ALREADY_FLUSHED: &str = "ALREADY_FLUSHED";

/// Wire text of the flush location used when the flushing site is unknown
pub const UNKNOWN_FLUSH_LOC: &str = "0:-1";

/// Location carried by a `TOP_LEVEL_FLUSH` record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushLoc {
    Source(SourceId),
    AlreadyFlushed,
}

impl FlushLoc {
    /// The `0:-1` location
    pub fn unknown() -> Self {
        FlushLoc::Source(SourceId::new(ScriptId(0), Iid::UNKNOWN))
    }
}

impl fmt::Display for FlushLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlushLoc::Source(source) => write!(f, "{}", source),
            FlushLoc::AlreadyFlushed => write!(f, "{}", ALREADY_FLUSHED),
        }
    }
}

impl FromStr for FlushLoc {
    type Err = TraceError;

    fn from_str(s: &str) -> Result<Self> {
        if s == ALREADY_FLUSHED {
            Ok(FlushLoc::AlreadyFlushed)
        } else {
            s.parse().map(FlushLoc::Source)
        }
    }
}

/// Free variables of a function, as carried by `FREE_VARS`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FreeVars {
    /// Ordered identifier names
    Names(Vec<String>),
    /// All free variables, unresolved
    Any,
}

/// Errors that can occur while encoding, decoding or recording traces
#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unknown log entry kind {kind} at offset {offset}")]
    UnknownKind { kind: u64, offset: u64 },

    #[error("Invalid string in record at offset {offset}: {reason}")]
    InvalidString { offset: u64, reason: String },

    #[error("Invalid source id: {0:?}")]
    InvalidSourceId(String),

    #[error("Invalid record at offset {offset}: {reason}")]
    InvalidRecord { offset: u64, reason: String },

    #[error("Cannot encode record: {0}")]
    Encode(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Trace writer failed earlier; no further entries are accepted")]
    WriterPoisoned,

    #[error("Object id space exhausted")]
    ObjectIdsExhausted,

    #[error("Host error: {0}")]
    Host(#[from] crate::host::HostError),
}

//! Memory Trace Library
//!
//! Runtime side of a heap-lifetime profiler for a dynamic-language engine.
//! Instrumented programs report allocations, writes, calls and DOM mutations
//! to a [`Recorder`], which serializes them as an ordered stream of
//! [`LogEntry`] records for an offline lifetime analysis.
//!
//! # Architecture
//!
//! - `entry` defines the 25 record kinds and their stable discriminants
//! - `codec` holds the binary and line-oriented ASCII encodings
//! - `writer` and `reader` batch records to a sink and decode them back
//! - `host` models the engine's object graph; `intrinsics` captures the
//!   realm's primitives before user code can replace them
//! - `identity` maps each function object to its entry-site iid
//! - `recorder` ties these together behind the instrumentation callbacks
//!
//! The library does NOT run benchmarks, instrument source code or analyze
//! traces. The harness lives in `mem-bench`.
//!
//! # Example Usage
//!
//! ```no_run
//! use mem_trace::{Iid, Realm, Recorder, TraceConfig, TraceFormat, TraceReader};
//! use std::path::Path;
//!
//! let realm = Realm::new();
//! let config = TraceConfig::new().with_format(TraceFormat::Binary);
//! let mut recorder = Recorder::create(&realm, Path::new("mem-trace"), &config).unwrap();
//!
//! // function f() { ... }; f();
//! let f = realm.new_function("function f() { J$.Fe(5); }");
//! recorder.create_fun(Iid(1), &f, None).unwrap();
//! recorder.invoke_pre(Iid(9), &f).unwrap();
//! recorder.function_enter(Iid(5), &f).unwrap();
//! recorder.function_exit(Iid(5)).unwrap();
//! recorder.finish().unwrap();
//!
//! for entry in TraceReader::open(Path::new("mem-trace")).unwrap() {
//!     println!("{:?}", entry.unwrap());
//! }
//! ```

// Public modules
pub mod codec;
pub mod config;
pub mod entry;
pub mod host;
pub mod identity;
pub mod intrinsics;
pub mod reader;
pub mod recorder;
pub mod summary;
pub mod types;
pub mod writer;

// Re-export main types for convenience
pub use codec::TraceFormat;
pub use config::{CacheBackendChoice, TraceConfig};
pub use entry::{LogEntry, LogEntryKind, MAX_BUF_SIZE, WIRE_VERSION};
pub use host::{HostError, JsObject, PropertyDescriptor, Realm, Value};
pub use identity::{CacheBackendKind, CacheStats, FunctionIdentityCache};
pub use intrinsics::Intrinsics;
pub use reader::TraceReader;
pub use recorder::{Recorder, SourceSpan};
pub use summary::{check_prototype_adjacency, AdjacencyViolation, TraceSummary};
pub use types::{
    FlushLoc, FreeVars, Iid, ObjectId, Result, ScriptId, SourceId, Timestamp, TraceError,
    ALREADY_FLUSHED, UNKNOWN_FLUSH_LOC,
};
pub use writer::TraceWriter;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Trace configuration types
//!
//! This module defines the configuration shared by the trace writer, the
//! function-identity cache and the recorder. Buffering and cache backend are
//! performance choices only: no setting here changes which records are
//! written or their order.

use crate::codec::TraceFormat;
use crate::entry::MAX_BUF_SIZE;
use crate::identity::DEFAULT_ENTER_MARKER;
use serde::{Deserialize, Serialize};

/// Configuration for trace recording
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceConfig {
    /// On-disk encoding of the trace
    #[serde(default)]
    pub format: TraceFormat,

    /// Bytes buffered in memory before a flush to the sink (default: 64000)
    #[serde(default = "default_max_buf_size")]
    pub max_buf_size: usize,

    /// Where resolved enter iids are cached
    #[serde(default)]
    pub cache_backend: CacheBackendChoice,

    /// Call the instrumenter places at function entry, followed by the enter iid
    #[serde(default = "default_enter_marker")]
    pub enter_marker: String,
}

fn default_max_buf_size() -> usize {
    MAX_BUF_SIZE
}

fn default_enter_marker() -> String {
    DEFAULT_ENTER_MARKER.to_string()
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            format: TraceFormat::default(),
            max_buf_size: default_max_buf_size(),
            cache_backend: CacheBackendChoice::default(),
            enter_marker: default_enter_marker(),
        }
    }
}

/// Requested function-identity cache backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheBackendChoice {
    /// Identity map when the host supports weak maps, hidden tag otherwise
    #[default]
    Auto,
    /// Identity-keyed weak map (falls back to the hidden tag if unsupported)
    IdentityMap,
    /// Non-enumerable property on the function object
    HiddenTag,
}

impl TraceConfig {
    /// Create a new trace configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set the trace encoding
    pub fn with_format(mut self, format: TraceFormat) -> Self {
        self.format = format;
        self
    }

    /// Builder method: set the flush threshold in bytes
    pub fn with_max_buf_size(mut self, bytes: usize) -> Self {
        self.max_buf_size = bytes;
        self
    }

    /// Builder method: choose the cache backend
    pub fn with_cache_backend(mut self, backend: CacheBackendChoice) -> Self {
        self.cache_backend = backend;
        self
    }

    /// Builder method: set the function-entry marker
    pub fn with_enter_marker(mut self, marker: impl Into<String>) -> Self {
        self.enter_marker = marker.into();
        self
    }
}

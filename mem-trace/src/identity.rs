//! Function-identity cache
//!
//! Maps a runtime function value to the iid of its entry point so the iid is
//! derived at most once per function. Resolution order:
//!
//! 1. a cached value (identity map or hidden tag, whichever backend is active)
//! 2. the iid the engine reported when the function was created
//!    ([`FunctionIdentityCache::record_enter_iid`])
//! 3. the integer after the enter marker (`J$.Fe(<iid>`) in the function's
//!    source text
//! 4. [`Iid::UNKNOWN`] when there is no marker or no source text
//!
//! Whatever is resolved is cached, `UNKNOWN` included: a function without a
//! marker never gains one.

use crate::config::{CacheBackendChoice, TraceConfig};
use crate::host::{JsObject, PropertyDescriptor, Realm, Value, WeakObject};
use crate::intrinsics::Intrinsics;
use crate::types::{Iid, Result, TraceError};
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;

/// Call the instrumenter inserts at every function entry
pub const DEFAULT_ENTER_MARKER: &str = "J$.Fe(";

/// Property name used by the hidden-tag backend
pub const HIDDEN_TAG: &str = "*HP$*";

/// Map keyed by object identity that does not keep its keys alive
#[derive(Debug)]
pub(crate) struct WeakIdentityMap<V> {
    entries: HashMap<usize, (WeakObject, V)>,
    purge_at: usize,
}

const INITIAL_PURGE_AT: usize = 1024;

impl<V: Copy> WeakIdentityMap<V> {
    pub(crate) fn new() -> Self {
        Self {
            entries: HashMap::new(),
            purge_at: INITIAL_PURGE_AT,
        }
    }

    pub(crate) fn get(&self, key: &JsObject) -> Option<V> {
        self.entries
            .get(&key.addr())
            .filter(|(weak, _)| weak.points_to(key))
            .map(|(_, value)| *value)
    }

    pub(crate) fn insert(&mut self, key: &JsObject, value: V) {
        if self.entries.len() >= self.purge_at {
            self.purge_dead();
            self.purge_at = (self.entries.len() * 2).max(INITIAL_PURGE_AT);
        }
        self.entries.insert(key.addr(), (key.downgrade(), value));
    }

    /// Drop entries whose object is gone
    pub(crate) fn purge_dead(&mut self) {
        let before = self.entries.len();
        self.entries.retain(|_, (weak, _)| weak.is_alive());
        log::trace!("Purged {} dead identity entries", before - self.entries.len());
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Active cache backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheBackendKind {
    IdentityMap,
    HiddenTag,
}

#[derive(Debug)]
enum Backend {
    IdentityMap(WeakIdentityMap<Iid>),
    HiddenTag,
}

/// Counters reported when a trace finishes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Misses resolved from the source-text marker
    pub extracted: u64,
    /// Misses resolved to `Iid::UNKNOWN`
    pub unknown: u64,
    /// Values supplied by the engine at function creation
    pub side_channel: u64,
}

/// Function value → enter iid cache
#[derive(Debug)]
pub struct FunctionIdentityCache {
    backend: Backend,
    intrinsics: Intrinsics,
    marker: Regex,
    stats: CacheStats,
}

impl FunctionIdentityCache {
    /// Create a cache for the given realm, choosing the backend once
    pub fn new(realm: &Realm, config: &TraceConfig) -> Result<Self> {
        Self::with_intrinsics(
            Intrinsics::capture(realm),
            realm.supports_weak_maps(),
            config,
        )
    }

    pub fn with_intrinsics(
        intrinsics: Intrinsics,
        supports_weak_maps: bool,
        config: &TraceConfig,
    ) -> Result<Self> {
        let backend = match (config.cache_backend, supports_weak_maps) {
            (CacheBackendChoice::HiddenTag, _) => Backend::HiddenTag,
            (_, true) => Backend::IdentityMap(WeakIdentityMap::new()),
            (CacheBackendChoice::IdentityMap, false) => {
                log::warn!("Host has no weak maps; caching enter iids in hidden properties");
                Backend::HiddenTag
            }
            (CacheBackendChoice::Auto, false) => Backend::HiddenTag,
        };

        let cache = Self {
            backend,
            intrinsics,
            marker: marker_regex(&config.enter_marker)?,
            stats: CacheStats::default(),
        };
        log::debug!("Function identity cache using {:?}", cache.backend());
        Ok(cache)
    }

    pub fn backend(&self) -> CacheBackendKind {
        match self.backend {
            Backend::IdentityMap(_) => CacheBackendKind::IdentityMap,
            Backend::HiddenTag => CacheBackendKind::HiddenTag,
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Cached enter iid of `f`, without resolving it
    pub fn lookup(&self, f: &JsObject) -> Option<Iid> {
        match &self.backend {
            Backend::IdentityMap(map) => map.get(f),
            Backend::HiddenTag => self
                .intrinsics
                .get_own_property_descriptor(f, HIDDEN_TAG)
                .and_then(|desc| desc.value)
                .and_then(|value| value.as_number())
                .map(|n| Iid(n as i32)),
        }
    }

    /// Enter iid of `f`, computed at most once per function value.
    ///
    /// Functions without a marker (natives included) resolve to
    /// [`Iid::UNKNOWN`]. Only host failures (a non-function value, a
    /// hidden property that cannot be defined) are errors.
    pub fn resolve_enter_iid(&mut self, f: &JsObject) -> Result<Iid> {
        if let Some(iid) = self.lookup(f) {
            self.stats.hits += 1;
            return Ok(iid);
        }
        self.stats.misses += 1;

        let iid = match self.intrinsics.function_source(f)? {
            Some(source) => self.extract_enter_iid(&source),
            None => Iid::UNKNOWN,
        };
        if iid.is_unknown() {
            self.stats.unknown += 1;
        } else {
            self.stats.extracted += 1;
        }

        self.store(f, iid)?;
        Ok(iid)
    }

    /// Record the enter iid the engine reported for a newly created function.
    ///
    /// An already cached value is kept; the effective value is returned.
    pub fn record_enter_iid(&mut self, f: &JsObject, iid: Iid) -> Result<Iid> {
        if let Some(existing) = self.lookup(f) {
            if existing != iid {
                log::warn!(
                    "Ignoring enter iid {} for function already cached with {}",
                    iid,
                    existing
                );
            }
            return Ok(existing);
        }
        self.stats.side_channel += 1;
        self.store(f, iid)?;
        Ok(iid)
    }

    /// Integer following the enter marker in `source`, or `Iid::UNKNOWN`
    pub fn extract_enter_iid(&self, source: &str) -> Iid {
        self.marker
            .captures(source)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<i32>().ok())
            .map_or(Iid::UNKNOWN, Iid)
    }

    /// Number of live identity-map entries (always 0 for the hidden tag)
    pub fn cached_functions(&self) -> usize {
        match &self.backend {
            Backend::IdentityMap(map) => map.len(),
            Backend::HiddenTag => 0,
        }
    }

    fn store(&mut self, f: &JsObject, iid: Iid) -> Result<()> {
        match &mut self.backend {
            Backend::IdentityMap(map) => map.insert(f, iid),
            Backend::HiddenTag => {
                let desc = PropertyDescriptor {
                    value: Some(Value::Number(iid.0 as f64)),
                    writable: true,
                    enumerable: false,
                    configurable: false,
                    ..Default::default()
                };
                self.intrinsics.define_property(f, HIDDEN_TAG, desc)?;
            }
        }
        Ok(())
    }
}

fn marker_regex(marker: &str) -> Result<Regex> {
    if marker.is_empty() {
        return Err(TraceError::Config("enter marker must not be empty".to_string()));
    }
    Regex::new(&format!("{}([0-9]+)", regex::escape(marker)))
        .map_err(|e| TraceError::Config(format!("invalid enter marker {:?}: {}", marker, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HostError;

    const INSTRUMENTED: &str = "function f() { J$.Fe(41, arguments.callee, this, arguments); }";

    fn cache_for(realm: &Realm, backend: CacheBackendChoice) -> FunctionIdentityCache {
        let config = TraceConfig::new().with_cache_backend(backend);
        FunctionIdentityCache::new(realm, &config).unwrap()
    }

    #[test]
    fn test_backend_selection() {
        let modern = Realm::new();
        let legacy = Realm::without_weak_maps();

        assert_eq!(
            cache_for(&modern, CacheBackendChoice::Auto).backend(),
            CacheBackendKind::IdentityMap
        );
        assert_eq!(
            cache_for(&modern, CacheBackendChoice::HiddenTag).backend(),
            CacheBackendKind::HiddenTag
        );
        assert_eq!(
            cache_for(&legacy, CacheBackendChoice::Auto).backend(),
            CacheBackendKind::HiddenTag
        );
        assert_eq!(
            cache_for(&legacy, CacheBackendChoice::IdentityMap).backend(),
            CacheBackendKind::HiddenTag
        );
    }

    #[test]
    fn test_marker_extraction() {
        let realm = Realm::new();
        let cache = cache_for(&realm, CacheBackendChoice::Auto);
        assert_eq!(cache.extract_enter_iid(INSTRUMENTED), Iid(41));
        assert_eq!(cache.extract_enter_iid("J$.Fe(7"), Iid(7));
        assert_eq!(cache.extract_enter_iid("function g() {}"), Iid::UNKNOWN);
        assert_eq!(cache.extract_enter_iid("J$xFe(7"), Iid::UNKNOWN);
        assert_eq!(cache.extract_enter_iid("J$.Fe(99999999999)"), Iid::UNKNOWN);
    }

    #[test]
    fn test_resolve_is_idempotent_for_both_backends() {
        for backend in [CacheBackendChoice::IdentityMap, CacheBackendChoice::HiddenTag] {
            let realm = Realm::new();
            let mut cache = cache_for(&realm, backend);
            let f = realm.new_function(INSTRUMENTED);

            assert_eq!(cache.resolve_enter_iid(&f).unwrap(), Iid(41));
            assert_eq!(cache.resolve_enter_iid(&f).unwrap(), Iid(41));
            assert_eq!(cache.stats().misses, 1);
            assert_eq!(cache.stats().hits, 1);
            assert_eq!(cache.stats().extracted, 1);
        }
    }

    #[test]
    fn test_unmarked_functions_resolve_to_unknown() {
        for backend in [CacheBackendChoice::IdentityMap, CacheBackendChoice::HiddenTag] {
            let realm = Realm::new();
            let mut cache = cache_for(&realm, backend);
            let native = realm.new_native_function("push");
            let opaque = JsObject::opaque_function(Some(realm.function_prototype()));

            for f in [&native, &opaque] {
                assert_eq!(cache.resolve_enter_iid(f).unwrap(), Iid::UNKNOWN);
                assert_eq!(cache.resolve_enter_iid(f).unwrap(), Iid::UNKNOWN);
            }
            // Unknown results are cached like any other
            assert_eq!(cache.stats().misses, 2);
            assert_eq!(cache.stats().unknown, 2);
        }
    }

    #[test]
    fn test_cached_value_is_never_recomputed() {
        let mut realm = Realm::new();
        let mut cache = cache_for(&realm, CacheBackendChoice::IdentityMap);
        let f = realm.new_function(INSTRUMENTED);
        assert_eq!(cache.resolve_enter_iid(&f).unwrap(), Iid(41));

        // Even if the source text could no longer be read, the cached value wins
        realm.builtins.function_to_string = |_| Err(HostError::NotAFunction);
        assert_eq!(cache.resolve_enter_iid(&f).unwrap(), Iid(41));
    }

    #[test]
    fn test_hidden_tag_is_non_enumerable_own_property() {
        let realm = Realm::new();
        let mut cache = cache_for(&realm, CacheBackendChoice::HiddenTag);
        let f = realm.new_function(INSTRUMENTED);
        cache.resolve_enter_iid(&f).unwrap();

        let intrinsics = Intrinsics::capture(&realm);
        let desc = intrinsics.get_own_property_descriptor(&f, HIDDEN_TAG).unwrap();
        assert!(!desc.enumerable);
        assert!(desc.writable);
        assert_eq!(desc.value.and_then(|v| v.as_number()), Some(41.0));
        assert_eq!(cache.cached_functions(), 0);
    }

    #[test]
    fn test_identity_map_does_not_touch_function() {
        let realm = Realm::new();
        let mut cache = cache_for(&realm, CacheBackendChoice::IdentityMap);
        let f = realm.new_function(INSTRUMENTED);
        cache.resolve_enter_iid(&f).unwrap();

        let intrinsics = Intrinsics::capture(&realm);
        assert!(!intrinsics.has_own_property(&f, HIDDEN_TAG));
        assert_eq!(cache.cached_functions(), 1);
    }

    #[test]
    fn test_identity_map_does_not_keep_functions_alive() {
        let realm = Realm::new();
        let mut cache = cache_for(&realm, CacheBackendChoice::IdentityMap);
        let f = realm.new_function(INSTRUMENTED);
        let weak = f.downgrade();
        cache.resolve_enter_iid(&f).unwrap();
        drop(f);
        assert!(!weak.is_alive());
    }

    #[test]
    fn test_environment_failures_propagate() {
        let realm = Realm::new();

        let mut cache = cache_for(&realm, CacheBackendChoice::IdentityMap);
        let not_a_function = realm.new_object();
        assert!(matches!(
            cache.resolve_enter_iid(&not_a_function),
            Err(TraceError::Host(HostError::NotAFunction))
        ));

        let mut cache = cache_for(&realm, CacheBackendChoice::HiddenTag);
        let sealed = realm.new_function(INSTRUMENTED);
        sealed.prevent_extensions();
        assert!(matches!(
            cache.resolve_enter_iid(&sealed),
            Err(TraceError::Host(HostError::NotExtensible(_)))
        ));
    }

    #[test]
    fn test_side_channel_preferred_and_idempotent() {
        let realm = Realm::new();
        let mut cache = cache_for(&realm, CacheBackendChoice::IdentityMap);
        let f = realm.new_function(INSTRUMENTED);

        assert_eq!(cache.record_enter_iid(&f, Iid(7)).unwrap(), Iid(7));
        assert_eq!(cache.resolve_enter_iid(&f).unwrap(), Iid(7));
        // A later, conflicting report does not change the cached value
        assert_eq!(cache.record_enter_iid(&f, Iid(8)).unwrap(), Iid(7));
        assert_eq!(cache.stats().side_channel, 1);
        assert_eq!(cache.stats().extracted, 0);
    }

    #[test]
    fn test_custom_marker() {
        let realm = Realm::new();
        let config = TraceConfig::new().with_enter_marker("__enter(");
        let cache = FunctionIdentityCache::new(&realm, &config).unwrap();
        assert_eq!(cache.extract_enter_iid("__enter(12)"), Iid(12));
        assert_eq!(cache.extract_enter_iid(INSTRUMENTED), Iid::UNKNOWN);

        let empty = TraceConfig::new().with_enter_marker("");
        assert!(matches!(
            FunctionIdentityCache::new(&realm, &empty),
            Err(TraceError::Config(_))
        ));
    }

    #[test]
    fn test_weak_identity_map_purges_dead_entries() {
        let mut map = WeakIdentityMap::new();
        let keep = JsObject::new(None);
        map.insert(&keep, 1u32);
        for i in 0..(INITIAL_PURGE_AT as u32 + 10) {
            let temp = JsObject::new(None);
            map.insert(&temp, i);
        }
        assert!(map.len() < INITIAL_PURGE_AT);
        assert_eq!(map.get(&keep), Some(1));
    }
}

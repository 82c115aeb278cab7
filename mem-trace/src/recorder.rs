//! Instrumentation-runtime recorder
//!
//! The recorder is the context the instrumentation engine calls into. It owns
//! the trace writer, the function-identity cache, the captured intrinsics and
//! object-id allocation, and turns engine notifications into log entries.
//! There is no process-wide state: one recorder per traced execution.
//!
//! Object ids are allocated from 1 upward and never reused. A function takes
//! two consecutive ids: its own and, implicitly, its prototype object's.

use crate::config::TraceConfig;
use crate::entry::LogEntry;
use crate::host::{JsObject, Realm, Value};
use crate::identity::{FunctionIdentityCache, WeakIdentityMap};
use crate::intrinsics::Intrinsics;
use crate::types::{
    FlushLoc, FreeVars, Iid, ObjectId, Result, ScriptId, SourceId, Timestamp, TraceError,
};
use crate::writer::TraceWriter;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Source span carried by `SOURCE_MAPPING`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceSpan {
    pub start_line: i32,
    pub start_column: i32,
    pub end_line: i32,
    pub end_column: i32,
}

/// Turns instrumentation callbacks into an ordered trace
pub struct Recorder<W: Write> {
    writer: TraceWriter<W>,
    intrinsics: Intrinsics,
    cache: FunctionIdentityCache,
    object_ids: WeakIdentityMap<ObjectId>,
    function_scripts: WeakIdentityMap<ScriptId>,
    next_object_id: u32,
    current_script: ScriptId,
    call_pending: bool,
}

impl Recorder<File> {
    /// Record into a new trace file
    pub fn create(realm: &Realm, path: &Path, config: &TraceConfig) -> Result<Self> {
        let writer = TraceWriter::create(path, config)?;
        Self::with_writer(realm, writer, config)
    }
}

impl<W: Write> Recorder<W> {
    /// Record into any sink.
    ///
    /// Must be called before user code runs in `realm`: the realm's
    /// primitives are captured here.
    pub fn new(realm: &Realm, sink: W, config: &TraceConfig) -> Result<Self> {
        Self::with_writer(realm, TraceWriter::new(sink, config), config)
    }

    fn with_writer(realm: &Realm, writer: TraceWriter<W>, config: &TraceConfig) -> Result<Self> {
        let intrinsics = Intrinsics::capture(realm);
        let cache = FunctionIdentityCache::with_intrinsics(
            intrinsics,
            realm.supports_weak_maps(),
            config,
        )?;
        Ok(Self {
            writer,
            intrinsics,
            cache,
            object_ids: WeakIdentityMap::new(),
            function_scripts: WeakIdentityMap::new(),
            next_object_id: 1,
            current_script: ScriptId(0),
            call_pending: false,
        })
    }

    pub fn intrinsics(&self) -> &Intrinsics {
        &self.intrinsics
    }

    pub fn cache(&self) -> &FunctionIdentityCache {
        &self.cache
    }

    pub fn current_script(&self) -> ScriptId {
        self.current_script
    }

    /// Id assigned to `o`, if it is tracked
    pub fn object_id(&self, o: &JsObject) -> Option<ObjectId> {
        self.object_ids.get(o)
    }

    /// `var name = value`
    pub fn declare(&mut self, iid: Iid, name: &str, value: &Value) -> Result<()> {
        let obj = self.value_id(value)?;
        self.emit(LogEntry::Declare {
            iid,
            name: name.to_string(),
            obj,
        })
    }

    /// `name = value`
    pub fn write_var(&mut self, iid: Iid, name: &str, value: &Value) -> Result<()> {
        let obj = self.value_id(value)?;
        self.emit(LogEntry::Write {
            iid,
            name: name.to_string(),
            obj,
        })
    }

    /// A plain object was allocated at `iid`
    pub fn create_obj(&mut self, iid: Iid, o: &JsObject) -> Result<ObjectId> {
        if let Some(existing) = self.object_ids.get(o) {
            log::warn!("Object {} created twice; keeping its id", existing);
            return Ok(existing);
        }
        let obj = self.allocate(o, 1)?;
        self.emit(LogEntry::CreateObj { iid, obj })?;
        Ok(obj)
    }

    /// A function was allocated at `iid`.
    ///
    /// `enter_iid` is the entry site when the engine knows it; otherwise it
    /// is resolved through the identity cache. The function's `prototype`
    /// object, if any, is tracked with the next id.
    pub fn create_fun(&mut self, iid: Iid, f: &JsObject, enter_iid: Option<Iid>) -> Result<ObjectId> {
        if let Some(existing) = self.object_ids.get(f) {
            log::warn!("Function {} created twice; keeping its id", existing);
            return Ok(existing);
        }
        let enter_iid = match enter_iid {
            Some(iid) => self.cache.record_enter_iid(f, iid)?,
            None => self.cache.resolve_enter_iid(f)?,
        };
        let obj = self.allocate(f, 2)?;
        if let (Some(proto), Some(proto_id)) = (self.prototype_object(f), obj.prototype()) {
            self.object_ids.insert(&proto, proto_id);
        }
        self.function_scripts.insert(f, self.current_script);
        self.emit(LogEntry::CreateFun { iid, enter_iid, obj })?;
        Ok(obj)
    }

    /// `base[prop] = value`
    pub fn put_field(&mut self, iid: Iid, base: &JsObject, prop: &str, value: &Value) -> Result<()> {
        let base = self.ensure_tracked(base)?;
        let val = self.value_id(value)?;
        self.emit(LogEntry::PutField {
            iid,
            base,
            prop: prop.to_string(),
            val,
        })
    }

    pub fn last_use(&mut self, o: &JsObject, timestamp: Timestamp, source: SourceId) -> Result<()> {
        let obj = self.ensure_tracked(o)?;
        self.emit(LogEntry::LastUse {
            obj,
            timestamp,
            source,
        })
    }

    /// Before a call at `iid` to `f`.
    ///
    /// Emits `CALL` when `f` is instrumented (its enter iid is known); the
    /// matching `function_enter` then emits nothing.
    pub fn invoke_pre(&mut self, iid: Iid, f: &JsObject) -> Result<()> {
        let enter_iid = self.cache.resolve_enter_iid(f)?;
        if enter_iid.is_unknown() {
            self.call_pending = false;
            return Ok(());
        }
        let fun = self.ensure_tracked(f)?;
        let fun_script = self
            .function_scripts
            .get(f)
            .unwrap_or(self.current_script);
        self.call_pending = true;
        self.emit(LogEntry::Call {
            iid,
            fun,
            enter_iid,
            fun_script,
        })
    }

    /// Entry into `f` at its enter site `iid`. Emits `FUNCTION_ENTER` only
    /// when no `CALL` announced this invocation (callbacks from native code,
    /// getters, implicit calls).
    pub fn function_enter(&mut self, iid: Iid, f: &JsObject) -> Result<()> {
        if self.call_pending {
            self.call_pending = false;
            return Ok(());
        }
        let fun = self.ensure_tracked(f)?;
        self.emit(LogEntry::FunctionEnter { iid, fun })
    }

    pub fn function_exit(&mut self, iid: Iid) -> Result<()> {
        self.call_pending = false;
        self.emit(LogEntry::FunctionExit { iid })
    }

    pub fn return_value(&mut self, value: &Value) -> Result<()> {
        let obj = self.value_id(value)?;
        self.emit(LogEntry::Return { obj })
    }

    /// Correct the allocation site recorded for `o`
    pub fn update_iid(&mut self, o: &JsObject, new_iid: Iid) -> Result<()> {
        let obj = self.ensure_tracked(o)?;
        self.emit(LogEntry::UpdateIid { obj, new_iid })
    }

    pub fn debug(&mut self, call_iid: Iid, o: &JsObject) -> Result<()> {
        let obj = self.ensure_tracked(o)?;
        self.emit(LogEntry::Debug { call_iid, obj })
    }

    pub fn create_dom_node(&mut self, iid: Iid, node: &JsObject) -> Result<ObjectId> {
        if let Some(existing) = self.object_ids.get(node) {
            return Ok(existing);
        }
        let obj = self.allocate(node, 1)?;
        self.emit(LogEntry::CreateDomNode { iid, obj })?;
        Ok(obj)
    }

    pub fn dom_root(&mut self, root: &JsObject) -> Result<()> {
        let obj = self.ensure_tracked(root)?;
        self.emit(LogEntry::DomRoot { obj })
    }

    pub fn add_dom_child(&mut self, parent: &JsObject, child: &JsObject) -> Result<()> {
        let parent = self.ensure_tracked(parent)?;
        let child = self.ensure_tracked(child)?;
        self.emit(LogEntry::AddDomChild { parent, child })
    }

    pub fn remove_dom_child(&mut self, parent: &JsObject, child: &JsObject) -> Result<()> {
        let parent = self.ensure_tracked(parent)?;
        let child = self.ensure_tracked(child)?;
        self.emit(LogEntry::RemoveDomChild { parent, child })
    }

    pub fn add_to_child_set(
        &mut self,
        iid: Iid,
        parent: &JsObject,
        name: &str,
        child: &JsObject,
    ) -> Result<()> {
        let parent = self.ensure_tracked(parent)?;
        let child = self.ensure_tracked(child)?;
        self.emit(LogEntry::AddToChildSet {
            iid,
            parent,
            name: name.to_string(),
            child,
        })
    }

    pub fn remove_from_child_set(
        &mut self,
        iid: Iid,
        parent: &JsObject,
        name: &str,
        child: &JsObject,
    ) -> Result<()> {
        let parent = self.ensure_tracked(parent)?;
        let child = self.ensure_tracked(child)?;
        self.emit(LogEntry::RemoveFromChildSet {
            iid,
            parent,
            name: name.to_string(),
            child,
        })
    }

    pub fn script_enter(&mut self, iid: Iid, script: ScriptId, filename: &str) -> Result<()> {
        self.current_script = script;
        self.emit(LogEntry::ScriptEnter {
            iid,
            script,
            filename: filename.to_string(),
        })
    }

    pub fn script_exit(&mut self, iid: Iid) -> Result<()> {
        self.emit(LogEntry::ScriptExit { iid })
    }

    pub fn update_current_script(&mut self, script: ScriptId) -> Result<()> {
        self.current_script = script;
        self.emit(LogEntry::UpdateCurrentScript { script })
    }

    pub fn free_vars(&mut self, iid: Iid, vars: FreeVars) -> Result<()> {
        self.emit(LogEntry::FreeVars { iid, vars })
    }

    pub fn source_mapping(&mut self, iid: Iid, span: SourceSpan) -> Result<()> {
        self.emit(LogEntry::SourceMapping {
            iid,
            start_line: span.start_line,
            start_column: span.start_column,
            end_line: span.end_line,
            end_column: span.end_column,
        })
    }

    pub fn top_level_flush(&mut self, loc: FlushLoc) -> Result<()> {
        self.emit(LogEntry::TopLevelFlush { loc })
    }

    pub fn end_last_use(&mut self) -> Result<()> {
        self.emit(LogEntry::EndLastUse)
    }

    /// Push buffered entries to the sink
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()
    }

    /// Flush and return the sink
    pub fn finish(self) -> Result<W> {
        let stats = self.cache.stats();
        log::info!(
            "Recorder finished: {} objects, enter-iid cache {} hits / {} misses",
            self.next_object_id - 1,
            stats.hits,
            stats.misses
        );
        self.writer.finish()
    }

    fn emit(&mut self, entry: LogEntry) -> Result<()> {
        log::trace!("{:?}", entry);
        self.writer.append(&entry)
    }

    fn allocate(&mut self, o: &JsObject, width: u32) -> Result<ObjectId> {
        let id = ObjectId(self.next_object_id);
        self.next_object_id = self
            .next_object_id
            .checked_add(width)
            .ok_or(TraceError::ObjectIdsExhausted)?;
        self.object_ids.insert(o, id);
        Ok(id)
    }

    fn prototype_object(&self, f: &JsObject) -> Option<JsObject> {
        self.intrinsics
            .get_own_property_descriptor(f, "prototype")
            .and_then(|desc| desc.value)
            .and_then(|value| value.as_object().cloned())
    }

    /// Id of `o`, announcing objects the instrumentation never saw allocated
    /// (host-created objects) with an unknown allocation site
    fn ensure_tracked(&mut self, o: &JsObject) -> Result<ObjectId> {
        if let Some(id) = self.object_ids.get(o) {
            return Ok(id);
        }
        if o.is_callable() {
            self.create_fun(Iid::UNKNOWN, o, None)
        } else {
            self.create_obj(Iid::UNKNOWN, o)
        }
    }

    fn value_id(&mut self, value: &Value) -> Result<ObjectId> {
        match value {
            Value::Object(o) => self.ensure_tracked(o),
            _ => Ok(ObjectId::NONE),
        }
    }
}

//! Log entry taxonomy
//!
//! Every runtime event the instrumentation can emit is one [`LogEntry`]. The
//! kind of an entry is identified on the wire by the integer discriminant of
//! [`LogEntryKind`]. These discriminants form version 1 of the trace wire
//! contract: consumers index by them, so existing values are never renumbered
//! and new kinds are only ever appended.

use crate::types::{FlushLoc, FreeVars, Iid, ObjectId, ScriptId, SourceId, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Version of the kind numbering below
pub const WIRE_VERSION: u32 = 1;

/// Default size (in bytes) of an in-memory batch before it is flushed to the sink
pub const MAX_BUF_SIZE: usize = 64000;

/// Stable discriminant of each log entry kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum LogEntryKind {
    Declare = 0,
    CreateObj = 1,
    CreateFun = 2,
    Putfield = 3,
    Write = 4,
    LastUse = 5,
    FunctionEnter = 6,
    FunctionExit = 7,
    TopLevelFlush = 8,
    UpdateIid = 9,
    Debug = 10,
    Return = 11,
    CreateDomNode = 12,
    AddDomChild = 13,
    RemoveDomChild = 14,
    AddToChildSet = 15,
    RemoveFromChildSet = 16,
    DomRoot = 17,
    Call = 18,
    ScriptEnter = 19,
    ScriptExit = 20,
    FreeVars = 21,
    SourceMapping = 22,
    UpdateCurrentScript = 23,
    EndLastUse = 24,
}

impl LogEntryKind {
    /// All kinds in discriminant order
    pub const ALL: [LogEntryKind; 25] = [
        LogEntryKind::Declare,
        LogEntryKind::CreateObj,
        LogEntryKind::CreateFun,
        LogEntryKind::Putfield,
        LogEntryKind::Write,
        LogEntryKind::LastUse,
        LogEntryKind::FunctionEnter,
        LogEntryKind::FunctionExit,
        LogEntryKind::TopLevelFlush,
        LogEntryKind::UpdateIid,
        LogEntryKind::Debug,
        LogEntryKind::Return,
        LogEntryKind::CreateDomNode,
        LogEntryKind::AddDomChild,
        LogEntryKind::RemoveDomChild,
        LogEntryKind::AddToChildSet,
        LogEntryKind::RemoveFromChildSet,
        LogEntryKind::DomRoot,
        LogEntryKind::Call,
        LogEntryKind::ScriptEnter,
        LogEntryKind::ScriptExit,
        LogEntryKind::FreeVars,
        LogEntryKind::SourceMapping,
        LogEntryKind::UpdateCurrentScript,
        LogEntryKind::EndLastUse,
    ];

    /// Wire discriminant
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Look up a kind by its wire discriminant
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }

    /// Upper-case name used in trace dumps
    pub fn name(self) -> &'static str {
        match self {
            LogEntryKind::Declare => "DECLARE",
            LogEntryKind::CreateObj => "CREATE_OBJ",
            LogEntryKind::CreateFun => "CREATE_FUN",
            LogEntryKind::Putfield => "PUTFIELD",
            LogEntryKind::Write => "WRITE",
            LogEntryKind::LastUse => "LAST_USE",
            LogEntryKind::FunctionEnter => "FUNCTION_ENTER",
            LogEntryKind::FunctionExit => "FUNCTION_EXIT",
            LogEntryKind::TopLevelFlush => "TOP_LEVEL_FLUSH",
            LogEntryKind::UpdateIid => "UPDATE_IID",
            LogEntryKind::Debug => "DEBUG",
            LogEntryKind::Return => "RETURN",
            LogEntryKind::CreateDomNode => "CREATE_DOM_NODE",
            LogEntryKind::AddDomChild => "ADD_DOM_CHILD",
            LogEntryKind::RemoveDomChild => "REMOVE_DOM_CHILD",
            LogEntryKind::AddToChildSet => "ADD_TO_CHILD_SET",
            LogEntryKind::RemoveFromChildSet => "REMOVE_FROM_CHILD_SET",
            LogEntryKind::DomRoot => "DOM_ROOT",
            LogEntryKind::Call => "CALL",
            LogEntryKind::ScriptEnter => "SCRIPT_ENTER",
            LogEntryKind::ScriptExit => "SCRIPT_EXIT",
            LogEntryKind::FreeVars => "FREE_VARS",
            LogEntryKind::SourceMapping => "SOURCE_MAPPING",
            LogEntryKind::UpdateCurrentScript => "UPDATE_CURRENT_SCRIPT",
            LogEntryKind::EndLastUse => "END_LAST_USE",
        }
    }
}

impl fmt::Display for LogEntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One record of the trace. Field order of each variant is the wire order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEntry {
    /// A local/variable binding observed
    Declare { iid: Iid, name: String, obj: ObjectId },

    /// A plain object allocated
    CreateObj { iid: Iid, obj: ObjectId },

    /// A function allocated. Its prototype object has id `obj + 1`.
    CreateFun { iid: Iid, enter_iid: Iid, obj: ObjectId },

    /// A property write
    PutField {
        iid: Iid,
        base: ObjectId,
        prop: String,
        val: ObjectId,
    },

    /// A variable write
    Write { iid: Iid, name: String, obj: ObjectId },

    /// Most recent observed use of an object
    LastUse {
        obj: ObjectId,
        timestamp: Timestamp,
        source: SourceId,
    },

    /// Only emitted when no `Call` was emitted for this invocation
    FunctionEnter { iid: Iid, fun: ObjectId },

    FunctionExit { iid: Iid },

    TopLevelFlush { loc: FlushLoc },

    /// Retroactively updates the recorded site of an object
    UpdateIid { obj: ObjectId, new_iid: Iid },

    Debug { call_iid: Iid, obj: ObjectId },

    Return { obj: ObjectId },

    CreateDomNode { iid: Iid, obj: ObjectId },

    AddDomChild { parent: ObjectId, child: ObjectId },

    RemoveDomChild { parent: ObjectId, child: ObjectId },

    AddToChildSet {
        iid: Iid,
        parent: ObjectId,
        name: String,
        child: ObjectId,
    },

    RemoveFromChildSet {
        iid: Iid,
        parent: ObjectId,
        name: String,
        child: ObjectId,
    },

    DomRoot { obj: ObjectId },

    /// Only emitted for calls into instrumented functions
    Call {
        iid: Iid,
        fun: ObjectId,
        enter_iid: Iid,
        fun_script: ScriptId,
    },

    ScriptEnter {
        iid: Iid,
        script: ScriptId,
        filename: String,
    },

    ScriptExit { iid: Iid },

    FreeVars { iid: Iid, vars: FreeVars },

    SourceMapping {
        iid: Iid,
        start_line: i32,
        start_column: i32,
        end_line: i32,
        end_column: i32,
    },

    UpdateCurrentScript { script: ScriptId },

    EndLastUse,
}

impl LogEntry {
    /// Kind of this entry
    pub fn kind(&self) -> LogEntryKind {
        match self {
            LogEntry::Declare { .. } => LogEntryKind::Declare,
            LogEntry::CreateObj { .. } => LogEntryKind::CreateObj,
            LogEntry::CreateFun { .. } => LogEntryKind::CreateFun,
            LogEntry::PutField { .. } => LogEntryKind::Putfield,
            LogEntry::Write { .. } => LogEntryKind::Write,
            LogEntry::LastUse { .. } => LogEntryKind::LastUse,
            LogEntry::FunctionEnter { .. } => LogEntryKind::FunctionEnter,
            LogEntry::FunctionExit { .. } => LogEntryKind::FunctionExit,
            LogEntry::TopLevelFlush { .. } => LogEntryKind::TopLevelFlush,
            LogEntry::UpdateIid { .. } => LogEntryKind::UpdateIid,
            LogEntry::Debug { .. } => LogEntryKind::Debug,
            LogEntry::Return { .. } => LogEntryKind::Return,
            LogEntry::CreateDomNode { .. } => LogEntryKind::CreateDomNode,
            LogEntry::AddDomChild { .. } => LogEntryKind::AddDomChild,
            LogEntry::RemoveDomChild { .. } => LogEntryKind::RemoveDomChild,
            LogEntry::AddToChildSet { .. } => LogEntryKind::AddToChildSet,
            LogEntry::RemoveFromChildSet { .. } => LogEntryKind::RemoveFromChildSet,
            LogEntry::DomRoot { .. } => LogEntryKind::DomRoot,
            LogEntry::Call { .. } => LogEntryKind::Call,
            LogEntry::ScriptEnter { .. } => LogEntryKind::ScriptEnter,
            LogEntry::ScriptExit { .. } => LogEntryKind::ScriptExit,
            LogEntry::FreeVars { .. } => LogEntryKind::FreeVars,
            LogEntry::SourceMapping { .. } => LogEntryKind::SourceMapping,
            LogEntry::UpdateCurrentScript { .. } => LogEntryKind::UpdateCurrentScript,
            LogEntry::EndLastUse => LogEntryKind::EndLastUse,
        }
    }

    /// Id of the object this entry allocates, if it is an allocation record
    pub fn allocated_object(&self) -> Option<ObjectId> {
        match self {
            LogEntry::CreateObj { obj, .. }
            | LogEntry::CreateFun { obj, .. }
            | LogEntry::CreateDomNode { obj, .. } => Some(*obj),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discriminants_are_stable() {
        // Consumers index by these values
        assert_eq!(LogEntryKind::Declare.code(), 0);
        assert_eq!(LogEntryKind::CreateFun.code(), 2);
        assert_eq!(LogEntryKind::LastUse.code(), 5);
        assert_eq!(LogEntryKind::DomRoot.code(), 17);
        assert_eq!(LogEntryKind::Call.code(), 18);
        assert_eq!(LogEntryKind::EndLastUse.code(), 24);

        for (i, kind) in LogEntryKind::ALL.iter().enumerate() {
            assert_eq!(kind.code() as usize, i);
            assert_eq!(LogEntryKind::from_code(i as u8), Some(*kind));
        }
        assert_eq!(LogEntryKind::from_code(25), None);
        assert_eq!(LogEntryKind::from_code(b'['), None);
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(LogEntryKind::RemoveFromChildSet.to_string(), "REMOVE_FROM_CHILD_SET");
        assert_eq!(LogEntry::EndLastUse.kind().name(), "END_LAST_USE");
    }

    #[test]
    fn test_allocated_object() {
        let create_fun = LogEntry::CreateFun {
            iid: Iid(4),
            enter_iid: Iid(9),
            obj: ObjectId(12),
        };
        assert_eq!(create_fun.allocated_object(), Some(ObjectId(12)));
        assert_eq!(LogEntry::Return { obj: ObjectId(3) }.allocated_object(), None);
    }
}

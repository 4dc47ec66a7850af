//! Frame shapes on either side of a transition
//!
//! `InterpreterFrame` is what materialization produces and what the
//! snapshot builder captures at an OSR entry. `CompiledFrame` models the
//! register/stack state of an executing compiled artifact; the frame holds
//! its artifact alive so invalidation never reclaims code out from under an
//! in-flight execution.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::code::{EntryKind, InstalledCode};
use crate::method::MethodId;
use crate::snapshot::{FrameSnapshot, MonitorEntry, SnapshotBuilder};
use crate::value::Value;

/// An interpreter-visible frame
#[derive(Debug, Clone)]
pub struct InterpreterFrame {
    /// Executing method
    pub method: MethodId,
    /// Next bytecode index to execute
    pub bci: u32,
    /// Live locals as ordered (logical slot, value) pairs
    pub locals: Vec<(u16, Value)>,
    /// Operand stack, bottom first
    pub stack: Vec<Value>,
    /// Held monitors, innermost last
    pub monitors: Vec<MonitorEntry>,
}

impl InterpreterFrame {
    /// Create an empty frame for `method` positioned at `bci`
    pub fn new(method: MethodId, bci: u32) -> Self {
        InterpreterFrame {
            method,
            bci,
            locals: Vec::new(),
            stack: Vec::new(),
            monitors: Vec::new(),
        }
    }

    /// Value of a local slot, if live
    pub fn local(&self, slot: u16) -> Option<&Value> {
        self.locals
            .iter()
            .find(|(s, _)| *s == slot)
            .map(|(_, v)| v)
    }

    /// Store a local slot, replacing any previous value
    pub fn set_local(&mut self, slot: u16, value: Value) {
        if let Some(entry) = self.locals.iter_mut().find(|(s, _)| *s == slot) {
            entry.1 = value;
        } else {
            self.locals.push((slot, value));
        }
    }

    /// Capture this frame's live state as a snapshot at its current index
    pub fn snapshot(&self) -> FrameSnapshot {
        let mut builder = SnapshotBuilder::new(self.bci);
        for (slot, value) in &self.locals {
            builder = builder.local(*slot, value.clone());
        }
        for value in &self.stack {
            builder = builder.push_stack(value.clone());
        }
        for entry in &self.monitors {
            builder = builder.monitor(entry.object.clone(), entry.depth);
        }
        builder.build()
    }
}

/// Register/stack state of an executing compiled frame
///
/// The logical locals are seeded from the entry snapshot; compiled code
/// writes physical locations (registers, spill slots) as it runs. The
/// descriptor maps logical slots back to these locations at deopt points.
pub struct CompiledFrame {
    /// Logical entry-seeded slots
    pub locals: FxHashMap<u16, Value>,
    /// Machine register contents
    pub registers: FxHashMap<u8, Value>,
    /// Spill slot contents
    pub stack_slots: FxHashMap<u16, Value>,
    /// Monitors held on entry, identity-preserved, innermost last
    pub monitors: Vec<MonitorEntry>,
    code: Arc<InstalledCode>,
}

impl CompiledFrame {
    /// Build a frame for `code` seeded from an entry snapshot
    pub fn enter(code: Arc<InstalledCode>, snapshot: FrameSnapshot) -> Self {
        let mut locals = FxHashMap::default();
        for (slot, value) in snapshot.locals {
            locals.insert(slot, value);
        }
        CompiledFrame {
            locals,
            registers: FxHashMap::default(),
            stack_slots: FxHashMap::default(),
            monitors: snapshot.monitors,
            code,
        }
    }

    /// Owning method
    pub fn method(&self) -> MethodId {
        self.code.method()
    }

    /// Entry kind this frame was entered through
    pub fn entry(&self) -> EntryKind {
        self.code.entry()
    }

    /// The artifact this frame executes; kept alive for the frame's
    /// lifetime regardless of invalidation
    pub fn code(&self) -> &Arc<InstalledCode> {
        &self.code
    }

    /// Entry-seeded value of a logical local
    pub fn local(&self, slot: u16) -> Option<&Value> {
        self.locals.get(&slot)
    }

    /// Write a machine register
    pub fn set_register(&mut self, reg: u8, value: Value) {
        self.registers.insert(reg, value);
    }

    /// Write a spill slot
    pub fn set_stack_slot(&mut self, slot: u16, value: Value) {
        self.stack_slots.insert(slot, value);
    }
}

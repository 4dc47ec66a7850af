//! Frame snapshots: the dynamic half of a transition
//!
//! A snapshot is a transient, per-invocation description of live state at a
//! bytecode index: ordered (slot, value) pairs for locals, the operand
//! stack bottom-up, and held monitors innermost-last. It is produced from
//! interpreter state at an OSR entry, or from compiled register/stack state
//! through the frame descriptor at a deopt, and consumed exactly once.

use crate::value::{ObjectRef, Value};

/// One held monitor: the locked object and its recursion depth
#[derive(Debug, Clone)]
pub struct MonitorEntry {
    /// Locked object (identity-bearing)
    pub object: ObjectRef,
    /// Recursion depth at snapshot time
    pub depth: u32,
}

/// Live state at one bytecode index, consumed once to seed a frame
#[derive(Debug, Clone)]
pub struct FrameSnapshot {
    /// Bytecode index the state belongs to
    pub bci: u32,
    /// Live locals as ordered (logical slot, value) pairs
    pub locals: Vec<(u16, Value)>,
    /// Operand stack, bottom first
    pub stack: Vec<Value>,
    /// Held monitors, innermost last
    pub monitors: Vec<MonitorEntry>,
}

impl FrameSnapshot {
    /// Value of a local slot, if live in this snapshot
    pub fn local(&self, slot: u16) -> Option<&Value> {
        self.locals
            .iter()
            .find(|(s, _)| *s == slot)
            .map(|(_, v)| v)
    }
}

/// Builder for a snapshot at a bytecode index
#[derive(Debug)]
pub struct SnapshotBuilder {
    bci: u32,
    locals: Vec<(u16, Value)>,
    stack: Vec<Value>,
    monitors: Vec<MonitorEntry>,
}

impl SnapshotBuilder {
    /// Start a snapshot at `bci`
    pub fn new(bci: u32) -> Self {
        SnapshotBuilder {
            bci,
            locals: Vec::new(),
            stack: Vec::new(),
            monitors: Vec::new(),
        }
    }

    /// Record a live local
    pub fn local(mut self, slot: u16, value: Value) -> Self {
        self.locals.push((slot, value));
        self
    }

    /// Push an operand-stack value (bottom first)
    pub fn push_stack(mut self, value: Value) -> Self {
        self.stack.push(value);
        self
    }

    /// Record a held monitor; call in lock order, innermost last
    pub fn monitor(mut self, object: ObjectRef, depth: u32) -> Self {
        self.monitors.push(MonitorEntry { object, depth });
        self
    }

    /// Finish the snapshot
    pub fn build(self) -> FrameSnapshot {
        FrameSnapshot {
            bci: self.bci,
            locals: self.locals,
            stack: self.stack,
            monitors: self.monitors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_preserves_order() {
        let obj = ObjectRef::new(1);
        let snapshot = SnapshotBuilder::new(16)
            .local(0, Value::Int(3))
            .local(2, Value::Long(9))
            .push_stack(Value::Int(1))
            .push_stack(Value::Int(2))
            .monitor(obj.clone(), 1)
            .build();

        assert_eq!(snapshot.bci, 16);
        assert_eq!(snapshot.locals, vec![(0, Value::Int(3)), (2, Value::Long(9))]);
        assert_eq!(snapshot.stack, vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(snapshot.monitors.len(), 1);
        assert!(snapshot.monitors[0].object.same_identity(&obj));
    }

    #[test]
    fn test_local_lookup() {
        let snapshot = SnapshotBuilder::new(0)
            .local(1, Value::Int(7))
            .build();
        assert_eq!(snapshot.local(1), Some(&Value::Int(7)));
        assert!(snapshot.local(0).is_none());
    }
}

//! Identity-keyed re-entrant monitors
//!
//! Monitors are associated with object identity. During deoptimization the
//! materializer re-enters recorded monitors on the materializing thread with
//! their recorded recursion depth before the interpreter frame goes live, so
//! a subsequent unlock observes correct nesting.

use std::sync::Arc;
use std::thread::ThreadId;

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::error::{EngineError, EngineResult};
use crate::value::ObjectRef;

#[derive(Debug, Default)]
struct MonitorState {
    owner: Option<ThreadId>,
    depth: u32,
}

/// A re-entrant monitor owned by at most one thread
#[derive(Debug, Default)]
pub struct Monitor {
    state: Mutex<MonitorState>,
}

impl Monitor {
    /// Try to enter; re-entrant for the owning thread. Returns false if
    /// another thread owns the monitor (the engine never blocks on locks).
    pub fn try_enter(&self, thread: ThreadId) -> bool {
        let mut state = self.state.lock();
        match state.owner {
            None => {
                state.owner = Some(thread);
                state.depth = 1;
                true
            }
            Some(owner) if owner == thread => {
                state.depth += 1;
                true
            }
            Some(_) => false,
        }
    }

    /// Exit one level; returns false if the thread does not own the monitor
    pub fn exit(&self, thread: ThreadId) -> bool {
        let mut state = self.state.lock();
        if state.owner != Some(thread) {
            return false;
        }
        state.depth -= 1;
        if state.depth == 0 {
            state.owner = None;
        }
        true
    }

    /// Current recursion depth (0 when unowned)
    pub fn depth(&self) -> u32 {
        self.state.lock().depth
    }

    /// Whether the given thread owns this monitor
    pub fn held_by(&self, thread: ThreadId) -> bool {
        self.state.lock().owner == Some(thread)
    }

    /// Reassociate after a transition: the monitor must end up owned by
    /// `thread` at exactly `depth`. Valid when unowned (re-lock of a value
    /// that only existed in compiled state) or already owned by the same
    /// thread (held across the compiled region).
    pub fn reassociate(&self, thread: ThreadId, depth: u32, object: usize) -> EngineResult<()> {
        let mut state = self.state.lock();
        match state.owner {
            Some(owner) if owner != thread => Err(EngineError::ForeignMonitorOwner { object }),
            _ => {
                state.owner = Some(thread);
                state.depth = depth;
                Ok(())
            }
        }
    }
}

/// Table of monitors keyed by object identity
pub struct MonitorTable {
    monitors: DashMap<usize, Arc<Monitor>>,
}

impl MonitorTable {
    /// Create an empty monitor table
    pub fn new() -> Self {
        MonitorTable {
            monitors: DashMap::new(),
        }
    }

    fn monitor_of(&self, object: &ObjectRef) -> Arc<Monitor> {
        self.monitors
            .entry(object.addr())
            .or_insert_with(|| Arc::new(Monitor::default()))
            .clone()
    }

    /// Enter the monitor for `object` on `thread`; false if contended
    pub fn enter(&self, object: &ObjectRef, thread: ThreadId) -> bool {
        self.monitor_of(object).try_enter(thread)
    }

    /// Exit one level of the monitor for `object` on `thread`
    pub fn exit(&self, object: &ObjectRef, thread: ThreadId) -> bool {
        let monitor = match self.monitors.get(&object.addr()) {
            Some(m) => m.clone(),
            None => return false,
        };
        monitor.exit(thread)
    }

    /// Recursion depth currently recorded for `object`
    pub fn depth(&self, object: &ObjectRef) -> u32 {
        self.monitors
            .get(&object.addr())
            .map(|m| m.depth())
            .unwrap_or(0)
    }

    /// Whether `thread` owns the monitor for `object`
    pub fn held_by(&self, object: &ObjectRef, thread: ThreadId) -> bool {
        self.monitors
            .get(&object.addr())
            .map(|m| m.held_by(thread))
            .unwrap_or(false)
    }

    /// Reassociate the monitor for `object` to `thread` at `depth`
    pub fn reassociate(&self, object: &ObjectRef, depth: u32, thread: ThreadId) -> EngineResult<()> {
        self.monitor_of(object).reassociate(thread, depth, object.addr())
    }
}

impl Default for MonitorTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn me() -> ThreadId {
        std::thread::current().id()
    }

    #[test]
    fn test_reentrant_enter_exit() {
        let table = MonitorTable::new();
        let obj = ObjectRef::new(1);

        assert!(table.enter(&obj, me()));
        assert!(table.enter(&obj, me()));
        assert_eq!(table.depth(&obj), 2);

        assert!(table.exit(&obj, me()));
        assert_eq!(table.depth(&obj), 1);
        assert!(table.held_by(&obj, me()));

        assert!(table.exit(&obj, me()));
        assert!(!table.held_by(&obj, me()));
    }

    #[test]
    fn test_exit_without_ownership() {
        let table = MonitorTable::new();
        let obj = ObjectRef::new(1);
        assert!(!table.exit(&obj, me()));
    }

    #[test]
    fn test_reassociate_sets_recorded_depth() {
        let table = MonitorTable::new();
        let obj = ObjectRef::new(1);

        table.reassociate(&obj, 3, me()).unwrap();
        assert_eq!(table.depth(&obj), 3);
        assert!(table.held_by(&obj, me()));

        // Nesting unwinds one level at a time
        assert!(table.exit(&obj, me()));
        assert_eq!(table.depth(&obj), 2);
    }

    #[test]
    fn test_reassociate_held_by_same_thread() {
        let table = MonitorTable::new();
        let obj = ObjectRef::new(1);

        assert!(table.enter(&obj, me()));
        table.reassociate(&obj, 2, me()).unwrap();
        assert_eq!(table.depth(&obj), 2);
    }

    #[test]
    fn test_reassociate_foreign_owner_fails() {
        let table = Arc::new(MonitorTable::new());
        let obj = ObjectRef::new(1);

        let t2 = {
            let table = table.clone();
            let obj = obj.clone();
            std::thread::spawn(move || {
                assert!(table.enter(&obj, std::thread::current().id()));
                // Hold until the main thread has observed the failure
                std::thread::sleep(std::time::Duration::from_millis(200));
            })
        };

        // Give the spawned thread time to take the lock
        std::thread::sleep(std::time::Duration::from_millis(50));
        let result = table.reassociate(&obj, 1, me());
        assert!(matches!(
            result,
            Err(EngineError::ForeignMonitorOwner { .. })
        ));
        t2.join().unwrap();
    }

    #[test]
    fn test_contended_enter_returns_false() {
        let table = Arc::new(MonitorTable::new());
        let obj = ObjectRef::new(1);
        assert!(table.enter(&obj, me()));

        let table2 = table.clone();
        let obj2 = obj.clone();
        let handle = std::thread::spawn(move || {
            table2.enter(&obj2, std::thread::current().id())
        });
        assert!(!handle.join().unwrap());
    }
}

//! Method records and registry
//!
//! A method is the unit of code the engine manages: it owns its profile,
//! its speculation log, and static loop metadata supplied by the bytecode
//! front end. Methods are registered at first reference; a purge (class
//! redefinition or unload) invalidates profile and speculation state
//! without destroying the record.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use rustc_hash::FxHashSet;

use crate::profile::ProfileStore;
use crate::speculation::SpeculationLog;

/// Identifies a registered method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodId(pub u32);

impl std::fmt::Display for MethodId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "m{}", self.0)
    }
}

/// Static method metadata supplied by the bytecode front end
#[derive(Debug, Clone)]
pub struct MethodInfo {
    /// Method name, for diagnostics
    pub name: String,
    /// Declared parameter count
    pub param_count: u8,
    /// Local variable slot count
    pub max_locals: u16,
    /// Bytecode length; valid bytecode indices are `0..code_len`
    pub code_len: u32,
    /// Loop header bytecode indices (backedge targets)
    pub loop_headers: FxHashSet<u32>,
    /// Headers reached by irreducible control flow; mid-method entry at
    /// these indices cannot be compiled
    pub irreducible_headers: FxHashSet<u32>,
}

impl MethodInfo {
    /// Create metadata for a method with no known loops
    pub fn new(name: impl Into<String>, param_count: u8, max_locals: u16, code_len: u32) -> Self {
        MethodInfo {
            name: name.into(),
            param_count,
            max_locals,
            code_len,
            loop_headers: FxHashSet::default(),
            irreducible_headers: FxHashSet::default(),
        }
    }

    /// Add a loop header at `bci`
    pub fn with_loop_header(mut self, bci: u32) -> Self {
        self.loop_headers.insert(bci);
        self
    }

    /// Mark the header at `bci` as the target of irreducible control flow
    pub fn with_irreducible_header(mut self, bci: u32) -> Self {
        self.loop_headers.insert(bci);
        self.irreducible_headers.insert(bci);
        self
    }
}

/// A registered method with its mutable engine-side state
pub struct Method {
    id: MethodId,
    info: MethodInfo,
    profile: ProfileStore,
    speculation: SpeculationLog,
}

impl Method {
    /// Method identity
    pub fn id(&self) -> MethodId {
        self.id
    }

    /// Static metadata
    pub fn info(&self) -> &MethodInfo {
        &self.info
    }

    /// The method's profiling counters
    pub fn profile(&self) -> &ProfileStore {
        &self.profile
    }

    /// The method's speculation log
    pub fn speculation(&self) -> &SpeculationLog {
        &self.speculation
    }
}

/// Registry of all methods known to the engine
pub struct MethodRegistry {
    methods: DashMap<MethodId, Arc<Method>>,
    next_id: AtomicU32,
}

impl MethodRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        MethodRegistry {
            methods: DashMap::new(),
            next_id: AtomicU32::new(0),
        }
    }

    /// Register a method, assigning it a fresh id
    pub fn register(&self, info: MethodInfo) -> Arc<Method> {
        let id = MethodId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let method = Arc::new(Method {
            id,
            info,
            profile: ProfileStore::new(),
            speculation: SpeculationLog::new(),
        });
        self.methods.insert(id, method.clone());
        method
    }

    /// Look up a method by id
    pub fn get(&self, id: MethodId) -> Option<Arc<Method>> {
        self.methods.get(&id).map(|m| m.clone())
    }

    /// Number of registered methods
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    /// Whether no methods are registered
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// Lifecycle boundary: drop profile and speculation state for a method
    /// whose owning class was redefined or unloaded. The record itself
    /// survives; installed-code invalidation is the code table's concern.
    pub fn purge(&self, id: MethodId) -> bool {
        match self.methods.get(&id) {
            Some(method) => {
                method.profile.reset();
                method.speculation.clear();
                true
            }
            None => false,
        }
    }
}

impl Default for MethodRegistry {
    fn default() -> Self {
        Self::new()
    }
}

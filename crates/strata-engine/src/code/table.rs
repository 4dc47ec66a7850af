//! Installed-code table and compilation lifecycle
//!
//! Per (method, entry kind): `Uncompiled → Compiling → Installed →
//! {Invalid}`. OSR entries are independent sub-states per bytecode index.
//! Install and invalidate are atomic with respect to lookup; a reader
//! never observes an artifact without its descriptor. Invalidated
//! artifacts are reclaimed only once the last referencing frame drops
//! (deferred release through `Arc`).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::code::artifact::{CompiledUnit, EntryKind, InstalledCode};
use crate::method::MethodId;

/// Claim ticket for an in-flight compilation; install must present it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompileToken {
    /// Claimed method
    pub method: MethodId,
    /// Claimed entry kind
    pub entry: EntryKind,
    ticket: u64,
}

enum CodeState {
    Compiling { ticket: u64 },
    Installed(Arc<InstalledCode>),
}

/// Thread-safe table of installed code keyed by (method, entry kind)
pub struct InstalledCodeTable {
    entries: DashMap<(MethodId, EntryKind), CodeState>,
    next_ticket: AtomicU64,
}

impl InstalledCodeTable {
    /// Create an empty table
    pub fn new() -> Self {
        InstalledCodeTable {
            entries: DashMap::new(),
            next_ticket: AtomicU64::new(1),
        }
    }

    fn ticket(&self) -> u64 {
        self.next_ticket.fetch_add(1, Ordering::Relaxed)
    }

    /// Claim (method, entry) for compilation. Idempotent: returns `None`
    /// while a compile is in flight or valid code is installed, so at most
    /// one live request exists per key.
    pub fn begin_compile(&self, method: MethodId, entry: EntryKind) -> Option<CompileToken> {
        let ticket = self.ticket();
        match self.entries.entry((method, entry)) {
            Entry::Occupied(mut occupied) => match occupied.get() {
                CodeState::Compiling { .. } => None,
                CodeState::Installed(code) if code.is_valid() => None,
                CodeState::Installed(_) => {
                    occupied.insert(CodeState::Compiling { ticket });
                    Some(CompileToken { method, entry, ticket })
                }
            },
            Entry::Vacant(vacant) => {
                vacant.insert(CodeState::Compiling { ticket });
                Some(CompileToken { method, entry, ticket })
            }
        }
    }

    /// Supersede an in-flight compilation with a newer claim. The older
    /// claim's output will be dropped at install time; returns the new
    /// token, or `None` if nothing is in flight.
    pub fn supersede(&self, method: MethodId, entry: EntryKind) -> Option<CompileToken> {
        let ticket = self.ticket();
        match self.entries.entry((method, entry)) {
            Entry::Occupied(mut occupied) => match occupied.get() {
                CodeState::Compiling { .. } => {
                    occupied.insert(CodeState::Compiling { ticket });
                    Some(CompileToken { method, entry, ticket })
                }
                CodeState::Installed(_) => None,
            },
            Entry::Vacant(_) => None,
        }
    }

    /// Atomically install the output of a claimed compilation. Returns the
    /// installed artifact, or `None` if the token was superseded (the unit
    /// is dropped without ever becoming visible).
    pub fn install(&self, token: CompileToken, unit: CompiledUnit) -> Option<Arc<InstalledCode>> {
        match self.entries.entry((token.method, token.entry)) {
            Entry::Occupied(mut occupied) => match occupied.get() {
                CodeState::Compiling { ticket } if *ticket == token.ticket => {
                    let code = Arc::new(InstalledCode::new(
                        token.method,
                        token.entry,
                        token.ticket,
                        unit,
                    ));
                    occupied.insert(CodeState::Installed(code.clone()));
                    tracing::debug!(method = %token.method, entry = ?token.entry, "installed code");
                    Some(code)
                }
                _ => None,
            },
            Entry::Vacant(_) => None,
        }
    }

    /// Release a claim whose compilation failed, so a later request may
    /// retry. No-op if the claim was superseded.
    pub fn abandon(&self, token: CompileToken) {
        if let Entry::Occupied(occupied) = self.entries.entry((token.method, token.entry)) {
            if matches!(occupied.get(), CodeState::Compiling { ticket } if *ticket == token.ticket)
            {
                occupied.remove();
            }
        }
    }

    /// Current valid artifact for (method, entry), or `None`
    pub fn lookup(&self, method: MethodId, entry: EntryKind) -> Option<Arc<InstalledCode>> {
        match self.entries.get(&(method, entry))?.value() {
            CodeState::Installed(code) if code.is_valid() => Some(code.clone()),
            _ => None,
        }
    }

    /// Whether a compilation is in flight for (method, entry)
    pub fn is_compiling(&self, method: MethodId, entry: EntryKind) -> bool {
        matches!(
            self.entries.get(&(method, entry)).as_deref(),
            Some(CodeState::Compiling { .. })
        )
    }

    /// Invalidate the installed artifact for (method, entry). Future
    /// entries fail fast; frames already executing it are unaffected until
    /// their next deopt point or return. Returns true if an artifact
    /// transitioned to invalid.
    pub fn invalidate(&self, method: MethodId, entry: EntryKind, why: &str) -> bool {
        if let Some(state) = self.entries.get(&(method, entry)) {
            if let CodeState::Installed(code) = state.value() {
                if code.invalidate() {
                    tracing::debug!(method = %method, entry = ?entry, why, "invalidated code");
                    return true;
                }
            }
        }
        false
    }

    /// Invalidate every entry owned by `method` (normal and all OSR).
    /// In-flight compilations for the method lose their claim, so their
    /// output can never install after the lifecycle boundary, while the
    /// key stays reclaimable for later requests.
    pub fn invalidate_method(&self, method: MethodId, why: &str) -> usize {
        let keys: Vec<(MethodId, EntryKind)> = self
            .entries
            .iter()
            .filter(|state| state.key().0 == method)
            .map(|state| *state.key())
            .collect();

        let mut count = 0;
        for key in keys {
            if let Entry::Occupied(occupied) = self.entries.entry(key) {
                if matches!(occupied.get(), CodeState::Compiling { .. }) {
                    occupied.remove();
                } else if let CodeState::Installed(code) = occupied.get() {
                    if code.invalidate() {
                        count += 1;
                    }
                }
            }
        }
        if count > 0 {
            tracing::debug!(method = %method, count, why, "invalidated method code");
        }
        count
    }

    /// Number of table entries, including in-flight and invalidated ones
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }
}

impl Default for InstalledCodeTable {
    fn default() -> Self {
        Self::new()
    }
}

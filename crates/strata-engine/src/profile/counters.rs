//! Per-method profiling counters
//!
//! Backedge counts per loop header, exception-seen bits per bytecode index,
//! and bounded type-profile samples per polymorphic site. Written by the
//! interpreter (and profiling compiled tiers), read by the promotion
//! trigger and by graph building.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use dashmap::DashMap;
use parking_lot::Mutex;

/// Exception categories the interpreter records per bytecode index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfiledException {
    /// Array/string index out of bounds
    BoundsCheck,
    /// Null dereference
    NullPointer,
    /// Failed checked cast
    ClassCast,
    /// Arithmetic fault (division by zero, overflow trap)
    Arithmetic,
    /// Anything else
    Other,
}

impl ProfiledException {
    fn bit(self) -> u32 {
        match self {
            ProfiledException::BoundsCheck => 1 << 0,
            ProfiledException::NullPointer => 1 << 1,
            ProfiledException::ClassCast => 1 << 2,
            ProfiledException::Arithmetic => 1 << 3,
            ProfiledException::Other => 1 << 4,
        }
    }
}

/// One observed receiver type at a polymorphic site
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeSample {
    /// Observed class
    pub class_id: u32,
    /// Observation count
    pub count: u64,
}

/// Mutable profiling counters for a single method
#[derive(Debug, Default)]
pub struct ProfileStore {
    backedges: DashMap<u32, AtomicU64>,
    exceptions: DashMap<u32, AtomicU32>,
    type_samples: DashMap<u32, Mutex<Vec<TypeSample>>>,
}

impl ProfileStore {
    /// Create an empty profile
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a taken backedge at a loop header, returning the new count
    pub fn record_backedge(&self, header_bci: u32) -> u64 {
        self.backedges
            .entry(header_bci)
            .or_default()
            .fetch_add(1, Ordering::Relaxed)
            + 1
    }

    /// Backedge count observed at a loop header
    pub fn backedge_count(&self, header_bci: u32) -> u64 {
        self.backedges
            .get(&header_bci)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Record that an exception of `kind` was raised at `bci`
    pub fn record_exception(&self, bci: u32, kind: ProfiledException) {
        self.exceptions
            .entry(bci)
            .or_default()
            .fetch_or(kind.bit(), Ordering::Relaxed);
    }

    /// Whether an exception of `kind` has ever been seen at `bci`
    pub fn has_seen_exception(&self, bci: u32, kind: ProfiledException) -> bool {
        self.exceptions
            .get(&bci)
            .map(|bits| bits.load(Ordering::Relaxed) & kind.bit() != 0)
            .unwrap_or(false)
    }

    /// Record an observed receiver type at a call site, bounded to
    /// `max_width` distinct classes; overflow observations are dropped
    pub fn record_type(&self, bci: u32, class_id: u32, max_width: usize) {
        let entry = self.type_samples.entry(bci).or_default();
        let mut samples = entry.lock();
        if let Some(sample) = samples.iter_mut().find(|s| s.class_id == class_id) {
            sample.count += 1;
        } else if samples.len() < max_width {
            samples.push(TypeSample { class_id, count: 1 });
        }
    }

    /// Snapshot of type samples at a call site
    pub fn types_at(&self, bci: u32) -> Vec<TypeSample> {
        self.type_samples
            .get(&bci)
            .map(|entry| entry.lock().clone())
            .unwrap_or_default()
    }

    /// Whether the profile at a header has enough observations to back
    /// speculative guards
    pub fn is_mature(&self, header_bci: u32, minimum: u64) -> bool {
        self.backedge_count(header_bci) >= minimum
    }

    /// Drop all recorded data (method lifecycle boundary: class
    /// redefinition or unload, not an observable counter decrease)
    pub fn reset(&self) {
        self.backedges.clear();
        self.exceptions.clear();
        self.type_samples.clear();
    }
}

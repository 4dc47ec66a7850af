//! Per-method speculation log
//!
//! Records speculations that failed at runtime so a later compilation of
//! the same method provably avoids re-speculating on the same fact. Without
//! this, a failing speculative guard recompiles into the same guard and the
//! method ping-pongs between tiers forever.

use parking_lot::RwLock;
use rustc_hash::FxHashSet;

use crate::deopt::DeoptReason;

/// Identifies one speculated fact: a reason at a bytecode index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpeculationKey {
    /// Bytecode index of the speculating guard
    pub bci: u32,
    /// Deoptimization reason the guard failed with
    pub reason: DeoptReason,
}

/// Log of failed speculations for one method
#[derive(Debug, Default)]
pub struct SpeculationLog {
    failed: RwLock<FxHashSet<SpeculationKey>>,
}

impl SpeculationLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failed speculation; returns true if newly recorded
    pub fn record_failure(&self, key: SpeculationKey) -> bool {
        self.failed.write().insert(key)
    }

    /// Whether a compilation may still speculate on this fact
    pub fn may_speculate(&self, key: SpeculationKey) -> bool {
        !self.failed.read().contains(&key)
    }

    /// Snapshot of all blocked speculations, for a compile request
    pub fn blocked(&self) -> Vec<SpeculationKey> {
        self.failed.read().iter().copied().collect()
    }

    /// Number of recorded failures
    pub fn len(&self) -> usize {
        self.failed.read().len()
    }

    /// Whether no failures are recorded
    pub fn is_empty(&self) -> bool {
        self.failed.read().is_empty()
    }

    /// Drop all recorded failures (method lifecycle boundary)
    pub fn clear(&self) {
        self.failed.write().clear();
    }
}

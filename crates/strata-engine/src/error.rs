//! Error taxonomy for the transition engine
//!
//! Expected control transitions (uninitialized-class guards, explicit
//! deoptimization requests) are not errors and never appear here. This
//! module covers caller-visible signals and fatal internal contract
//! violations; speculation failures surface through deopt statistics and
//! the structured log, not through these types.

use crate::code::EntryKind;
use crate::method::MethodId;

/// Errors surfaced by the transition engine
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Entry into code that has been invalidated; the caller must
    /// re-resolve the artifact before retrying
    #[error("invalid installed code for method {method} entry {entry:?}")]
    InvalidInstalledCode {
        /// Owning method
        method: MethodId,
        /// Entry kind the caller attempted
        entry: EntryKind,
    },

    /// No deoptimization descriptor exists at the requested bytecode index
    #[error("no deoptimization descriptor at bci {bci} in method {method}")]
    MissingDeoptPoint {
        /// Owning method
        method: MethodId,
        /// Triggering bytecode index
        bci: u32,
    },

    /// Descriptor lacks a mapping for a required slot. Substituting a
    /// default value here would break observable-state equivalence, so this
    /// aborts the materialization instead.
    #[error("descriptor missing location for slot {slot} at bci {bci}")]
    MissingSlotMapping {
        /// Triggering bytecode index
        bci: u32,
        /// Logical slot with no physical location
        slot: u16,
    },

    /// A physical location named by the descriptor holds no value
    #[error("unresolved physical location {location} at bci {bci}")]
    UnresolvedLocation {
        /// Triggering bytecode index
        bci: u32,
        /// Description of the missing location
        location: String,
    },

    /// The entry snapshot does not satisfy the artifact's entry contract
    #[error("entry snapshot missing required local {slot} for method {method}")]
    EntryContract {
        /// Target method
        method: MethodId,
        /// Expected local slot absent from the snapshot
        slot: u16,
    },

    /// A monitor recorded in a snapshot is owned by a different thread;
    /// reassociation would corrupt lock state
    #[error("cannot reassociate monitor for object {object:#x}: held by another thread")]
    ForeignMonitorOwner {
        /// Identity address of the locked object
        object: usize,
    },

    /// Descriptor frame chain violates its structural contract
    #[error("malformed descriptor frame chain: {detail}")]
    MalformedDescriptor {
        /// Human-readable description of the violation
        detail: String,
    },

    /// Method is not registered with the engine
    #[error("unknown method {0}")]
    UnknownMethod(MethodId),
}

/// Result alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

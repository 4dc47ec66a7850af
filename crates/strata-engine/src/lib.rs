//! Strata Tiered-Execution Transition Engine
//!
//! This crate implements the transition protocol between the two execution
//! modes of a tiered runtime:
//! - **Promotion (OSR)**: hot interpreted loops are replaced mid-method by
//!   compiled code entered at the loop header, seeded from the live
//!   interpreter frame (`osr`, `snapshot` modules)
//! - **Deoptimization**: compiled code that fails a guard abandons itself,
//!   and the engine reconstructs exact interpreter state — locals, operand
//!   stack, monitor nesting, canonical boxed identities — from the
//!   compiled frame and its descriptor (`deopt` module)
//! - **Installed code lifecycle**: atomic install/invalidate/lookup per
//!   (method, entry kind) with deferred reclamation (`code` module)
//! - **Profiling**: lock-free counters the promotion policy reads
//!   (`profile` module)
//!
//! Code generation itself is external: hosts supply a
//! [`compile::CompilerCollaborator`] that turns requests into installable
//! units, and an interpreter that consumes the materialized frames.
//!
//! # Example
//!
//! ```rust,ignore
//! use strata_engine::{EngineConfig, TransitionEngine};
//!
//! let engine = TransitionEngine::new(EngineConfig::new(), my_compiler);
//! let method = engine.register_method(method_info);
//!
//! // Interpreter loop: report backedges, transfer control when promoted
//! loop {
//!     match engine.on_backedge(&frame)? {
//!         BackedgeAction::Entered(result) => break result,
//!         _ => { /* keep interpreting */ }
//!     }
//! }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

/// Canonical boxed-primitive cache
pub mod boxing;

/// Installed code: artifacts, descriptors, and the code table
pub mod code;

/// Compiler collaborator contract
pub mod compile;

/// Engine configuration
pub mod config;

/// Deoptimization: reasons, site statistics, frame materialization
pub mod deopt;

/// The engine facade
pub mod engine;

/// Error taxonomy
pub mod error;

/// Interpreter and compiled frame shapes
pub mod frame;

/// Method records and registry
pub mod method;

/// Identity-keyed re-entrant monitors
pub mod monitor;

/// On-stack replacement trigger
pub mod osr;

/// Profiling counters
pub mod profile;

/// Frame snapshots
pub mod snapshot;

/// Per-method speculation log
pub mod speculation;

/// The value model
pub mod value;

/// Method-substitution consistency verification
pub mod verify;

pub use boxing::BoxingCache;
pub use code::{
    CompileToken, CompiledExit, CompiledUnit, DeoptPointDescriptor, EntryKind, FrameDescriptor,
    InstalledCode, InstalledCodeTable, MonitorAssignment, RuntimeServices, SlotAssignment,
    SlotLocation, SlotRepr, VirtualFrameDescriptor,
};
pub use compile::{CompileFailure, CompileRequest, CompilerCollaborator};
pub use config::EngineConfig;
pub use deopt::{classify, DeoptReason, DeoptSiteKey, DeoptSiteStats, FrameMaterializer, GuardKind};
pub use engine::{BackedgeAction, ExecutionResult, TransitionEngine};
pub use error::{EngineError, EngineResult};
pub use frame::{CompiledFrame, InterpreterFrame};
pub use method::{Method, MethodId, MethodInfo, MethodRegistry};
pub use monitor::MonitorTable;
pub use osr::OsrTrigger;
pub use profile::{ProfileStore, ProfiledException, TypeSample};
pub use snapshot::{FrameSnapshot, MonitorEntry, SnapshotBuilder};
pub use speculation::{SpeculationKey, SpeculationLog};
pub use value::{BoxedRef, ObjectRef, PrimitiveKind, Value};
pub use verify::{
    ArityVerifier, CoreProviders, FallbackVerifier, Substitution, SubstitutionRegistry,
    Verifier, VerifierPipeline, VerifyReport, Violation,
};

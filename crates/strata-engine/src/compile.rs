//! Compiler collaborator contract
//!
//! The engine never generates code itself; it prepares requests (method,
//! entry kind, blocked speculations) and consumes either an installable
//! unit or a structured failure. Requests are dispatched asynchronously to
//! background compiler threads, or inline when the engine is configured
//! synchronous; either way the collaborator must be safely abandonable —
//! a superseded request completes but its output is never installed.

use std::sync::Arc;

use crate::code::{CompileToken, CompiledUnit, EntryKind};
use crate::method::Method;
use crate::speculation::SpeculationKey;

/// Structured compile failure
#[derive(Debug, Clone, thiserror::Error)]
pub enum CompileFailure {
    /// The requested loop header is reached by irreducible control flow;
    /// mid-method entry there can never be compiled
    #[error("irreducible control flow targeting loop header at bci {bci}")]
    IrreducibleLoop {
        /// The offending header
        bci: u32,
    },

    /// The profile never matured enough to compile speculatively
    #[error("profile immature after {observations} observations")]
    ProfileImmature {
        /// Observations at the header when the request gave up
        observations: u64,
    },

    /// The per-header re-attempt budget ran out
    #[error("compile re-attempt budget exhausted after {attempts} attempts")]
    RetryBudgetExhausted {
        /// Attempts made before giving up
        attempts: u32,
    },

    /// The collaborating compiler reported a failure
    #[error("backend failure: {0}")]
    Backend(String),
}

impl CompileFailure {
    /// Whether retrying the same request can ever succeed
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            CompileFailure::IrreducibleLoop { .. } | CompileFailure::RetryBudgetExhausted { .. }
        )
    }
}

/// A prepared compilation request
pub struct CompileRequest {
    /// Method to compile
    pub method: Arc<Method>,
    /// Requested entry kind
    pub entry: EntryKind,
    /// Install claim; stale tokens make the output uninstallable
    pub token: CompileToken,
    /// Speculations the produced code must not make
    pub blocked_speculations: Vec<SpeculationKey>,
}

/// The collaborating compiler
///
/// Implementations are free to take as long as they like; the engine
/// tolerates requests whose claim has been superseded by discarding the
/// output at install time.
pub trait CompilerCollaborator: Send + Sync {
    /// Compile `request` into an installable unit or a structured failure
    fn compile(&self, request: &CompileRequest) -> Result<CompiledUnit, CompileFailure>;
}

impl<F> CompilerCollaborator for F
where
    F: Fn(&CompileRequest) -> Result<CompiledUnit, CompileFailure> + Send + Sync,
{
    fn compile(&self, request: &CompileRequest) -> Result<CompiledUnit, CompileFailure> {
        self(request)
    }
}

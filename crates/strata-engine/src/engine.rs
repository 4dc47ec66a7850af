//! The transition engine facade
//!
//! Owns the method registry, installed-code table, boxing cache, monitor
//! table, deopt statistics, and the compile queue, and drives the two
//! transitions: interpreted backedge → OSR entry, and failed compiled
//! guard → materialized interpreter frames. Entry points take the engine
//! explicitly; there is no ambient global state.

use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam::channel::{unbounded, Receiver, Sender};

use crate::boxing::BoxingCache;
use crate::code::{CompiledExit, EntryKind, InstalledCode, InstalledCodeTable, RuntimeServices};
use crate::compile::{CompileFailure, CompileRequest, CompilerCollaborator};
use crate::config::EngineConfig;
use crate::deopt::{DeoptReason, DeoptSiteKey, DeoptSiteStats, FrameMaterializer};
use crate::error::{EngineError, EngineResult};
use crate::frame::{CompiledFrame, InterpreterFrame};
use crate::method::{Method, MethodId, MethodInfo, MethodRegistry};
use crate::monitor::MonitorTable;
use crate::osr::OsrTrigger;
use crate::snapshot::FrameSnapshot;
use crate::speculation::SpeculationKey;
use crate::value::Value;

/// Outcome of a compiled execution
#[derive(Debug)]
pub enum ExecutionResult {
    /// Compiled code ran to completion
    Returned(Value),
    /// Compiled code abandoned itself; the caller resumes interpretation
    /// in the materialized frames (outermost first, innermost resuming at
    /// the triggering index)
    Deoptimized {
        /// Classified reason
        reason: DeoptReason,
        /// Materialized interpreter frames
        frames: Vec<InterpreterFrame>,
    },
}

/// Outcome of reporting one interpreted backedge
#[derive(Debug)]
pub enum BackedgeAction {
    /// Keep interpreting
    Continue,
    /// An OSR compile was requested on this backedge
    Requested,
    /// Control transferred into OSR code; the interpreter frame is dead
    Entered(ExecutionResult),
}

struct EngineInner {
    config: EngineConfig,
    methods: MethodRegistry,
    table: InstalledCodeTable,
    boxing: BoxingCache,
    monitors: MonitorTable,
    stats: DeoptSiteStats,
    osr: OsrTrigger,
    compiler: Box<dyn CompilerCollaborator>,
}

/// The tiered-execution transition engine
pub struct TransitionEngine {
    inner: Arc<EngineInner>,
    sender: Option<Sender<CompileRequest>>,
    workers: Vec<JoinHandle<()>>,
}

impl TransitionEngine {
    /// Create an engine with the given configuration and compiler
    /// collaborator
    pub fn new(config: EngineConfig, compiler: impl CompilerCollaborator + 'static) -> Self {
        let threads = config.compiler_threads;
        let inner = Arc::new(EngineInner {
            config,
            methods: MethodRegistry::new(),
            table: InstalledCodeTable::new(),
            boxing: BoxingCache::new(),
            monitors: MonitorTable::new(),
            stats: DeoptSiteStats::new(),
            osr: OsrTrigger::new(),
            compiler: Box::new(compiler),
        });

        let (sender, workers) = if threads > 0 {
            let (tx, rx) = unbounded::<CompileRequest>();
            let workers = (0..threads)
                .map(|_| {
                    let inner = inner.clone();
                    let rx: Receiver<CompileRequest> = rx.clone();
                    std::thread::spawn(move || {
                        while let Ok(request) = rx.recv() {
                            compile_one(&inner, request);
                        }
                    })
                })
                .collect();
            (Some(tx), workers)
        } else {
            (None, Vec::new())
        };

        TransitionEngine {
            inner,
            sender,
            workers,
        }
    }

    /// Register a method with the engine
    pub fn register_method(&self, info: MethodInfo) -> Arc<Method> {
        self.inner.methods.register(info)
    }

    /// The method registry
    pub fn methods(&self) -> &MethodRegistry {
        &self.inner.methods
    }

    /// The installed-code table
    pub fn table(&self) -> &InstalledCodeTable {
        &self.inner.table
    }

    /// The canonical boxing cache
    pub fn boxing(&self) -> &BoxingCache {
        &self.inner.boxing
    }

    /// The monitor table
    pub fn monitors(&self) -> &MonitorTable {
        &self.inner.monitors
    }

    /// Deoptimization site statistics
    pub fn stats(&self) -> &DeoptSiteStats {
        &self.inner.stats
    }

    /// The OSR trigger state
    pub fn osr(&self) -> &OsrTrigger {
        &self.inner.osr
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Request a compilation of (method, entry). Fire-and-forget:
    /// returns true if a new request was claimed, false if one is already
    /// in flight, code is already installed, or the entry is disabled.
    pub fn request_compile(&self, method: &Arc<Method>, entry: EntryKind) -> bool {
        let inner = &self.inner;
        if let EntryKind::Osr { bci } = entry {
            if inner.osr.is_disabled(method.id(), bci) {
                return false;
            }
            if method.info().irreducible_headers.contains(&bci) {
                // Deterministic failure: never reaches the collaborator
                inner.osr.record_failure(
                    method.id(),
                    bci,
                    &CompileFailure::IrreducibleLoop { bci },
                    inner.config.max_compile_reattempts,
                );
                return false;
            }
        }

        let Some(token) = inner.table.begin_compile(method.id(), entry) else {
            return false;
        };
        let request = CompileRequest {
            method: method.clone(),
            entry,
            token,
            blocked_speculations: method.speculation().blocked(),
        };
        match &self.sender {
            Some(sender) => {
                // Workers only exit once the engine drops, so the queue is
                // always live here
                let _ = sender.send(request);
            }
            None => compile_one(inner, request),
        }
        true
    }

    /// Report one taken backedge at `frame.bci`. Counts the backedge,
    /// enters OSR code as soon as it is installed (seeding it from the
    /// current frame), and runs the promotion decision once per poll
    /// interval.
    pub fn on_backedge(&self, frame: &InterpreterFrame) -> EngineResult<BackedgeAction> {
        let inner = &self.inner;
        let method = inner
            .methods
            .get(frame.method)
            .ok_or(EngineError::UnknownMethod(frame.method))?;
        let bci = frame.bci;
        let entry = EntryKind::Osr { bci };
        let count = method.profile().record_backedge(bci);

        // Enter as soon as the artifact is visible
        if let Some(code) = inner.table.lookup(method.id(), entry) {
            return Ok(BackedgeAction::Entered(
                self.enter_artifact(&code, frame.snapshot())?,
            ));
        }

        if !OsrTrigger::should_poll(count, inner.config.osr_poll_interval) {
            return Ok(BackedgeAction::Continue);
        }
        if count < inner.config.osr_threshold
            || inner.osr.is_disabled(method.id(), bci)
            || inner.table.is_compiling(method.id(), entry)
        {
            return Ok(BackedgeAction::Continue);
        }
        if !method
            .profile()
            .is_mature(bci, inner.config.profile_maturity_threshold)
        {
            // Backedges without a maturing profile: retry within the
            // budget, then the header latches disabled
            inner
                .osr
                .note_attempt(method.id(), bci, inner.config.max_compile_reattempts);
            return Ok(BackedgeAction::Continue);
        }

        if self.request_compile(&method, entry) {
            // A synchronous engine has the artifact by now
            if let Some(code) = inner.table.lookup(method.id(), entry) {
                return Ok(BackedgeAction::Entered(
                    self.enter_artifact(&code, frame.snapshot())?,
                ));
            }
            return Ok(BackedgeAction::Requested);
        }
        Ok(BackedgeAction::Continue)
    }

    /// Invoke the installed normal-entry code for `method`, if any.
    /// `Ok(None)` means the caller should interpret.
    pub fn invoke(
        &self,
        method: MethodId,
        snapshot: FrameSnapshot,
    ) -> EngineResult<Option<ExecutionResult>> {
        match self.inner.table.lookup(method, EntryKind::Normal) {
            Some(code) => Ok(Some(self.enter_artifact(&code, snapshot)?)),
            None => Ok(None),
        }
    }

    /// Enter a specific artifact with an entry snapshot. Callers holding a
    /// stale handle get `InvalidInstalledCode` and must re-resolve through
    /// `lookup`.
    pub fn enter_artifact(
        &self,
        code: &Arc<InstalledCode>,
        snapshot: FrameSnapshot,
    ) -> EngineResult<ExecutionResult> {
        let inner = &self.inner;
        if !code.is_valid() {
            return Err(EngineError::InvalidInstalledCode {
                method: code.method(),
                entry: code.entry(),
            });
        }
        for slot in code.entry_slots() {
            if snapshot.local(*slot).is_none() {
                return Err(EngineError::EntryContract {
                    method: code.method(),
                    slot: *slot,
                });
            }
        }

        tracing::trace!(method = %code.method(), entry = ?code.entry(), "entering compiled code");
        let mut frame = CompiledFrame::enter(code.clone(), snapshot);
        let services = RuntimeServices {
            boxing: &inner.boxing,
            monitors: &inner.monitors,
        };
        match code.run(&mut frame, &services) {
            CompiledExit::Return(value) => Ok(ExecutionResult::Returned(value)),
            CompiledExit::Deopt { reason, bci } => self.deoptimize(frame, reason, bci),
        }
    }

    /// Lifecycle boundary: the owning class of `method` was redefined or
    /// unloaded. All installed entries are invalidated and the profile and
    /// speculation state reset; the method record survives.
    pub fn purge_method(&self, method: MethodId) {
        self.inner.table.invalidate_method(method, "class redefined");
        self.inner.methods.purge(method);
    }

    fn deoptimize(
        &self,
        frame: CompiledFrame,
        reason: DeoptReason,
        bci: u32,
    ) -> EngineResult<ExecutionResult> {
        let inner = &self.inner;
        let code = frame.code().clone();
        let method_id = code.method();

        // One counted record per (method, bci, reason), however often the
        // same site triggers
        inner.stats.record(DeoptSiteKey {
            method: method_id,
            bci,
            reason,
        });
        tracing::debug!(method = %method_id, bci, %reason, "deoptimizing");

        if reason.records_speculation() {
            if let Some(method) = inner.methods.get(method_id) {
                method
                    .speculation()
                    .record_failure(SpeculationKey { bci, reason });
            }
        }
        if reason.invalidates_code() && code.invalidate() {
            tracing::debug!(method = %method_id, entry = ?code.entry(), %reason, "invalidated code");
        }

        let point = code
            .descriptor()
            .point_at(bci)
            .ok_or(EngineError::MissingDeoptPoint {
                method: method_id,
                bci,
            })?;
        let materializer = FrameMaterializer::new(&inner.boxing, &inner.monitors);
        let frames = materializer.materialize(&frame, point, std::thread::current().id())?;
        Ok(ExecutionResult::Deoptimized { reason, frames })
    }
}

impl Drop for TransitionEngine {
    fn drop(&mut self) {
        // Closing the queue lets workers drain and exit
        self.sender = None;
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

fn compile_one(inner: &EngineInner, request: CompileRequest) {
    let method = request.method.id();
    let entry = request.entry;
    match inner.compiler.compile(&request) {
        Ok(unit) => {
            if inner.table.install(request.token, unit).is_none() {
                // Superseded: the output must never become visible
                tracing::debug!(method = %method, entry = ?entry, "compile superseded");
            }
        }
        Err(failure) => {
            inner.table.abandon(request.token);
            if let EntryKind::Osr { bci } = entry {
                inner.osr.record_failure(
                    method,
                    bci,
                    &failure,
                    inner.config.max_compile_reattempts,
                );
            } else {
                tracing::debug!(method = %method, %failure, "compile failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::{
        CompiledUnit, DeoptPointDescriptor, FrameDescriptor, SlotAssignment, SlotLocation,
        VirtualFrameDescriptor,
    };
    use crate::snapshot::SnapshotBuilder;

    fn return_42() -> Result<CompiledUnit, CompileFailure> {
        Ok(CompiledUnit {
            entry_slots: vec![],
            descriptor: FrameDescriptor::new(),
            body: Box::new(|_, _| CompiledExit::Return(Value::Int(42))),
        })
    }

    #[test]
    fn test_normal_invoke_flow() {
        let engine = TransitionEngine::new(EngineConfig::synchronous(), |_req: &CompileRequest| {
            return_42()
        });
        let method = engine.register_method(MethodInfo::new("answer", 0, 0, 4));

        // Nothing installed yet
        let snapshot = SnapshotBuilder::new(0).build();
        assert!(matches!(engine.invoke(method.id(), snapshot), Ok(None)));

        assert!(engine.request_compile(&method, EntryKind::Normal));
        let snapshot = SnapshotBuilder::new(0).build();
        match engine.invoke(method.id(), snapshot) {
            Ok(Some(ExecutionResult::Returned(value))) => assert_eq!(value, Value::Int(42)),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_request_compile_idempotent() {
        let engine = TransitionEngine::new(EngineConfig::synchronous(), |_req: &CompileRequest| {
            return_42()
        });
        let method = engine.register_method(MethodInfo::new("idem", 0, 0, 4));

        assert!(engine.request_compile(&method, EntryKind::Normal));
        // Installed code refuses a second claim
        assert!(!engine.request_compile(&method, EntryKind::Normal));
    }

    #[test]
    fn test_enter_invalid_artifact_signals() {
        let engine = TransitionEngine::new(EngineConfig::synchronous(), |_req: &CompileRequest| {
            return_42()
        });
        let method = engine.register_method(MethodInfo::new("stale", 0, 0, 4));
        engine.request_compile(&method, EntryKind::Normal);

        let code = engine.table().lookup(method.id(), EntryKind::Normal).unwrap();
        engine.table().invalidate(method.id(), EntryKind::Normal, "test");

        let result = engine.enter_artifact(&code, SnapshotBuilder::new(0).build());
        assert!(matches!(
            result,
            Err(EngineError::InvalidInstalledCode { .. })
        ));
    }

    #[test]
    fn test_entry_contract_enforced() {
        let engine = TransitionEngine::new(EngineConfig::synchronous(), |_req: &CompileRequest| {
            Ok(CompiledUnit {
                entry_slots: vec![0, 1],
                descriptor: FrameDescriptor::new(),
                body: Box::new(|_, _| CompiledExit::Return(Value::Null)),
            })
        });
        let method = engine.register_method(MethodInfo::new("strict", 2, 2, 4));
        engine.request_compile(&method, EntryKind::Normal);
        let code = engine.table().lookup(method.id(), EntryKind::Normal).unwrap();

        let incomplete = SnapshotBuilder::new(0).local(0, Value::Int(1)).build();
        assert!(matches!(
            engine.enter_artifact(&code, incomplete),
            Err(EngineError::EntryContract { slot: 1, .. })
        ));

        let complete = SnapshotBuilder::new(0)
            .local(0, Value::Int(1))
            .local(1, Value::Int(2))
            .build();
        assert!(engine.enter_artifact(&code, complete).is_ok());
    }

    #[test]
    fn test_deopt_records_and_invalidates() {
        let engine = TransitionEngine::new(EngineConfig::synchronous(), |req: &CompileRequest| {
            let method = req.method.id();
            Ok(CompiledUnit {
                entry_slots: vec![],
                descriptor: FrameDescriptor::new().with_point(DeoptPointDescriptor {
                    bci: 8,
                    frames: vec![VirtualFrameDescriptor {
                        method,
                        bci: 8,
                        locals: vec![SlotAssignment::raw(
                            0,
                            SlotLocation::Constant(Value::Int(7)),
                        )],
                        stack: vec![],
                        monitors: vec![],
                    }],
                }),
                body: Box::new(|_, _| CompiledExit::Deopt {
                    reason: DeoptReason::BoundsCheckFailed,
                    bci: 8,
                }),
            })
        });
        let method = engine.register_method(MethodInfo::new("bounds", 0, 1, 16));
        engine.request_compile(&method, EntryKind::Normal);
        let code = engine.table().lookup(method.id(), EntryKind::Normal).unwrap();

        match engine.enter_artifact(&code, SnapshotBuilder::new(0).build()) {
            Ok(ExecutionResult::Deoptimized { reason, frames }) => {
                assert_eq!(reason, DeoptReason::BoundsCheckFailed);
                assert_eq!(frames.len(), 1);
                assert_eq!(frames[0].bci, 8);
                assert_eq!(frames[0].local(0), Some(&Value::Int(7)));
            }
            other => panic!("unexpected result: {other:?}"),
        }

        // Speculative failure invalidates and pins the speculation
        assert!(!code.is_valid());
        assert!(!method.speculation().may_speculate(SpeculationKey {
            bci: 8,
            reason: DeoptReason::BoundsCheckFailed,
        }));
        assert_eq!(engine.stats().total_for_method(method.id()), 1);
    }

    #[test]
    fn test_purge_method() {
        let engine = TransitionEngine::new(EngineConfig::synchronous(), |_req: &CompileRequest| {
            return_42()
        });
        let method = engine.register_method(MethodInfo::new("purged", 0, 0, 4).with_loop_header(0));
        engine.request_compile(&method, EntryKind::Normal);
        method.profile().record_backedge(0);

        engine.purge_method(method.id());
        assert!(engine.table().lookup(method.id(), EntryKind::Normal).is_none());
        assert_eq!(method.profile().backedge_count(0), 0);
    }
}

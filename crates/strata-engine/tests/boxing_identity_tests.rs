//! Boxed Value Identity Tests
//!
//! Tests that boxed primitives observed across execution-mode transitions
//! are indistinguishable from what pure interpretation produces:
//! - Canonical ranges are reference-identical after materialization
//! - Out-of-range values are fresh per boxing and never asserted identical
//! - Compiled allocation and materialization share one canonical cache
//! - One object reachable as local, stack slot, and monitor materializes
//!   to a single identity with its lock intact
//!
//! # Running Tests
//! ```bash
//! cargo test --test boxing_identity_tests
//! ```

use strata_engine::{
    CompileFailure, CompileRequest, CompiledExit, CompiledUnit, DeoptPointDescriptor, DeoptReason,
    EngineConfig, EntryKind, ExecutionResult, FrameDescriptor, InterpreterFrame, MethodInfo,
    MonitorAssignment, PrimitiveKind, SlotAssignment, SlotLocation, SnapshotBuilder,
    TransitionEngine, Value, VirtualFrameDescriptor,
};

const DEOPT_BCI: u32 = 16;

/// Compiler whose body parks the given scalars in registers and deopts,
/// with every slot observed as a boxed primitive
fn boxing_compiler(
    values: Vec<(PrimitiveKind, Value)>,
) -> impl Fn(&CompileRequest) -> Result<CompiledUnit, CompileFailure> {
    move |req: &CompileRequest| {
        let method = req.method.id();
        let locals = values
            .iter()
            .enumerate()
            .map(|(slot, (kind, _))| {
                SlotAssignment::boxed(slot as u16, SlotLocation::Register(slot as u8), *kind)
            })
            .collect();
        let values = values.clone();
        Ok(CompiledUnit {
            entry_slots: vec![],
            descriptor: FrameDescriptor::new().with_point(DeoptPointDescriptor {
                bci: DEOPT_BCI,
                frames: vec![VirtualFrameDescriptor {
                    method,
                    bci: DEOPT_BCI,
                    locals,
                    stack: vec![],
                    monitors: vec![],
                }],
            }),
            body: Box::new(move |frame, _| {
                for (reg, (_, value)) in values.iter().enumerate() {
                    frame.set_register(reg as u8, value.clone());
                }
                CompiledExit::Deopt {
                    reason: DeoptReason::Explicit,
                    bci: DEOPT_BCI,
                }
            }),
        })
    }
}

fn materialized_frame(engine: &TransitionEngine, expected_locals: usize) -> InterpreterFrame {
    let method = engine.register_method(MethodInfo::new("boxer", 0, 8, 32));
    assert!(engine.request_compile(&method, EntryKind::Normal));
    match engine.invoke(method.id(), SnapshotBuilder::new(0).build()) {
        Ok(Some(ExecutionResult::Deoptimized { mut frames, .. })) => {
            let frame = frames.pop().unwrap();
            assert_eq!(frame.locals.len(), expected_locals);
            frame
        }
        other => panic!("expected deoptimization, got {other:?}"),
    }
}

fn boxed_local(frame: &InterpreterFrame, slot: u16) -> strata_engine::BoxedRef {
    match frame.local(slot) {
        Some(Value::Boxed(b)) => b.clone(),
        other => panic!("slot {slot} is not boxed: {other:?}"),
    }
}

#[test]
fn test_in_range_ints_identical_across_materializations() {
    let values = vec![
        (PrimitiveKind::Int, Value::Int(42)),
        (PrimitiveKind::Int, Value::Int(-42)),
    ];
    let engine =
        TransitionEngine::new(EngineConfig::synchronous(), boxing_compiler(values.clone()));

    let first = materialized_frame(&engine, values.len());
    let second = materialized_frame(&engine, values.len());

    // Two independent materializations and the interpreter's own boxing
    // all share one canonical instance per value
    let canonical_42 = engine.boxing().canonical_box(PrimitiveKind::Int, 42);
    let canonical_neg = engine.boxing().canonical_box(PrimitiveKind::Int, -42);
    assert!(boxed_local(&first, 0).same_identity(&boxed_local(&second, 0)));
    assert!(boxed_local(&first, 0).same_identity(&canonical_42));
    assert!(boxed_local(&first, 1).same_identity(&boxed_local(&second, 1)));
    assert!(boxed_local(&first, 1).same_identity(&canonical_neg));
}

#[test]
fn test_out_of_range_long_fresh_per_boxing() {
    let values = vec![(PrimitiveKind::Long, Value::Long(2_i64 << 40))];
    let engine =
        TransitionEngine::new(EngineConfig::synchronous(), boxing_compiler(values.clone()));

    let first = materialized_frame(&engine, values.len());
    let second = materialized_frame(&engine, values.len());

    let a = boxed_local(&first, 0);
    let b = boxed_local(&second, 0);
    assert_eq!(a.bits(), b.bits());
    // Outside the canonical range each boxing is a distinct instance
    assert!(!a.same_identity(&b));
}

#[test]
fn test_full_range_kinds_identical() {
    let values = vec![
        (PrimitiveKind::Short, Value::Short(-30_000)),
        (PrimitiveKind::Char, Value::Char(0x2603)),
        (PrimitiveKind::Byte, Value::Byte(-128)),
        (PrimitiveKind::Boolean, Value::Boolean(true)),
    ];
    let engine =
        TransitionEngine::new(EngineConfig::synchronous(), boxing_compiler(values.clone()));

    let first = materialized_frame(&engine, values.len());
    let second = materialized_frame(&engine, values.len());

    for slot in 0..4 {
        assert!(
            boxed_local(&first, slot).same_identity(&boxed_local(&second, slot)),
            "slot {slot} lost canonical identity"
        );
    }
}

#[test]
fn test_compiled_allocation_shares_interpreter_cache() {
    // The body boxes through the runtime services, the way compiled
    // allocation of a boxed value does
    let engine = TransitionEngine::new(
        EngineConfig::synchronous(),
        |_req: &CompileRequest| -> Result<CompiledUnit, CompileFailure> {
            Ok(CompiledUnit {
                entry_slots: vec![],
                descriptor: FrameDescriptor::new(),
                body: Box::new(|_, services| {
                    CompiledExit::Return(Value::Boxed(
                        services.boxing.canonical_box(PrimitiveKind::Int, 100),
                    ))
                }),
            })
        },
    );
    let method = engine.register_method(MethodInfo::new("alloc_box", 0, 0, 8));
    assert!(engine.request_compile(&method, EntryKind::Normal));

    let compiled = match engine.invoke(method.id(), SnapshotBuilder::new(0).build()) {
        Ok(Some(ExecutionResult::Returned(Value::Boxed(b)))) => b,
        other => panic!("expected boxed return, got {other:?}"),
    };
    let interpreted = engine.boxing().canonical_box(PrimitiveKind::Int, 100);
    assert!(compiled.same_identity(&interpreted));
}

#[test]
fn test_object_aliased_across_local_stack_and_monitor() {
    use strata_engine::ObjectRef;

    let engine = TransitionEngine::new(
        EngineConfig::synchronous(),
        |req: &CompileRequest| -> Result<CompiledUnit, CompileFailure> {
            let method = req.method.id();
            Ok(CompiledUnit {
                entry_slots: vec![0],
                descriptor: FrameDescriptor::new().with_point(DeoptPointDescriptor {
                    bci: DEOPT_BCI,
                    frames: vec![VirtualFrameDescriptor {
                        method,
                        bci: DEOPT_BCI,
                        // The same physical location feeds a local, a stack
                        // slot, and the held monitor
                        locals: vec![SlotAssignment::raw(0, SlotLocation::EntryLocal(0))],
                        stack: vec![SlotAssignment::raw(0, SlotLocation::EntryLocal(0))],
                        monitors: vec![MonitorAssignment {
                            location: SlotLocation::EntryLocal(0),
                            depth: 2,
                        }],
                    }],
                }),
                body: Box::new(|_, _| CompiledExit::Deopt {
                    reason: DeoptReason::Explicit,
                    bci: DEOPT_BCI,
                }),
            })
        },
    );
    let method = engine.register_method(MethodInfo::new("aliased", 1, 1, 32));
    assert!(engine.request_compile(&method, EntryKind::Normal));

    let lockee = ObjectRef::new(11);
    let me = std::thread::current().id();
    assert!(engine.monitors().enter(&lockee, me));
    assert!(engine.monitors().enter(&lockee, me));

    let snapshot = SnapshotBuilder::new(0)
        .local(0, Value::Object(lockee.clone()))
        .monitor(lockee.clone(), 2)
        .build();
    let frames = match engine.invoke(method.id(), snapshot) {
        Ok(Some(ExecutionResult::Deoptimized { frames, .. })) => frames,
        other => panic!("expected deoptimization, got {other:?}"),
    };

    // All three observed positions hold the same object
    let frame = &frames[0];
    let local = match frame.local(0) {
        Some(Value::Object(o)) => o.clone(),
        other => panic!("local is not an object: {other:?}"),
    };
    let stacked = match &frame.stack[0] {
        Value::Object(o) => o.clone(),
        other => panic!("stack slot is not an object: {other:?}"),
    };
    assert!(local.same_identity(&lockee));
    assert!(stacked.same_identity(&lockee));
    assert!(frame.monitors[0].object.same_identity(&lockee));

    // The monitor is held at the recorded depth, and re-entrant operations
    // on it still succeed
    assert!(engine.monitors().held_by(&lockee, me));
    assert_eq!(engine.monitors().depth(&lockee), 2);
    assert!(engine.monitors().enter(&lockee, me));
    assert_eq!(engine.monitors().depth(&lockee), 3);
    assert!(engine.monitors().exit(&lockee, me));
}

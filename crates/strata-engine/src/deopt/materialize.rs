//! Frame materialization: rebuilding interpreter state from compiled state
//!
//! Given a live compiled frame and the descriptor for the triggering
//! bytecode index, produce the interpreter frames whose locals, operand
//! stack, and monitor ownership are observably identical to what
//! interpreted execution would show at that index. Scalars the interpreter
//! observes boxed canonicalize through the boxing cache; recorded monitors
//! re-enter on the materializing thread before any frame goes live; frames
//! build bottom-up for inlined chains.

use std::thread::ThreadId;

use crate::boxing::BoxingCache;
use crate::code::{DeoptPointDescriptor, SlotAssignment, SlotLocation, SlotRepr, VirtualFrameDescriptor};
use crate::error::{EngineError, EngineResult};
use crate::frame::{CompiledFrame, InterpreterFrame};
use crate::monitor::MonitorTable;
use crate::snapshot::MonitorEntry;
use crate::value::Value;

/// Rebuilds interpreter frames from compiled frames
pub struct FrameMaterializer<'a> {
    boxing: &'a BoxingCache,
    monitors: &'a MonitorTable,
}

impl<'a> FrameMaterializer<'a> {
    /// Create a materializer over the engine's boxing cache and monitor
    /// table
    pub fn new(boxing: &'a BoxingCache, monitors: &'a MonitorTable) -> Self {
        FrameMaterializer { boxing, monitors }
    }

    /// Materialize the interpreter frame chain for `point` from `frame`,
    /// re-entering recorded monitors on `thread`. Frames come back
    /// outermost first; the innermost frame resumes at the triggering
    /// index so the failing operation re-executes interpretively.
    pub fn materialize(
        &self,
        frame: &CompiledFrame,
        point: &DeoptPointDescriptor,
        thread: ThreadId,
    ) -> EngineResult<Vec<InterpreterFrame>> {
        let innermost = point.frames.last().ok_or_else(|| {
            EngineError::MalformedDescriptor {
                detail: format!("empty frame chain at bci {}", point.bci),
            }
        })?;
        if innermost.bci != point.bci {
            return Err(EngineError::MalformedDescriptor {
                detail: format!(
                    "innermost frame resumes at bci {} but the deopt point is bci {}",
                    innermost.bci, point.bci
                ),
            });
        }

        let mut result = Vec::with_capacity(point.frames.len());
        for vframe in &point.frames {
            result.push(self.materialize_one(frame, vframe, point.bci, thread)?);
        }
        Ok(result)
    }

    fn materialize_one(
        &self,
        frame: &CompiledFrame,
        vframe: &VirtualFrameDescriptor,
        point_bci: u32,
        thread: ThreadId,
    ) -> EngineResult<InterpreterFrame> {
        let mut out = InterpreterFrame::new(vframe.method, vframe.bci);

        for assignment in &vframe.locals {
            let value = self.resolve_slot(frame, assignment, point_bci)?;
            out.locals.push((assignment.slot, value));
        }
        for assignment in &vframe.stack {
            let value = self.resolve_slot(frame, assignment, point_bci)?;
            out.stack.push(value);
        }

        // Monitors re-enter in recorded order, innermost last, before the
        // frame is handed to the interpreter.
        for monitor in &vframe.monitors {
            let value = self.resolve(frame, &monitor.location, point_bci)?;
            let object = match value {
                Value::Object(object) => object,
                other => {
                    return Err(EngineError::MalformedDescriptor {
                        detail: format!(
                            "monitor location {} resolved to non-object {:?}",
                            monitor.location, other
                        ),
                    })
                }
            };
            self.monitors.reassociate(&object, monitor.depth, thread)?;
            out.monitors.push(MonitorEntry {
                object,
                depth: monitor.depth,
            });
        }

        Ok(out)
    }

    fn resolve_slot(
        &self,
        frame: &CompiledFrame,
        assignment: &SlotAssignment,
        point_bci: u32,
    ) -> EngineResult<Value> {
        let value = self.resolve(frame, &assignment.location, point_bci)?;
        Ok(match assignment.repr {
            SlotRepr::Raw => value,
            SlotRepr::BoxedPrimitive(kind) => match value.scalar_bits() {
                // The interpreter observes this slot boxed: canonicalize so
                // identity matches what unoptimized execution produces.
                Some((_, bits)) => Value::Boxed(self.boxing.canonical_box(kind, bits)),
                // Already a heap value; identity flows through untouched.
                None => value,
            },
        })
    }

    fn resolve(
        &self,
        frame: &CompiledFrame,
        location: &SlotLocation,
        point_bci: u32,
    ) -> EngineResult<Value> {
        match location {
            SlotLocation::Register(reg) => {
                frame.registers.get(reg).cloned().ok_or_else(|| {
                    EngineError::UnresolvedLocation {
                        bci: point_bci,
                        location: location.to_string(),
                    }
                })
            }
            SlotLocation::StackSlot(slot) => {
                frame.stack_slots.get(slot).cloned().ok_or_else(|| {
                    EngineError::UnresolvedLocation {
                        bci: point_bci,
                        location: location.to_string(),
                    }
                })
            }
            SlotLocation::EntryLocal(slot) => {
                frame.locals.get(slot).cloned().ok_or_else(|| {
                    EngineError::MissingSlotMapping {
                        bci: point_bci,
                        slot: *slot,
                    }
                })
            }
            SlotLocation::Constant(value) => Ok(value.clone()),
        }
    }
}

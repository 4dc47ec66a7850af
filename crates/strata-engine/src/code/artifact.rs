//! Installed code: the artifact, its entry contract, and its descriptor
//!
//! The descriptor is the static half of deoptimization: for every
//! potential deopt point it records where each logical slot lives
//! (register, spill slot, entry-seeded local, or compile-time constant)
//! and the virtual frame chain the compiled frame stands for.

use std::sync::atomic::{AtomicBool, Ordering};

use rustc_hash::FxHashMap;

use crate::boxing::BoxingCache;
use crate::deopt::DeoptReason;
use crate::frame::CompiledFrame;
use crate::method::MethodId;
use crate::monitor::MonitorTable;
use crate::value::{PrimitiveKind, Value};

/// How an artifact is entered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    /// Ordinary method entry
    Normal,
    /// Mid-method entry at a loop header
    Osr {
        /// Loop header bytecode index
        bci: u32,
    },
}

/// Physical location of a logical slot at a deopt point
#[derive(Debug, Clone)]
pub enum SlotLocation {
    /// Machine register
    Register(u8),
    /// Spill slot
    StackSlot(u16),
    /// Still in its entry-seeded logical local
    EntryLocal(u16),
    /// Compile-time constant
    Constant(Value),
}

impl std::fmt::Display for SlotLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SlotLocation::Register(r) => write!(f, "reg{r}"),
            SlotLocation::StackSlot(s) => write!(f, "stack{s}"),
            SlotLocation::EntryLocal(l) => write!(f, "local{l}"),
            SlotLocation::Constant(_) => write!(f, "const"),
        }
    }
}

/// How the interpreter observes a slot's value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotRepr {
    /// As-is
    Raw,
    /// As a boxed reference of the given kind; scalar values canonicalize
    /// through the boxing cache during materialization
    BoxedPrimitive(PrimitiveKind),
}

/// One logical slot's mapping at a deopt point
#[derive(Debug, Clone)]
pub struct SlotAssignment {
    /// Logical slot index
    pub slot: u16,
    /// Where the value lives
    pub location: SlotLocation,
    /// How the interpreter observes it
    pub repr: SlotRepr,
}

impl SlotAssignment {
    /// Map `slot` to `location`, observed raw
    pub fn raw(slot: u16, location: SlotLocation) -> Self {
        SlotAssignment {
            slot,
            location,
            repr: SlotRepr::Raw,
        }
    }

    /// Map `slot` to `location`, observed as a boxed primitive
    pub fn boxed(slot: u16, location: SlotLocation, kind: PrimitiveKind) -> Self {
        SlotAssignment {
            slot,
            location,
            repr: SlotRepr::BoxedPrimitive(kind),
        }
    }
}

/// One held monitor's mapping at a deopt point
#[derive(Debug, Clone)]
pub struct MonitorAssignment {
    /// Where the locked object lives
    pub location: SlotLocation,
    /// Recorded recursion depth
    pub depth: u32,
}

/// One logical interpreter frame within a compiled frame
///
/// A compiled frame may stand for several of these when calls were
/// inlined; the chain is ordered outermost first.
#[derive(Debug, Clone)]
pub struct VirtualFrameDescriptor {
    /// Method of this logical frame
    pub method: MethodId,
    /// Resume index: the call-return point for callers, the triggering
    /// index for the innermost frame
    pub bci: u32,
    /// Local mappings
    pub locals: Vec<SlotAssignment>,
    /// Operand-stack mappings, bottom first
    pub stack: Vec<SlotAssignment>,
    /// Monitor mappings, innermost last
    pub monitors: Vec<MonitorAssignment>,
}

/// All metadata needed to materialize at one deopt point
#[derive(Debug, Clone)]
pub struct DeoptPointDescriptor {
    /// Triggering bytecode index
    pub bci: u32,
    /// Virtual frame chain, outermost first
    pub frames: Vec<VirtualFrameDescriptor>,
}

/// Static deopt metadata for an artifact: descriptors keyed by bytecode
/// index
#[derive(Debug, Clone, Default)]
pub struct FrameDescriptor {
    points: FxHashMap<u32, DeoptPointDescriptor>,
}

impl FrameDescriptor {
    /// Create an empty descriptor
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a deopt point, keyed by its triggering index
    pub fn add_point(&mut self, point: DeoptPointDescriptor) {
        self.points.insert(point.bci, point);
    }

    /// Builder-style `add_point`
    pub fn with_point(mut self, point: DeoptPointDescriptor) -> Self {
        self.add_point(point);
        self
    }

    /// Descriptor at a triggering index, if any
    pub fn point_at(&self, bci: u32) -> Option<&DeoptPointDescriptor> {
        self.points.get(&bci)
    }

    /// Number of deopt points
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the descriptor has no deopt points
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Exit states of a compiled execution
pub enum CompiledExit {
    /// Normal completion with a return value
    Return(Value),
    /// A guard failed; the engine deoptimizes at `bci` with `reason`
    Deopt {
        /// Selected deoptimization reason
        reason: DeoptReason,
        /// Triggering bytecode index; must name a descriptor point
        bci: u32,
    },
}

/// Runtime services compiled code reaches back into
///
/// The compiled tier boxes values through the same canonical cache the
/// interpreter uses, so both execution modes are indistinguishable to
/// identity-sensitive code.
pub struct RuntimeServices<'a> {
    /// Canonical boxed-primitive cache
    pub boxing: &'a BoxingCache,
    /// Identity-keyed monitor table
    pub monitors: &'a MonitorTable,
}

/// Executable body of an artifact
///
/// Supplied by the compiler collaborator; the engine treats it as opaque
/// machine code with the entry signature below.
pub type CompiledBody = Box<dyn Fn(&mut CompiledFrame, &RuntimeServices<'_>) -> CompiledExit + Send + Sync>;

/// Output of a successful compilation, ready to install
pub struct CompiledUnit {
    /// Logical locals the entry snapshot must supply
    pub entry_slots: Vec<u16>,
    /// Static deopt metadata
    pub descriptor: FrameDescriptor,
    /// Executable body
    pub body: CompiledBody,
}

/// An installed compiled artifact
///
/// Code and descriptor install as one unit; a reader can never observe one
/// without the other. The validity flag is the only mutable state:
/// invalidated code must not be entered, but frames already executing it
/// keep the artifact alive through their own reference.
pub struct InstalledCode {
    method: MethodId,
    entry: EntryKind,
    version: u64,
    entry_slots: Vec<u16>,
    descriptor: FrameDescriptor,
    body: CompiledBody,
    valid: AtomicBool,
}

impl InstalledCode {
    pub(crate) fn new(method: MethodId, entry: EntryKind, version: u64, unit: CompiledUnit) -> Self {
        InstalledCode {
            method,
            entry,
            version,
            entry_slots: unit.entry_slots,
            descriptor: unit.descriptor,
            body: unit.body,
            valid: AtomicBool::new(true),
        }
    }

    /// Owning method
    pub fn method(&self) -> MethodId {
        self.method
    }

    /// Entry kind
    pub fn entry(&self) -> EntryKind {
        self.entry
    }

    /// Install version; newer installs for the same key carry larger
    /// versions
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Logical locals the entry snapshot must supply
    pub fn entry_slots(&self) -> &[u16] {
        &self.entry_slots
    }

    /// Static deopt metadata
    pub fn descriptor(&self) -> &FrameDescriptor {
        &self.descriptor
    }

    /// Whether this artifact may still be entered
    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    /// Mark invalid; returns true if this call performed the transition
    pub fn invalidate(&self) -> bool {
        self.valid.swap(false, Ordering::AcqRel)
    }

    pub(crate) fn run(&self, frame: &mut CompiledFrame, services: &RuntimeServices<'_>) -> CompiledExit {
        (self.body)(frame, services)
    }
}

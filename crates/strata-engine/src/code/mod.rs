//! Compiled-code artifacts and the installed-code table
//!
//! An artifact is opaque executable code plus the static frame descriptor
//! that makes deoptimization from it possible. The table maps (method,
//! entry kind) to at most one active artifact with atomic install,
//! invalidate, and lookup.

mod artifact;
mod table;

pub use artifact::{
    CompiledBody, CompiledExit, CompiledUnit, DeoptPointDescriptor, EntryKind, FrameDescriptor,
    InstalledCode, MonitorAssignment, RuntimeServices, SlotAssignment, SlotLocation, SlotRepr,
    VirtualFrameDescriptor,
};
pub use table::{CompileToken, InstalledCodeTable};

//! Deoptimization: reason classification, site accounting, and frame
//! materialization
//!
//! A failed guard in compiled code selects a reason, routes through the
//! single counted record for its site, and hands the compiled frame plus
//! its descriptor to the materializer, which rebuilds interpreter-visible
//! state. The reason's action policy decides whether the artifact is
//! invalidated and whether the failed speculation is pinned against
//! recompilation.

mod materialize;
mod reason;
mod stats;

pub use materialize::FrameMaterializer;
pub use reason::{classify, DeoptReason, GuardKind};
pub use stats::{DeoptSite, DeoptSiteKey, DeoptSiteStats};

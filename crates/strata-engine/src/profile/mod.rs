//! Profiling data written by interpreted execution
//!
//! Lock-free counters read by the promotion trigger and by compile
//! requests. Profiling is approximate: lost updates under races are
//! tolerated, but counts are monotonic and never observed to decrease.

mod counters;

pub use counters::{ProfileStore, ProfiledException, TypeSample};

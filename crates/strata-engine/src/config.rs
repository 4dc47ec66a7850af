//! Engine configuration
//!
//! Promotion thresholds, maturity minimums, and compiler parallelism are
//! tuning parameters, not correctness invariants. Defaults here are the
//! values the test suites run with.

/// Configuration for the transition engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Backedge count at a loop header before an OSR compile is requested
    pub osr_threshold: u64,
    /// The full trigger decision runs once per this many backedges; between
    /// polls only the counter increment and the ready-check run
    pub osr_poll_interval: u64,
    /// Minimum observations at a header before its profile is mature enough
    /// to back speculative guards
    pub profile_maturity_threshold: u64,
    /// Compile re-attempts for a header whose profile never matures, or
    /// whose compilation fails retriably, before the header is disabled
    pub max_compile_reattempts: u32,
    /// Background compiler threads; 0 compiles synchronously on the
    /// requesting thread
    pub compiler_threads: usize,
    /// Bound on retained type-profile samples per call site
    pub max_type_profile_width: usize,
}

impl EngineConfig {
    /// Create a configuration with default thresholds
    pub fn new() -> Self {
        EngineConfig {
            // Threshold is a multiple of the poll interval so promotion
            // triggers on the poll that crosses it.
            osr_threshold: 1_024,
            osr_poll_interval: 16,
            profile_maturity_threshold: 128,
            max_compile_reattempts: 3,
            compiler_threads: num_cpus::get().min(4),
            max_type_profile_width: 8,
        }
    }

    /// Compile synchronously on the requesting thread. Used by tests that
    /// need deterministic promotion timing.
    pub fn synchronous() -> Self {
        EngineConfig {
            compiler_threads: 0,
            ..Self::new()
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

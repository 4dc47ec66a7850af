//! On-stack replacement trigger
//!
//! Consulted on interpreted backedges. Counting happens on every backedge;
//! the full decision runs once per poll interval. A header whose profile
//! never matures retries a bounded number of times and is then disabled
//! with a descriptive failure — a lower tier can report backedges for a
//! region that never actually runs to maturity, and that must degrade to a
//! compile failure, never a crash.

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::compile::CompileFailure;
use crate::method::MethodId;

#[derive(Debug, Default)]
struct HeaderState {
    attempts: u32,
    disabled: bool,
    last_failure: Option<String>,
}

/// Per-header OSR bookkeeping: retry budget and failure latch
#[derive(Default)]
pub struct OsrTrigger {
    headers: DashMap<(MethodId, u32), Mutex<HeaderState>>,
}

impl OsrTrigger {
    /// Create an empty trigger
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the full decision should run for this backedge count
    pub fn should_poll(count: u64, interval: u64) -> bool {
        interval <= 1 || count % interval == 0
    }

    /// Whether the header has been disabled
    pub fn is_disabled(&self, method: MethodId, bci: u32) -> bool {
        self.headers
            .get(&(method, bci))
            .map(|s| s.lock().disabled)
            .unwrap_or(false)
    }

    /// Descriptive reason for the header's last failure, if any
    pub fn last_failure(&self, method: MethodId, bci: u32) -> Option<String> {
        self.headers
            .get(&(method, bci))
            .and_then(|s| s.lock().last_failure.clone())
    }

    /// Count one attempt for a header that could not compile yet (immature
    /// profile or retriable failure); disables the header once the budget
    /// is exhausted. Returns the attempts used so far.
    pub fn note_attempt(&self, method: MethodId, bci: u32, budget: u32) -> u32 {
        let entry = self.headers.entry((method, bci)).or_default();
        let mut state = entry.lock();
        state.attempts += 1;
        if state.attempts >= budget && !state.disabled {
            state.disabled = true;
            let failure = CompileFailure::RetryBudgetExhausted {
                attempts: state.attempts,
            };
            state.last_failure = Some(failure.to_string());
            tracing::debug!(method = %method, bci, attempts = state.attempts, "osr disabled");
        }
        state.attempts
    }

    /// Record a compile failure for a header. Permanent failures disable
    /// immediately; retriable ones consume one attempt from the budget.
    pub fn record_failure(
        &self,
        method: MethodId,
        bci: u32,
        failure: &CompileFailure,
        budget: u32,
    ) {
        let entry = self.headers.entry((method, bci)).or_default();
        let mut state = entry.lock();
        state.attempts += 1;
        if failure.is_permanent() || state.attempts >= budget {
            state.disabled = true;
        }
        state.last_failure = Some(failure.to_string());
        tracing::debug!(
            method = %method,
            bci,
            %failure,
            disabled = state.disabled,
            "osr compile failed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_cadence() {
        assert!(OsrTrigger::should_poll(16, 16));
        assert!(OsrTrigger::should_poll(32, 16));
        assert!(!OsrTrigger::should_poll(17, 16));
        // Degenerate interval polls every backedge
        assert!(OsrTrigger::should_poll(7, 1));
        assert!(OsrTrigger::should_poll(7, 0));
    }

    #[test]
    fn test_attempt_budget_disables() {
        let trigger = OsrTrigger::new();
        let method = MethodId(0);

        assert_eq!(trigger.note_attempt(method, 8, 3), 1);
        assert!(!trigger.is_disabled(method, 8));
        assert_eq!(trigger.note_attempt(method, 8, 3), 2);
        assert_eq!(trigger.note_attempt(method, 8, 3), 3);

        assert!(trigger.is_disabled(method, 8));
        let failure = trigger.last_failure(method, 8).unwrap();
        assert!(failure.contains("re-attempt budget exhausted"));
    }

    #[test]
    fn test_permanent_failure_disables_immediately() {
        let trigger = OsrTrigger::new();
        let method = MethodId(0);

        trigger.record_failure(
            method,
            24,
            &CompileFailure::IrreducibleLoop { bci: 24 },
            3,
        );
        assert!(trigger.is_disabled(method, 24));
        assert!(trigger
            .last_failure(method, 24)
            .unwrap()
            .contains("irreducible control flow"));
    }

    #[test]
    fn test_retriable_failure_consumes_budget() {
        let trigger = OsrTrigger::new();
        let method = MethodId(0);
        let failure = CompileFailure::Backend("transient".into());

        trigger.record_failure(method, 8, &failure, 3);
        assert!(!trigger.is_disabled(method, 8));
        trigger.record_failure(method, 8, &failure, 3);
        assert!(!trigger.is_disabled(method, 8));
        trigger.record_failure(method, 8, &failure, 3);
        assert!(trigger.is_disabled(method, 8));
    }

    #[test]
    fn test_headers_independent() {
        let trigger = OsrTrigger::new();
        trigger.record_failure(
            MethodId(0),
            8,
            &CompileFailure::IrreducibleLoop { bci: 8 },
            3,
        );
        assert!(trigger.is_disabled(MethodId(0), 8));
        assert!(!trigger.is_disabled(MethodId(0), 16));
        assert!(!trigger.is_disabled(MethodId(1), 8));
    }
}

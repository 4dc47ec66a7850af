//! Method-substitution consistency verification
//!
//! Substituted ("intrinsic") implementations must agree with the methods
//! they replace, and any substitution that can bail out mid-execution must
//! carry the metadata the transition back to bytecode needs. Verifiers are
//! a closed set of variants registered in a fixed order over a providers
//! capability struct; nothing is discovered at runtime.

use dashmap::DashMap;

use crate::method::{MethodId, MethodRegistry};

/// A registered method substitution
#[derive(Debug, Clone)]
pub struct Substitution {
    /// Method being replaced
    pub target: MethodId,
    /// Name of the substituted implementation, for diagnostics
    pub replacement: String,
    /// Parameter count of the substituted implementation
    pub param_count: u8,
    /// Whether the substitution can bail out to the original bytecode
    pub can_bail_out: bool,
    /// Bytecode index execution resumes at on bail-out
    pub fallback_bci: Option<u32>,
}

/// Registry of method substitutions
#[derive(Default)]
pub struct SubstitutionRegistry {
    subs: DashMap<MethodId, Substitution>,
}

impl SubstitutionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a substitution, replacing any previous one for the target
    pub fn register(&self, sub: Substitution) {
        self.subs.insert(sub.target, sub);
    }

    /// The substitution for `target`, if any
    pub fn get(&self, target: MethodId) -> Option<Substitution> {
        self.subs.get(&target).map(|s| s.clone())
    }

    /// Number of registered substitutions
    pub fn len(&self) -> usize {
        self.subs.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.subs.is_empty()
    }

    /// All substitutions in target order, for deterministic verification
    pub fn all(&self) -> Vec<Substitution> {
        let mut subs: Vec<Substitution> = self.subs.iter().map(|s| s.clone()).collect();
        subs.sort_by_key(|s| s.target);
        subs
    }
}

/// Capabilities the verifiers read
pub struct CoreProviders<'a> {
    /// Registered methods
    pub methods: &'a MethodRegistry,
    /// Registered substitutions
    pub substitutions: &'a SubstitutionRegistry,
}

/// One consistency violation
#[derive(Debug, Clone)]
pub struct Violation {
    /// Offending substitution target
    pub method: MethodId,
    /// What is inconsistent
    pub detail: String,
}

/// Result of one verifier pass
#[derive(Debug)]
pub struct VerifyReport {
    /// Name of the verifier that produced this report
    pub verifier: &'static str,
    /// Substitutions checked
    pub checked: usize,
    /// Violations found
    pub violations: Vec<Violation>,
}

impl VerifyReport {
    /// Whether the pass found no violations
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }
}

/// One consistency check over the providers
pub trait Verifier: Send + Sync {
    /// Verifier name, for reports
    fn name(&self) -> &'static str;

    /// Run the check
    fn verify(&self, providers: &CoreProviders<'_>) -> VerifyReport;
}

/// Checks that each substitution names a registered method and matches its
/// parameter count
pub struct ArityVerifier;

impl Verifier for ArityVerifier {
    fn name(&self) -> &'static str {
        "arity"
    }

    fn verify(&self, providers: &CoreProviders<'_>) -> VerifyReport {
        let subs = providers.substitutions.all();
        let mut violations = Vec::new();
        for sub in &subs {
            match providers.methods.get(sub.target) {
                None => violations.push(Violation {
                    method: sub.target,
                    detail: format!("substitution {} targets an unregistered method", sub.replacement),
                }),
                Some(method) if method.info().param_count != sub.param_count => {
                    violations.push(Violation {
                        method: sub.target,
                        detail: format!(
                            "substitution {} takes {} parameters but {} declares {}",
                            sub.replacement,
                            sub.param_count,
                            method.info().name,
                            method.info().param_count
                        ),
                    })
                }
                Some(_) => {}
            }
        }
        VerifyReport {
            verifier: self.name(),
            checked: subs.len(),
            violations,
        }
    }
}

/// Checks that substitutions able to bail out carry a resumable fallback
/// index within the target's bytecode
pub struct FallbackVerifier;

impl Verifier for FallbackVerifier {
    fn name(&self) -> &'static str {
        "fallback"
    }

    fn verify(&self, providers: &CoreProviders<'_>) -> VerifyReport {
        let subs = providers.substitutions.all();
        let mut violations = Vec::new();
        for sub in &subs {
            if !sub.can_bail_out {
                continue;
            }
            match sub.fallback_bci {
                None => violations.push(Violation {
                    method: sub.target,
                    detail: format!(
                        "substitution {} can bail out but names no fallback index",
                        sub.replacement
                    ),
                }),
                Some(bci) => {
                    if let Some(method) = providers.methods.get(sub.target) {
                        if bci >= method.info().code_len {
                            violations.push(Violation {
                                method: sub.target,
                                detail: format!(
                                    "fallback index {bci} is outside {} (length {})",
                                    method.info().name,
                                    method.info().code_len
                                ),
                            });
                        }
                    }
                }
            }
        }
        VerifyReport {
            verifier: self.name(),
            checked: subs.len(),
            violations,
        }
    }
}

/// Ordered pipeline of verifiers
pub struct VerifierPipeline {
    verifiers: Vec<Box<dyn Verifier>>,
}

impl VerifierPipeline {
    /// The standard pipeline: arity agreement, then fallback metadata
    pub fn standard() -> Self {
        VerifierPipeline {
            verifiers: vec![Box::new(ArityVerifier), Box::new(FallbackVerifier)],
        }
    }

    /// Append a verifier to the pipeline
    pub fn push(&mut self, verifier: Box<dyn Verifier>) {
        self.verifiers.push(verifier);
    }

    /// Run all verifiers in order
    pub fn run(&self, providers: &CoreProviders<'_>) -> Vec<VerifyReport> {
        self.verifiers.iter().map(|v| v.verify(providers)).collect()
    }
}

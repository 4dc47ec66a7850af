//! Deoptimization reasons and their action policy
//!
//! The reason selected at a failing guard decides whether the owning
//! artifact is invalidated and whether the failure is recorded so a
//! recompilation avoids the same speculation.

/// Why compiled execution abandoned itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeoptReason {
    /// Array/string bounds check failed
    BoundsCheckFailed,
    /// Null check failed
    NullCheckFailed,
    /// Checked cast failed
    ClassCastFailed,
    /// Touched a class that has not finished initializing
    UninitializedClass,
    /// Explicit/programmatic request (test or debug directive)
    Explicit,
    /// Referenced an entity not yet resolved
    UnresolvedReference,
    /// A type-profile-based speculation no longer holds
    TypeProfileInvalidated,
    /// Anything else
    Other,
}

/// Guard kinds compiled code can fail on; the classifier maps these to
/// reasons at the trigger site
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardKind {
    /// Array/string bounds guard
    BoundsCheck,
    /// Null guard
    NullCheck,
    /// Checked-cast guard
    ClassCast,
    /// Class-initialization guard
    ClassInitialization,
    /// Type-profile speculation guard
    TypeProfile,
    /// Unresolved-reference guard
    Unresolved,
    /// Explicit directive embedded in the code
    ExplicitRequest,
    /// A method substitution bailing out to the original bytecode
    IntrinsicFallback,
}

/// Select the deoptimization reason for a failed guard
pub fn classify(guard: GuardKind) -> DeoptReason {
    match guard {
        GuardKind::BoundsCheck => DeoptReason::BoundsCheckFailed,
        GuardKind::NullCheck => DeoptReason::NullCheckFailed,
        GuardKind::ClassCast => DeoptReason::ClassCastFailed,
        GuardKind::ClassInitialization => DeoptReason::UninitializedClass,
        GuardKind::TypeProfile => DeoptReason::TypeProfileInvalidated,
        GuardKind::Unresolved => DeoptReason::UnresolvedReference,
        GuardKind::ExplicitRequest | GuardKind::IntrinsicFallback => DeoptReason::Explicit,
    }
}

impl DeoptReason {
    /// Whether this reason invalidates the owning artifact
    pub fn invalidates_code(self) -> bool {
        match self {
            DeoptReason::BoundsCheckFailed
            | DeoptReason::NullCheckFailed
            | DeoptReason::ClassCastFailed
            | DeoptReason::TypeProfileInvalidated
            | DeoptReason::Other => true,
            DeoptReason::UninitializedClass
            | DeoptReason::Explicit
            | DeoptReason::UnresolvedReference => false,
        }
    }

    /// Whether the failure is recorded in the speculation log so
    /// recompilation avoids the same guard
    pub fn records_speculation(self) -> bool {
        matches!(
            self,
            DeoptReason::BoundsCheckFailed
                | DeoptReason::NullCheckFailed
                | DeoptReason::ClassCastFailed
                | DeoptReason::TypeProfileInvalidated
        )
    }

    /// Expected, repeatable transition paths: not failures, never
    /// reported upward
    pub fn is_expected_transition(self) -> bool {
        matches!(
            self,
            DeoptReason::UninitializedClass
                | DeoptReason::Explicit
                | DeoptReason::UnresolvedReference
        )
    }
}

impl std::fmt::Display for DeoptReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DeoptReason::BoundsCheckFailed => "bounds check",
            DeoptReason::NullCheckFailed => "null check",
            DeoptReason::ClassCastFailed => "class cast",
            DeoptReason::UninitializedClass => "uninitialized class",
            DeoptReason::Explicit => "explicit request",
            DeoptReason::UnresolvedReference => "unresolved reference",
            DeoptReason::TypeProfileInvalidated => "type profile",
            DeoptReason::Other => "other",
        };
        write!(f, "{}", name)
    }
}

use crate::class::UserType;

/// How a component resolves an ambiguous backend failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Keep the already-authenticated principal usable.
    FailOpen,
    /// Treat the credential as invalid and purge it.
    FailClosed,
}

/// A transport or query error while classifying a principal that already has
/// a backend session keeps them at base-user capabilities.
pub const DETECTION_FAILURE_POLICY: FailurePolicy = FailurePolicy::FailOpen;
pub const DETECTION_FAILURE_FALLBACK: UserType = UserType::User;

/// Any failure to confirm a stored token with the backend forces logout.
pub const VERIFICATION_FAILURE_POLICY: FailurePolicy = FailurePolicy::FailClosed;

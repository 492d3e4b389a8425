use serde::Serialize;
use thiserror::Error;

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Clone, Error)]
pub enum AuthError {
    #[error("unknown user class '{0}'")]
    UnknownClass(String),
    #[error("failed to read storage key '{key}': {message}")]
    StorageRead { key: String, message: String },
    #[error("failed to write storage key '{key}': {message}")]
    StorageWrite { key: String, message: String },
    #[error("malformed auth record: {0}")]
    MalformedRecord(String),
    #[error("failed to serialize auth record: {0}")]
    Serialization(String),
    #[error("backend unreachable: {0}")]
    Transport(String),
    #[error("backend query on '{table}' failed: {message}")]
    Query { table: String, message: String },
    #[error("function '{name}' failed: {message}")]
    Function { name: String, message: String },
    #[error("unexpected backend response: {0}")]
    InvalidResponse(String),
    #[error("no token available")]
    MissingToken,
    #[error("session expired")]
    Expired,
}

impl AuthError {
    /// Transport and query failures, as opposed to a clean "no row" answer.
    pub fn is_backend_failure(&self) -> bool {
        matches!(
            self,
            AuthError::Transport(_)
                | AuthError::Query { .. }
                | AuthError::Function { .. }
                | AuthError::InvalidResponse(_)
        )
    }
}

/// Why a stored token failed verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum VerifyFailure {
    MissingToken,
    Expired,
    Unreachable(String),
    Rejected(String),
    InvalidResponse(String),
}

impl VerifyFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerifyFailure::MissingToken => "missing_token",
            VerifyFailure::Expired => "expired",
            VerifyFailure::Unreachable(_) => "unreachable",
            VerifyFailure::Rejected(_) => "rejected",
            VerifyFailure::InvalidResponse(_) => "invalid_response",
        }
    }

    /// The backend could not give an answer, as opposed to rejecting the token.
    pub fn is_backend_failure(&self) -> bool {
        matches!(
            self,
            VerifyFailure::Unreachable(_) | VerifyFailure::InvalidResponse(_)
        )
    }
}

impl From<AuthError> for VerifyFailure {
    fn from(value: AuthError) -> Self {
        match value {
            AuthError::Transport(message) => VerifyFailure::Unreachable(message),
            AuthError::Expired => VerifyFailure::Expired,
            AuthError::MissingToken => VerifyFailure::MissingToken,
            AuthError::InvalidResponse(message) | AuthError::MalformedRecord(message) => {
                VerifyFailure::InvalidResponse(message)
            }
            other => VerifyFailure::Rejected(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_map_to_unreachable() {
        let failure = VerifyFailure::from(AuthError::Transport("connection refused".into()));
        assert_eq!(failure, VerifyFailure::Unreachable("connection refused".into()));
        assert_eq!(failure.as_str(), "unreachable");
    }

    #[test]
    fn function_errors_map_to_rejected() {
        let failure = VerifyFailure::from(AuthError::Function {
            name: "verify-admin-session".into(),
            message: "revoked".into(),
        });
        assert!(matches!(failure, VerifyFailure::Rejected(message) if message.contains("revoked")));
    }

    #[test]
    fn backend_failure_excludes_local_conditions() {
        assert!(AuthError::Transport("x".into()).is_backend_failure());
        assert!(AuthError::Query { table: "profiles".into(), message: "x".into() }.is_backend_failure());
        assert!(!AuthError::MissingToken.is_backend_failure());
        assert!(!AuthError::MalformedRecord("x".into()).is_backend_failure());
    }

    #[test]
    fn verify_failure_separates_unanswered_from_rejected() {
        assert!(VerifyFailure::from(AuthError::Transport("x".into())).is_backend_failure());
        assert!(VerifyFailure::InvalidResponse("x".into()).is_backend_failure());
        assert!(!VerifyFailure::Expired.is_backend_failure());
        assert!(!VerifyFailure::Rejected("revoked".into()).is_backend_failure());
    }
}

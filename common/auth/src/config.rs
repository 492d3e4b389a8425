use std::time::Duration;

use crate::class::UserClass;

/// Which local key-value namespace a class persists into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageNamespace {
    /// Tab-scoped; gone when the hosting process ends.
    Volatile,
    /// Origin-scoped; survives restarts.
    Durable,
}

/// Per-class storage and backend wiring.
#[derive(Debug, Clone)]
pub struct ClassConfig {
    pub class: UserClass,
    pub namespace: StorageNamespace,
    /// Storage key holding the serialized record.
    pub storage_key: String,
    /// Backend function that validates a stored token.
    pub verify_function: String,
    /// Backend function that exchanges credentials for a token.
    pub login_function: String,
    /// Lifetime given to records whose login response carries no expiry.
    pub default_ttl: Option<Duration>,
}

impl ClassConfig {
    /// Admin sessions live in the tab-scoped store and default to eight hours.
    pub fn admin() -> Self {
        Self {
            class: UserClass::Admin,
            namespace: StorageNamespace::Volatile,
            storage_key: "admin_session".to_string(),
            verify_function: "verify-admin-session".to_string(),
            login_function: "admin-login".to_string(),
            default_ttl: Some(Duration::from_secs(8 * 60 * 60)),
        }
    }

    /// Lawyer fallback tokens live in the durable store with no local expiry.
    pub fn lawyer() -> Self {
        Self {
            class: UserClass::Lawyer,
            namespace: StorageNamespace::Durable,
            storage_key: "lawyer_session".to_string(),
            verify_function: "verify-lawyer-session".to_string(),
            login_function: "lawyer-token-login".to_string(),
            default_ttl: None,
        }
    }

    pub fn with_default_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.default_ttl = ttl;
        self
    }
}

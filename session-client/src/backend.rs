use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common_auth::AuthResult;
use serde_json::Value;

use crate::headers::AuthHeaders;

/// Session held by the backend's own auth mechanism.
#[derive(Debug, Clone, PartialEq)]
pub struct FederatedSession {
    pub access_token: String,
    pub principal_id: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl FederatedSession {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(expires_at) if expires_at <= now)
    }
}

/// Keyed zero-or-one row lookups.
#[async_trait]
pub trait BackendQuery: Send + Sync {
    /// `Ok(None)` means "no row"; `Err` is a transport or query failure.
    async fn select_one(&self, table: &str, column: &str, value: &str) -> AuthResult<Option<Value>>;
}

#[async_trait]
pub trait FunctionInvoker: Send + Sync {
    async fn invoke(&self, function: &str, body: Value, headers: &AuthHeaders) -> AuthResult<Value>;
}

#[async_trait]
pub trait SessionSource: Send + Sync {
    async fn get_session(&self) -> AuthResult<Option<FederatedSession>>;
}

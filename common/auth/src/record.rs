use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{AuthError, AuthResult};

/// Cached profile snapshot for an authenticated principal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
    /// Class-specific flags (`role`, `is_verified`, ...) kept verbatim.
    #[serde(flatten)]
    pub flags: Map<String, Value>,
}

impl Profile {
    pub fn new(id: impl Into<String>, email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            name: name.into(),
            flags: Map::new(),
        }
    }

    pub fn with_flag(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.flags.insert(key.into(), value.into());
        self
    }

    pub fn flag(&self, key: &str) -> Option<&Value> {
        self.flags.get(key)
    }

    /// Lenient conversion from a backend payload.
    pub fn from_value(value: Value) -> AuthResult<Self> {
        let profile: Profile = serde_json::from_value(value)
            .map_err(|err| AuthError::MalformedRecord(err.to_string()))?;
        if profile.id.trim().is_empty() {
            return Err(AuthError::MalformedRecord("profile id is empty".into()));
        }
        Ok(profile)
    }
}

/// Locally persisted token and profile for one user class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthRecord {
    pub token: String,
    pub user: Profile,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl AuthRecord {
    pub fn new(token: impl Into<String>, user: Profile) -> Self {
        Self {
            token: token.into(),
            user,
            expires_at: None,
        }
    }

    pub fn expiring_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// A record without an explicit expiry never expires locally.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(expires_at) if expires_at <= now)
    }

    pub fn to_json(&self) -> AuthResult<String> {
        serde_json::to_string(self).map_err(|err| AuthError::Serialization(err.to_string()))
    }

    pub fn from_json(raw: &str) -> AuthResult<Self> {
        let record: AuthRecord =
            serde_json::from_str(raw).map_err(|err| AuthError::MalformedRecord(err.to_string()))?;
        if record.token.trim().is_empty() {
            return Err(AuthError::MalformedRecord("token is empty".into()));
        }
        Ok(record)
    }
}

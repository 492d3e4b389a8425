use std::collections::BTreeMap;
use std::sync::Arc;

use common_auth::{AuthError, AuthResult, UserClass};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::{debug, warn};

use crate::backend::SessionSource;
use crate::token_store::TokenStore;

pub const AUTHORIZATION: &str = "authorization";

/// Outbound authorization headers, lower-case names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthHeaders(BTreeMap<String, String>);

impl AuthHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn authorization(token: impl Into<String>) -> Self {
        let mut headers = Self::new();
        headers.insert(AUTHORIZATION, token);
        headers
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into().to_ascii_lowercase(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn to_header_map(&self) -> AuthResult<HeaderMap> {
        let mut map = HeaderMap::with_capacity(self.0.len());
        for (name, value) in &self.0 {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|err| AuthError::InvalidResponse(format!("header name '{name}': {err}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|err| AuthError::InvalidResponse(format!("header value: {err}")))?;
            map.insert(name, value);
        }
        Ok(map)
    }
}

/// Derives authorization headers from whichever token is currently valid.
/// Never writes to the token store.
#[derive(Clone)]
pub struct HeaderProducer {
    store: TokenStore,
    federated: Option<Arc<dyn SessionSource>>,
}

impl HeaderProducer {
    pub fn new(store: TokenStore) -> Self {
        Self {
            store,
            federated: None,
        }
    }

    pub fn with_federated(mut self, source: Arc<dyn SessionSource>) -> Self {
        self.federated = Some(source);
        self
    }

    /// Stored, unexpired token for `class`, or nothing.
    pub fn headers(&self, class: UserClass) -> AuthHeaders {
        match self.store.get_active(class) {
            Some(record) => AuthHeaders::authorization(record.token),
            None => AuthHeaders::new(),
        }
    }

    /// Prefers a live federated session token over the stored fallback.
    pub async fn lawyer_headers(&self) -> AuthHeaders {
        if let Some(source) = &self.federated {
            match source.get_session().await {
                Ok(Some(session)) if !session.access_token.is_empty() => {
                    debug!("using federated session token for lawyer headers");
                    return AuthHeaders::authorization(session.access_token);
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(error = %err, "federated session lookup failed; using stored lawyer token");
                }
            }
        }
        self.headers(UserClass::Lawyer)
    }
}

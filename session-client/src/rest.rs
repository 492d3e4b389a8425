//! HTTP collaborator for a hosted backend-as-a-service.
//!
//! Table reads go through `/rest/v1`, function calls through
//! `/functions/v1`, and the federated session through `/auth/v1/token`.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Duration};
use common_auth::{AuthError, AuthResult};
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::backend::{BackendQuery, FederatedSession, FunctionInvoker, SessionSource};
use crate::clock::{Clock, SystemClock};
use crate::headers::AuthHeaders;

#[derive(Clone)]
pub struct RestBackend {
    client: Client,
    base_url: String,
    anon_key: String,
    session: Arc<RwLock<Option<FederatedSession>>>,
    clock: Arc<dyn Clock>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: TokenUser,
}

#[derive(Debug, Deserialize)]
struct TokenUser {
    id: String,
}

impl RestBackend {
    pub fn new(base_url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url, anon_key)
    }

    pub fn with_client(client: Client, base_url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
            session: Arc::new(RwLock::new(None)),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn current(&self) -> Option<FederatedSession> {
        self.session
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn replace(&self, session: Option<FederatedSession>) {
        let mut guard = self
            .session
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = session;
    }

    /// Installs a session obtained out of band (e.g. restored by the host).
    pub fn set_session(&self, session: FederatedSession) {
        self.replace(Some(session));
    }

    pub fn sign_out(&self) {
        self.replace(None);
        debug!("federated session cleared");
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        let bearer = self
            .current()
            .map(|session| session.access_token)
            .unwrap_or_else(|| self.anon_key.clone());
        builder.header("apikey", &self.anon_key).bearer_auth(bearer)
    }

    pub async fn sign_in_with_password(&self, email: &str, password: &str) -> AuthResult<FederatedSession> {
        let url = format!("{}/auth/v1/token?grant_type=password", self.base_url);
        let body = json!({ "email": email, "password": password });
        let session = self.token_grant(&url, body).await?;
        self.replace(Some(session.clone()));
        debug!(principal_id = %session.principal_id, "federated sign-in succeeded");
        Ok(session)
    }

    pub async fn refresh_session(&self) -> AuthResult<FederatedSession> {
        let refresh_token = self
            .current()
            .and_then(|session| session.refresh_token)
            .ok_or(AuthError::MissingToken)?;
        let url = format!("{}/auth/v1/token?grant_type=refresh_token", self.base_url);
        let body = json!({ "refresh_token": refresh_token });
        match self.token_grant(&url, body).await {
            Ok(session) => {
                self.replace(Some(session.clone()));
                Ok(session)
            }
            Err(err) => {
                self.replace(None);
                Err(err)
            }
        }
    }

    async fn token_grant(&self, url: &str, body: Value) -> AuthResult<FederatedSession> {
        let response = self
            .client
            .post(url)
            .header("apikey", &self.anon_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| AuthError::Transport(err.to_string()))?;
        let response = check_status(response, "auth/v1/token").await?;
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|err| AuthError::InvalidResponse(err.to_string()))?;

        let now = self.clock.now();
        let expires_at = match (token.expires_at, token.expires_in) {
            (Some(at), _) => Some(DateTime::from_timestamp(at, 0).ok_or_else(|| {
                AuthError::InvalidResponse(format!("expires_at {at} out of range"))
            })?),
            (None, Some(secs)) => Some(
                Duration::try_seconds(secs)
                    .and_then(|span| now.checked_add_signed(span))
                    .ok_or_else(|| {
                        AuthError::InvalidResponse(format!("expires_in {secs} out of range"))
                    })?,
            ),
            (None, None) => None,
        };

        Ok(FederatedSession {
            access_token: token.access_token,
            principal_id: token.user.id,
            refresh_token: token.refresh_token,
            expires_at,
        })
    }
}

async fn check_status(response: Response, what: &str) -> AuthResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body: Value = response.json().await.unwrap_or(Value::Null);
    let message = ["error", "message", "msg", "error_description"]
        .iter()
        .find_map(|key| body.get(*key).and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP {status} from {what}"));
    Err(AuthError::Function {
        name: what.to_string(),
        message,
    })
}

#[async_trait]
impl BackendQuery for RestBackend {
    async fn select_one(&self, table: &str, column: &str, value: &str) -> AuthResult<Option<Value>> {
        let url = format!(
            "{}/rest/v1/{}?{}=eq.{}&select=*&limit=1",
            self.base_url,
            table,
            urlencoding::encode(column),
            urlencoding::encode(value)
        );
        let response = self
            .authed(self.client.get(&url))
            .send()
            .await
            .map_err(|err| AuthError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AuthError::Query {
                table: table.to_string(),
                message: format!("HTTP {status}: {message}"),
            });
        }

        let rows: Vec<Value> = response.json().await.map_err(|err| AuthError::Query {
            table: table.to_string(),
            message: err.to_string(),
        })?;
        Ok(rows.into_iter().next())
    }
}

#[async_trait]
impl FunctionInvoker for RestBackend {
    async fn invoke(&self, function: &str, body: Value, headers: &AuthHeaders) -> AuthResult<Value> {
        let url = format!("{}/functions/v1/{}", self.base_url, function);
        let extra = headers.to_header_map()?;
        let response = self
            .authed(self.client.post(&url))
            .headers(extra)
            .json(&body)
            .send()
            .await
            .map_err(|err| AuthError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body: Value = response.json().await.unwrap_or(Value::Null);
            let message = body
                .get("error")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("HTTP {status}"));
            return Err(AuthError::Function {
                name: function.to_string(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|err| AuthError::InvalidResponse(err.to_string()))
    }
}

#[async_trait]
impl SessionSource for RestBackend {
    async fn get_session(&self) -> AuthResult<Option<FederatedSession>> {
        let Some(session) = self.current() else {
            return Ok(None);
        };
        if !session.is_expired_at(self.clock.now()) {
            return Ok(Some(session));
        }
        if session.refresh_token.is_none() {
            self.replace(None);
            return Ok(None);
        }
        match self.refresh_session().await {
            Ok(session) => Ok(Some(session)),
            Err(err) => {
                warn!(error = %err, "federated session refresh failed");
                Ok(None)
            }
        }
    }
}

//! Per-class session state machine.
//!
//! `unauthenticated -> verifying -> authenticated | unauthenticated`, with
//! logout and sweep-detected expiry dropping straight to `unauthenticated`.
//! Every transition that invalidates an in-flight check bumps a generation
//! counter; a verification that finishes under an older generation is dropped
//! without touching the store.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use common_auth::{
    AuthError, AuthRecord, AuthResult, FailurePolicy, Profile, UserClass, VerifyFailure,
    VERIFICATION_FAILURE_POLICY,
};
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::backend::{FunctionInvoker, SessionSource};
use crate::clock::Clock;
use crate::headers::AuthHeaders;
use crate::sweeper::ExpiryListener;
use crate::token_store::TokenStore;
use crate::verifier::SessionVerifier;

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Unauthenticated,
    Verifying,
    Authenticated(Profile),
}

impl SessionState {
    pub fn user(&self) -> Option<&Profile> {
        match self {
            SessionState::Authenticated(user) => Some(user),
            _ => None,
        }
    }
}

pub struct ClassSession {
    class: UserClass,
    store: TokenStore,
    verifier: SessionVerifier,
    invoker: Arc<dyn FunctionInvoker>,
    state: watch::Sender<SessionState>,
    generation: AtomicU64,
}

impl ClassSession {
    pub fn new(
        store: TokenStore,
        verifier: SessionVerifier,
        invoker: Arc<dyn FunctionInvoker>,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Unauthenticated);
        Self {
            class: verifier.class(),
            store,
            verifier,
            invoker,
            state,
            generation: AtomicU64::new(0),
        }
    }

    pub fn class(&self) -> UserClass {
        self.class
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn user(&self) -> Option<Profile> {
        self.state.borrow().user().cloned()
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(*self.state.borrow(), SessionState::Authenticated(_))
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    fn transition(&self, next: SessionState) {
        self.state.send_replace(next);
    }

    fn bump(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Re-verifies the stored token. A definitive rejection purges the
    /// record; a backend failure is resolved by `VERIFICATION_FAILURE_POLICY`.
    pub async fn check(&self) -> bool {
        let Some(record) = self.store.get(self.class) else {
            self.transition(SessionState::Unauthenticated);
            return false;
        };

        let generation = self.generation.load(Ordering::SeqCst);
        let previous = self.state.send_replace(SessionState::Verifying);
        let verification = self.verifier.verify(&record).await;

        if self.generation.load(Ordering::SeqCst) != generation {
            debug!(class = %self.class, "discarding stale verification result");
            self.leave_verifying(previous);
            return self.is_authenticated();
        }

        match verification.user {
            Some(user) if verification.valid => {
                let refreshed = AuthRecord {
                    token: record.token,
                    user: user.clone(),
                    expires_at: record.expires_at,
                };
                if let Err(err) = self.store.set(self.class, &refreshed) {
                    warn!(class = %self.class, error = %err, "failed to refresh auth record");
                }
                self.transition(SessionState::Authenticated(user));
                true
            }
            _ if !purges(verification.error.as_ref(), VERIFICATION_FAILURE_POLICY) => {
                warn!(
                    class = %self.class,
                    reason = ?verification.error,
                    "could not confirm stored session; keeping it"
                );
                self.leave_verifying(previous);
                self.is_authenticated()
            }
            _ => {
                info!(
                    class = %self.class,
                    reason = ?verification.error,
                    "stored session rejected; logging out"
                );
                self.purge();
                self.transition(SessionState::Unauthenticated);
                false
            }
        }
    }

    /// Puts back the pre-check state unless something else already replaced
    /// `Verifying`.
    fn leave_verifying(&self, previous: SessionState) {
        self.state.send_if_modified(|state| {
            if *state != SessionState::Verifying {
                return false;
            }
            *state = previous;
            true
        });
    }

    /// Exchanges credentials through the class's login function and stores
    /// the issued token.
    pub async fn login(&self, credentials: Value) -> AuthResult<Profile> {
        let config = self.store.class_config(self.class);
        let data = self
            .invoker
            .invoke(&config.login_function, credentials, &AuthHeaders::new())
            .await?;
        let now = self.store.clock().now();
        let record = record_from_login(data, config.default_ttl, now)?;
        self.adopt(record.clone())?;
        info!(class = %self.class, user_id = %record.user.id, "logged in");
        Ok(record.user)
    }

    /// Persists a record issued elsewhere and marks the class authenticated.
    pub fn adopt(&self, record: AuthRecord) -> AuthResult<()> {
        self.bump();
        self.store.set(self.class, &record)?;
        self.transition(SessionState::Authenticated(record.user));
        Ok(())
    }

    pub fn logout(&self) {
        self.bump();
        self.purge();
        self.transition(SessionState::Unauthenticated);
        info!(class = %self.class, "logged out");
    }

    /// Late results from checks started before this call are ignored.
    pub fn detach(&self) {
        self.bump();
    }

    /// Rewrites the stored record with the live federated token. Returns
    /// false when there is no federated session or no profile to pair it with.
    pub async fn sync_federated(&self, source: &dyn SessionSource) -> bool {
        let session = match source.get_session().await {
            Ok(Some(session)) => session,
            Ok(None) => return false,
            Err(err) => {
                warn!(class = %self.class, error = %err, "federated session lookup failed");
                return false;
            }
        };

        let user = match self.store.get(self.class) {
            Some(record) => record.user,
            None => match self.user() {
                Some(user) => user,
                None => return false,
            },
        };

        let record = AuthRecord {
            token: session.access_token,
            user,
            expires_at: session.expires_at,
        };
        match self.store.set(self.class, &record) {
            Ok(()) => {
                debug!(class = %self.class, "stored federated session token");
                true
            }
            Err(err) => {
                warn!(class = %self.class, error = %err, "failed to store federated token");
                false
            }
        }
    }

    fn purge(&self) {
        if let Err(err) = self.store.clear(self.class) {
            warn!(class = %self.class, error = %err, "failed to purge auth record");
        }
    }
}

impl ExpiryListener for ClassSession {
    fn on_expired(&self, class: UserClass) {
        if class != self.class {
            return;
        }
        self.bump();
        self.transition(SessionState::Unauthenticated);
    }
}

/// Definitive answers always purge; backend failures follow `policy`.
fn purges(failure: Option<&VerifyFailure>, policy: FailurePolicy) -> bool {
    match failure {
        Some(failure) if failure.is_backend_failure() => match policy {
            FailurePolicy::FailClosed => true,
            FailurePolicy::FailOpen => false,
        },
        _ => true,
    }
}

/// Builds a record from `{token|access_token, user, expiresAt|expires_at|expires_in}`.
fn record_from_login(
    data: Value,
    default_ttl: Option<std::time::Duration>,
    now: DateTime<Utc>,
) -> AuthResult<AuthRecord> {
    let object = data
        .as_object()
        .ok_or_else(|| AuthError::InvalidResponse("login response is not an object".into()))?;

    let token = ["token", "access_token"]
        .iter()
        .find_map(|key| object.get(*key).and_then(Value::as_str))
        .filter(|token| !token.trim().is_empty())
        .ok_or(AuthError::MissingToken)?
        .to_string();

    let user = object
        .get("user")
        .cloned()
        .ok_or_else(|| AuthError::InvalidResponse("login response carries no user".into()))
        .and_then(Profile::from_value)?;

    let explicit = ["expiresAt", "expires_at"]
        .iter()
        .find_map(|key| object.get(*key).and_then(Value::as_str));
    let expires_at = if let Some(raw) = explicit {
        let at = DateTime::parse_from_rfc3339(raw)
            .map_err(|err| AuthError::InvalidResponse(format!("expiresAt '{raw}': {err}")))?;
        Some(at.with_timezone(&Utc))
    } else if let Some(secs) = object.get("expires_in").and_then(Value::as_i64) {
        let at = Duration::try_seconds(secs).and_then(|span| now.checked_add_signed(span));
        Some(at.ok_or_else(|| AuthError::InvalidResponse(format!("expires_in {secs} out of range")))?)
    } else if let Some(ttl) = default_ttl {
        let at = Duration::from_std(ttl)
            .ok()
            .and_then(|span| now.checked_add_signed(span));
        Some(at.ok_or_else(|| {
            AuthError::InvalidResponse(format!("default ttl {}s out of range", ttl.as_secs()))
        })?)
    } else {
        None
    };

    Ok(AuthRecord {
        token,
        user,
        expires_at,
    })
}

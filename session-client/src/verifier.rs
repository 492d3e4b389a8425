use std::sync::Arc;

use common_auth::{AuthError, AuthRecord, ClassConfig, Profile, UserClass, VerifyFailure};
use common_observability::SessionMetrics;
use serde_json::{json, Value};
use tracing::debug;

use crate::backend::FunctionInvoker;
use crate::clock::{Clock, SystemClock};
use crate::headers::AuthHeaders;

/// Normalized outcome of a server-side token check.
#[derive(Debug, Clone, PartialEq)]
pub struct Verification {
    pub valid: bool,
    pub user: Option<Profile>,
    pub error: Option<VerifyFailure>,
}

impl Verification {
    pub fn valid(user: Profile) -> Self {
        Self {
            valid: true,
            user: Some(user),
            error: None,
        }
    }

    pub fn invalid(reason: VerifyFailure) -> Self {
        Self {
            valid: false,
            user: None,
            error: Some(reason),
        }
    }

    pub fn outcome(&self) -> &'static str {
        match &self.error {
            None if self.valid => "valid",
            None => "invalid",
            Some(reason) => reason.as_str(),
        }
    }
}

/// Validates a locally stored token against the class's backend endpoint.
/// Every failure mode yields `valid == false`.
#[derive(Clone)]
pub struct SessionVerifier {
    class: UserClass,
    function: String,
    invoker: Arc<dyn FunctionInvoker>,
    clock: Arc<dyn Clock>,
    metrics: Option<Arc<SessionMetrics>>,
}

impl SessionVerifier {
    pub fn new(config: &ClassConfig, invoker: Arc<dyn FunctionInvoker>) -> Self {
        Self {
            class: config.class,
            function: config.verify_function.clone(),
            invoker,
            clock: Arc::new(SystemClock),
            metrics: None,
        }
    }

    pub fn admin(invoker: Arc<dyn FunctionInvoker>) -> Self {
        Self::new(&ClassConfig::admin(), invoker)
    }

    pub fn lawyer(invoker: Arc<dyn FunctionInvoker>) -> Self {
        Self::new(&ClassConfig::lawyer(), invoker)
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<SessionMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn class(&self) -> UserClass {
        self.class
    }

    /// Local expiry short-circuits; otherwise the backend decides.
    pub async fn verify(&self, record: &AuthRecord) -> Verification {
        let verification = if record.is_expired_at(self.clock.now()) {
            Verification::invalid(VerifyFailure::Expired)
        } else {
            self.call(&record.token).await
        };
        self.record(&verification);
        verification
    }

    pub async fn verify_token(&self, token: &str) -> Verification {
        let verification = self.call(token).await;
        self.record(&verification);
        verification
    }

    async fn call(&self, token: &str) -> Verification {
        if token.trim().is_empty() {
            return Verification::invalid(VerifyFailure::MissingToken);
        }

        let body = json!({ "token": token });
        let headers = AuthHeaders::authorization(token);
        match self.invoker.invoke(&self.function, body, &headers).await {
            Ok(data) => interpret(data),
            Err(AuthError::Function { message, .. }) if is_expiry_message(&message) => {
                Verification::invalid(VerifyFailure::Expired)
            }
            Err(err) => Verification::invalid(err.into()),
        }
    }

    fn record(&self, verification: &Verification) {
        debug!(class = %self.class, outcome = verification.outcome(), "verified stored token");
        if let Some(metrics) = &self.metrics {
            metrics.verification(self.class.as_str(), verification.outcome());
        }
    }
}

fn is_expiry_message(message: &str) -> bool {
    message.to_ascii_lowercase().contains("expired")
}

/// Accepts `{valid, user}` or `{success, user}`; `expired: true` or an
/// `"expired"` error code marks expiry.
fn interpret(data: Value) -> Verification {
    let Some(object) = data.as_object() else {
        return Verification::invalid(VerifyFailure::InvalidResponse(
            "verification response is not an object".into(),
        ));
    };

    let flag = |key: &str| object.get(key).and_then(Value::as_bool).unwrap_or(false);
    let error = object.get("error").and_then(Value::as_str);

    if flag("expired") || error.is_some_and(is_expiry_message) {
        return Verification::invalid(VerifyFailure::Expired);
    }

    if !(flag("valid") || flag("success")) {
        let reason = error.unwrap_or("token rejected").to_string();
        return Verification::invalid(VerifyFailure::Rejected(reason));
    }

    match object.get("user").cloned().map(Profile::from_value) {
        Some(Ok(user)) => Verification::valid(user),
        Some(Err(err)) => Verification::invalid(VerifyFailure::InvalidResponse(err.to_string())),
        None => Verification::invalid(VerifyFailure::InvalidResponse(
            "verification response carries no user".into(),
        )),
    }
}

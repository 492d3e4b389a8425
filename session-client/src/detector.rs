use std::sync::{Arc, Mutex};

use common_auth::{
    AuthError, FailurePolicy, UserType, DETECTION_FAILURE_FALLBACK, DETECTION_FAILURE_POLICY,
};
use common_observability::SessionMetrics;
use tracing::{debug, warn};

use crate::backend::{BackendQuery, SessionSource};

/// Backend tables probed to classify a principal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileTables {
    pub lawyer_table: String,
    pub user_table: String,
    pub key_column: String,
}

impl Default for ProfileTables {
    fn default() -> Self {
        Self {
            lawyer_table: "lawyer_profiles".to_string(),
            user_table: "profiles".to_string(),
            key_column: "id".to_string(),
        }
    }
}

/// Classifies the backend-authenticated principal: lawyer profile first,
/// then user profile, otherwise guest.
#[derive(Clone)]
pub struct AuthTypeDetector {
    query: Arc<dyn BackendQuery>,
    session: Arc<dyn SessionSource>,
    tables: ProfileTables,
    metrics: Option<Arc<SessionMetrics>>,
}

impl AuthTypeDetector {
    pub fn new(query: Arc<dyn BackendQuery>, session: Arc<dyn SessionSource>) -> Self {
        Self {
            query,
            session,
            tables: ProfileTables::default(),
            metrics: None,
        }
    }

    pub fn with_tables(mut self, tables: ProfileTables) -> Self {
        self.tables = tables;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<SessionMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Current principal id, if the backend holds a session. A failed lookup
    /// is indistinguishable from "signed out".
    pub async fn principal(&self) -> Option<String> {
        match self.session.get_session().await {
            Ok(session) => session.map(|session| session.principal_id),
            Err(err) => {
                warn!(error = %err, "backend session lookup failed; treating as signed out");
                None
            }
        }
    }

    pub async fn detect(&self) -> UserType {
        let principal = self.principal().await;
        self.classify(principal.as_deref()).await
    }

    pub async fn classify(&self, principal: Option<&str>) -> UserType {
        let user_type = match principal {
            None => UserType::Guest,
            Some(id) => self.probe(id).await,
        };
        if let Some(metrics) = &self.metrics {
            metrics.detection(user_type.as_str());
        }
        user_type
    }

    async fn probe(&self, principal_id: &str) -> UserType {
        match self.has_row(&self.tables.lawyer_table, principal_id).await {
            Ok(true) => return UserType::Lawyer,
            Ok(false) => {}
            Err(err) => return fallback(principal_id, &err),
        }

        match self.has_row(&self.tables.user_table, principal_id).await {
            Ok(true) => UserType::User,
            Ok(false) => {
                debug!(principal_id, "no profile rows for principal");
                UserType::Guest
            }
            Err(err) => fallback(principal_id, &err),
        }
    }

    async fn has_row(&self, table: &str, principal_id: &str) -> Result<bool, AuthError> {
        self.query
            .select_one(table, &self.tables.key_column, principal_id)
            .await
            .map(|row| row.is_some())
    }
}

fn fallback(principal_id: &str, err: &AuthError) -> UserType {
    let user_type = probe_failure_result(err, DETECTION_FAILURE_POLICY);
    warn!(
        principal_id,
        error = %err,
        fallback = %user_type,
        "profile probe failed"
    );
    user_type
}

/// Backend failures resolve through `policy`; any other error means the
/// principal cannot be classified.
fn probe_failure_result(err: &AuthError, policy: FailurePolicy) -> UserType {
    if !err.is_backend_failure() {
        return UserType::Guest;
    }
    match policy {
        FailurePolicy::FailOpen => DETECTION_FAILURE_FALLBACK,
        FailurePolicy::FailClosed => UserType::Guest,
    }
}

/// Re-runs detection only when the backend principal changes.
pub struct UserTypeTracker {
    detector: AuthTypeDetector,
    last: Mutex<Option<(Option<String>, UserType)>>,
}

impl UserTypeTracker {
    pub fn new(detector: AuthTypeDetector) -> Self {
        Self {
            detector,
            last: Mutex::new(None),
        }
    }

    pub async fn current(&self) -> UserType {
        let principal = self.detector.principal().await;
        if let Some((seen, user_type)) = self.cached() {
            if seen == principal {
                return user_type;
            }
        }

        let user_type = self.detector.classify(principal.as_deref()).await;
        let mut guard = self.last.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Some((principal, user_type));
        user_type
    }

    pub fn invalidate(&self) {
        let mut guard = self.last.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = None;
    }

    fn cached(&self) -> Option<(Option<String>, UserType)> {
        self.last
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query_error() -> AuthError {
        AuthError::Query {
            table: "lawyer_profiles".into(),
            message: "connection reset".into(),
        }
    }

    #[test]
    fn backend_failure_resolves_through_policy() {
        assert_eq!(
            probe_failure_result(&query_error(), FailurePolicy::FailOpen),
            DETECTION_FAILURE_FALLBACK
        );
        assert_eq!(
            probe_failure_result(&query_error(), FailurePolicy::FailClosed),
            UserType::Guest
        );
        assert_eq!(
            probe_failure_result(&query_error(), DETECTION_FAILURE_POLICY),
            UserType::User
        );
    }

    #[test]
    fn non_backend_error_is_guest_under_either_policy() {
        assert_eq!(
            probe_failure_result(&AuthError::MissingToken, FailurePolicy::FailOpen),
            UserType::Guest
        );
    }
}

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use common_auth::{AuthError, AuthRecord, AuthResult, Profile};
use serde_json::Value;
use session_client::backend::{BackendQuery, FederatedSession, FunctionInvoker, SessionSource};
use session_client::clock::ManualClock;
use session_client::storage::MemoryStorage;
use session_client::{AuthHeaders, TokenStore};
use tokio::sync::oneshot;

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 4, 14, 9, 0, 0).unwrap()
}

pub fn profile(id: &str) -> Profile {
    Profile::new(id, format!("{id}@example.com"), format!("User {id}"))
}

pub fn record(token: &str) -> AuthRecord {
    AuthRecord::new(token, profile("u-1"))
}

pub struct StoreFixture {
    pub store: TokenStore,
    pub volatile: Arc<MemoryStorage>,
    pub durable: Arc<MemoryStorage>,
    pub clock: ManualClock,
}

pub fn store_fixture() -> StoreFixture {
    let clock = ManualClock::new(t0());
    let volatile = Arc::new(MemoryStorage::new());
    let durable = Arc::new(MemoryStorage::new());
    let store =
        TokenStore::new(volatile.clone(), durable.clone()).with_clock(Arc::new(clock.clone()));
    StoreFixture {
        store,
        volatile,
        durable,
        clock,
    }
}

#[derive(Debug, Clone)]
pub struct InvokeCall {
    pub function: String,
    pub body: Value,
    pub headers: AuthHeaders,
}

/// In-process stand-in for the hosted backend.
#[derive(Default)]
pub struct FakeBackend {
    rows: Mutex<HashMap<String, HashSet<String>>>,
    failing_tables: Mutex<HashSet<String>>,
    session: Mutex<Option<FederatedSession>>,
    session_error: Mutex<bool>,
    responses: Mutex<HashMap<String, AuthResult<Value>>>,
    calls: Mutex<Vec<InvokeCall>>,
    queries: Mutex<Vec<String>>,
    gate: Mutex<Option<oneshot::Receiver<()>>>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_row(&self, table: &str, id: &str) {
        self.rows
            .lock()
            .unwrap()
            .entry(table.to_string())
            .or_default()
            .insert(id.to_string());
    }

    pub fn fail_table(&self, table: &str) {
        self.failing_tables.lock().unwrap().insert(table.to_string());
    }

    pub fn set_session(&self, principal_id: &str, access_token: &str) {
        *self.session.lock().unwrap() = Some(FederatedSession {
            access_token: access_token.to_string(),
            principal_id: principal_id.to_string(),
            refresh_token: None,
            expires_at: None,
        });
    }

    pub fn set_federated(&self, session: FederatedSession) {
        *self.session.lock().unwrap() = Some(session);
    }

    pub fn clear_session(&self) {
        *self.session.lock().unwrap() = None;
    }

    pub fn fail_session_lookup(&self) {
        *self.session_error.lock().unwrap() = true;
    }

    pub fn respond(&self, function: &str, response: AuthResult<Value>) {
        self.responses
            .lock()
            .unwrap()
            .insert(function.to_string(), response);
    }

    /// The next invoke waits until the returned sender fires.
    pub fn hold_next_invoke(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.gate.lock().unwrap() = Some(rx);
        tx
    }

    pub fn calls(&self) -> Vec<InvokeCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl BackendQuery for FakeBackend {
    async fn select_one(&self, table: &str, column: &str, value: &str) -> AuthResult<Option<Value>> {
        self.queries.lock().unwrap().push(table.to_string());
        if self.failing_tables.lock().unwrap().contains(table) {
            return Err(AuthError::Query {
                table: table.to_string(),
                message: "connection reset".into(),
            });
        }
        let found = self
            .rows
            .lock()
            .unwrap()
            .get(table)
            .is_some_and(|ids| ids.contains(value));
        Ok(found.then(|| serde_json::json!({ column: value })))
    }
}

#[async_trait]
impl FunctionInvoker for FakeBackend {
    async fn invoke(&self, function: &str, body: Value, headers: &AuthHeaders) -> AuthResult<Value> {
        self.calls.lock().unwrap().push(InvokeCall {
            function: function.to_string(),
            body,
            headers: headers.clone(),
        });
        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        self.responses
            .lock()
            .unwrap()
            .get(function)
            .cloned()
            .unwrap_or_else(|| Err(AuthError::Transport(format!("no route for {function}"))))
    }
}

#[async_trait]
impl SessionSource for FakeBackend {
    async fn get_session(&self) -> AuthResult<Option<FederatedSession>> {
        if *self.session_error.lock().unwrap() {
            return Err(AuthError::Transport("auth endpoint down".into()));
        }
        Ok(self.session.lock().unwrap().clone())
    }
}

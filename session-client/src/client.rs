use std::sync::Arc;

use anyhow::{Context, Result};
use common_auth::{UserClass, UserType};
use common_observability::SessionMetrics;
use reqwest::Client;
use serde::Serialize;
use tracing::info;

use crate::backend::{BackendQuery, FunctionInvoker, SessionSource};
use crate::clock::{Clock, SystemClock};
use crate::config::ClientConfig;
use crate::detector::{AuthTypeDetector, UserTypeTracker};
use crate::headers::{AuthHeaders, HeaderProducer};
use crate::notifications::{FanoutNotifier, Notifier, TracingNotifier, WebhookNotifier};
use crate::rest::RestBackend;
use crate::session::ClassSession;
use crate::storage::{FileStorage, KeyValueStorage, MemoryStorage};
use crate::sweeper::{ExpirySweeper, SweepReport, SweeperHandle};
use crate::token_store::TokenStore;
use crate::verifier::SessionVerifier;

/// Everything the core needs from the hosted backend.
pub trait Backend: BackendQuery + FunctionInvoker + SessionSource {}

impl<T: BackendQuery + FunctionInvoker + SessionSource> Backend for T {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub admin: bool,
    pub lawyer: bool,
    pub user_type: UserType,
}

/// Environment-facing collaborators, swappable for tests and other hosts.
pub struct ClientParts {
    pub volatile: Arc<dyn KeyValueStorage>,
    pub durable: Arc<dyn KeyValueStorage>,
    pub notifier: Arc<dyn Notifier>,
    pub clock: Arc<dyn Clock>,
}

impl ClientParts {
    pub fn in_memory(notifier: Arc<dyn Notifier>, clock: Arc<dyn Clock>) -> Self {
        Self {
            volatile: Arc::new(MemoryStorage::new()),
            durable: Arc::new(MemoryStorage::new()),
            notifier,
            clock,
        }
    }
}

pub struct SessionClient {
    config: ClientConfig,
    store: TokenStore,
    admin: Arc<ClassSession>,
    lawyer: Arc<ClassSession>,
    federated: Arc<dyn SessionSource>,
    tracker: UserTypeTracker,
    headers: HeaderProducer,
    sweeper: Arc<ExpirySweeper>,
    metrics: Option<Arc<SessionMetrics>>,
    rest: Option<Arc<RestBackend>>,
}

impl SessionClient {
    /// Wires the REST backend and the storage backends the config selects.
    pub fn from_config(config: ClientConfig) -> Result<Self> {
        let http = Client::builder()
            .build()
            .context("Failed to build HTTP client")?;
        let rest = Arc::new(RestBackend::with_client(
            http.clone(),
            config.backend_url.clone(),
            config.anon_key.clone(),
        ));

        let durable: Arc<dyn KeyValueStorage> = match &config.storage_dir {
            Some(dir) => Arc::new(
                FileStorage::in_dir(dir, "durable")
                    .with_context(|| format!("Failed to open storage dir {}", dir.display()))?,
            ),
            None => Arc::new(MemoryStorage::new()),
        };

        let mut notifier = FanoutNotifier::new().with(Arc::new(TracingNotifier));
        if let Some(url) = &config.expiry_webhook_url {
            notifier = notifier.with(Arc::new(WebhookNotifier::new(
                http,
                url.clone(),
                config.expiry_webhook_bearer.clone(),
            )));
        }

        let parts = ClientParts {
            volatile: Arc::new(MemoryStorage::new()),
            durable,
            notifier: Arc::new(notifier),
            clock: Arc::new(SystemClock),
        };

        let mut client = Self::with_backend(config, rest.clone(), parts)?;
        client.rest = Some(rest);
        Ok(client)
    }

    pub fn with_backend<B>(config: ClientConfig, backend: Arc<B>, parts: ClientParts) -> Result<Self>
    where
        B: Backend + 'static,
    {
        let metrics = if config.metrics_enabled {
            Some(Arc::new(
                SessionMetrics::new().context("Failed to register session metrics")?,
            ))
        } else {
            None
        };

        let query: Arc<dyn BackendQuery> = backend.clone();
        let invoker: Arc<dyn FunctionInvoker> = backend.clone();
        let federated: Arc<dyn SessionSource> = backend;

        let store = TokenStore::new(parts.volatile, parts.durable)
            .with_class_config(config.admin.clone())
            .with_class_config(config.lawyer.clone())
            .with_clock(parts.clock.clone());

        let session_for = |class: UserClass| {
            let mut verifier = SessionVerifier::new(store.class_config(class), invoker.clone())
                .with_clock(parts.clock.clone());
            if let Some(metrics) = &metrics {
                verifier = verifier.with_metrics(metrics.clone());
            }
            Arc::new(ClassSession::new(store.clone(), verifier, invoker.clone()))
        };
        let admin = session_for(UserClass::Admin);
        let lawyer = session_for(UserClass::Lawyer);

        let mut detector = AuthTypeDetector::new(query, federated.clone())
            .with_tables(config.profile_tables.clone());
        let mut sweeper = ExpirySweeper::new(store.clone(), parts.notifier)
            .with_listener(admin.clone())
            .with_listener(lawyer.clone());
        if let Some(metrics) = &metrics {
            detector = detector.with_metrics(metrics.clone());
            sweeper = sweeper.with_metrics(metrics.clone());
        }

        let headers = HeaderProducer::new(store.clone()).with_federated(federated.clone());

        Ok(Self {
            config,
            store,
            admin,
            lawyer,
            federated,
            tracker: UserTypeTracker::new(detector),
            headers,
            sweeper: Arc::new(sweeper),
            metrics,
            rest: None,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    pub fn admin(&self) -> &Arc<ClassSession> {
        &self.admin
    }

    pub fn lawyer(&self) -> &Arc<ClassSession> {
        &self.lawyer
    }

    pub fn session(&self, class: UserClass) -> &Arc<ClassSession> {
        match class {
            UserClass::Admin => &self.admin,
            UserClass::Lawyer => &self.lawyer,
        }
    }

    pub fn metrics(&self) -> Option<&Arc<SessionMetrics>> {
        self.metrics.as_ref()
    }

    /// Present only for clients built by `from_config`.
    pub fn rest_backend(&self) -> Option<&Arc<RestBackend>> {
        self.rest.as_ref()
    }

    pub fn headers(&self, class: UserClass) -> AuthHeaders {
        self.headers.headers(class)
    }

    pub async fn lawyer_headers(&self) -> AuthHeaders {
        self.headers.lawyer_headers().await
    }

    pub async fn user_type(&self) -> UserType {
        self.tracker.current().await
    }

    pub async fn status(&self) -> SessionStatus {
        let active = self.store.list_active();
        SessionStatus {
            admin: active.is_active(UserClass::Admin),
            lawyer: active.is_active(UserClass::Lawyer),
            user_type: self.user_type().await,
        }
    }

    /// Mount-time pass: pick up a live federated lawyer token, then verify
    /// every stored record with the backend.
    pub async fn verify_stored_sessions(&self) -> SessionStatus {
        self.lawyer.sync_federated(self.federated.as_ref()).await;
        self.admin.check().await;
        self.lawyer.check().await;
        self.status().await
    }

    pub fn sweep(&self) -> SweepReport {
        self.sweeper.sweep()
    }

    pub fn start_sweeper(&self) -> SweeperHandle {
        info!(interval_secs = self.config.sweep_interval.as_secs(), "starting session sweeper");
        self.sweeper.clone().start(self.config.sweep_interval)
    }
}

//! Periodic eviction of expired auth records.
//!
//! A sweep diffs `list_active()` around `cleanup_expired_tokens()` so that a
//! class going from present to absent produces exactly one "session expired"
//! notification. The loop runs as an owned tokio task: `start` at init,
//! `stop`/`shutdown` at teardown.

use std::sync::Arc;
use std::time::{Duration, Instant};

use common_auth::UserClass;
use common_observability::SessionMetrics;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::notifications::{Notification, Notifier};
use crate::token_store::TokenStore;

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Observer told when a sweep detects passive expiry for a class.
pub trait ExpiryListener: Send + Sync {
    fn on_expired(&self, class: UserClass);
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Records the cleanup pass removed.
    pub evicted: Vec<UserClass>,
    /// Classes that went from active to inactive; one notification each.
    pub expired: Vec<UserClass>,
}

pub struct ExpirySweeper {
    store: TokenStore,
    notifier: Arc<dyn Notifier>,
    listeners: Vec<Arc<dyn ExpiryListener>>,
    metrics: Option<Arc<SessionMetrics>>,
}

impl ExpirySweeper {
    pub fn new(store: TokenStore, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store,
            notifier,
            listeners: Vec::new(),
            metrics: None,
        }
    }

    pub fn with_listener(mut self, listener: Arc<dyn ExpiryListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<SessionMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn sweep(&self) -> SweepReport {
        let start = Instant::now();
        let before = self.store.list_active();
        let evicted = self.store.cleanup_expired_tokens();
        let after = self.store.list_active();
        let expired = before.lost_in(&after);

        for class in &expired {
            info!(%class, "session expired");
            self.notifier.notify(Notification::session_expired(*class));
            for listener in &self.listeners {
                listener.on_expired(*class);
            }
        }

        if let Some(metrics) = &self.metrics {
            for class in &evicted {
                metrics.evicted(class.as_str());
            }
            for class in &expired {
                metrics.expiry_notified(class.as_str());
            }
            metrics.sweep_completed(start.elapsed().as_secs_f64());
        }

        debug!(evicted = evicted.len(), expired = expired.len(), "expiry sweep finished");
        SweepReport { evicted, expired }
    }

    /// Spawns the interval loop. The first sweep runs immediately.
    pub fn start(self: Arc<Self>, every: Duration) -> SweeperHandle {
        let every = every.max(Duration::from_secs(1));
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let sweeper = self.clone();

        let task = tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        sweeper.sweep();
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("expiry sweeper stopped");
        });

        info!(interval_secs = every.as_secs(), "expiry sweeper started");
        SweeperHandle {
            sweeper: self,
            stop: stop_tx,
            task: Some(task),
        }
    }
}

/// Owns the running sweep loop; dropping it aborts the task.
pub struct SweeperHandle {
    sweeper: Arc<ExpirySweeper>,
    stop: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    pub async fn stop(&mut self) {
        let _ = self.stop.send(true);
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                warn!(error = %err, "expiry sweeper task ended abnormally");
            }
        }
    }

    /// Stops the loop and runs one last best-effort sweep.
    pub async fn shutdown(mut self) -> SweepReport {
        self.stop().await;
        self.sweeper.sweep()
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

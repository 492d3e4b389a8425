use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use common_auth::UserClass;
use reqwest::Client;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub id: Uuid,
    pub title: String,
    pub message: String,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<UserClass>,
    pub occurred_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(title: impl Into<String>, message: impl Into<String>, severity: Severity) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            message: message.into(),
            severity,
            class: None,
            occurred_at: Utc::now(),
        }
    }

    pub fn session_expired(class: UserClass) -> Self {
        let mut notification = Self::new(
            "Session expired",
            format!("Your {class} session has expired. Please sign in again."),
            Severity::Warning,
        );
        notification.class = Some(class);
        notification
    }
}

/// Fire-and-forget sink for user-visible messages.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: Notification) {
        info!(
            id = %notification.id,
            title = %notification.title,
            severity = ?notification.severity,
            class = ?notification.class,
            "{}",
            notification.message
        );
    }
}

/// Posts notifications as JSON to a webhook on the current tokio runtime.
#[derive(Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: String,
    bearer: Option<String>,
}

impl WebhookNotifier {
    pub fn new(client: Client, url: impl Into<String>, bearer: Option<String>) -> Self {
        Self {
            client,
            url: url.into(),
            bearer,
        }
    }

    pub async fn post(&self, notification: &Notification) -> Result<()> {
        post_notification_webhook(&self.client, &self.url, self.bearer.as_deref(), notification)
            .await
    }
}

impl Notifier for WebhookNotifier {
    fn notify(&self, notification: Notification) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(id = %notification.id, "no runtime available to deliver webhook notification");
            return;
        };
        let notifier = self.clone();
        handle.spawn(async move {
            if let Err(err) = notifier.post(&notification).await {
                warn!(?err, id = %notification.id, url = %notifier.url, "Failed to post notification webhook");
            }
        });
    }
}

pub async fn post_notification_webhook(
    client: &Client,
    url: &str,
    bearer: Option<&str>,
    notification: &Notification,
) -> Result<()> {
    let mut request = client.post(url).json(notification);
    if let Some(token) = bearer {
        request = request.bearer_auth(token);
    }
    let response = request.send().await?;
    if !response.status().is_success() {
        return Err(anyhow!(
            "Notification webhook returned status {}",
            response.status()
        ));
    }
    Ok(())
}

/// Delivers each notification to every inner notifier.
#[derive(Clone, Default)]
pub struct FanoutNotifier {
    targets: Vec<Arc<dyn Notifier>>,
}

impl FanoutNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.targets.push(notifier);
        self
    }
}

impl Notifier for FanoutNotifier {
    fn notify(&self, notification: Notification) {
        for target in &self.targets {
            target.notify(notification.clone());
        }
    }
}

/// Keeps every notification in memory; useful for hosts that poll.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    seen: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<Notification> {
        let mut guard = self.seen.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::take(&mut *guard)
    }

    pub fn count_for(&self, class: UserClass) -> usize {
        let guard = self.seen.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.iter().filter(|n| n.class == Some(class)).count()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        let mut guard = self.seen.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.push(notification);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[test]
    fn session_expired_names_the_class() {
        let notification = Notification::session_expired(UserClass::Admin);
        assert_eq!(notification.title, "Session expired");
        assert!(notification.message.contains("admin"));
        assert_eq!(notification.severity, Severity::Warning);
        assert_eq!(notification.class, Some(UserClass::Admin));
    }

    #[test]
    fn fanout_reaches_every_target() {
        let first = Arc::new(RecordingNotifier::new());
        let second = Arc::new(RecordingNotifier::new());
        let fanout = FanoutNotifier::new()
            .with(first.clone())
            .with(second.clone());
        fanout.notify(Notification::session_expired(UserClass::Lawyer));
        assert_eq!(first.count_for(UserClass::Lawyer), 1);
        assert_eq!(second.take().len(), 1);
    }

    #[tokio::test]
    async fn webhook_posts_json_with_bearer() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/hooks/session")
                    .header("authorization", "Bearer hook-secret")
                    .json_body_partial(r#"{"title":"Session expired","severity":"warning","class":"admin"}"#);
                then.status(204);
            })
            .await;

        let notifier = WebhookNotifier::new(
            Client::new(),
            server.url("/hooks/session"),
            Some("hook-secret".into()),
        );
        notifier
            .post(&Notification::session_expired(UserClass::Admin))
            .await
            .expect("webhook accepted");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn webhook_reports_non_success_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/hooks/session");
                then.status(500);
            })
            .await;

        let notifier = WebhookNotifier::new(Client::new(), server.url("/hooks/session"), None);
        let err = notifier
            .post(&Notification::session_expired(UserClass::Lawyer))
            .await
            .expect_err("500 is a failure");
        assert!(err.to_string().contains("500"));
    }
}

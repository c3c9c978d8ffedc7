use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::models::{Match, MatchId, MatchNotification, NotificationKind, UserId};

/// Errors that can occur when handing a notification to the transport
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("Transport rejected notification with status {status}")]
    Rejected { status: u16 },

    #[error("Delivery timed out after {0:?}")]
    TimedOut(Duration),
}

/// Messaging transport boundary
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, notification: &MatchNotification) -> Result<(), NotifyError>;
}

/// Posts each notification as JSON to the messaging gateway
pub struct WebhookNotifier {
    client: Client,
    endpoint: String,
    auth_token: Option<String>,
}

impl WebhookNotifier {
    pub fn new(endpoint: String, auth_token: Option<String>, timeout: Duration) -> Result<Self, NotifyError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            endpoint,
            auth_token,
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn deliver(&self, notification: &MatchNotification) -> Result<(), NotifyError> {
        let mut request = self.client.post(&self.endpoint).json(notification);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
            });
        }

        tracing::debug!(
            "Delivered {:?} notification {} to user {}",
            notification.kind,
            notification.event_id,
            notification.recipient_id
        );
        Ok(())
    }
}

/// Development transport: notifications only reach the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver(&self, notification: &MatchNotification) -> Result<(), NotifyError> {
        tracing::info!(
            event_id = %notification.event_id,
            recipient_id = notification.recipient_id,
            kind = ?notification.kind,
            match_id = ?notification.match_id,
            "Notification"
        );
        Ok(())
    }
}

/// Fire-and-forget front of the transport
///
/// Failures are logged per recipient and never reach the caller; one
/// participant's failed delivery does not affect the other's.
#[derive(Clone)]
pub struct NotificationDispatcher {
    notifier: Arc<dyn Notifier>,
    timeout: Duration,
}

impl NotificationDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>, timeout: Duration) -> Self {
        Self { notifier, timeout }
    }

    /// Deliver one notification; returns whether it went through
    pub async fn dispatch(&self, notification: MatchNotification) -> bool {
        let result = match tokio::time::timeout(self.timeout, self.notifier.deliver(&notification)).await {
            Ok(result) => result,
            Err(_) => Err(NotifyError::TimedOut(self.timeout)),
        };

        match result {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    "Failed to notify user {} ({:?}): {}",
                    notification.recipient_id,
                    notification.kind,
                    e
                );
                false
            }
        }
    }

    /// One `MatchFound` per participant, delivered concurrently
    pub async fn match_found(&self, record: &Match) -> usize {
        let [first, second] = record.participants();
        let (a, b) = tokio::join!(
            self.dispatch(MatchNotification::new(first, NotificationKind::MatchFound, Some(record.match_id))),
            self.dispatch(MatchNotification::new(second, NotificationKind::MatchFound, Some(record.match_id))),
        );
        usize::from(a) + usize::from(b)
    }

    /// Hand both `MatchFound` deliveries to a background task
    pub fn spawn_match_found(&self, record: Match) -> JoinHandle<usize> {
        let dispatcher = self.clone();
        tokio::spawn(async move { dispatcher.match_found(&record).await })
    }

    /// Tell the remaining participant their chat is over
    pub async fn partner_left(&self, recipient_id: UserId, kind: NotificationKind, match_id: MatchId) -> bool {
        self.dispatch(MatchNotification::new(recipient_id, kind, Some(match_id)))
            .await
    }
}

impl Default for NotificationDispatcher {
    fn default() -> Self {
        Self::new(Arc::new(LogNotifier), Duration::from_secs(5))
    }
}

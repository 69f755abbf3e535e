use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::UserId;

pub const MATCH_NOTIFICATION_TYPE: &str = "MATCH";

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("Notification service returned status {0}")]
    ApiError(u16),
}

/// Notification request understood by the notification service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub user_id: UserId,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl Notification {
    /// "You matched" notice for `receiver`, naming the other user
    pub fn matched(receiver: UserId, counterpart_name: &str) -> Self {
        Self {
            user_id: receiver,
            title: "New pet mate match!".to_string(),
            message: format!(
                "You matched with {}. Start chatting now!",
                counterpart_name
            ),
            kind: MATCH_NOTIFICATION_TYPE.to_string(),
        }
    }
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Posts to `{base}/api/notifications/send`
pub struct HttpNotificationSink {
    base_url: String,
    client: Client,
}

impl HttpNotificationSink {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, NotifyError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into(),
            client,
        })
    }
}

#[async_trait]
impl NotificationSink for HttpNotificationSink {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let url = format!(
            "{}/api/notifications/send",
            self.base_url.trim_end_matches('/')
        );

        let response = self.client.post(&url).json(notification).send().await?;
        if !response.status().is_success() {
            return Err(NotifyError::ApiError(response.status().as_u16()));
        }
        Ok(())
    }
}

/// Drops every notification
pub struct NoopNotificationSink;

#[async_trait]
impl NotificationSink for NoopNotificationSink {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        tracing::debug!(user_id = notification.user_id, "notification sink disabled, dropping");
        Ok(())
    }
}

/// Fire-and-forget delivery; failures are logged and swallowed
pub fn send_detached(sink: Arc<dyn NotificationSink>, notification: Notification) {
    tokio::spawn(async move {
        if let Err(e) = sink.send(&notification).await {
            tracing::warn!(
                user_id = notification.user_id,
                kind = %notification.kind,
                error = %e,
                "failed to send notification"
            );
        }
    });
}

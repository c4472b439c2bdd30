use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

impl Notification {
    pub fn new(
        recipient: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            recipient: recipient.into(),
            subject: subject.into(),
            body: body.into(),
        }
    }
}

/// Delivery transport for notifications (mail, SMS, push...).
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn send(&self, notification: Notification) -> anyhow::Result<()>;
}

/// Keeps every notification it is handed.
#[derive(Default)]
pub struct InMemoryOutbox {
    sent: RwLock<Vec<Notification>>,
}

impl InMemoryOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<Notification> {
        self.sent.read().await.clone()
    }

    pub async fn sent_to(&self, recipient: &str) -> Vec<Notification> {
        let sent = self.sent.read().await;
        sent.iter()
            .filter(|notification| notification.recipient == recipient)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl NotificationChannel for InMemoryOutbox {
    async fn send(&self, notification: Notification) -> anyhow::Result<()> {
        self.sent.write().await.push(notification);
        Ok(())
    }
}

/// Writes notifications to the log instead of delivering them.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingChannel;

#[async_trait]
impl NotificationChannel for TracingChannel {
    async fn send(&self, notification: Notification) -> anyhow::Result<()> {
        info!(
            recipient = %notification.recipient,
            subject = %notification.subject,
            "{}",
            notification.body
        );
        Ok(())
    }
}

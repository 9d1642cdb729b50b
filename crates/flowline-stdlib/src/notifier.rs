use async_trait::async_trait;
use flowline_core::{EngineError, Notification, Notifier};
use tracing::info;
use uuid::Uuid;

/// Notifier that records every delivery in the log instead of handing it to
/// a provider. Useful for local runs and dry runs of new workflows.
#[derive(Debug, Default, Clone)]
pub struct TracingNotifier {
    sender: Option<String>,
}

impl TracingNotifier {
    /// Create a notifier with no sender address
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a sender address to logged deliveries
    pub fn with_sender(sender: impl Into<String>) -> Self {
        Self {
            sender: Some(sender.into()),
        }
    }
}

#[async_trait]
impl Notifier for TracingNotifier {
    async fn send(&self, notification: Notification) -> Result<String, EngineError> {
        if notification.recipient.trim().is_empty() {
            return Err(EngineError::Collaborator("notification has no recipient".to_string()));
        }

        let message_id = Uuid::new_v4().to_string();
        info!(
            message_id = %message_id,
            channel = ?notification.channel,
            recipient = %notification.recipient,
            sender = self.sender.as_deref().unwrap_or("-"),
            subject = notification.subject.as_deref().unwrap_or(""),
            body_len = notification.body.len(),
            "Notification delivered"
        );
        Ok(message_id)
    }
}

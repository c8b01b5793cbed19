//! Dry-run transport.

use crate::{OutgoingEmail, SendReceipt, SenderProfiles, Transport, TransportResult};
use async_trait::async_trait;
use tracing::info;

/// Logs each message and reports it delivered.
#[derive(Debug, Clone, Default)]
pub struct LogTransport {
    profiles: SenderProfiles,
}

impl LogTransport {
    pub fn new(profiles: SenderProfiles) -> Self {
        Self { profiles }
    }
}

#[async_trait]
impl Transport for LogTransport {
    async fn send(&self, message: &OutgoingEmail) -> TransportResult<SendReceipt> {
        let receipt = self.profiles.resolve(message);
        info!(
            queue_id = %message.queue_id,
            from = %receipt.from_email,
            to = ?message.to,
            cc = message.cc.len(),
            bcc = message.bcc.len(),
            subject = %message.subject,
            template = %message.template,
            layout = %message.layout,
            config = %message.config,
            "Dry-run delivery"
        );
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailqueue_database::{EmailFormat, JsonMap};

    #[tokio::test]
    async fn log_transport_accepts_everything() {
        let transport = LogTransport::default();
        let message = OutgoingEmail {
            queue_id: "q-1".to_string(),
            from_email: Some("me@example.com".to_string()),
            from_name: Some("Me".to_string()),
            to: vec!["a@example.com".to_string()],
            cc: Vec::new(),
            bcc: Vec::new(),
            reply_to: Vec::new(),
            subject: "Hello".to_string(),
            headers: JsonMap::new(),
            template: "welcome".to_string(),
            layout: "default".to_string(),
            config: "default".to_string(),
            theme: String::new(),
            format: EmailFormat::Text,
            template_vars: JsonMap::new(),
        };

        let receipt = transport.send(&message).await.unwrap();
        assert_eq!(receipt.from_email, "me@example.com");
        assert_eq!(receipt.from_name, "Me");
    }
}

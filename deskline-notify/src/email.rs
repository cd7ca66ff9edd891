//! Email channel.
//!
//! The channel turns a payload into an [`EmailMessage`] once and passes it to
//! an [`EmailTransport`]. Transports own the actual wire protocol.

use crate::NotificationChannel;
use async_trait::async_trait;
use deskline_core::{DeliveryError, EmailConfig, NotificationPayload};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const CHANNEL_NAME: &str = "email";

/// A fully built plain-text message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
}

impl EmailMessage {
    /// Build the message for `payload`. Recipients are the requester
    /// followed by the watchers, without duplicates.
    pub fn from_payload(payload: &NotificationPayload, from: &str, watchers: &[String]) -> Self {
        let mut to: Vec<String> = Vec::new();
        for address in payload.requester.iter().chain(watchers.iter()) {
            let address = address.trim();
            if !address.is_empty() && !to.iter().any(|a| a.eq_ignore_ascii_case(address)) {
                to.push(address.to_string());
            }
        }

        let mut body = format!(
            "Ticket {} moved from {} to {}.\n\nSubject: {}\nPriority: {}\n",
            payload.ticket_id,
            payload.prior_status,
            payload.new_status,
            payload.subject,
            payload.priority,
        );
        if let Some(owner) = payload.owner {
            body.push_str(&format!("Owner: {}\n", owner));
        }
        body.push_str(&format!("Changed by: {}\n", payload.actor));
        if let Some(note) = payload.note.as_deref() {
            body.push_str(&format!("\n{}\n", note));
        }

        Self {
            from: from.to_string(),
            to,
            subject: format!("[Ticket {}] {}", payload.ticket_id, payload.summary()),
            body,
        }
    }
}

/// Hands a built message to a mail system.
#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn deliver(&self, message: &EmailMessage) -> Result<(), DeliveryError>;
}

/// Development transport that writes each message to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTransport;

#[async_trait]
impl EmailTransport for LogTransport {
    async fn deliver(&self, message: &EmailMessage) -> Result<(), DeliveryError> {
        tracing::info!(
            from = %message.from,
            to = ?message.to,
            subject = %message.subject,
            body_len = message.body.len(),
            "Email delivered to log transport"
        );
        Ok(())
    }
}

/// Notifies the requester and configured watchers by email.
#[derive(Clone)]
pub struct EmailChannel {
    from: String,
    watchers: Vec<String>,
    transport: Arc<dyn EmailTransport>,
}

impl EmailChannel {
    pub fn new(config: &EmailConfig, transport: Arc<dyn EmailTransport>) -> Self {
        Self {
            from: config.from.clone(),
            watchers: config.watchers.clone(),
            transport,
        }
    }
}

impl std::fmt::Debug for EmailChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailChannel")
            .field("from", &self.from)
            .field("watchers", &self.watchers)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    fn name(&self) -> &str {
        CHANNEL_NAME
    }

    async fn send(&self, payload: &NotificationPayload) -> Result<(), DeliveryError> {
        let message = EmailMessage::from_payload(payload, &self.from, &self.watchers);
        if message.to.is_empty() {
            tracing::debug!(ticket_id = %payload.ticket_id, "No email recipients, skipping");
            return Ok(());
        }
        self.transport.deliver(&message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use deskline_core::{Actor, AgentId, EntityIdType, Priority, TicketId, TicketStatus};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<EmailMessage>>,
    }

    #[async_trait]
    impl EmailTransport for RecordingTransport {
        async fn deliver(&self, message: &EmailMessage) -> Result<(), DeliveryError> {
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    fn payload(requester: Option<&str>) -> NotificationPayload {
        NotificationPayload {
            delivery_id: uuid::Uuid::now_v7(),
            ticket_id: TicketId::nil(),
            sequence: 3,
            subject: "VPN drops".to_string(),
            priority: Priority::Urgent,
            requester: requester.map(String::from),
            prior_status: TicketStatus::Open,
            new_status: TicketStatus::Resolved,
            owner: Some(AgentId::nil()),
            actor: Actor::System,
            note: Some("Replaced the router.".to_string()),
            occurred_at: Utc::now(),
        }
    }

    fn config(watchers: &[&str]) -> EmailConfig {
        EmailConfig {
            from: "desk@example.com".to_string(),
            watchers: watchers.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_message_recipients_are_deduplicated() {
        let message = EmailMessage::from_payload(
            &payload(Some("sam@example.com")),
            "desk@example.com",
            &["ops@example.com".to_string(), "SAM@example.com".to_string()],
        );
        assert_eq!(message.to, vec!["sam@example.com", "ops@example.com"]);
    }

    #[test]
    fn test_message_renders_transition() {
        let message = EmailMessage::from_payload(&payload(None), "desk@example.com", &[]);
        assert!(message.subject.contains("VPN drops"));
        assert!(message.subject.contains("Open -> Resolved"));
        assert!(message.body.contains("Priority: Urgent"));
        assert!(message.body.contains("Changed by: system"));
        assert!(message.body.ends_with("Replaced the router.\n"));
    }

    #[tokio::test]
    async fn test_channel_sends_through_transport() {
        let transport = Arc::new(RecordingTransport::default());
        let channel = EmailChannel::new(&config(&["ops@example.com"]), transport.clone());
        channel.send(&payload(Some("sam@example.com"))).await.unwrap();

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].from, "desk@example.com");
        assert_eq!(sent[0].to.len(), 2);
    }

    #[tokio::test]
    async fn test_channel_skips_when_nobody_to_notify() {
        let transport = Arc::new(RecordingTransport::default());
        let channel = EmailChannel::new(&config(&[]), transport.clone());
        channel.send(&payload(None)).await.unwrap();
        assert!(transport.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_log_transport_accepts_everything() {
        let channel = EmailChannel::new(&config(&["ops@example.com"]), Arc::new(LogTransport));
        assert!(channel.send(&payload(None)).await.is_ok());
        assert_eq!(channel.name(), "email");
    }
}

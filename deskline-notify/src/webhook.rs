//! Signed HTTP webhook channel.

use crate::NotificationChannel;
use async_trait::async_trait;
use chrono::Utc;
use deskline_core::{
    ConfigError, DeliveryError, NotificationPayload, Timestamp, WebhookConfig,
};
use hmac::{Hmac, Mac};
use reqwest::StatusCode;
use serde::Serialize;
use sha2::Sha256;

/// Header carrying `sha256=<hex hmac of body>`.
pub const SIGNATURE_HEADER: &str = "X-Deskline-Signature";

const CHANNEL_NAME: &str = "webhook";

/// Body posted to the receiver.
#[derive(Debug, Serialize)]
struct WebhookEnvelope<'a> {
    delivery_id: String,
    event_type: String,
    timestamp: Timestamp,
    data: &'a NotificationPayload,
}

/// Generate the hex HMAC-SHA256 signature of `payload` under `secret`.
pub fn sign_payload(payload: &[u8], secret: &str) -> Result<String, DeliveryError> {
    type HmacSha256 = Hmac<Sha256>;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| DeliveryError::fatal(CHANNEL_NAME, format!("HMAC init failed: {}", e)))?;
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Map a response status to a delivery outcome.
///
/// 2xx succeeds; 408, 429 and 5xx are worth retrying; any other status means
/// the receiver rejected the payload and retrying cannot help.
fn classify_status(status: StatusCode) -> Result<(), DeliveryError> {
    if status.is_success() {
        Ok(())
    } else if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        Err(DeliveryError::retryable(
            CHANNEL_NAME,
            format!("receiver returned {}", status),
        ))
    } else {
        Err(DeliveryError::fatal(
            CHANNEL_NAME,
            format!("receiver returned {}", status),
        ))
    }
}

/// Posts each payload as JSON to one URL.
#[derive(Debug, Clone)]
pub struct WebhookChannel {
    url: String,
    secret: String,
    client: reqwest::Client,
}

impl WebhookChannel {
    pub fn new(config: &WebhookConfig) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                field: "channels.webhook".to_string(),
                value: config.url.clone(),
                reason: format!("failed to create HTTP client: {}", e),
            })?;
        Ok(Self {
            url: config.url.clone(),
            secret: config.secret.clone(),
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn name(&self) -> &str {
        CHANNEL_NAME
    }

    async fn send(&self, payload: &NotificationPayload) -> Result<(), DeliveryError> {
        let envelope = WebhookEnvelope {
            delivery_id: payload.delivery_id.to_string(),
            event_type: payload.event_type(),
            timestamp: Utc::now(),
            data: payload,
        };
        let body = serde_json::to_vec(&envelope).map_err(|e| {
            DeliveryError::fatal(CHANNEL_NAME, format!("failed to serialize payload: {}", e))
        })?;
        let signature = sign_payload(&body, &self.secret)?;

        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header(SIGNATURE_HEADER, format!("sha256={}", signature))
            .header("X-Deskline-Delivery-ID", envelope.delivery_id.as_str())
            .header("X-Deskline-Event", envelope.event_type.as_str())
            .header("User-Agent", "Deskline-Webhook/0.1")
            .body(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_builder() {
                    DeliveryError::fatal(CHANNEL_NAME, e.to_string())
                } else {
                    DeliveryError::retryable(CHANNEL_NAME, e.to_string())
                }
            })?;

        let status = response.status();
        tracing::debug!(
            ticket_id = %payload.ticket_id,
            delivery_id = %payload.delivery_id,
            status = %status,
            "Webhook response"
        );
        classify_status(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode as AxumStatus};
    use axum::routing::post;
    use axum::Router;
    use deskline_core::{Actor, EntityIdType, Priority, TicketId, TicketStatus};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    const SECRET: &str = "0123456789abcdef-secret";

    fn payload() -> NotificationPayload {
        NotificationPayload {
            delivery_id: uuid::Uuid::now_v7(),
            ticket_id: TicketId::now_v7(),
            sequence: 1,
            subject: "Printer down".to_string(),
            priority: Priority::High,
            requester: None,
            prior_status: TicketStatus::New,
            new_status: TicketStatus::Open,
            owner: None,
            actor: Actor::Unattributed,
            note: None,
            occurred_at: Utc::now(),
        }
    }

    #[derive(Clone, Default)]
    struct Received {
        requests: Arc<Mutex<Vec<(HeaderMap, Vec<u8>)>>>,
    }

    /// Start a receiver that answers every POST with `status`.
    async fn receiver(status: u16) -> (String, Received) {
        let received = Received::default();
        let app = Router::new()
            .route(
                "/hook",
                post(
                    move |State(state): State<Received>, headers: HeaderMap, body: axum::body::Bytes| async move {
                        state.requests.lock().unwrap().push((headers, body.to_vec()));
                        AxumStatus::from_u16(status).unwrap()
                    },
                ),
            )
            .with_state(received.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}/hook", addr), received)
    }

    fn channel(url: &str) -> WebhookChannel {
        WebhookChannel::new(&WebhookConfig {
            url: url.to_string(),
            secret: SECRET.to_string(),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[test]
    fn test_sign_payload_is_hex_and_deterministic() {
        let a = sign_payload(b"{}", SECRET).unwrap();
        let b = sign_payload(b"{}", SECRET).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, sign_payload(b"{}", "another-secret-value").unwrap());
    }

    #[test]
    fn test_classify_status() {
        assert!(classify_status(StatusCode::OK).is_ok());
        assert!(classify_status(StatusCode::ACCEPTED).is_ok());
        for retryable in [
            StatusCode::REQUEST_TIMEOUT,
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::SERVICE_UNAVAILABLE,
        ] {
            assert!(classify_status(retryable).unwrap_err().is_retryable());
        }
        for fatal in [StatusCode::BAD_REQUEST, StatusCode::NOT_FOUND, StatusCode::GONE] {
            assert!(!classify_status(fatal).unwrap_err().is_retryable());
        }
    }

    #[tokio::test]
    async fn test_send_posts_signed_json() {
        let (url, received) = receiver(200).await;
        let payload = payload();
        channel(&url).send(&payload).await.unwrap();

        let requests = received.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        let (headers, body) = &requests[0];
        let expected = format!("sha256={}", sign_payload(body, SECRET).unwrap());
        assert_eq!(headers.get(SIGNATURE_HEADER).unwrap().to_str().unwrap(), expected);
        assert_eq!(headers.get("X-Deskline-Event").unwrap(), "ticket.open");

        let json: serde_json::Value = serde_json::from_slice(body).unwrap();
        assert_eq!(json["event_type"], "ticket.open");
        assert_eq!(json["data"]["subject"], "Printer down");
        assert_eq!(json["delivery_id"], payload.delivery_id.to_string());
    }

    #[tokio::test]
    async fn test_server_error_is_retryable() {
        let (url, _) = receiver(503).await;
        let err = channel(&url).send(&payload()).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_client_error_is_fatal() {
        let (url, _) = receiver(410).await;
        let err = channel(&url).send(&payload()).await.unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_unreachable_receiver_is_retryable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let err = channel(&format!("http://{}/hook", addr))
            .send(&payload())
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }
}

//! Delivery channel contract.

use async_trait::async_trait;
use deskline_core::{DeliveryError, NotificationPayload};

/// A destination for notifications, such as email or a webhook.
///
/// `send` makes exactly one attempt. Retrying is the dispatcher's job; the
/// channel only classifies its failure as retryable or fatal.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Stable name used in logs and dead-letter records.
    fn name(&self) -> &str;

    async fn send(&self, payload: &NotificationPayload) -> Result<(), DeliveryError>;
}

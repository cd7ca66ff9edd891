//! Deskline Notify - Asynchronous Notification Delivery
//!
//! The transition engine hands every committed event to a
//! [`DispatcherHandle`]. Background workers deliver it to each configured
//! [`NotificationChannel`] independently, retrying retryable failures with
//! bounded exponential backoff. Anything that cannot be delivered ends up in a
//! [`DeadLetterStore`]; nothing is dropped silently.

mod channel;
mod dead_letter;
mod dispatcher;
mod email;
mod webhook;

pub use channel::NotificationChannel;
pub use dead_letter::{
    DeadLetter, DeadLetterReason, DeadLetterStore, InMemoryDeadLetterStore, JsonlDeadLetterStore,
    UNROUTED_CHANNEL,
};
pub use dispatcher::{
    DispatcherHandle, DispatcherMetrics, DispatcherRuntime, DispatcherSnapshot,
    NotificationDispatcher,
};
pub use email::{EmailChannel, EmailMessage, EmailTransport, LogTransport};
pub use webhook::{sign_payload, WebhookChannel, SIGNATURE_HEADER};

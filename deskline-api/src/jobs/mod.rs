//! Background Jobs for the Deskline API
//!
//! - `auto_close`: closes tickets left Resolved past the configured timeout
//!
//! Jobs are spawned at server startup and stopped through a shared `watch`
//! shutdown signal:
//!
//! ```ignore
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! let job = tokio::spawn(auto_close_task(engine.clone(), config.auto_close.clone(), shutdown_rx));
//! // ...
//! let _ = shutdown_tx.send(true);
//! let metrics = job.await?;
//! ```

pub mod auto_close;

pub use auto_close::{auto_close_task, AutoCloseMetrics, AutoCloseSnapshot};

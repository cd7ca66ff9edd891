//! Deskline Server Entry Point
//!
//! Loads configuration, wires store, directory, dispatcher and engine
//! together, starts the auto-close job and serves the HTTP API until Ctrl-C.

use std::path::Path;
use std::sync::Arc;

use deskline_agents::{AgentDirectory, AssignmentResolver, KeywordClassifier};
use deskline_api::{
    create_api_router,
    jobs::auto_close_task,
    telemetry::{init_tracing, TelemetryConfig},
    ApiError, ApiResult, AppState,
};
use deskline_core::{DesklineConfig, DesklineError};
use deskline_engine::TransitionEngine;
use deskline_notify::{
    DeadLetterStore, EmailChannel, InMemoryDeadLetterStore, JsonlDeadLetterStore, LogTransport,
    NotificationChannel, NotificationDispatcher, WebhookChannel,
};
use deskline_storage::InMemoryTicketStore;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> ApiResult<()> {
    init_tracing(&TelemetryConfig::from_env())?;

    let config = load_config()?;
    let dead_letters = open_dead_letters(&config).await?;
    let channels = build_channels(&config)?;
    let (notifier, dispatcher) =
        NotificationDispatcher::start(&config.dispatcher, channels, dead_letters.clone());

    let store = Arc::new(InMemoryTicketStore::new());
    let directory = Arc::new(AgentDirectory::new());
    directory.rebuild_loads(store.as_ref())?;

    let classifier = KeywordClassifier::standard(config.classifier.default_tag.clone())
        .map_err(DesklineError::from)?;
    let resolver = AssignmentResolver::new(directory, Arc::new(classifier));
    let engine = TransitionEngine::new(store, resolver, notifier, config.engine.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let auto_close = config.auto_close.enabled.then(|| {
        tokio::spawn(auto_close_task(
            engine.clone(),
            config.auto_close.clone(),
            shutdown_rx.clone(),
        ))
    });

    let app = create_api_router(AppState::new(engine, dead_letters));
    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .map_err(|e| {
            ApiError::internal_error(format!("Failed to bind {}: {}", config.server.bind_addr, e))
        })?;
    tracing::info!(addr = %config.server.bind_addr, "Starting Deskline API server");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;

    let _ = shutdown_tx.send(true);
    if let Some(job) = auto_close {
        if let Err(e) = job.await {
            tracing::error!(error = %e, "Auto-close task panicked");
        }
    }
    dispatcher.shutdown().await;

    tracing::info!("Deskline API server stopped");
    Ok(())
}

/// `DESKLINE_CONFIG` names a TOML file; otherwise read `DESKLINE_*` variables.
fn load_config() -> ApiResult<DesklineConfig> {
    let config = match std::env::var("DESKLINE_CONFIG") {
        Ok(path) => {
            tracing::info!(path = %path, "Loading configuration file");
            DesklineConfig::from_toml_path(Path::new(&path))?
        }
        Err(_) => DesklineConfig::from_env()?,
    };
    Ok(config)
}

async fn open_dead_letters(config: &DesklineConfig) -> ApiResult<Arc<dyn DeadLetterStore>> {
    let store: Arc<dyn DeadLetterStore> = match &config.server.dead_letter_path {
        Some(path) => Arc::new(JsonlDeadLetterStore::open(path).await?),
        None => {
            tracing::warn!("No dead-letter path configured, dead letters are kept in memory");
            Arc::new(InMemoryDeadLetterStore::new())
        }
    };
    Ok(store)
}

fn build_channels(config: &DesklineConfig) -> ApiResult<Vec<Arc<dyn NotificationChannel>>> {
    let mut channels: Vec<Arc<dyn NotificationChannel>> = Vec::new();
    if let Some(webhook) = &config.channels.webhook {
        let channel = WebhookChannel::new(webhook).map_err(DesklineError::from)?;
        tracing::info!(url = %channel.url(), "Webhook channel enabled");
        channels.push(Arc::new(channel));
    }
    if let Some(email) = &config.channels.email {
        tracing::info!(from = %email.from, watchers = email.watchers.len(), "Email channel enabled");
        channels.push(Arc::new(EmailChannel::new(email, Arc::new(LogTransport))));
    }
    if channels.is_empty() {
        tracing::warn!("No notification channels configured");
    }
    Ok(channels)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

//! Auto-Close Background Task
//!
//! Periodically closes tickets that have stayed Resolved longer than
//! `resolved_ttl`. Each close is an ordinary `Resolved -> Closed` transition
//! attributed to [`Actor::System`], so it is validated, audited and notified
//! like any other.
//!
//! A ticket that a requester reopens between the scan and the close fails
//! with `InvalidTransition` or `Conflict`; that ticket is skipped, not
//! counted as an error.

use chrono::Utc;
use deskline_core::{Actor, AutoCloseConfig, DesklineError, TicketId, TicketStatus};
use deskline_engine::{TransitionEngine, TransitionRequest};
use deskline_storage::list_by_status;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

// ============================================================================
// METRICS
// ============================================================================

/// Counters for auto-close activity since startup.
#[derive(Debug, Default)]
pub struct AutoCloseMetrics {
    pub closed: AtomicU64,
    /// Tickets that moved on before they could be closed
    pub skipped: AtomicU64,
    pub errors: AtomicU64,
    pub cycles: AtomicU64,
}

impl AutoCloseMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> AutoCloseSnapshot {
        AutoCloseSnapshot {
            closed: self.closed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            cycles: self.cycles.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`AutoCloseMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoCloseSnapshot {
    pub closed: u64,
    pub skipped: u64,
    pub errors: u64,
    pub cycles: u64,
}

// ============================================================================
// BACKGROUND TASK
// ============================================================================

/// Run until `shutdown_rx` reads true, closing stale Resolved tickets every
/// `check_interval`.
///
/// The first cycle runs immediately. Returns the metrics collected over the
/// task's lifetime.
pub async fn auto_close_task(
    engine: TransitionEngine,
    config: AutoCloseConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<AutoCloseMetrics> {
    let metrics = Arc::new(AutoCloseMetrics::new());

    let mut check_interval = interval(config.check_interval);
    check_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        check_interval_secs = config.check_interval.as_secs(),
        resolved_ttl_secs = config.resolved_ttl.as_secs(),
        batch_size = config.batch_size,
        "Auto-close task started"
    );

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    tracing::info!("Auto-close task shutting down");
                    break;
                }
            }

            _ = check_interval.tick() => {
                run_cycle(&engine, &config, &metrics).await;
            }
        }
    }

    let snapshot = metrics.snapshot();
    tracing::info!(
        closed = snapshot.closed,
        skipped = snapshot.skipped,
        errors = snapshot.errors,
        cycles = snapshot.cycles,
        "Auto-close task completed"
    );

    metrics
}

/// One scan-and-close pass. Returns the number of tickets closed.
pub async fn run_cycle(
    engine: &TransitionEngine,
    config: &AutoCloseConfig,
    metrics: &AutoCloseMetrics,
) -> u64 {
    metrics.cycles.fetch_add(1, Ordering::Relaxed);

    let stale = match find_stale(engine, config) {
        Ok(stale) => stale,
        Err(e) => {
            tracing::error!(error = %e, "Failed to scan resolved tickets");
            metrics.errors.fetch_add(1, Ordering::Relaxed);
            return 0;
        }
    };

    let mut closed = 0u64;
    for ticket_id in stale {
        let request = TransitionRequest::new(ticket_id, TicketStatus::Closed)
            .with_actor(Actor::System)
            .with_note("Closed automatically after resolution timeout");

        match engine.apply_transition(request).await {
            Ok(_) => {
                closed += 1;
                metrics.closed.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) if e.is_conflict() || matches!(e, DesklineError::Transition(_)) => {
                tracing::debug!(
                    ticket_id = %ticket_id,
                    error = %e,
                    "Ticket changed before auto-close, skipping"
                );
                metrics.skipped.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!(ticket_id = %ticket_id, error = %e, "Failed to auto-close ticket");
                metrics.errors.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    if closed > 0 {
        tracing::info!(closed, "Auto-close cycle completed");
    } else {
        tracing::trace!("Auto-close cycle completed with nothing to close");
    }
    closed
}

/// Ids of Resolved tickets last updated before the cutoff, oldest last.
fn find_stale(
    engine: &TransitionEngine,
    config: &AutoCloseConfig,
) -> Result<Vec<TicketId>, DesklineError> {
    let ttl = chrono::Duration::from_std(config.resolved_ttl).unwrap_or(chrono::Duration::MAX);
    let cutoff = Utc::now().checked_sub_signed(ttl).unwrap_or(chrono::DateTime::<Utc>::MIN_UTC);

    let mut stale = Vec::new();
    for ticket in list_by_status(engine.store().as_ref(), TicketStatus::Resolved) {
        let ticket = ticket?;
        if ticket.updated_at > cutoff {
            continue;
        }
        stale.push(ticket.ticket_id);
        if stale.len() >= config.batch_size.max(1) {
            break;
        }
    }
    Ok(stale)
}

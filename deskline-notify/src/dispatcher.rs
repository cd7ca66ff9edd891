//! Bounded queue plus background delivery workers.

use crate::{
    DeadLetter, DeadLetterReason, DeadLetterStore, NotificationChannel, UNROUTED_CHANNEL,
};
use deskline_core::{
    DeliveryError, DispatchError, DispatcherConfig, NotificationPayload, RetryPolicy,
};
use futures_util::future::join_all;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

// ============================================================================
// METRICS
// ============================================================================

/// Counters for dispatcher activity since start.
#[derive(Debug, Default)]
pub struct DispatcherMetrics {
    /// Payloads accepted into the queue
    pub enqueued: AtomicU64,
    /// Enqueue or replay calls refused
    pub rejected: AtomicU64,
    /// Successful (payload, channel) deliveries
    pub delivered: AtomicU64,
    /// Retry attempts after a retryable failure
    pub retried: AtomicU64,
    /// Dead letters written
    pub dead_lettered: AtomicU64,
    /// Dead letters the store refused on every attempt
    pub dead_letter_failures: AtomicU64,
}

impl DispatcherMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> DispatcherSnapshot {
        DispatcherSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
            dead_letter_failures: self.dead_letter_failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`DispatcherMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct DispatcherSnapshot {
    pub enqueued: u64,
    pub rejected: u64,
    pub delivered: u64,
    pub retried: u64,
    pub dead_lettered: u64,
    pub dead_letter_failures: u64,
}

// ============================================================================
// QUEUE ITEMS
// ============================================================================

#[derive(Debug, Clone)]
struct Dispatch {
    payload: NotificationPayload,
    /// Restrict delivery to one channel; used for replays
    only_channel: Option<String>,
}

/// Where delivery to one channel ended up when it did not succeed.
#[derive(Debug)]
struct Undelivered {
    attempts: u32,
    last_error: Option<DeliveryError>,
    reason: DeadLetterReason,
}

// ============================================================================
// HANDLE
// ============================================================================

/// Cloneable sending side of the dispatcher.
#[derive(Debug, Clone)]
pub struct DispatcherHandle {
    tx: mpsc::Sender<Dispatch>,
    channel_names: Arc<[String]>,
    capacity: usize,
    enqueue_timeout: Duration,
    metrics: Arc<DispatcherMetrics>,
}

impl DispatcherHandle {
    /// Queue a payload for every channel.
    ///
    /// Waits at most `enqueue_timeout` for room, then fails with
    /// `QueueFull`. Fails with `Closed` once the dispatcher has shut down.
    pub async fn enqueue(&self, payload: NotificationPayload) -> Result<(), DispatchError> {
        self.push(Dispatch {
            payload,
            only_channel: None,
        })
        .await
    }

    /// Queue a dead letter's payload again, for its original channel only.
    ///
    /// Fails with `UnknownChannel` when that channel is not configured, so
    /// the caller still holds the letter. Letters recorded under
    /// [`UNROUTED_CHANNEL`] go to every configured channel.
    pub async fn replay(&self, letter: DeadLetter) -> Result<(), DispatchError> {
        let only_channel = if letter.channel == UNROUTED_CHANNEL {
            if self.channel_names.is_empty() {
                return self.refuse_replay(letter.channel);
            }
            None
        } else if self.channel_names.iter().any(|name| *name == letter.channel) {
            Some(letter.channel.clone())
        } else {
            return self.refuse_replay(letter.channel);
        };

        tracing::info!(
            letter_id = %letter.letter_id,
            channel = %letter.channel,
            ticket_id = %letter.payload.ticket_id,
            "Replaying dead letter"
        );
        self.push(Dispatch {
            payload: letter.payload,
            only_channel,
        })
        .await
    }

    fn refuse_replay(&self, channel: String) -> Result<(), DispatchError> {
        self.metrics.rejected.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(channel = %channel, "Replay names no configured channel");
        Err(DispatchError::UnknownChannel { channel })
    }

    async fn push(&self, dispatch: Dispatch) -> Result<(), DispatchError> {
        let result = match self.tx.try_send(dispatch) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(DispatchError::Closed),
            Err(mpsc::error::TrySendError::Full(dispatch)) => self
                .tx
                .send_timeout(dispatch, self.enqueue_timeout)
                .await
                .map_err(|e| match e {
                    mpsc::error::SendTimeoutError::Timeout(_) => DispatchError::QueueFull {
                        capacity: self.capacity,
                    },
                    mpsc::error::SendTimeoutError::Closed(_) => DispatchError::Closed,
                }),
        };
        match result {
            Ok(()) => self.metrics.enqueued.fetch_add(1, Ordering::Relaxed),
            Err(_) => self.metrics.rejected.fetch_add(1, Ordering::Relaxed),
        };
        result
    }

    pub fn metrics(&self) -> &Arc<DispatcherMetrics> {
        &self.metrics
    }
}

// ============================================================================
// RUNTIME
// ============================================================================

/// Owns the worker tasks; consumed by [`shutdown`](Self::shutdown).
///
/// Call `shutdown` before exiting. Dropping the runtime leaves the workers
/// running detached, and whatever is still queued when the process ends is
/// lost without a dead letter.
pub struct DispatcherRuntime {
    shutdown_tx: watch::Sender<bool>,
    workers: Vec<JoinHandle<()>>,
    queue: Arc<Mutex<mpsc::Receiver<Dispatch>>>,
    queue_tx: mpsc::WeakSender<Dispatch>,
    shared: Arc<Shared>,
    stopped: bool,
}

impl DispatcherRuntime {
    /// Stop the workers and dead-letter whatever is still queued.
    ///
    /// Deliveries waiting on a retry delay give up with reason `Shutdown`.
    /// Returns the final metrics.
    pub async fn shutdown(mut self) -> DispatcherSnapshot {
        self.stopped = true;
        let _ = self.shutdown_tx.send(true);
        for worker in std::mem::take(&mut self.workers) {
            if let Err(e) = worker.await {
                tracing::error!(error = %e, "Dispatcher worker panicked");
            }
        }

        let mut rx = self.queue.lock().await;
        rx.close();
        let mut drained = 0usize;
        while let Ok(dispatch) = rx.try_recv() {
            drained += 1;
            let targets: Vec<_> = self.shared.targets(&dispatch).collect();
            if targets.is_empty() {
                self.shared.dead_letter_unrouted(&dispatch).await;
                continue;
            }
            for channel in targets {
                self.shared
                    .dead_letter(
                        channel.name(),
                        &dispatch.payload,
                        Undelivered {
                            attempts: 0,
                            last_error: None,
                            reason: DeadLetterReason::Shutdown,
                        },
                    )
                    .await;
            }
        }

        let snapshot = self.shared.metrics.snapshot();
        tracing::info!(
            drained,
            enqueued = snapshot.enqueued,
            delivered = snapshot.delivered,
            retried = snapshot.retried,
            dead_lettered = snapshot.dead_lettered,
            dead_letter_failures = snapshot.dead_letter_failures,
            "Notification dispatcher stopped"
        );
        snapshot
    }

    /// Payloads waiting in the queue right now.
    fn queued(&self) -> usize {
        self.queue_tx
            .upgrade()
            .map_or(0, |tx| tx.max_capacity() - tx.capacity())
    }
}

impl Drop for DispatcherRuntime {
    fn drop(&mut self) {
        if self.stopped {
            return;
        }
        let queued = self.queued();
        if queued > 0 {
            tracing::warn!(
                queued,
                "Dispatcher runtime dropped without shutdown, queued work will not be dead-lettered"
            );
        } else {
            tracing::debug!("Dispatcher runtime dropped without shutdown, workers left running");
        }
    }
}

// ============================================================================
// DISPATCHER
// ============================================================================

/// State shared by all workers.
struct Shared {
    channels: Vec<Arc<dyn NotificationChannel>>,
    dead_letters: Arc<dyn DeadLetterStore>,
    retry: RetryPolicy,
    metrics: Arc<DispatcherMetrics>,
}

impl Shared {
    fn targets<'a>(
        &'a self,
        dispatch: &'a Dispatch,
    ) -> impl Iterator<Item = &'a Arc<dyn NotificationChannel>> {
        self.channels.iter().filter(move |c| {
            dispatch
                .only_channel
                .as_deref()
                .map_or(true, |only| c.name() == only)
        })
    }

    async fn dead_letter(
        &self,
        channel: &str,
        payload: &NotificationPayload,
        failure: Undelivered,
    ) {
        let letter = DeadLetter::new(
            channel,
            payload.clone(),
            failure.attempts,
            failure.last_error.map(|e| e.to_string()),
            failure.reason,
        );
        tracing::error!(
            letter_id = %letter.letter_id,
            ticket_id = %payload.ticket_id,
            channel = %channel,
            attempts = failure.attempts,
            reason = %failure.reason,
            "Notification moved to dead letters"
        );

        // The store gets the same backoff schedule as a channel.
        let max_attempts = self.retry.max_attempts.max(1);
        for attempt in 1..=max_attempts {
            match self.dead_letters.record(letter.clone()).await {
                Ok(()) => {
                    self.metrics.dead_lettered.fetch_add(1, Ordering::Relaxed);
                    return;
                }
                Err(e) => {
                    tracing::warn!(
                        letter_id = %letter.letter_id,
                        channel = %channel,
                        attempt,
                        error = %e,
                        "Failed to record dead letter"
                    );
                    if attempt < max_attempts {
                        tokio::time::sleep(self.retry.delay_after(attempt)).await;
                    }
                }
            }
        }

        self.metrics
            .dead_letter_failures
            .fetch_add(1, Ordering::Relaxed);
        tracing::error!(
            letter = ?letter,
            "Dead letter store refused the letter on every attempt, this log entry is the only copy"
        );
    }

    /// Dead-letter a dispatch that matches no configured channel.
    async fn dead_letter_unrouted(&self, dispatch: &Dispatch) {
        let channel = dispatch
            .only_channel
            .as_deref()
            .unwrap_or(UNROUTED_CHANNEL);
        self.dead_letter(
            channel,
            &dispatch.payload,
            Undelivered {
                attempts: 0,
                last_error: None,
                reason: DeadLetterReason::NoChannel,
            },
        )
        .await;
    }

    /// Deliver one payload to one channel with bounded backoff.
    async fn deliver(
        &self,
        channel: &dyn NotificationChannel,
        payload: &NotificationPayload,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<u32, Undelivered> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            match channel.send(payload).await {
                Ok(()) => return Ok(attempt),
                Err(e) if !e.is_retryable() => {
                    return Err(Undelivered {
                        attempts: attempt,
                        last_error: Some(e),
                        reason: DeadLetterReason::Fatal,
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        ticket_id = %payload.ticket_id,
                        channel = %channel.name(),
                        attempt = attempt,
                        error = %e,
                        "Notification delivery failed"
                    );
                    last_error = Some(e);
                }
            }

            if attempt < max_attempts {
                self.metrics.retried.fetch_add(1, Ordering::Relaxed);
                tokio::select! {
                    _ = tokio::time::sleep(self.retry.delay_after(attempt)) => {}
                    _ = wait_for_shutdown(&mut shutdown) => {
                        return Err(Undelivered {
                            attempts: attempt,
                            last_error,
                            reason: DeadLetterReason::Shutdown,
                        });
                    }
                }
            }
        }

        Err(Undelivered {
            attempts: max_attempts,
            last_error,
            reason: DeadLetterReason::Exhausted,
        })
    }

    /// Deliver to every target channel concurrently.
    async fn process(&self, dispatch: Dispatch, shutdown: &watch::Receiver<bool>) {
        let targets: Vec<_> = self.targets(&dispatch).collect();
        if targets.is_empty() {
            self.dead_letter_unrouted(&dispatch).await;
            return;
        }

        let deliveries = targets.into_iter().map(|channel| {
            let shutdown = shutdown.clone();
            let payload = &dispatch.payload;
            async move {
                match self.deliver(channel.as_ref(), payload, shutdown).await {
                    Ok(attempts) => {
                        self.metrics.delivered.fetch_add(1, Ordering::Relaxed);
                        tracing::debug!(
                            ticket_id = %payload.ticket_id,
                            channel = %channel.name(),
                            attempts,
                            "Notification delivered"
                        );
                    }
                    Err(failure) => self.dead_letter(channel.name(), payload, failure).await,
                }
            }
        });
        join_all(deliveries).await;
    }
}

/// Resolve once the shutdown flag is set or its sender is gone.
async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// Entry point for starting the dispatcher.
pub struct NotificationDispatcher;

impl NotificationDispatcher {
    /// Spawn `config.workers` delivery tasks on the current runtime.
    pub fn start(
        config: &DispatcherConfig,
        channels: Vec<Arc<dyn NotificationChannel>>,
        dead_letters: Arc<dyn DeadLetterStore>,
    ) -> (DispatcherHandle, DispatcherRuntime) {
        let capacity = config.queue_capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let metrics = Arc::new(DispatcherMetrics::new());
        let queue = Arc::new(Mutex::new(rx));

        let channel_names: Arc<[String]> =
            channels.iter().map(|c| c.name().to_string()).collect();
        tracing::info!(
            workers = config.workers,
            queue_capacity = capacity,
            channels = ?channel_names,
            max_attempts = config.retry.max_attempts,
            "Notification dispatcher started"
        );

        let shared = Arc::new(Shared {
            channels,
            dead_letters,
            retry: config.retry.clone(),
            metrics: metrics.clone(),
        });

        let workers = (0..config.workers.max(1))
            .map(|worker_id| {
                let shared = shared.clone();
                let queue = queue.clone();
                let shutdown = shutdown_rx.clone();
                tokio::spawn(worker_loop(worker_id, shared, queue, shutdown))
            })
            .collect();

        let queue_tx = tx.downgrade();
        let handle = DispatcherHandle {
            tx,
            channel_names,
            capacity,
            enqueue_timeout: config.enqueue_timeout,
            metrics,
        };
        let runtime = DispatcherRuntime {
            shutdown_tx,
            workers,
            queue,
            queue_tx,
            shared,
            stopped: false,
        };
        (handle, runtime)
    }
}

async fn worker_loop(
    worker_id: usize,
    shared: Arc<Shared>,
    queue: Arc<Mutex<mpsc::Receiver<Dispatch>>>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let next = tokio::select! {
            biased;
            _ = wait_for_shutdown(&mut shutdown) => None,
            dispatch = async { queue.lock().await.recv().await } => dispatch,
        };
        let Some(dispatch) = next else {
            break;
        };
        shared.process(dispatch, &shutdown).await;
    }
    tracing::debug!(worker_id, "Dispatcher worker stopped");
}

//! Dead-letter records for notifications that could not be delivered.

use async_trait::async_trait;
use chrono::Utc;
use deskline_core::{
    DesklineResult, EntityIdType, EntityType, LetterId, NotificationPayload, StorageError,
    Timestamp,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};

/// Why delivery stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadLetterReason {
    /// The channel reported a non-retryable failure
    Fatal,
    /// Every retry attempt failed
    Exhausted,
    /// The dispatcher stopped before delivery finished
    Shutdown,
    /// No configured channel could take the payload
    NoChannel,
}

impl DeadLetterReason {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            DeadLetterReason::Fatal => "Fatal",
            DeadLetterReason::Exhausted => "Exhausted",
            DeadLetterReason::Shutdown => "Shutdown",
            DeadLetterReason::NoChannel => "NoChannel",
        }
    }
}

impl fmt::Display for DeadLetterReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

/// Channel recorded on a letter that no configured channel could take.
///
/// Replaying such a letter offers it to every channel configured at that time.
pub const UNROUTED_CHANNEL: &str = "unrouted";

/// One undelivered (payload, channel) pair, kept for manual recovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub letter_id: LetterId,
    pub channel: String,
    pub payload: NotificationPayload,
    /// Attempts made before giving up; zero for letters drained at shutdown
    pub attempts: u32,
    pub last_error: Option<String>,
    pub reason: DeadLetterReason,
    pub failed_at: Timestamp,
}

impl DeadLetter {
    pub fn new(
        channel: impl Into<String>,
        payload: NotificationPayload,
        attempts: u32,
        last_error: Option<String>,
        reason: DeadLetterReason,
    ) -> Self {
        Self {
            letter_id: LetterId::now_v7(),
            channel: channel.into(),
            payload,
            attempts,
            last_error,
            reason,
            failed_at: Utc::now(),
        }
    }
}

fn letter_not_found(id: LetterId) -> StorageError {
    StorageError::NotFound {
        entity_type: EntityType::DeadLetter,
        id: id.to_string(),
    }
}

/// Durable home for dead letters.
#[async_trait]
pub trait DeadLetterStore: Send + Sync {
    async fn record(&self, letter: DeadLetter) -> DesklineResult<()>;

    /// Every held letter, oldest first.
    async fn list(&self) -> DesklineResult<Vec<DeadLetter>>;

    /// Remove a letter so it can be replayed.
    async fn take(&self, id: LetterId) -> DesklineResult<DeadLetter>;
}

// ============================================================================
// IN-MEMORY STORE
// ============================================================================

/// Volatile dead-letter store.
#[derive(Debug, Default, Clone)]
pub struct InMemoryDeadLetterStore {
    letters: Arc<RwLock<Vec<DeadLetter>>>,
}

impl InMemoryDeadLetterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.letters.read().await.len()
    }
}

#[async_trait]
impl DeadLetterStore for InMemoryDeadLetterStore {
    async fn record(&self, letter: DeadLetter) -> DesklineResult<()> {
        self.letters.write().await.push(letter);
        Ok(())
    }

    async fn list(&self) -> DesklineResult<Vec<DeadLetter>> {
        Ok(self.letters.read().await.clone())
    }

    async fn take(&self, id: LetterId) -> DesklineResult<DeadLetter> {
        let mut letters = self.letters.write().await;
        let index = letters
            .iter()
            .position(|l| l.letter_id == id)
            .ok_or_else(|| letter_not_found(id))?;
        Ok(letters.remove(index))
    }
}

// ============================================================================
// JSON-LINES FILE STORE
// ============================================================================

/// One line of the dead-letter log.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum LogEntry {
    Record { letter: DeadLetter },
    Take { letter_id: LetterId },
}

#[derive(Debug)]
struct JsonlState {
    file: tokio::fs::File,
    letters: Vec<DeadLetter>,
}

/// Append-only JSON-lines dead-letter log.
///
/// `record` and `take` each append one line; the current set is rebuilt by
/// replaying the log on open. Unreadable lines are skipped with a warning.
#[derive(Debug)]
pub struct JsonlDeadLetterStore {
    path: PathBuf,
    state: Mutex<JsonlState>,
}

impl JsonlDeadLetterStore {
    pub async fn open(path: impl AsRef<Path>) -> DesklineResult<Self> {
        let path = path.as_ref().to_path_buf();
        let letters = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => replay(&path, &contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(io_error(&path, e).into()),
        };

        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| io_error(&path, e))?;

        tracing::info!(path = %path.display(), letters = letters.len(), "Dead-letter log opened");
        Ok(Self {
            path,
            state: Mutex::new(JsonlState { file, letters }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn append(&self, state: &mut JsonlState, entry: &LogEntry) -> DesklineResult<()> {
        let mut line = serde_json::to_vec(entry).map_err(|e| StorageError::Io {
            reason: format!("failed to encode dead letter: {}", e),
        })?;
        line.push(b'\n');
        state
            .file
            .write_all(&line)
            .await
            .map_err(|e| io_error(&self.path, e))?;
        state
            .file
            .flush()
            .await
            .map_err(|e| io_error(&self.path, e))?;
        Ok(())
    }
}

fn replay(path: &Path, contents: &str) -> Vec<DeadLetter> {
    let mut letters: Vec<DeadLetter> = Vec::new();
    for (index, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<LogEntry>(line) {
            Ok(LogEntry::Record { letter }) => letters.push(letter),
            Ok(LogEntry::Take { letter_id }) => letters.retain(|l| l.letter_id != letter_id),
            Err(e) => tracing::warn!(
                path = %path.display(),
                line = index + 1,
                error = %e,
                "Skipping unreadable dead-letter entry"
            ),
        }
    }
    letters
}

fn io_error(path: &Path, e: std::io::Error) -> StorageError {
    StorageError::Io {
        reason: format!("{}: {}", path.display(), e),
    }
}

#[async_trait]
impl DeadLetterStore for JsonlDeadLetterStore {
    async fn record(&self, letter: DeadLetter) -> DesklineResult<()> {
        let mut state = self.state.lock().await;
        self.append(&mut state, &LogEntry::Record { letter: letter.clone() })
            .await?;
        state.letters.push(letter);
        Ok(())
    }

    async fn list(&self) -> DesklineResult<Vec<DeadLetter>> {
        Ok(self.state.lock().await.letters.clone())
    }

    async fn take(&self, id: LetterId) -> DesklineResult<DeadLetter> {
        let mut state = self.state.lock().await;
        let index = state
            .letters
            .iter()
            .position(|l| l.letter_id == id)
            .ok_or_else(|| letter_not_found(id))?;
        self.append(&mut state, &LogEntry::Take { letter_id: id })
            .await?;
        Ok(state.letters.remove(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deskline_core::{Actor, Priority, TicketId, TicketStatus};

    fn letter(reason: DeadLetterReason) -> DeadLetter {
        let payload = NotificationPayload {
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
        };
        DeadLetter::new("webhook", payload, 5, Some("503".to_string()), reason)
    }

    #[tokio::test]
    async fn test_in_memory_record_list_take() {
        let store = InMemoryDeadLetterStore::new();
        let a = letter(DeadLetterReason::Exhausted);
        let b = letter(DeadLetterReason::Fatal);
        store.record(a.clone()).await.unwrap();
        store.record(b.clone()).await.unwrap();
        assert_eq!(store.list().await.unwrap(), vec![a.clone(), b.clone()]);

        assert_eq!(store.take(a.letter_id).await.unwrap(), a);
        assert_eq!(store.list().await.unwrap(), vec![b]);
        assert!(store.take(a.letter_id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_jsonl_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dead_letters.jsonl");
        let a = letter(DeadLetterReason::Exhausted);
        let b = letter(DeadLetterReason::Shutdown);

        {
            let store = JsonlDeadLetterStore::open(&path).await.unwrap();
            store.record(a.clone()).await.unwrap();
            store.record(b.clone()).await.unwrap();
            store.take(a.letter_id).await.unwrap();
        }

        let reopened = JsonlDeadLetterStore::open(&path).await.unwrap();
        assert_eq!(reopened.list().await.unwrap(), vec![b]);

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 3);
    }

    #[tokio::test]
    async fn test_jsonl_skips_corrupt_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dead_letters.jsonl");
        let a = letter(DeadLetterReason::Fatal);
        let good = serde_json::to_string(&LogEntry::Record { letter: a.clone() }).unwrap();
        std::fs::write(&path, format!("{}\n{{not json\n\n", good)).unwrap();

        let store = JsonlDeadLetterStore::open(&path).await.unwrap();
        assert_eq!(store.list().await.unwrap(), vec![a]);
    }

    #[test]
    fn test_reason_serialization() {
        assert_eq!(
            serde_json::to_string(&DeadLetterReason::Exhausted).unwrap(),
            "\"exhausted\""
        );
        assert_eq!(DeadLetterReason::Shutdown.to_string(), "Shutdown");
        assert_eq!(
            serde_json::to_string(&DeadLetterReason::NoChannel).unwrap(),
            "\"no_channel\""
        );
    }
}

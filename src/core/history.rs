//! History Repository
//!
//! Information Hiding:
//! - Stored layout of `chat_history` hidden behind append/load/clear
//! - Read-after-write verification and bounded retries internalized
//! - Failed appends are handed to the retry queue instead of surfacing to callers
//!
//! Appends are read-modify-write on a single key without a lock. Two contexts
//! appending at the same moment can overwrite each other's entry; this is a
//! known limitation of the underlying store.

use super::message::{sort_by_created_at, Message, MessageKind};
use super::retry_queue::{PendingEntry, PersistTarget, RetryQueue};
use crate::config::{HistoryConfig, QueueConfig};
use crate::error::{StorageError, StoreResult};
use crate::storage::{entry, keys, KeyValueStore};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::time::sleep;

/// What happened to an appended message
#[derive(Debug, Clone, PartialEq)]
pub enum AppendOutcome {
    /// Written and verified
    Persisted(Message),
    /// Persistence failed; the retry queue owns it now
    Queued(Message),
    /// `system` messages are display-only
    Ephemeral(Message),
}

impl AppendOutcome {
    pub fn message(&self) -> &Message {
        match self {
            AppendOutcome::Persisted(m) | AppendOutcome::Queued(m) | AppendOutcome::Ephemeral(m) => m,
        }
    }

    pub fn into_message(self) -> Message {
        match self {
            AppendOutcome::Persisted(m) | AppendOutcome::Queued(m) | AppendOutcome::Ephemeral(m) => m,
        }
    }

    pub fn is_persisted(&self) -> bool {
        matches!(self, AppendOutcome::Persisted(_))
    }
}

/// Single writer of the persisted history
pub struct HistoryRepository {
    writer: Arc<HistoryWriter>,
    queue: RetryQueue,
}

struct HistoryWriter {
    store: Arc<dyn KeyValueStore>,
    config: HistoryConfig,
}

impl HistoryRepository {
    pub fn new(store: Arc<dyn KeyValueStore>, config: HistoryConfig, queue_config: QueueConfig) -> Self {
        let writer = Arc::new(HistoryWriter { store, config });
        let queue = RetryQueue::new(writer.clone(), queue_config.drain_delay());
        Self { writer, queue }
    }

    pub fn queue(&self) -> &RetryQueue {
        &self.queue
    }

    /// Append a message to the persisted history
    ///
    /// Never fails from the caller's point of view: after the configured
    /// attempts the message is queued for background retry.
    pub async fn append(&self, text: impl Into<String>, kind: MessageKind) -> AppendOutcome {
        let message = Message::new(text, kind);

        if !kind.is_persistent() {
            tracing::trace!("[HistoryRepository] Not persisting {} message", kind);
            return AppendOutcome::Ephemeral(message);
        }

        match self.writer.persist_message(&message).await {
            Ok(()) => AppendOutcome::Persisted(message),
            Err(e) => {
                tracing::error!(
                    "[HistoryRepository] Giving up on direct save of {}, queueing: {}",
                    message.id,
                    e
                );
                self.queue.enqueue(message.text.clone(), message.kind);
                AppendOutcome::Queued(message)
            }
        }
    }

    /// Load the history in ascending creation order
    ///
    /// Malformed data reads as empty; store failures are retried and then
    /// also read as empty so the caller can keep going.
    pub async fn load(&self) -> Vec<Message> {
        let attempts = self.writer.config.load_attempts.max(1);

        for attempt in 1..=attempts {
            match self.writer.store.get_one(keys::CHAT_HISTORY).await {
                Ok(value) => {
                    let mut history = decode_history(value).unwrap_or_else(|e| {
                        tracing::warn!("[HistoryRepository] Treating history as empty: {}", e);
                        Vec::new()
                    });
                    sort_by_created_at(&mut history);
                    tracing::debug!("[HistoryRepository] Loaded {} messages", history.len());
                    return history;
                }
                Err(e) => {
                    tracing::warn!(
                        "[HistoryRepository] Load attempt {}/{} failed: {}",
                        attempt,
                        attempts,
                        e
                    );
                    if attempt < attempts {
                        sleep(self.writer.config.retry_delay()).await;
                    }
                }
            }
        }

        tracing::error!("[HistoryRepository] Failed to load chat history after all retries");
        Vec::new()
    }

    /// Remove history and the pending-response slot, then confirm the history reads back empty
    pub async fn clear(&self) -> StoreResult<()> {
        self.queue.clear();

        let store = &self.writer.store;
        store
            .remove(&[keys::CHAT_HISTORY, keys::PENDING_RESPONSE])
            .await?;
        // Some stores only honour full overwrites
        store
            .set(entry(keys::CHAT_HISTORY, Value::Array(Vec::new())))
            .await?;

        let remaining = decode_history(store.get_one(keys::CHAT_HISTORY).await?)
            .map_err(|e| StorageError::VerificationFailed(format!("history unreadable after clear: {}", e)))?;

        if !remaining.is_empty() {
            return Err(StorageError::VerificationFailed(format!(
                "{} messages still stored after clear",
                remaining.len()
            )));
        }

        tracing::info!("[HistoryRepository] Chat history cleared");
        Ok(())
    }
}

impl HistoryWriter {
    async fn persist_message(&self, message: &Message) -> StoreResult<()> {
        let attempts = self.config.persist_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            match self.write_and_verify(message).await {
                Ok(()) => {
                    tracing::debug!(
                        "[HistoryRepository] Saved {} on attempt {}",
                        message.id,
                        attempt
                    );
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(
                        "[HistoryRepository] Save attempt {}/{} failed: {}",
                        attempt,
                        attempts,
                        e
                    );
                    last_error = Some(e);
                    if attempt < attempts {
                        sleep(self.config.retry_delay()).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| StorageError::unavailable("no save attempt made")))
    }

    async fn write_and_verify(&self, message: &Message) -> StoreResult<()> {
        let current = self.store.get_one(keys::CHAT_HISTORY).await?;
        let mut history = decode_history(current).unwrap_or_else(|e| {
            tracing::warn!("[HistoryRepository] Replacing unreadable history: {}", e);
            Vec::new()
        });

        // An earlier attempt may have landed and been overtaken by another writer;
        // move it back to the end instead of leaving it buried or adding a copy
        history.retain(|m| m.id != message.id);
        history.push(message.clone());

        if history.len() > self.config.max_entries {
            let overflow = history.len() - self.config.max_entries;
            history.drain(..overflow);
        }

        let value = serde_json::to_value(&history).map_err(|e| StorageError::MalformedData {
            key: keys::CHAT_HISTORY.to_string(),
            reason: e.to_string(),
        })?;
        self.store.set(entry(keys::CHAT_HISTORY, value)).await?;

        let written = self.store.get_one(keys::CHAT_HISTORY).await?;
        let written = decode_history(written)
            .map_err(|e| StorageError::VerificationFailed(e.to_string()))?;

        match written.last() {
            Some(last) if last.id == message.id => Ok(()),
            Some(last) => Err(StorageError::VerificationFailed(format!(
                "expected last entry {}, found {}",
                message.id, last.id
            ))),
            None => Err(StorageError::VerificationFailed(format!(
                "history empty after writing {}",
                message.id
            ))),
        }
    }
}

#[async_trait]
impl PersistTarget for HistoryWriter {
    async fn persist(&self, entry: &PendingEntry) -> StoreResult<Message> {
        let message = Message::new(entry.text.clone(), entry.kind);
        self.persist_message(&message).await?;
        Ok(message)
    }
}

/// Decode the stored history value
///
/// A missing value is an empty history. A value that is not an array is
/// malformed. Individual entries that cannot be decoded are skipped.
fn decode_history(value: Option<Value>) -> StoreResult<Vec<Message>> {
    let items = match value {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(other) => {
            return Err(StorageError::MalformedData {
                key: keys::CHAT_HISTORY.to_string(),
                reason: format!("expected an array, found {}", json_type(&other)),
            })
        }
    };

    let total = items.len();
    let history: Vec<Message> = items
        .into_iter()
        .filter_map(|item| serde_json::from_value::<Message>(item).ok())
        .filter(|m| m.kind.is_persistent())
        .collect();

    if history.len() < total {
        tracing::warn!(
            "[HistoryRepository] Skipped {} unreadable history entries",
            total - history.len()
        );
    }
    Ok(history)
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

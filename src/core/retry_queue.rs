//! Retry Queue for messages that failed to persist
//!
//! Information Hiding:
//! - Queue storage and the in-progress flag live inside the instance, never in module state
//! - Drain scheduling hidden behind `enqueue`
//! - Head-of-line blocking: an entry is only removed once its own persistence succeeds

use super::message::{Message, MessageKind};
use crate::error::StoreResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;
use tokio::time::{sleep, Duration};

/// A message whose persistence attempt failed
#[derive(Debug, Clone, PartialEq)]
pub struct PendingEntry {
    pub text: String,
    pub kind: MessageKind,
    pub enqueued_at: DateTime<Utc>,
    seq: u64,
}

/// Where drained entries are written
#[async_trait]
pub trait PersistTarget: Send + Sync {
    /// Persist one logical message, returning the stored message
    async fn persist(&self, entry: &PendingEntry) -> StoreResult<Message>;
}

/// In-memory queue with a single drain loop
/// Cloning yields another handle onto the same queue
#[derive(Clone)]
pub struct RetryQueue {
    shared: Arc<QueueShared>,
}

struct QueueShared {
    target: Arc<dyn PersistTarget>,
    entries: Mutex<VecDeque<PendingEntry>>,
    // Flipped only while `entries` is locked
    draining: AtomicBool,
    next_seq: AtomicU64,
    idle: Notify,
    drain_delay: Duration,
}

impl QueueShared {
    fn entries(&self) -> MutexGuard<'_, VecDeque<PendingEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl RetryQueue {
    pub fn new(target: Arc<dyn PersistTarget>, drain_delay: Duration) -> Self {
        Self {
            shared: Arc::new(QueueShared {
                target,
                entries: Mutex::new(VecDeque::new()),
                draining: AtomicBool::new(false),
                next_seq: AtomicU64::new(0),
                idle: Notify::new(),
                drain_delay,
            }),
        }
    }

    /// Queue a message and start draining if no drain is running
    ///
    /// Must be called from within a Tokio runtime.
    pub fn enqueue(&self, text: impl Into<String>, kind: MessageKind) -> PendingEntry {
        let entry = PendingEntry {
            text: text.into(),
            kind,
            enqueued_at: Utc::now(),
            seq: self.shared.next_seq.fetch_add(1, Ordering::SeqCst),
        };

        let start_drain = {
            let mut entries = self.shared.entries();
            entries.push_back(entry.clone());
            !self.shared.draining.swap(true, Ordering::SeqCst)
        };

        tracing::debug!(
            "[RetryQueue] Queued {} message ({} pending)",
            entry.kind,
            self.len()
        );

        if start_drain {
            tokio::spawn(drain(Arc::clone(&self.shared)));
        }

        entry
    }

    pub fn len(&self) -> usize {
        self.shared.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_draining(&self) -> bool {
        self.shared.draining.load(Ordering::SeqCst)
    }

    /// Pending entries in submission order
    pub fn snapshot(&self) -> Vec<PendingEntry> {
        self.shared.entries().iter().cloned().collect()
    }

    /// Drop every pending entry; a running drain exits after its current attempt
    pub fn clear(&self) {
        let dropped = {
            let mut entries = self.shared.entries();
            let dropped = entries.len();
            entries.clear();
            dropped
        };
        if dropped > 0 {
            tracing::info!("[RetryQueue] Dropped {} pending messages", dropped);
        }
    }

    /// Resolve once no drain loop is running
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            if !self.is_draining() {
                return;
            }
            notified.await;
        }
    }
}

async fn drain(shared: Arc<QueueShared>) {
    tracing::debug!("[RetryQueue] Drain started");

    loop {
        let head = {
            let entries = shared.entries();
            match entries.front() {
                Some(entry) => entry.clone(),
                None => {
                    shared.draining.store(false, Ordering::SeqCst);
                    break;
                }
            }
        };

        match shared.target.persist(&head).await {
            Ok(message) => {
                let mut entries = shared.entries();
                // The queue may have been cleared while the attempt was in flight
                if entries.front().map(|e| e.seq) == Some(head.seq) {
                    entries.pop_front();
                }
                tracing::debug!(
                    "[RetryQueue] Persisted queued message {} ({} pending)",
                    message.id,
                    entries.len()
                );
            }
            Err(e) => {
                tracing::warn!(
                    "[RetryQueue] Failed to persist queued message, retrying in {:?}: {}",
                    shared.drain_delay,
                    e
                );
                sleep(shared.drain_delay).await;
            }
        }
    }

    shared.idle.notify_waiters();
    tracing::debug!("[RetryQueue] Drain finished, queue empty");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;

    /// Fails the first `fail_counts[text]` attempts for each text
    struct MockTarget {
        fail_counts: Mutex<HashMap<String, usize>>,
        persisted: Mutex<Vec<String>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl MockTarget {
        fn new(fail_counts: &[(&str, usize)]) -> Arc<Self> {
            Arc::new(Self {
                fail_counts: Mutex::new(
                    fail_counts.iter().map(|(t, n)| (t.to_string(), *n)).collect(),
                ),
                persisted: Mutex::new(Vec::new()),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            })
        }

        fn persisted(&self) -> Vec<String> {
            self.persisted.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PersistTarget for MockTarget {
        async fn persist(&self, entry: &PendingEntry) -> StoreResult<Message> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::task::yield_now().await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let should_fail = {
                let mut counts = self.fail_counts.lock().unwrap();
                match counts.get_mut(&entry.text) {
                    Some(remaining) if *remaining > 0 => {
                        *remaining -= 1;
                        true
                    }
                    _ => false,
                }
            };

            if should_fail {
                return Err(StorageError::unavailable("simulated outage"));
            }
            self.persisted.lock().unwrap().push(entry.text.clone());
            Ok(Message::new(entry.text.clone(), entry.kind))
        }
    }

    #[tokio::test]
    async fn test_drains_in_submission_order() {
        let target = MockTarget::new(&[]);
        let queue = RetryQueue::new(target.clone(), Duration::from_millis(1));

        queue.enqueue("A", MessageKind::User);
        queue.enqueue("B", MessageKind::Assistant);
        queue.enqueue("C", MessageKind::Error);
        queue.wait_idle().await;

        assert!(queue.is_empty());
        assert_eq!(target.persisted(), vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn test_head_of_line_blocking() {
        let target = MockTarget::new(&[("A", 3)]);
        let queue = RetryQueue::new(target.clone(), Duration::from_millis(1));

        queue.enqueue("A", MessageKind::User);
        queue.enqueue("B", MessageKind::User);
        queue.wait_idle().await;

        // B is never attempted while A is still failing
        assert_eq!(target.persisted(), vec!["A", "B"]);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_only_one_drain_runs() {
        let target = MockTarget::new(&[("first", 2)]);
        let queue = RetryQueue::new(target.clone(), Duration::from_millis(1));

        for i in 0..10 {
            let text = if i == 0 { "first".to_string() } else { format!("msg {}", i) };
            queue.enqueue(text, MessageKind::User);
        }
        queue.wait_idle().await;

        assert_eq!(target.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(target.persisted().len(), 10);
    }

    #[tokio::test]
    async fn test_clear_drops_pending_entries() {
        let target = MockTarget::new(&[("stuck", usize::MAX)]);
        let queue = RetryQueue::new(target.clone(), Duration::from_millis(5));

        queue.enqueue("stuck", MessageKind::User);
        queue.enqueue("behind", MessageKind::User);
        assert_eq!(queue.len(), 2);

        queue.clear();
        tokio::time::timeout(Duration::from_secs(5), queue.wait_idle())
            .await
            .expect("drain should stop once the queue is cleared");

        assert!(queue.is_empty());
        assert!(target.persisted().is_empty());
    }

    #[tokio::test]
    async fn test_enqueue_after_idle_restarts_drain() {
        let target = MockTarget::new(&[]);
        let queue = RetryQueue::new(target.clone(), Duration::from_millis(1));

        queue.enqueue("one", MessageKind::User);
        queue.wait_idle().await;
        assert!(!queue.is_draining());

        queue.enqueue("two", MessageKind::User);
        queue.wait_idle().await;
        assert_eq!(target.persisted(), vec!["one", "two"]);
    }
}

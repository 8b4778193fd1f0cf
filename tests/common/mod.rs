//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use taxmate::error::{StorageError, StoreResult};
use serde_json::Value;
use taxmate::storage::{entry, keys, InMemoryStore, KeyValueStore, StoreMap};
use taxmate::Settings;

/// In-memory store with switchable faults
///
/// - `fail_sets(n)`: the next n `set` calls report an error
/// - `drop_sets(n)`: the next n `set` calls report success but store nothing
/// - `fail_gets(n)`: the next n `get` calls report an error
/// - `ignore_removes(n)`: the next n `remove` calls report success but remove nothing
/// - `interleave_history(entry)`: right after the next `chat_history` write lands,
///   another writer appends `entry`
/// - `set_down(true)`: every operation fails until switched back
#[derive(Default)]
pub struct FlakyStore {
    inner: InMemoryStore,
    down: AtomicBool,
    failing_sets: AtomicUsize,
    dropped_sets: AtomicUsize,
    failing_gets: AtomicUsize,
    ignored_removes: AtomicUsize,
    interleaved: Mutex<Option<Value>>,
    set_calls: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn fail_sets(&self, n: usize) {
        self.failing_sets.store(n, Ordering::SeqCst);
    }

    pub fn drop_sets(&self, n: usize) {
        self.dropped_sets.store(n, Ordering::SeqCst);
    }

    pub fn fail_gets(&self, n: usize) {
        self.failing_gets.store(n, Ordering::SeqCst);
    }

    pub fn ignore_removes(&self, n: usize) {
        self.ignored_removes.store(n, Ordering::SeqCst);
    }

    pub fn interleave_history(&self, entry: Value) {
        *self.interleaved.lock().unwrap() = Some(entry);
    }

    pub fn set_calls(&self) -> usize {
        self.set_calls.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &InMemoryStore {
        &self.inner
    }

    fn check_up(&self) -> StoreResult<()> {
        if self.down.load(Ordering::SeqCst) {
            Err(StorageError::unavailable("simulated outage"))
        } else {
            Ok(())
        }
    }
}

/// Decrement a fault counter, returning true if a fault should fire
fn take(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl KeyValueStore for FlakyStore {
    async fn get(&self, keys: &[&str]) -> StoreResult<StoreMap> {
        self.check_up()?;
        if take(&self.failing_gets) {
            return Err(StorageError::unavailable("simulated read failure"));
        }
        self.inner.get(keys).await
    }

    async fn get_all(&self) -> StoreResult<StoreMap> {
        self.check_up()?;
        if take(&self.failing_gets) {
            return Err(StorageError::unavailable("simulated read failure"));
        }
        self.inner.get_all().await
    }

    async fn set(&self, items: StoreMap) -> StoreResult<()> {
        self.set_calls.fetch_add(1, Ordering::SeqCst);
        self.check_up()?;
        if take(&self.failing_sets) {
            return Err(StorageError::unavailable("simulated write failure"));
        }
        if take(&self.dropped_sets) {
            return Ok(());
        }
        let touches_history = items.contains_key(keys::CHAT_HISTORY);
        self.inner.set(items).await?;

        if touches_history {
            let foreign = self.interleaved.lock().unwrap().take();
            if let Some(foreign) = foreign {
                let mut history = match self.inner.get_one(keys::CHAT_HISTORY).await? {
                    Some(Value::Array(items)) => items,
                    _ => Vec::new(),
                };
                history.push(foreign);
                self.inner
                    .set(entry(keys::CHAT_HISTORY, Value::Array(history)))
                    .await?;
            }
        }
        Ok(())
    }

    async fn remove(&self, keys: &[&str]) -> StoreResult<()> {
        self.check_up()?;
        if take(&self.ignored_removes) {
            return Ok(());
        }
        self.inner.remove(keys).await
    }

    async fn share_session_tier(&self) -> StoreResult<bool> {
        self.check_up()?;
        self.inner.share_session_tier().await
    }
}

/// Settings with millisecond delays so retry paths finish quickly
pub fn fast_settings() -> Settings {
    let mut settings = Settings::immediate();
    settings.history.retry_delay_ms = 1;
    settings.queue.drain_delay_ms = 5;
    settings.probe.delay_ms = 1;
    settings.session.init_retry_delay_ms = 1;
    settings
}

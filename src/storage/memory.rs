//! In-Memory Key-Value Store
//!
//! Information Hiding:
//! - Map storage structure hidden from users
//! - Thread-safe access via RwLock hidden behind async interface
//! - Suitable for testing and ephemeral sessions

use super::{KeyValueStore, StoreMap};
use crate::error::StoreResult;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory store with a session tier
/// Data is lost when process terminates
pub struct InMemoryStore {
    values: Arc<RwLock<StoreMap>>,
    session_shared: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            values: Arc::new(RwLock::new(StoreMap::new())),
            session_shared: AtomicBool::new(false),
        }
    }

    pub fn with_values(values: StoreMap) -> Self {
        Self {
            values: Arc::new(RwLock::new(values)),
            session_shared: AtomicBool::new(false),
        }
    }

    pub fn is_session_shared(&self) -> bool {
        self.session_shared.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn get(&self, keys: &[&str]) -> StoreResult<StoreMap> {
        let values = self.values.read().await;
        let found: StoreMap = keys
            .iter()
            .filter_map(|key| values.get(*key).map(|v| (key.to_string(), v.clone())))
            .collect();
        tracing::trace!("[InMemoryStore] Read {}/{} keys", found.len(), keys.len());
        Ok(found)
    }

    async fn get_all(&self) -> StoreResult<StoreMap> {
        Ok(self.values.read().await.clone())
    }

    async fn set(&self, items: StoreMap) -> StoreResult<()> {
        let mut values = self.values.write().await;
        let count = items.len();
        values.extend(items);
        tracing::trace!("[InMemoryStore] Wrote {} keys", count);
        Ok(())
    }

    async fn remove(&self, keys: &[&str]) -> StoreResult<()> {
        let mut values = self.values.write().await;
        for key in keys {
            values.remove(*key);
        }
        Ok(())
    }

    async fn share_session_tier(&self) -> StoreResult<bool> {
        self.session_shared.store(true, Ordering::SeqCst);
        Ok(true)
    }
}

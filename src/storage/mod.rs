//! Key-Value Store Abstraction
//!
//! Information Hiding:
//! - Storage backend implementation details hidden behind trait
//! - Allows swapping between memory, filesystem and SQLite without API changes
//! - Every backend failure is reported as `StorageError::Unavailable`; callers decide on retries

use crate::config::{StorageBackend, StorageConfig};
use crate::error::StoreResult;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;

pub mod filesystem;
pub mod memory;
pub mod sqlite;

pub use filesystem::FileSystemStore;
pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// Key/value pairs read from or written to a store
pub type StoreMap = Map<String, Value>;

/// Persisted key layout
pub mod keys {
    pub const CHAT_HISTORY: &str = "chat_history";
    pub const API_KEY: &str = "openai_api_key";
    pub const MODEL: &str = "openai_model";
    pub const PENDING_RESPONSE: &str = "lastPendingResponse";
}

/// Trait defining the local key-value store interface
/// Implementations never retry; a failed operation returns an error instead of partial data
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read the given keys; absent keys are missing from the returned map
    async fn get(&self, keys: &[&str]) -> StoreResult<StoreMap>;

    /// Read every stored key
    async fn get_all(&self) -> StoreResult<StoreMap>;

    /// Write all pairs, replacing existing values
    async fn set(&self, items: StoreMap) -> StoreResult<()>;

    /// Remove the given keys; removing an absent key is not an error
    async fn remove(&self, keys: &[&str]) -> StoreResult<()>;

    /// Open the session-scoped tier to every context
    /// Returns false when the backend has no session tier
    async fn share_session_tier(&self) -> StoreResult<bool> {
        Ok(false)
    }

    /// Read a single key
    async fn get_one(&self, key: &str) -> StoreResult<Option<Value>> {
        let mut values = self.get(&[key]).await?;
        Ok(values.remove(key))
    }
}

/// Build the store selected in configuration
pub async fn open_store(config: &StorageConfig) -> Result<Arc<dyn KeyValueStore>> {
    let store: Arc<dyn KeyValueStore> = match config.backend {
        StorageBackend::Memory => Arc::new(InMemoryStore::new()),
        StorageBackend::Filesystem => {
            Arc::new(FileSystemStore::new(PathBuf::from(&config.path)).await?)
        }
        StorageBackend::Sqlite => Arc::new(SqliteStore::open(PathBuf::from(&config.path)).await?),
    };

    tracing::debug!("Opened {:?} store at '{}'", config.backend, config.path);
    Ok(store)
}

/// Build a single-entry map
pub fn entry(key: &str, value: Value) -> StoreMap {
    let mut map = StoreMap::new();
    map.insert(key.to_string(), value);
    map
}

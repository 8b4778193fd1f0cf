//! File System Key-Value Store
//!
//! Information Hiding:
//! - File path and JSON document format hidden from users
//! - Writes go through a temporary file and a rename so a crash never leaves half a document
//! - Read-modify-write of the document is serialized inside the process

use super::{KeyValueStore, StoreMap};
use crate::error::{StorageError, StoreResult};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use tokio::fs;
use tokio::sync::Mutex;

const DOCUMENT_NAME: &str = "store.json";

/// File system store - all keys live in one JSON object
/// The document is stored as {base_path}/store.json
pub struct FileSystemStore {
    base_path: PathBuf,
    lock: Mutex<()>,
}

impl FileSystemStore {
    pub async fn new(base_path: PathBuf) -> Result<Self> {
        // Create base directory if it doesn't exist
        fs::create_dir_all(&base_path)
            .await
            .context("Failed to create storage directory")?;

        Ok(Self {
            base_path,
            lock: Mutex::new(()),
        })
    }

    fn document_path(&self) -> PathBuf {
        self.base_path.join(DOCUMENT_NAME)
    }

    async fn read_document(&self) -> StoreResult<StoreMap> {
        let path = self.document_path();

        let json = match fs::read_to_string(&path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("[FileSystemStore] No document at {:?} yet", path);
                return Ok(StoreMap::new());
            }
            Err(e) => {
                return Err(StorageError::unavailable(format!(
                    "failed to read {:?}: {}",
                    path, e
                )))
            }
        };

        match serde_json::from_str::<Value>(&json) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(StorageError::unavailable(format!(
                "store document {:?} is not a JSON object",
                path
            ))),
            Err(e) => Err(StorageError::unavailable(format!(
                "store document {:?} is corrupt: {}",
                path, e
            ))),
        }
    }

    async fn write_document(&self, document: &StoreMap) -> StoreResult<()> {
        let path = self.document_path();
        let tmp_path = self.base_path.join(format!("{}.tmp", DOCUMENT_NAME));

        let json = serde_json::to_string_pretty(document)
            .map_err(|e| StorageError::unavailable(format!("failed to serialize store: {}", e)))?;

        fs::write(&tmp_path, json)
            .await
            .map_err(|e| StorageError::unavailable(format!("failed to write {:?}: {}", tmp_path, e)))?;
        fs::rename(&tmp_path, &path)
            .await
            .map_err(|e| StorageError::unavailable(format!("failed to replace {:?}: {}", path, e)))?;

        tracing::debug!("[FileSystemStore] Wrote {} keys to {:?}", document.len(), path);
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileSystemStore {
    async fn get(&self, keys: &[&str]) -> StoreResult<StoreMap> {
        let _guard = self.lock.lock().await;
        let mut document = self.read_document().await?;

        Ok(keys
            .iter()
            .filter_map(|key| document.remove(*key).map(|v| (key.to_string(), v)))
            .collect())
    }

    async fn get_all(&self) -> StoreResult<StoreMap> {
        let _guard = self.lock.lock().await;
        self.read_document().await
    }

    async fn set(&self, items: StoreMap) -> StoreResult<()> {
        let _guard = self.lock.lock().await;
        let mut document = self.read_document().await?;
        document.extend(items);
        self.write_document(&document).await
    }

    async fn remove(&self, keys: &[&str]) -> StoreResult<()> {
        let _guard = self.lock.lock().await;
        let mut document = self.read_document().await?;

        let before = document.len();
        for key in keys {
            document.remove(*key);
        }

        if document.len() == before {
            tracing::debug!("[FileSystemStore] Nothing to remove for {:?}", keys);
            return Ok(());
        }
        self.write_document(&document).await
    }
}

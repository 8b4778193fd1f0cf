//! SQLite Key-Value Store
//!
//! Information Hiding:
//! - Table layout hidden behind the store trait
//! - Values are stored as JSON text, one row per key
//! - Blocking rusqlite calls run on the blocking thread pool

use super::{KeyValueStore, StoreMap};
use crate::error::{StorageError, StoreResult};
use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS kv_store (
    key   TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL
)";

pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub async fn open(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create database directory")?;
        }

        let conn = tokio::task::spawn_blocking(move || Connection::open(&path))
            .await
            .context("Database open task panicked")?
            .context("Failed to open database")?;

        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to create database")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute(SCHEMA, [])
            .context("Failed to create kv_store table")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, op: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| StorageError::unavailable("database connection poisoned"))?;
            op(&mut guard).map_err(StorageError::unavailable)
        })
        .await
        .map_err(|e| StorageError::unavailable(format!("database task failed: {}", e)))?
    }
}

fn decode_rows(rows: Vec<(String, String)>) -> StoreResult<StoreMap> {
    rows.into_iter()
        .map(|(key, raw)| {
            serde_json::from_str::<Value>(&raw)
                .map(|value| (key.clone(), value))
                .map_err(|e| StorageError::unavailable(format!("value for '{}' is corrupt: {}", key, e)))
        })
        .collect()
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get(&self, keys: &[&str]) -> StoreResult<StoreMap> {
        let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        let rows = self
            .with_conn(move |conn| {
                let mut stmt = conn.prepare("SELECT value FROM kv_store WHERE key = ?1")?;
                let mut rows = Vec::new();
                for key in keys {
                    let value: Option<String> =
                        stmt.query_row(params![key], |row| row.get(0)).optional()?;
                    if let Some(value) = value {
                        rows.push((key, value));
                    }
                }
                Ok(rows)
            })
            .await?;

        decode_rows(rows)
    }

    async fn get_all(&self) -> StoreResult<StoreMap> {
        let rows = self
            .with_conn(|conn| {
                let mut stmt = conn.prepare("SELECT key, value FROM kv_store ORDER BY key")?;
                let rows = stmt
                    .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                    .collect::<rusqlite::Result<Vec<(String, String)>>>()?;
                Ok(rows)
            })
            .await?;

        decode_rows(rows)
    }

    async fn set(&self, items: StoreMap) -> StoreResult<()> {
        let rows: Vec<(String, String)> = items
            .into_iter()
            .map(|(key, value)| (key, value.to_string()))
            .collect();
        let count = rows.len();

        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO kv_store (key, value) VALUES (?1, ?2)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                )?;
                for (key, value) in &rows {
                    stmt.execute(params![key, value])?;
                }
            }
            tx.commit()
        })
        .await?;

        tracing::debug!("[SqliteStore] Wrote {} keys", count);
        Ok(())
    }

    async fn remove(&self, keys: &[&str]) -> StoreResult<()> {
        let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            for key in &keys {
                tx.execute("DELETE FROM kv_store WHERE key = ?1", params![key])?;
            }
            tx.commit()
        })
        .await
    }
}

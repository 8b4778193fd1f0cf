//! Storage Availability Prober
//!
//! Confirms the store answers a write/read round-trip before anything else
//! trusts it.

use crate::error::{StorageError, StoreResult};
use crate::storage::{entry, KeyValueStore};
use serde_json::Value;
use std::sync::Arc;
use tokio::time::{sleep, Duration};

pub const PROBE_KEY: &str = "test_key";
pub const PROBE_VALUE: &str = "test_value";

/// Key read by the lightweight availability check
const CHECK_KEY: &str = "test";

#[derive(Clone)]
pub struct StorageProber {
    store: Arc<dyn KeyValueStore>,
}

impl StorageProber {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Returns true on the first attempt whose round-trip reads back exactly what was written
    pub async fn probe(&self, max_attempts: u32, delay: Duration) -> bool {
        for attempt in 1..=max_attempts {
            match self.round_trip().await {
                Ok(()) => {
                    tracing::info!("[StorageProber] Storage check successful on attempt {}", attempt);
                    return true;
                }
                Err(e) => {
                    tracing::warn!(
                        "[StorageProber] Storage check failed attempt {}/{}: {}",
                        attempt,
                        max_attempts,
                        e
                    );
                    if attempt < max_attempts {
                        sleep(delay).await;
                    }
                }
            }
        }

        tracing::error!("[StorageProber] Storage unavailable after {} attempts", max_attempts);
        false
    }

    /// Single write-then-read of the sentinel value
    pub async fn round_trip(&self) -> StoreResult<()> {
        let expected = Value::String(PROBE_VALUE.to_string());
        self.store.set(entry(PROBE_KEY, expected.clone())).await?;

        match self.store.get_one(PROBE_KEY).await? {
            Some(found) if found == expected => Ok(()),
            found => Err(StorageError::VerificationFailed(format!(
                "storage test failed: value mismatch (found {:?})",
                found
            ))),
        }
    }

    /// Minimal read used by cross-context availability checks
    pub async fn check_readable(&self) -> StoreResult<()> {
        self.store.get(&[CHECK_KEY]).await.map(|_| ())
    }
}

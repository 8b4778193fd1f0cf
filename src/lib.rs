//! Taxmate - tax assistant chat client with durable local history
//!
//! This library keeps a chat history consistent across a UI context, a local
//! key-value store and a background coordinator, even when the store is slow
//! or temporarily unavailable.

pub mod actors;
mod config;
pub mod core;
pub mod error;
pub mod storage;
pub mod utils;

pub mod api;
pub mod cli;

pub use actors::{CoordinatorEvent, CoordinatorHandle, LifecycleEvent};
pub use api::ChatSession;
pub use config::{
    CoordinatorConfig, HistoryConfig, LLMConfig, LoggingConfig, ProbeConfig, QueueConfig,
    SessionConfig, Settings, StorageBackend, StorageConfig,
};
pub use core::{AppendOutcome, HistoryRepository, Message, MessageKind, RetryQueue};
pub use error::{ApiError, StorageError};

use std::sync::Arc;
use storage::KeyValueStore;
use tokio::sync::broadcast;

/// A running instance: one store, one coordinator, any number of sessions
pub struct System {
    store: Arc<dyn KeyValueStore>,
    coordinator: CoordinatorHandle,
    settings: Settings,
}

impl System {
    /// Wrap an existing store and spawn the coordinator
    /// Must be called from within a Tokio runtime
    pub fn new(store: Arc<dyn KeyValueStore>, settings: Settings) -> Self {
        let coordinator = CoordinatorHandle::new(store.clone(), settings.clone());
        Self {
            store,
            coordinator,
            settings,
        }
    }

    /// Open the configured store, spawn the coordinator and run startup initialization
    ///
    /// The returned receiver is subscribed before initialization runs, so a
    /// `storageInitError` raised during startup is delivered to it. An
    /// initialization failure does not stop the system.
    pub async fn start(
        settings: Settings,
    ) -> anyhow::Result<(Self, broadcast::Receiver<CoordinatorEvent>)> {
        let store = storage::open_store(&settings.storage).await?;
        Ok(Self::start_with_store(store, settings).await)
    }

    /// Same as `start`, over an already opened store
    pub async fn start_with_store(
        store: Arc<dyn KeyValueStore>,
        settings: Settings,
    ) -> (Self, broadcast::Receiver<CoordinatorEvent>) {
        let system = Self::new(store, settings);
        let events = system.coordinator.subscribe();

        if let Err(e) = system.coordinator.notify_lifecycle(LifecycleEvent::Startup).await {
            tracing::error!("{}", e);
        }

        tracing::info!("Taxmate system initialized");
        (system, events)
    }

    pub fn store(&self) -> Arc<dyn KeyValueStore> {
        self.store.clone()
    }

    pub fn coordinator(&self) -> &CoordinatorHandle {
        &self.coordinator
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn session(&self) -> ChatSession {
        ChatSession::new(self.store.clone(), self.coordinator.clone(), self.settings.clone())
    }

    /// Shutdown the coordinator gracefully
    pub async fn shutdown(&self) -> anyhow::Result<()> {
        self.coordinator.shutdown().await?;
        tracing::info!("Taxmate system shutdown complete");
        Ok(())
    }
}

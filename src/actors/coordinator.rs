use crate::actors::messages::*;
use crate::config::{CoordinatorConfig, Settings};
use crate::core::{HistoryRepository, StorageProber};
use crate::error::StoreResult;
use crate::storage::{keys, KeyValueStore, StoreMap};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc::{channel, Receiver, Sender};
use tokio::sync::{broadcast, oneshot};
use tokio::time::{sleep, Duration};

const NO_RESPONSE: &str = "No response from coordinator";

/// Handle onto the background coordinator
/// Cloning is cheap; every clone talks to the same actor
#[derive(Clone)]
pub struct CoordinatorHandle {
    sender: Sender<CoordinatorMessage>,
    events: broadcast::Sender<CoordinatorEvent>,
}

impl CoordinatorHandle {
    pub fn new(store: Arc<dyn KeyValueStore>, settings: Settings) -> Self {
        let (sender, receiver) = channel(settings.coordinator.channel_buffer_size);
        let (events, _) = broadcast::channel(settings.coordinator.event_buffer_size);
        tokio::spawn(coordinator_actor(receiver, store, settings, events.clone()));
        Self { sender, events }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.events.subscribe()
    }

    async fn send_message(&self, message: CoordinatorMessage) -> anyhow::Result<()> {
        self.sender
            .send(message)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to send message to coordinator: {}", e))
    }

    /// Run storage initialization for an install, update or startup
    /// Failures are also broadcast as `storageInitError`
    pub async fn notify_lifecycle(&self, event: LifecycleEvent) -> anyhow::Result<()> {
        let (response, rx) = oneshot::channel();
        self.send_message(CoordinatorMessage::Lifecycle { event, response })
            .await?;

        rx.await
            .map_err(|e| anyhow::anyhow!("Coordinator dropped lifecycle request: {}", e))?
            .map_err(|e| anyhow::anyhow!("Storage initialization failed: {}", e))
    }

    pub async fn dispatch(&self, request: Request) -> anyhow::Result<Response> {
        let (response, rx) = oneshot::channel();
        self.send_message(CoordinatorMessage::Request { request, response })
            .await?;

        rx.await
            .map_err(|e| anyhow::anyhow!("Failed to receive coordinator response: {}", e))
    }

    /// Wire-level entry point: one JSON request in, one JSON response out
    pub async fn dispatch_json(&self, raw: &str) -> anyhow::Result<String> {
        let request: Request = serde_json::from_str(raw)?;
        let response = self.dispatch(request).await?;
        Ok(serde_json::to_string(&response)?)
    }

    pub async fn clear_history(&self) -> ClearHistoryResponse {
        match self.dispatch(Request::ClearHistory).await {
            Ok(Response::ClearHistory(response)) => response,
            Ok(_) => ClearHistoryResponse::failed("Unexpected response"),
            Err(e) => {
                tracing::error!("Clear history request failed: {}", e);
                ClearHistoryResponse::failed(NO_RESPONSE)
            }
        }
    }

    pub async fn check_storage(&self) -> StorageStatus {
        match self.dispatch(Request::CheckStorage).await {
            Ok(Response::CheckStorage(status)) => status,
            Ok(_) => StorageStatus::unavailable("Unexpected response"),
            Err(e) => {
                tracing::error!("Storage check request failed: {}", e);
                StorageStatus::unavailable(NO_RESPONSE)
            }
        }
    }

    pub async fn shutdown(&self) -> anyhow::Result<()> {
        self.send_message(CoordinatorMessage::Shutdown).await
    }
}

async fn coordinator_actor(
    mut receiver: Receiver<CoordinatorMessage>,
    store: Arc<dyn KeyValueStore>,
    settings: Settings,
    events: broadcast::Sender<CoordinatorEvent>,
) {
    let repository = Arc::new(HistoryRepository::new(
        store.clone(),
        settings.history.clone(),
        settings.queue.clone(),
    ));
    let prober = StorageProber::new(store.clone());

    tracing::info!("Coordinator actor started");

    while let Some(message) = receiver.recv().await {
        match message {
            CoordinatorMessage::Lifecycle { event, response } => {
                tracing::info!("Coordinator lifecycle event: {:?}", event);
                let result = initialize_storage(store.as_ref(), &settings.coordinator)
                    .await
                    .map_err(|e| e.to_string());

                if let Err(error) = &result {
                    tracing::error!("Storage initialization failed: {}", error);
                    // Nobody listening is fine
                    let _ = events.send(CoordinatorEvent::StorageInitError {
                        error: error.clone(),
                    });
                }
                let _ = response.send(result);
            }
            CoordinatorMessage::Request { request, response } => {
                let repository = Arc::clone(&repository);
                let prober = prober.clone();
                tokio::spawn(async move {
                    let reply = handle_request(request, &repository, &prober).await;
                    let _ = response.send(reply);
                });
            }
            CoordinatorMessage::Shutdown => {
                tracing::info!("Coordinator received shutdown signal");
                break;
            }
        }
    }

    tracing::info!("Coordinator actor stopped");
}

async fn handle_request(
    request: Request,
    repository: &HistoryRepository,
    prober: &StorageProber,
) -> Response {
    match request {
        Request::ClearHistory => match repository.clear().await {
            Ok(()) => Response::ClearHistory(ClearHistoryResponse::ok()),
            Err(e) => {
                tracing::error!("Error clearing history: {}", e);
                Response::ClearHistory(ClearHistoryResponse::failed(e.to_string()))
            }
        },
        Request::CheckStorage => match prober.check_readable().await {
            Ok(()) => Response::CheckStorage(StorageStatus::available()),
            Err(e) => {
                tracing::error!("Storage availability check failed: {}", e);
                Response::CheckStorage(StorageStatus::unavailable(e.to_string()))
            }
        },
    }
}

/// First-run defaults; existing values are never overwritten
fn missing_defaults(state: &StoreMap) -> StoreMap {
    let defaults = [
        (keys::CHAT_HISTORY, Value::Array(Vec::new())),
        (keys::API_KEY, Value::String(String::new())),
        (keys::PENDING_RESPONSE, Value::Null),
    ];

    defaults
        .into_iter()
        .filter(|(key, _)| !state.contains_key(*key))
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

async fn initialize_storage(store: &dyn KeyValueStore, config: &CoordinatorConfig) -> StoreResult<()> {
    // Give the host store a moment to come up
    sleep(Duration::from_millis(config.startup_delay_ms)).await;

    match store.share_session_tier().await {
        Ok(true) => tracing::info!("Session storage shared with all contexts"),
        Ok(false) => tracing::debug!("Store has no session tier"),
        Err(e) => tracing::warn!("Failed to share session storage: {}", e),
    }

    let state = store.get_all().await?;
    let updates = missing_defaults(&state);

    if !updates.is_empty() {
        let written: Vec<String> = updates.keys().cloned().collect();
        store.set(updates).await?;
        tracing::info!("Storage initialized with defaults for {:?}", written);
    }

    tracing::info!("Storage initialization completed successfully");
    Ok(())
}

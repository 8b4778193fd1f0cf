use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

/// Why the coordinator is (re)initializing storage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Installed,
    Updated,
    Startup,
}

/// Cross-context requests, tagged by `action` on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Request {
    ClearHistory,
    CheckStorage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearHistoryResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ClearHistoryResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageStatus {
    pub available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StorageStatus {
    pub fn available() -> Self {
        Self {
            available: true,
            error: None,
        }
    }

    pub fn unavailable(error: impl Into<String>) -> Self {
        Self {
            available: false,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    ClearHistory(ClearHistoryResponse),
    CheckStorage(StorageStatus),
}

/// Broadcast from the coordinator to every listening context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum CoordinatorEvent {
    StorageInitError { error: String },
}

#[derive(Debug)]
pub enum CoordinatorMessage {
    Lifecycle {
        event: LifecycleEvent,
        response: oneshot::Sender<Result<(), String>>,
    },
    Request {
        request: Request,
        response: oneshot::Sender<Response>,
    },
    Shutdown,
}

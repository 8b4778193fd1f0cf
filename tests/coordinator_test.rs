//! Coordinator lifecycle handling and request dispatch

mod common;

use common::{fast_settings, FlakyStore};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use taxmate::actors::{Request, Response};
use taxmate::storage::{entry, keys, InMemoryStore, KeyValueStore};
use taxmate::{
    CoordinatorEvent, CoordinatorHandle, HistoryRepository, LifecycleEvent, MessageKind, System,
};
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_startup_fills_defaults() {
    let store = Arc::new(InMemoryStore::new());
    let coordinator = CoordinatorHandle::new(store.clone(), fast_settings());

    coordinator
        .notify_lifecycle(LifecycleEvent::Installed)
        .await
        .unwrap();

    let state = store.get_all().await.unwrap();
    assert_eq!(state[keys::CHAT_HISTORY], json!([]));
    assert_eq!(state[keys::API_KEY], json!(""));
    assert_eq!(state[keys::PENDING_RESPONSE], Value::Null);
    assert!(store.is_session_shared());
}

#[tokio::test]
async fn test_update_keeps_existing_values() {
    let store = Arc::new(InMemoryStore::new());
    store.set(entry(keys::API_KEY, json!("sk-existing"))).await.unwrap();
    store
        .set(entry(
            keys::CHAT_HISTORY,
            json!([{"id": "1", "message": "kept", "type": "user", "timestamp": "2024-01-01T00:00:00Z"}]),
        ))
        .await
        .unwrap();

    let coordinator = CoordinatorHandle::new(store.clone(), fast_settings());
    coordinator
        .notify_lifecycle(LifecycleEvent::Updated)
        .await
        .unwrap();

    let state = store.get_all().await.unwrap();
    assert_eq!(state[keys::API_KEY], json!("sk-existing"));
    assert_eq!(state[keys::CHAT_HISTORY].as_array().map(Vec::len), Some(1));
    assert_eq!(state[keys::PENDING_RESPONSE], Value::Null);
}

#[tokio::test]
async fn test_init_failure_is_broadcast() {
    let store = FlakyStore::new();
    store.set_down(true);
    let coordinator = CoordinatorHandle::new(store.clone(), fast_settings());
    let mut events = coordinator.subscribe();

    let result = coordinator.notify_lifecycle(LifecycleEvent::Startup).await;
    assert!(result.is_err());

    let event = timeout(WAIT, events.recv()).await.unwrap().unwrap();
    match event {
        CoordinatorEvent::StorageInitError { error } => {
            assert!(error.contains("simulated outage"), "got: {}", error)
        }
    }
}

#[tokio::test]
async fn test_coordinator_survives_init_failure() {
    let store = FlakyStore::new();
    store.set_down(true);
    let coordinator = CoordinatorHandle::new(store.clone(), fast_settings());

    assert!(coordinator.notify_lifecycle(LifecycleEvent::Startup).await.is_err());

    store.set_down(false);
    assert!(coordinator.check_storage().await.available);
    assert!(coordinator.notify_lifecycle(LifecycleEvent::Startup).await.is_ok());
}

#[tokio::test]
async fn test_clear_history_request() {
    let store = Arc::new(InMemoryStore::new());
    let settings = fast_settings();
    let repo = HistoryRepository::new(store.clone(), settings.history.clone(), settings.queue.clone());
    repo.append("How do I file an extension?", MessageKind::User).await;
    repo.append("Use Form 4868.", MessageKind::Assistant).await;

    let coordinator = CoordinatorHandle::new(store.clone(), settings);
    let response = coordinator.clear_history().await;

    assert!(response.success);
    assert!(response.error.is_none());
    assert!(repo.load().await.is_empty());
}

#[tokio::test]
async fn test_clear_history_reports_failure() {
    let store = FlakyStore::new();
    let coordinator = CoordinatorHandle::new(store.clone(), fast_settings());
    store.set_down(true);

    let response = coordinator.clear_history().await;

    assert!(!response.success);
    assert!(response.error.is_some());
}

#[tokio::test]
async fn test_check_storage_reports_outage() {
    let store = FlakyStore::new();
    let coordinator = CoordinatorHandle::new(store.clone(), fast_settings());

    assert!(coordinator.check_storage().await.available);

    store.set_down(true);
    let status = coordinator.check_storage().await;
    assert!(!status.available);
    assert!(status.error.unwrap().contains("simulated outage"));
}

#[tokio::test]
async fn test_dispatch_json_round_trip() {
    let store = Arc::new(InMemoryStore::new());
    let coordinator = CoordinatorHandle::new(store, fast_settings());

    let reply = coordinator
        .dispatch_json(r#"{"action":"checkStorage"}"#)
        .await
        .unwrap();
    assert_eq!(serde_json::from_str::<Value>(&reply).unwrap(), json!({"available": true}));

    let reply = coordinator
        .dispatch_json(r#"{"action":"clearHistory"}"#)
        .await
        .unwrap();
    assert_eq!(serde_json::from_str::<Value>(&reply).unwrap(), json!({"success": true}));
}

#[tokio::test]
async fn test_dispatch_json_rejects_unknown_action() {
    let store = Arc::new(InMemoryStore::new());
    let coordinator = CoordinatorHandle::new(store, fast_settings());

    assert!(coordinator
        .dispatch_json(r#"{"action":"exportHistory"}"#)
        .await
        .is_err());
}

#[tokio::test]
async fn test_concurrent_requests_each_get_a_reply() {
    let store = Arc::new(InMemoryStore::new());
    let coordinator = CoordinatorHandle::new(store, fast_settings());

    let requests = (0..8).map(|i| {
        let coordinator = coordinator.clone();
        async move {
            if i % 2 == 0 {
                coordinator.dispatch(Request::CheckStorage).await
            } else {
                coordinator.dispatch(Request::ClearHistory).await
            }
        }
    });

    let replies = futures::future::join_all(requests).await;
    assert_eq!(replies.len(), 8);
    for (i, reply) in replies.into_iter().enumerate() {
        match reply.unwrap() {
            Response::CheckStorage(status) => {
                assert_eq!(i % 2, 0);
                assert!(status.available);
            }
            Response::ClearHistory(response) => {
                assert_eq!(i % 2, 1);
                assert!(response.success);
            }
        }
    }
}

#[tokio::test]
async fn test_requests_after_shutdown_fail_softly() {
    let store = Arc::new(InMemoryStore::new());
    let coordinator = CoordinatorHandle::new(store, fast_settings());

    coordinator.shutdown().await.unwrap();
    // Let the actor observe the shutdown and drop its receiver
    tokio::time::sleep(Duration::from_millis(20)).await;

    let status = coordinator.check_storage().await;
    assert!(!status.available);
    assert_eq!(status.error.as_deref(), Some("No response from coordinator"));
    assert!(!coordinator.clear_history().await.success);
}

#[tokio::test]
async fn test_startup_failure_reaches_system_subscriber() {
    let store = FlakyStore::new();
    store.set_down(true);

    let (_system, mut events) = System::start_with_store(store, fast_settings()).await;

    // Startup has already run; the event must be waiting for us
    match events.try_recv() {
        Ok(CoordinatorEvent::StorageInitError { error }) => {
            assert!(error.contains("simulated outage"), "got: {}", error)
        }
        other => panic!("expected storageInitError, got {:?}", other),
    }
}

#[tokio::test]
async fn test_healthy_startup_broadcasts_nothing() {
    let store = Arc::new(InMemoryStore::new());

    let (system, mut events) = System::start_with_store(store.clone(), fast_settings()).await;

    assert!(events.try_recv().is_err());
    assert_eq!(store.get_all().await.unwrap()[keys::CHAT_HISTORY], json!([]));
    system.shutdown().await.unwrap();
}

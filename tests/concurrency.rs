//! Concurrency Integration Tests
//!
//! Racing flush triggers, concurrent receivers, two store handles on one log
//! (standing in for two processes), and the store watcher.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use courier::config::DeliverySettings;
use courier::core::{Courier, JsonlStore, RecordStore};
use courier::ingest::StoreWatcher;
use tempfile::TempDir;

async fn create_test_courier() -> (Arc<Courier>, TempDir) {
    let temp = TempDir::new().unwrap();
    let store = JsonlStore::open(temp.path().join("inbox.jsonl"))
        .await
        .unwrap();
    let courier = Courier::new(Arc::new(store), &DeliverySettings::default());
    (Arc::new(courier), temp)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_triggers_never_double_emit() {
    let (courier, _temp) = create_test_courier().await;
    for i in 0..50 {
        courier.ingest("+1", &format!("m{}", i)).await;
    }

    let mut listener = courier.subscribe();
    courier.on_runtime_resumed().await;

    let mut handles = Vec::new();
    for i in 0..9 {
        let courier = courier.clone();
        handles.push(tokio::spawn(async move {
            match i % 3 {
                0 => courier.register_listener().await,
                1 => courier.request_flush().await,
                _ => courier.on_runtime_resumed().await,
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let bodies: Vec<String> = listener.drain().into_iter().map(|d| d.body).collect();
    let expected: Vec<String> = (0..50).map(|i| format!("m{}", i)).collect();
    assert_eq!(bodies, expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_receivers_while_ready() {
    let (courier, _temp) = create_test_courier().await;
    let mut listener = courier.subscribe();
    courier.on_runtime_resumed().await;
    courier.register_listener().await;

    let mut handles = Vec::new();
    for i in 0..20 {
        let courier = courier.clone();
        handles.push(tokio::spawn(async move {
            courier.ingest("+1", &format!("t{}", i)).await;
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let deliveries = listener.drain();
    assert_eq!(deliveries.len(), 20);

    // Delivered in append order, each exactly once
    let sequences: Vec<u64> = deliveries.iter().map(|d| d.sequence).collect();
    assert!(sequences.windows(2).all(|w| w[0] < w[1]));
    let unique: HashSet<String> = deliveries.into_iter().map(|d| d.body).collect();
    assert_eq!(unique.len(), 20);

    assert!(courier.store().list_undelivered().await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_two_handles_share_one_log() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("inbox.jsonl");
    let first = Arc::new(JsonlStore::open(&path).await.unwrap());
    let second = Arc::new(JsonlStore::open(&path).await.unwrap());

    let mut handles = Vec::new();
    for (name, store) in [("a", first.clone()), ("b", second.clone())] {
        handles.push(tokio::spawn(async move {
            for i in 0..25 {
                store.append(name, &format!("{}{}", name, i)).await.unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let records = first.list_undelivered().await.unwrap();
    assert_eq!(records.len(), 50);

    let sequences: Vec<u64> = records.iter().map(|r| r.sequence).collect();
    assert_eq!(sequences, (1..=50).collect::<Vec<u64>>());

    // Each writer's own records stay in its append order
    for name in ["a", "b"] {
        let bodies: Vec<&str> = records
            .iter()
            .filter(|r| r.sender == name)
            .map(|r| r.body.as_str())
            .collect();
        let expected: Vec<String> = (0..25).map(|i| format!("{}{}", name, i)).collect();
        assert_eq!(bodies, expected);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_watcher_delivers_appends_from_other_process() {
    let (courier, temp) = create_test_courier().await;
    let path = temp.path().join("inbox.jsonl");

    let mut listener = courier.subscribe();
    courier.on_runtime_resumed().await;
    courier.register_listener().await;

    let watcher = StoreWatcher::new(&path, Duration::from_millis(50))
        .spawn(courier.clone())
        .unwrap();

    // Another process's receiver writes straight to the log
    let receiver = JsonlStore::open(&path).await.unwrap();
    receiver.append("+1555", "from elsewhere").await.unwrap();

    let delivery = tokio::time::timeout(Duration::from_secs(10), listener.recv())
        .await
        .expect("watcher should trigger a flush")
        .unwrap();
    assert_eq!(delivery.body, "from elsewhere");

    watcher.stop().await.unwrap();
}

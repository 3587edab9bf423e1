mod common;

use common::open_store;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::{Arc, Mutex};
use stowage_model::WriteOptions;
use stowage_storage::{ChangeEvent, QueryOptions};
use stowage_types::{Key, Operation};

fn recorder() -> (
    Arc<Mutex<Vec<ChangeEvent>>>,
    impl Fn(&ChangeEvent) -> anyhow::Result<()> + Send + Sync + 'static,
) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    (seen, move |event: &ChangeEvent| {
        sink.lock().unwrap().push(event.clone());
        Ok(())
    })
}

#[tokio::test]
async fn every_mutation_is_reported() {
    let store = open_store();
    let (seen, callback) = recorder();
    let _sub = store.storage.subscribe("tasks", callback);

    store
        .storage
        .add("tasks", json!({"id": "a", "n": 1}), WriteOptions::default())
        .await
        .unwrap();
    store
        .storage
        .put("tasks", json!({"id": "a", "n": 2}), WriteOptions::default())
        .await
        .unwrap();
    store.storage.update("tasks", "a", |v| v["n"] = json!(3)).await.unwrap();
    store.storage.delete("tasks", "a").await.unwrap();
    store.storage.delete("tasks", "missing").await.unwrap();
    store.storage.clear("tasks").await.unwrap();

    let seen = seen.lock().unwrap();
    let ops: Vec<Operation> = seen.iter().map(|e| e.operation).collect();
    assert_eq!(
        ops,
        vec![
            Operation::Add,
            Operation::Put,
            Operation::Put,
            Operation::Delete,
            Operation::Delete,
            Operation::Clear,
        ]
    );
    assert_eq!(seen[0].value, Some(json!({"id": "a", "n": 1})));
    assert_eq!(seen[2].value, Some(json!({"id": "a", "n": 3})));
    assert_eq!(seen[4].key, Some(Key::from("missing")));
    assert_eq!(seen[5].key, None);
}

#[tokio::test]
async fn delete_matching_reports_each_removed_key() {
    let store = open_store();
    for (id, status) in [("a", "done"), ("b", "open"), ("c", "done")] {
        store
            .storage
            .put("tasks", json!({"id": id, "status": status}), WriteOptions::default())
            .await
            .unwrap();
    }
    let (seen, callback) = recorder();
    let _sub = store.storage.subscribe("tasks", callback);

    store
        .storage
        .delete_matching("tasks", QueryOptions::new().index("status").value("done"))
        .await
        .unwrap();

    let seen = seen.lock().unwrap();
    assert!(seen.iter().all(|e| e.operation == Operation::Delete));
    let keys: Vec<Option<Key>> = seen.iter().map(|e| e.key.clone()).collect();
    assert_eq!(keys, vec![Some(Key::from("a")), Some(Key::from("c"))]);
}

#[tokio::test]
async fn failed_writes_are_not_reported() {
    let store = open_store();
    let (seen, callback) = recorder();
    let _sub = store.storage.subscribe("tasks", callback);

    store
        .storage
        .add("tasks", json!({"id": "a"}), WriteOptions::default())
        .await
        .unwrap();
    let _ = store
        .storage
        .add("tasks", json!({"id": "a"}), WriteOptions::default())
        .await;

    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn auto_keyed_add_reports_generated_key() {
    let store = open_store();
    let (seen, callback) = recorder();
    let _sub = store.storage.subscribe("notes", callback);

    store
        .storage
        .add("notes", json!({"text": "x"}), WriteOptions::default())
        .await
        .unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen[0].key, Some(Key::Int(1)));
    assert_eq!(seen[0].value, Some(json!({"text": "x", "id": 1})));
}

#[tokio::test]
async fn concurrent_writers_are_seen_in_commit_order() {
    let store = open_store();
    let (seen, callback) = recorder();
    let _sub = store.storage.subscribe("notes", callback);

    let mut handles = Vec::new();
    for i in 0..20 {
        let storage = store.storage.clone();
        handles.push(tokio::spawn(async move {
            storage
                .add("notes", json!({"text": format!("n{i}")}), WriteOptions::default())
                .await
                .unwrap()
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let keys: Vec<i64> = seen
        .lock()
        .unwrap()
        .iter()
        .filter_map(|e| e.key.as_ref().and_then(Key::as_int))
        .collect();
    assert_eq!(keys, (1..=20).collect::<Vec<_>>());
}

#[tokio::test]
async fn misbehaving_subscriber_does_not_fail_the_write() {
    let store = open_store();
    let _bad = store.storage.subscribe("tasks", |_| anyhow::bail!("refused"));
    let _worse = store.storage.subscribe("tasks", |_| panic!("subscriber crashed"));
    let (seen, callback) = recorder();
    let _good = store.storage.subscribe("tasks", callback);

    store
        .storage
        .put("tasks", json!({"id": "a"}), WriteOptions::default())
        .await
        .unwrap();

    assert_eq!(seen.lock().unwrap().len(), 1);
    assert!(store.storage.get("tasks", "a").await.unwrap().is_some());
}

#[tokio::test]
async fn unsubscribed_callbacks_stop_receiving() {
    let store = open_store();
    let (seen, callback) = recorder();
    let sub = store.storage.subscribe("tasks", callback);

    store
        .storage
        .put("tasks", json!({"id": "a"}), WriteOptions::default())
        .await
        .unwrap();
    assert!(sub.unsubscribe());
    store
        .storage
        .put("tasks", json!({"id": "b"}), WriteOptions::default())
        .await
        .unwrap();

    assert_eq!(seen.lock().unwrap().len(), 1);
    assert_eq!(store.hub.subscriber_count(), 0);
}

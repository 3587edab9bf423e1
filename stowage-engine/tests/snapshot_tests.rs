mod common;

use common::{config, engine_with, memory_engine, START};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::time::Duration;
use stowage_engine::{EngineConfig, ImportOptions, ImportOutcome, Snapshot};
use stowage_model::{CollectionSchema, WriteOptions};
use stowage_storage::StoreLocation;
use stowage_types::SyncStatus;

async fn seeded() -> common::TestEngine {
    let t = memory_engine();
    t.engine
        .put("tasks", json!({"id": "a", "status": "open"}), WriteOptions::default())
        .await
        .unwrap();
    t.clock.advance(Duration::from_secs(1));
    t.engine
        .put(
            "tasks",
            json!({"id": "b", "status": "done"}),
            WriteOptions::default()
                .with_sync_status(SyncStatus::Synced)
                .with_version(4),
        )
        .await
        .unwrap();
    t.engine
        .add("notes", json!({"body": "first"}), WriteOptions::default())
        .await
        .unwrap();
    t.engine.set_setting("theme", json!("dark"), None).await.unwrap();
    t
}

#[tokio::test]
async fn export_import_preserves_envelopes() {
    let source = seeded().await;
    let snapshot = source.engine.export(None).await.unwrap();
    assert_eq!(snapshot.version, 1);
    assert_eq!(snapshot.timestamp, START.saturating_add(Duration::from_secs(1)));
    assert_eq!(snapshot.data["tasks"].len(), 2);
    assert_eq!(snapshot.record_count(), 4);

    let target = memory_engine();
    let outcomes = target
        .engine
        .import(&snapshot, &ImportOptions::default())
        .await
        .unwrap();
    assert!(outcomes.values().all(ImportOutcome::is_success));
    assert_eq!(outcomes["tasks"], ImportOutcome::Imported { count: 2 });

    let restored = target.engine.export(None).await.unwrap();
    assert_eq!(restored.data, snapshot.data);

    let b = target.engine.get_envelope("tasks", "b").await.unwrap().unwrap();
    assert_eq!(b.sync_status, SyncStatus::Synced);
    assert_eq!(b.version, 4);
    assert_eq!(b.last_modified, START.saturating_add(Duration::from_secs(1)));
}

#[tokio::test]
async fn snapshot_survives_json() {
    let source = seeded().await;
    let snapshot = source.engine.export(None).await.unwrap();
    let raw = snapshot.to_json_string().unwrap();
    assert_eq!(Snapshot::from_json_str(&raw).unwrap(), snapshot);
    assert!(Snapshot::from_json_str("{\"version\": \"one\"}").is_err());
}

#[tokio::test]
async fn export_selected_collections() {
    let source = seeded().await;
    let only = vec!["notes".to_string()];
    let snapshot = source.engine.export(Some(&only)).await.unwrap();
    let names: Vec<&String> = snapshot.data.keys().collect();
    assert_eq!(names, vec!["notes"]);
    assert_eq!(snapshot.data["notes"][0].data["body"], "first");
}

#[tokio::test]
async fn overwrite_clears_existing_records() {
    let source = seeded().await;
    let snapshot = source.engine.export(None).await.unwrap();

    let merge = memory_engine();
    merge
        .engine
        .put("tasks", json!({"id": "z"}), WriteOptions::default())
        .await
        .unwrap();
    merge
        .engine
        .import(&snapshot, &ImportOptions::default())
        .await
        .unwrap();
    assert_eq!(merge.engine.count("tasks", None).await.unwrap(), 3);

    let replace = memory_engine();
    replace
        .engine
        .put("tasks", json!({"id": "z"}), WriteOptions::default())
        .await
        .unwrap();
    let options = ImportOptions {
        overwrite: true,
        ..ImportOptions::default()
    };
    replace.engine.import(&snapshot, &options).await.unwrap();
    assert_eq!(replace.engine.count("tasks", None).await.unwrap(), 2);
    assert_eq!(replace.engine.get("tasks", "z").await.unwrap(), None);
}

#[tokio::test]
async fn import_honours_collection_filter() {
    let source = seeded().await;
    let snapshot = source.engine.export(None).await.unwrap();

    let target = memory_engine();
    let options = ImportOptions {
        collections: Some(vec!["tasks".to_string()]),
        ..ImportOptions::default()
    };
    let outcomes = target.engine.import(&snapshot, &options).await.unwrap();
    let names: Vec<&String> = outcomes.keys().collect();
    assert_eq!(names, vec!["tasks"]);
    assert_eq!(target.engine.count("notes", None).await.unwrap(), 0);
    assert_eq!(target.engine.get_setting("theme").await.unwrap(), None);
}

#[tokio::test]
async fn failing_collection_does_not_stop_others() {
    let source = seeded().await;
    let mut snapshot = source.engine.export(None).await.unwrap();
    let stray = snapshot.data["tasks"].clone();
    snapshot.data.insert("ghosts".to_string(), stray);

    let target = memory_engine();
    let outcomes = target
        .engine
        .import(&snapshot, &ImportOptions::default())
        .await
        .unwrap();
    assert!(matches!(outcomes["ghosts"], ImportOutcome::Failed { .. }));
    assert_eq!(outcomes["tasks"], ImportOutcome::Imported { count: 2 });
    assert_eq!(target.engine.count("tasks", None).await.unwrap(), 2);
}

#[tokio::test]
async fn export_skips_collections_no_longer_declared() {
    let dir = tempfile::tempdir().unwrap();
    let full = EngineConfig {
        location: StoreLocation::directory(dir.path()),
        ..config("legacy")
    };
    let before = engine_with(full.clone());
    before
        .engine
        .add("notes", json!({"body": "old"}), WriteOptions::default())
        .await
        .unwrap();
    before
        .engine
        .put("tasks", json!({"id": "a"}), WriteOptions::default())
        .await
        .unwrap();
    before.engine.close().await;

    let after = engine_with(EngineConfig {
        schemas: vec![CollectionSchema::new("tasks", "id").index("status")],
        ..full
    });
    let snapshot = after.engine.export(None).await.unwrap();
    assert!(!snapshot.data.contains_key("notes"));
    assert_eq!(snapshot.data["tasks"].len(), 1);

    let target = memory_engine();
    let outcomes = target
        .engine
        .import(&snapshot, &ImportOptions::default())
        .await
        .unwrap();
    assert!(outcomes.values().all(ImportOutcome::is_success), "{outcomes:?}");
}

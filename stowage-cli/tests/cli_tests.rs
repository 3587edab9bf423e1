use pretty_assertions::assert_eq;
use serde_json::json;
use stowage_cli::{resolve_config, run, Command};
use stowage_engine::Engine;
use stowage_storage::StoreLocation;

const APP_CONFIG: &str = r#"{
    "name": "app",
    "schemas": [
        {"name": "tasks", "keyField": "id", "indexes": [{"name": "status", "field": "status"}]}
    ],
    "maintenance": {"enabled": true}
}"#;

fn write_config(dir: &std::path::Path) -> std::path::PathBuf {
    let path = dir.join("app.json");
    std::fs::write(&path, APP_CONFIG).unwrap();
    path
}

// ── Config resolution ────────────────────────────────────────────

#[test]
fn flags_override_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path());

    let config = resolve_config(Some(&path), Some(dir.path()), Some("other")).unwrap();
    assert_eq!(config.name, "other");
    assert_eq!(config.location, StoreLocation::directory(dir.path()));
    assert_eq!(config.schemas.len(), 1);
    assert!(!config.maintenance.enabled);
}

#[test]
fn defaults_without_config() {
    let config = resolve_config(None, None, None).unwrap();
    assert_eq!(config.name, "stowage");
    assert_eq!(config.location, StoreLocation::Memory);
}

#[test]
fn missing_config_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(resolve_config(Some(&dir.path().join("nope.json")), None, None).is_err());
}

// ── Commands ─────────────────────────────────────────────────────

#[tokio::test]
async fn export_to_file_then_import_elsewhere() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_config(dir.path());
    let source_dir = dir.path().join("source");
    let target_dir = dir.path().join("target");
    std::fs::create_dir_all(&source_dir).unwrap();
    std::fs::create_dir_all(&target_dir).unwrap();
    let backup = dir.path().join("backup.json");

    let source = Engine::new(resolve_config(Some(&config_path), Some(&source_dir), None).unwrap())
        .unwrap();
    source
        .put("tasks", json!({"id": "t1", "status": "open"}), Default::default())
        .await
        .unwrap();
    let printed = run(
        &source,
        Command::Export {
            out: Some(backup.clone()),
            collections: vec!["tasks".into()],
        },
    )
    .await
    .unwrap();
    assert_eq!(printed, None);
    source.close().await;

    let target = Engine::new(resolve_config(Some(&config_path), Some(&target_dir), None).unwrap())
        .unwrap();
    let outcomes = run(
        &target,
        Command::Import {
            file: backup,
            overwrite: true,
            collections: Vec::new(),
        },
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(outcomes, json!({"tasks": {"status": "imported", "count": 1}}));
    assert_eq!(
        target.get("tasks", "t1").await.unwrap(),
        Some(json!({"id": "t1", "status": "open"}))
    );
    target.close().await;
}

#[tokio::test]
async fn stats_and_queue_print_json() {
    let config = resolve_config(None, None, Some("cli_stats")).unwrap();
    let engine = Engine::new(config).unwrap();

    let stats = run(&engine, Command::Stats).await.unwrap().unwrap();
    assert_eq!(stats["schema_version"], 1);
    assert_eq!(stats["pending_sync_items"], 0);

    let queue = run(&engine, Command::Queue { store: None }).await.unwrap().unwrap();
    assert_eq!(queue, json!([]));
    engine.close().await;
}

#[tokio::test]
async fn maintain_reports_each_task() {
    let config = resolve_config(None, None, Some("cli_maintain")).unwrap();
    let engine = Engine::new(config).unwrap();
    let report = run(&engine, Command::Maintain).await.unwrap().unwrap();
    assert_eq!(report["expired_cache"], json!({"status": "removed", "count": 0}));
    assert_eq!(report["stale_metrics"]["status"], "removed");
    engine.close().await;
}

#[tokio::test]
async fn import_of_missing_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let config = resolve_config(None, None, Some("cli_import")).unwrap();
    let engine = Engine::new(config).unwrap();
    let err = run(
        &engine,
        Command::Import {
            file: dir.path().join("absent.json"),
            overwrite: false,
            collections: Vec::new(),
        },
    )
    .await
    .unwrap_err();
    assert!(err.to_string().contains("absent.json"));
}

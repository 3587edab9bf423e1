use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use stowage_model::{CollectionSchema, SchemaSet};
use stowage_storage::{Database, HandleRegistry, ObserverHub, OpenOptions, Storage, StoreLocation};
use stowage_sync::{
    sync_queue_schema, EnqueueOptions, QueueFilter, SyncError, SyncQueue, DEFAULT_MAX_RETRIES,
};
use stowage_types::{Clock, ManualClock, Operation, Priority, Timestamp};

const HOUR: Duration = Duration::from_secs(3600);

fn open_queue() -> (SyncQueue, Arc<ManualClock>) {
    static NEXT: AtomicUsize = AtomicUsize::new(0);
    let name = format!("queue_{}_{}", std::process::id(), NEXT.fetch_add(1, Ordering::SeqCst));
    let schemas = SchemaSet::new(
        1,
        vec![sync_queue_schema(), CollectionSchema::new("tasks", "id")],
    );
    let options = OpenOptions {
        registry: Arc::new(HandleRegistry::new()),
        ..OpenOptions::default()
    };
    let db = Database::open_or_upgrade(&name, &StoreLocation::Memory, &schemas, &options).unwrap();
    let clock = Arc::new(ManualClock::new(Timestamp::from_millis(1_700_000_000_000)));
    let storage = Storage::new(Arc::new(db), ObserverHub::new(), clock.clone());
    (SyncQueue::new(storage), clock)
}

fn with_priority(priority: Priority) -> EnqueueOptions {
    EnqueueOptions::default().priority(priority)
}

// ── enqueue ──────────────────────────────────────────────────────

#[tokio::test]
async fn enqueue_fills_defaults() {
    let (queue, clock) = open_queue();
    let item = queue
        .enqueue(Operation::Put, "tasks", json!({"id": "t1"}), EnqueueOptions::default())
        .await
        .unwrap();

    assert_eq!(item.id, 1);
    assert_eq!(item.store, "tasks");
    assert_eq!(item.priority, Priority::Normal);
    assert_eq!(item.retry_count, 0);
    assert_eq!(item.max_retries, DEFAULT_MAX_RETRIES);
    assert_eq!(item.last_retry, None);
    assert_eq!(item.timestamp, clock.now());

    let stored = queue.get(item.id).await.unwrap().unwrap();
    assert_eq!(stored, item);
}

#[tokio::test]
async fn enqueue_keeps_metadata() {
    let (queue, _) = open_queue();
    let options = EnqueueOptions::default()
        .max_retries(5)
        .metadata("endpoint", "/api/tasks")
        .metadata("attempt", 0);
    let item = queue
        .enqueue(Operation::Delete, "tasks", json!({"id": "t1"}), options)
        .await
        .unwrap();
    let stored = queue.get(item.id).await.unwrap().unwrap();
    assert_eq!(stored.max_retries, 5);
    assert_eq!(stored.metadata["endpoint"], "/api/tasks");
}

#[tokio::test]
async fn clear_cannot_be_queued() {
    let (queue, _) = open_queue();
    let err = queue
        .enqueue(Operation::Clear, "tasks", json!(null), EnqueueOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::UnsupportedOperation(Operation::Clear)));
    assert_eq!(queue.pending_count().await.unwrap(), 0);
}

// ── list ordering ────────────────────────────────────────────────

#[tokio::test]
async fn list_orders_by_priority_then_age() {
    let (queue, clock) = open_queue();
    let mut ids = Vec::new();
    for priority in [Priority::Low, Priority::High, Priority::Normal, Priority::High] {
        let item = queue
            .enqueue(Operation::Put, "tasks", json!({"id": "x"}), with_priority(priority))
            .await
            .unwrap();
        ids.push(item.id);
        clock.advance(Duration::from_millis(10));
    }

    let listed: Vec<(i64, Priority)> = queue
        .list(None)
        .await
        .unwrap()
        .into_iter()
        .map(|item| (item.id, item.priority))
        .collect();
    assert_eq!(
        listed,
        vec![
            (ids[1], Priority::High),
            (ids[3], Priority::High),
            (ids[2], Priority::Normal),
            (ids[0], Priority::Low),
        ]
    );
}

#[tokio::test]
async fn high_priority_lists_before_older_normal() {
    let (queue, clock) = open_queue();
    let older = queue
        .enqueue(Operation::Put, "tasks", json!({"id": "a"}), EnqueueOptions::default())
        .await
        .unwrap();
    clock.advance(Duration::from_secs(60));
    let urgent = queue
        .enqueue(Operation::Put, "tasks", json!({"id": "b"}), with_priority(Priority::High))
        .await
        .unwrap();

    let listed = queue.list(None).await.unwrap();
    assert_eq!(listed[0].id, urgent.id);
    assert_eq!(listed[1].id, older.id);
}

#[tokio::test]
async fn same_instant_falls_back_to_enqueue_order() {
    let (queue, _) = open_queue();
    for _ in 0..5 {
        queue
            .enqueue(Operation::Add, "tasks", json!({}), EnqueueOptions::default())
            .await
            .unwrap();
    }
    let ids: Vec<i64> = queue.list(None).await.unwrap().iter().map(|i| i.id).collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn list_filters() {
    let (queue, _) = open_queue();
    queue
        .enqueue(Operation::Put, "tasks", json!({}), EnqueueOptions::default())
        .await
        .unwrap();
    queue
        .enqueue(Operation::Delete, "notes", json!({}), with_priority(Priority::Low))
        .await
        .unwrap();
    queue
        .enqueue(Operation::Add, "tasks", json!({}), with_priority(Priority::Low))
        .await
        .unwrap();

    let tasks = queue.list(Some(QueueFilter::store("tasks"))).await.unwrap();
    assert_eq!(tasks.len(), 2);
    assert!(tasks.iter().all(|i| i.store == "tasks"));

    let low_tasks = queue
        .list(Some(QueueFilter {
            priority: Some(Priority::Low),
            ..QueueFilter::store("tasks")
        }))
        .await
        .unwrap();
    assert_eq!(low_tasks.len(), 1);
    assert_eq!(low_tasks[0].operation, Operation::Add);

    let deletes = queue
        .list(Some(QueueFilter {
            operation: Some(Operation::Delete),
            ..QueueFilter::default()
        }))
        .await
        .unwrap();
    assert_eq!(deletes.len(), 1);
    assert_eq!(deletes[0].store, "notes");
}

// ── remove / bump_retry ──────────────────────────────────────────

#[tokio::test]
async fn remove_reports_presence() {
    let (queue, _) = open_queue();
    let item = queue
        .enqueue(Operation::Put, "tasks", json!({}), EnqueueOptions::default())
        .await
        .unwrap();
    assert!(queue.remove(item.id).await.unwrap());
    assert!(!queue.remove(item.id).await.unwrap());
    assert_eq!(queue.pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn bump_retry_counts_and_stamps() {
    let (queue, clock) = open_queue();
    let item = queue
        .enqueue(Operation::Put, "tasks", json!({"id": "t"}), EnqueueOptions::default())
        .await
        .unwrap();

    clock.advance(Duration::from_secs(30));
    let first = queue.bump_retry(item.id).await.unwrap().unwrap();
    assert_eq!(first.retry_count, 1);
    assert_eq!(first.last_retry, Some(item.timestamp.saturating_add(Duration::from_secs(30))));

    clock.advance(Duration::from_secs(30));
    let second = queue.bump_retry(item.id).await.unwrap().unwrap();
    assert_eq!(second.retry_count, 2);
    assert_eq!(second.timestamp, item.timestamp);
    assert_eq!(second.data, item.data);
}

#[tokio::test]
async fn bump_retry_on_removed_item_does_not_resurrect() {
    let (queue, _) = open_queue();
    let item = queue
        .enqueue(Operation::Put, "tasks", json!({}), EnqueueOptions::default())
        .await
        .unwrap();
    queue.remove(item.id).await.unwrap();
    assert_eq!(queue.bump_retry(item.id).await.unwrap(), None);
    assert_eq!(queue.pending_count().await.unwrap(), 0);
}

// ── pruning ──────────────────────────────────────────────────────

#[tokio::test]
async fn prune_requires_age_and_exhaustion() {
    let (queue, clock) = open_queue();
    let options = EnqueueOptions::default().max_retries(1);

    let exhausted_old = queue
        .enqueue(Operation::Put, "tasks", json!({"n": 1}), options.clone())
        .await
        .unwrap();
    let live_old = queue
        .enqueue(Operation::Put, "tasks", json!({"n": 2}), options.clone())
        .await
        .unwrap();
    queue.bump_retry(exhausted_old.id).await.unwrap();

    clock.advance(24 * HOUR + Duration::from_millis(1));
    let exhausted_new = queue
        .enqueue(Operation::Put, "tasks", json!({"n": 3}), options)
        .await
        .unwrap();
    queue.bump_retry(exhausted_new.id).await.unwrap();

    assert_eq!(queue.prune_exhausted(24 * HOUR).await.unwrap(), 1);
    let remaining: Vec<i64> = queue.list(None).await.unwrap().iter().map(|i| i.id).collect();
    assert_eq!(remaining, vec![live_old.id, exhausted_new.id]);
}

#[tokio::test]
async fn prune_keeps_items_exactly_at_max_age() {
    let (queue, clock) = open_queue();
    let item = queue
        .enqueue(Operation::Put, "tasks", json!({}), EnqueueOptions::default().max_retries(0))
        .await
        .unwrap();
    clock.advance(24 * HOUR);
    assert_eq!(queue.prune_exhausted(24 * HOUR).await.unwrap(), 0);
    clock.advance(Duration::from_millis(1));
    assert_eq!(queue.prune_exhausted(24 * HOUR).await.unwrap(), 1);
    assert_eq!(queue.get(item.id).await.unwrap(), None);
}

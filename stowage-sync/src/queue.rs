//! The sync queue over the `syncQueue` collection.

use crate::error::{SyncError, SyncResult};
use crate::item::{EnqueueOptions, QueueFilter, SyncItem, SYNC_QUEUE};
use serde_json::Value;
use std::time::Duration;
use stowage_model::WriteOptions;
use stowage_storage::{BatchOp, QueryOptions, Storage};
use stowage_types::{Key, Operation};
use tracing::{debug, info};

/// Durable, priority-ordered buffer of pending mutations.
#[derive(Debug, Clone)]
pub struct SyncQueue {
    storage: Storage,
}

impl SyncQueue {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// Buffers a mutation of `collection` for later replay.
    pub async fn enqueue(
        &self,
        operation: Operation,
        collection: &str,
        data: Value,
        options: EnqueueOptions,
    ) -> SyncResult<SyncItem> {
        if operation == Operation::Clear {
            return Err(SyncError::UnsupportedOperation(operation));
        }
        let mut item = SyncItem {
            id: 0,
            operation,
            store: collection.to_string(),
            data,
            timestamp: self.storage.now(),
            priority: options.priority,
            retry_count: 0,
            max_retries: options.max_retries,
            last_retry: None,
            metadata: options.metadata,
        };

        let mut record = serde_json::to_value(&item)?;
        if let Value::Object(fields) = &mut record {
            fields.remove("id");
        }
        let key = self
            .storage
            .add(SYNC_QUEUE, record, WriteOptions::default())
            .await?;
        item.id = key
            .as_int()
            .ok_or_else(|| SyncError::Corrupt(format!("non-integer queue id {key}")))?;

        debug!(
            "Queued {} on {} as #{} ({} priority)",
            item.operation, item.store, item.id, item.priority
        );
        Ok(item)
    }

    /// Items matching `filter`, highest priority first, then oldest first.
    pub async fn list(&self, filter: Option<QueueFilter>) -> SyncResult<Vec<SyncItem>> {
        let filter = filter.unwrap_or_default();
        let options = match &filter.store {
            Some(store) => QueryOptions::new().index("store").value(store.as_str()),
            None => QueryOptions::new(),
        };

        let mut items = self
            .storage
            .get_all(SYNC_QUEUE, options)
            .await?
            .into_iter()
            .map(decode)
            .collect::<SyncResult<Vec<_>>>()?;
        items.retain(|item| filter.accepts(item));
        items.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.timestamp.cmp(&b.timestamp))
                .then(a.id.cmp(&b.id))
        });
        Ok(items)
    }

    /// Reads one item.
    pub async fn get(&self, id: i64) -> SyncResult<Option<SyncItem>> {
        self.storage.get(SYNC_QUEUE, id).await?.map(decode).transpose()
    }

    /// Drops an item, typically after the worker confirmed it. Returns
    /// whether it was still queued.
    pub async fn remove(&self, id: i64) -> SyncResult<bool> {
        Ok(self.storage.delete(SYNC_QUEUE, id).await?)
    }

    /// Records a failed replay attempt: increments `retryCount` and stamps
    /// `lastRetry`. Returns `None` if the item is gone.
    pub async fn bump_retry(&self, id: i64) -> SyncResult<Option<SyncItem>> {
        let now = self.storage.now();
        let updated = self
            .storage
            .update(SYNC_QUEUE, id, move |record| {
                let retries = record
                    .get("retryCount")
                    .and_then(Value::as_u64)
                    .unwrap_or(0);
                record["retryCount"] = Value::from(retries.saturating_add(1));
                record["lastRetry"] = Value::from(now.as_millis());
            })
            .await?;
        updated.map(decode).transpose()
    }

    /// Number of queued items.
    pub async fn pending_count(&self) -> SyncResult<u64> {
        Ok(self.storage.count(SYNC_QUEUE, None).await?)
    }

    /// Removes items that are both older than `max_age` and out of retries.
    ///
    /// Returns how many were removed.
    pub async fn prune_exhausted(&self, max_age: Duration) -> SyncResult<usize> {
        let now = self.storage.now();
        let max_age = i64::try_from(max_age.as_millis()).unwrap_or(i64::MAX);
        let stale: Vec<BatchOp> = self
            .list(Some(QueueFilter {
                exhausted: Some(true),
                ..QueueFilter::default()
            }))
            .await?
            .into_iter()
            .filter(|item| item.age_millis(now) > max_age)
            .map(|item| BatchOp::delete(SYNC_QUEUE, Key::Int(item.id)))
            .collect();

        if stale.is_empty() {
            return Ok(0);
        }
        let pruned = stale.len();
        self.storage.batch(stale).await?;
        info!("Pruned {pruned} exhausted sync item(s)");
        Ok(pruned)
    }
}

fn decode(record: Value) -> SyncResult<SyncItem> {
    serde_json::from_value(record).map_err(|e| SyncError::Corrupt(e.to_string()))
}

//! Queue item model and the collection it lives in.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use stowage_model::CollectionSchema;
use stowage_types::{Operation, Priority, Timestamp};

/// Name of the built-in queue collection.
pub const SYNC_QUEUE: &str = "syncQueue";

/// Retry budget when the caller does not set one.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Schema of the queue collection: auto-increment ids, indexed by
/// enqueue time, priority and target collection.
pub fn sync_queue_schema() -> CollectionSchema {
    CollectionSchema::new(SYNC_QUEUE, "id")
        .auto_key()
        .index("timestamp")
        .index("priority")
        .index("store")
}

/// One buffered mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncItem {
    pub id: i64,
    pub operation: Operation,
    /// Collection the mutation targets.
    pub store: String,
    pub data: Value,
    /// When the item was enqueued.
    pub timestamp: Timestamp,
    pub priority: Priority,
    pub retry_count: u32,
    pub max_retries: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_retry: Option<Timestamp>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl SyncItem {
    /// True once the retry budget is used up.
    pub fn is_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }

    /// Milliseconds since the item was enqueued.
    pub fn age_millis(&self, now: Timestamp) -> i64 {
        now.millis_since(self.timestamp)
    }
}

/// Options for [`crate::SyncQueue::enqueue`].
#[derive(Debug, Clone, PartialEq)]
pub struct EnqueueOptions {
    pub priority: Priority,
    pub max_retries: u32,
    pub metadata: Map<String, Value>,
}

impl Default for EnqueueOptions {
    fn default() -> Self {
        Self {
            priority: Priority::Normal,
            max_retries: DEFAULT_MAX_RETRIES,
            metadata: Map::new(),
        }
    }
}

impl EnqueueOptions {
    #[must_use]
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    #[must_use]
    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Restricts [`crate::SyncQueue::list`]. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueueFilter {
    pub store: Option<String>,
    pub operation: Option<Operation>,
    pub priority: Option<Priority>,
    /// `Some(true)` keeps only items out of retries, `Some(false)` only live ones.
    pub exhausted: Option<bool>,
}

impl QueueFilter {
    pub fn store(store: impl Into<String>) -> Self {
        Self {
            store: Some(store.into()),
            ..Self::default()
        }
    }

    pub(crate) fn accepts(&self, item: &SyncItem) -> bool {
        self.store.as_ref().is_none_or(|s| *s == item.store)
            && self.operation.is_none_or(|op| op == item.operation)
            && self.priority.is_none_or(|p| p == item.priority)
            && self.exhausted.is_none_or(|e| e == item.is_exhausted())
    }
}

//! Offline sync queue for Stowage.
//!
//! Mutations that could not be confirmed by the remote service are buffered
//! here until an external worker replays them. The queue only records intent
//! and retry bookkeeping; it never performs network I/O.
//!
//! # Ordering
//!
//! [`SyncQueue::list`] always returns items by priority (high first), then
//! by enqueue time (oldest first), then by id.
//!
//! # Example
//!
//! ```no_run
//! use serde_json::json;
//! use stowage_sync::{EnqueueOptions, SyncQueue};
//! use stowage_types::{Operation, Priority};
//!
//! # async fn demo(storage: stowage_storage::Storage) -> stowage_sync::SyncResult<()> {
//! let queue = SyncQueue::new(storage);
//! let options = EnqueueOptions::default().priority(Priority::High);
//! let item = queue
//!     .enqueue(Operation::Put, "tasks", json!({"id": "t1"}), options)
//!     .await?;
//! queue.bump_retry(item.id).await?;
//! # Ok(())
//! # }
//! ```

mod error;
mod item;
mod queue;

pub use error::{SyncError, SyncResult};
pub use item::{sync_queue_schema, EnqueueOptions, QueueFilter, SyncItem, DEFAULT_MAX_RETRIES, SYNC_QUEUE};
pub use queue::SyncQueue;

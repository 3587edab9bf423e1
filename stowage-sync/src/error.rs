//! Error types for the sync queue.

use stowage_storage::StorageError;
use stowage_types::Operation;
use thiserror::Error;

/// Result type for sync queue operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in sync queue operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Only record-level mutations can be queued.
    #[error("operation {0} cannot be queued")]
    UnsupportedOperation(Operation),

    /// A stored item could not be read back.
    #[error("corrupt queue item: {0}")]
    Corrupt(String),
}

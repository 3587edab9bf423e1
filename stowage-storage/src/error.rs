//! Error types for the storage layer.

use crate::batch::TransactionFailure;
use rusqlite::ErrorCode;
use stowage_model::SchemaError;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur in storage operations.
///
/// "Not found" is deliberately absent: single-record reads return `None`.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The store could not be opened or upgraded.
    #[error("failed to open store: {0}")]
    Open(String),

    /// An upgrade or delete was blocked by another open handle.
    #[error("blocked by another open handle: {0}")]
    Blocked(String),

    /// A key or unique-index collision.
    #[error("constraint violation: {0}")]
    Constraint(String),

    /// A batch aborted; nothing in it was committed.
    #[error("{0}")]
    Transaction(Box<TransactionFailure>),

    /// The configured storage quota is exhausted.
    #[error("storage quota exceeded: {0}")]
    QuotaExceeded(String),

    /// The collection is not part of the opened schema.
    #[error("unknown collection: {0}")]
    UnknownCollection(String),

    /// The index is not declared on the collection.
    #[error("unknown index {index:?} on collection {collection:?}")]
    UnknownIndex { collection: String, index: String },

    /// The schema set failed validation.
    #[error("invalid schema: {0}")]
    InvalidSchema(#[from] SchemaError),

    /// A record or key is malformed for its collection.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Any other database error from SQLite.
    #[error("database error: {0}")]
    Database(rusqlite::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error (file system).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The blocking task running the operation failed.
    #[error("storage task failed: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),

    /// The handle was closed.
    #[error("store is closed")]
    Closed,
}

impl StorageError {
    /// True for errors the caller can fix by changing its request.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            StorageError::Constraint(_) | StorageError::Blocked(_) | StorageError::QuotaExceeded(_)
        )
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, msg) => {
                let detail = msg.clone().unwrap_or_else(|| e.to_string());
                match e.code {
                    ErrorCode::ConstraintViolation => StorageError::Constraint(detail),
                    ErrorCode::DiskFull => StorageError::QuotaExceeded(detail),
                    _ => StorageError::Database(err),
                }
            }
            _ => StorageError::Database(err),
        }
    }
}

impl From<stowage_types::Error> for StorageError {
    fn from(err: stowage_types::Error) -> Self {
        StorageError::InvalidData(err.to_string())
    }
}

//! Error types for the engine facade.

use stowage_storage::StorageError;
use stowage_sync::SyncError;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced by [`crate::Engine`].
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    /// Configuration could not be loaded or is invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// A snapshot document is malformed.
    #[error("snapshot error: {0}")]
    Snapshot(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("task join error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

impl EngineError {
    /// The underlying storage error, if this is one.
    pub fn storage(&self) -> Option<&StorageError> {
        match self {
            EngineError::Storage(e) => Some(e),
            EngineError::Sync(SyncError::Storage(e)) => Some(e),
            _ => None,
        }
    }
}

//! Multi-collection atomic batches.

use serde_json::Value;
use std::fmt;
use stowage_model::{Envelope, WriteOptions};
use stowage_types::{Key, Operation};

/// One step of a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOp {
    Add {
        collection: String,
        value: Value,
        options: WriteOptions,
    },
    Put {
        collection: String,
        value: Value,
        options: WriteOptions,
    },
    Delete {
        collection: String,
        key: Key,
    },
    Clear {
        collection: String,
    },
    /// Writes an exported envelope back verbatim, metadata included.
    Restore {
        collection: String,
        envelope: Envelope,
    },
}

impl BatchOp {
    pub fn add(collection: impl Into<String>, value: Value) -> Self {
        BatchOp::Add {
            collection: collection.into(),
            value,
            options: WriteOptions::default(),
        }
    }

    pub fn put(collection: impl Into<String>, value: Value) -> Self {
        BatchOp::Put {
            collection: collection.into(),
            value,
            options: WriteOptions::default(),
        }
    }

    pub fn delete(collection: impl Into<String>, key: impl Into<Key>) -> Self {
        BatchOp::Delete {
            collection: collection.into(),
            key: key.into(),
        }
    }

    pub fn clear(collection: impl Into<String>) -> Self {
        BatchOp::Clear {
            collection: collection.into(),
        }
    }

    pub fn restore(collection: impl Into<String>, envelope: Envelope) -> Self {
        BatchOp::Restore {
            collection: collection.into(),
            envelope,
        }
    }

    pub fn collection(&self) -> &str {
        match self {
            BatchOp::Add { collection, .. }
            | BatchOp::Put { collection, .. }
            | BatchOp::Delete { collection, .. }
            | BatchOp::Clear { collection }
            | BatchOp::Restore { collection, .. } => collection,
        }
    }

    /// The change kind reported to observers.
    pub fn operation(&self) -> Operation {
        match self {
            BatchOp::Add { .. } => Operation::Add,
            BatchOp::Put { .. } | BatchOp::Restore { .. } => Operation::Put,
            BatchOp::Delete { .. } => Operation::Delete,
            BatchOp::Clear { .. } => Operation::Clear,
        }
    }
}

/// What a batch step did.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchResult {
    /// Record written under this key.
    Written(Key),
    /// Whether a record was removed.
    Deleted(bool),
    /// Number of records cleared.
    Cleared(usize),
}

/// Per-step report of an aborted batch.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome {
    /// The step succeeded but was rolled back with the rest of the batch.
    RolledBack(BatchResult),
    /// The step that aborted the batch.
    Failed(String),
    /// Never attempted because an earlier step failed.
    NotAttempted,
}

/// Detail carried by [`crate::StorageError::Transaction`].
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionFailure {
    pub failed_index: usize,
    pub collection: String,
    pub operation: Operation,
    pub reason: String,
    pub outcomes: Vec<BatchOutcome>,
}

impl fmt::Display for TransactionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "transaction aborted at operation {} ({} on {:?}): {}",
            self.failed_index, self.operation, self.collection, self.reason
        )
    }
}

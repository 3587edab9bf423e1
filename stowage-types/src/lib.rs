//! Core type definitions for Stowage.
//!
//! This crate defines the small, storage-agnostic types used throughout
//! the engine:
//! - Record keys ([`Key`])
//! - Millisecond timestamps and the injectable [`Clock`]
//! - Sync bookkeeping enums ([`SyncStatus`], [`Priority`], [`Operation`])
//!
//! Collection schemas and the record envelope live in `stowage-model`.

mod key;
mod status;
mod timestamp;

pub use key::Key;
pub use status::{Operation, Priority, SyncStatus};
pub use timestamp::{Clock, ManualClock, SystemClock, Timestamp};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("unknown {kind}: {value}")]
    UnknownVariant { kind: &'static str, value: String },
}

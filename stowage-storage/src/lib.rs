//! SQLite storage engine for Stowage.
//!
//! Provides the persistent, transactional record store that every other
//! Stowage subsystem goes through.
//!
//! # Architecture
//!
//! - [`Database`] is the schema registry: it opens a store, applies the
//!   declared [`stowage_model::SchemaSet`] additively and tracks open handles
//! - Each collection is one table holding JSON envelopes; secondary indexes
//!   are expression indexes over the record fields
//! - [`Storage`] is the generic CRUD/query/batch API over an open handle
//! - [`ObserverHub`] fans committed changes out to per-collection subscribers

mod batch;
mod error;
mod handles;
mod observer;
mod query;
mod registry;
mod rows;
mod storage;

pub use batch::{BatchOp, BatchOutcome, BatchResult, TransactionFailure};
pub use error::{StorageError, StorageResult};
pub use handles::{HandleGuard, HandleRegistry};
pub use observer::{ChangeEvent, ObserverHub, Subscriber, Subscription};
pub use query::{Condition, Conditions, Direction, KeyRange, Predicate, QueryOptions, SortSpec};
pub use registry::{Database, OpenOptions, StoreLocation};
pub use storage::{Storage, StorageStats};

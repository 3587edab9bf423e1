//! Collection model for Stowage.
//!
//! Defines the declarative types every other Stowage subsystem depends on:
//! - [`CollectionSchema`] / [`IndexSpec`]: a collection's key configuration
//!   and secondary indexes
//! - [`SchemaSet`]: one versioned set of collection schemas, validated once
//!   before the store is opened
//! - [`Envelope`]: the metadata wrapper stored around every record
//! - [`path`]: dotted field-path lookup and the total order used for sorting
//!   JSON values
//!
//! These types carry no I/O; the storage crate turns them into tables and
//! indexes.

mod envelope;
pub mod path;
mod schema;

pub use envelope::{Envelope, WriteOptions};
pub use schema::{CollectionSchema, IndexSpec, SchemaError, SchemaSet};

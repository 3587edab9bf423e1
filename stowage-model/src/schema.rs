use crate::path;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// Reasons a schema set is rejected before the store is opened.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("schema version must be at least 1")]
    InvalidVersion,

    #[error("invalid collection name {0:?}")]
    InvalidCollectionName(String),

    #[error("collection {0:?} is declared more than once")]
    DuplicateCollection(String),

    #[error("collection {collection:?}: invalid key field {field:?}")]
    InvalidKeyField { collection: String, field: String },

    #[error("collection {collection:?}: auto keys require a top-level key field, got {field:?}")]
    NestedAutoKey { collection: String, field: String },

    #[error("collection {collection:?}: invalid index name {index:?}")]
    InvalidIndexName { collection: String, index: String },

    #[error("collection {collection:?}: index {index:?} is declared more than once")]
    DuplicateIndex { collection: String, index: String },

    #[error("collection {collection:?}: index {index:?} has invalid field {field:?}")]
    InvalidIndexField {
        collection: String,
        index: String,
        field: String,
    },
}

/// Declares one collection: its key configuration and secondary indexes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionSchema {
    pub name: String,
    /// Dotted path of the key inside each record (e.g. `"id"`, `"meta.key"`).
    pub key_field: String,
    /// Whether the engine generates integer keys for records without one.
    #[serde(default)]
    pub auto_key: bool,
    #[serde(default)]
    pub indexes: Vec<IndexSpec>,
}

/// A secondary index over one field of a collection's records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub name: String,
    /// Dotted path of the indexed field.
    pub field: String,
    #[serde(default)]
    pub unique: bool,
}

impl CollectionSchema {
    /// A collection keyed by a caller-supplied field.
    pub fn new(name: impl Into<String>, key_field: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_field: key_field.into(),
            auto_key: false,
            indexes: Vec::new(),
        }
    }

    /// Enables generated integer keys.
    #[must_use]
    pub fn auto_key(mut self) -> Self {
        self.auto_key = true;
        self
    }

    /// Adds a non-unique index named after its field.
    #[must_use]
    pub fn index(self, field: &str) -> Self {
        self.named_index(field, field, false)
    }

    /// Adds a unique index named after its field.
    #[must_use]
    pub fn unique_index(self, field: &str) -> Self {
        self.named_index(field, field, true)
    }

    /// Adds an index with an explicit name.
    #[must_use]
    pub fn named_index(mut self, name: &str, field: &str, unique: bool) -> Self {
        self.indexes.push(IndexSpec {
            name: name.to_string(),
            field: field.to_string(),
            unique,
        });
        self
    }

    /// Looks up an index by name.
    pub fn find_index(&self, name: &str) -> Option<&IndexSpec> {
        self.indexes.iter().find(|i| i.name == name)
    }

    fn validate(&self) -> Result<(), SchemaError> {
        if !path::is_identifier(&self.name) {
            return Err(SchemaError::InvalidCollectionName(self.name.clone()));
        }
        if !path::is_valid_path(&self.key_field) {
            return Err(SchemaError::InvalidKeyField {
                collection: self.name.clone(),
                field: self.key_field.clone(),
            });
        }
        if self.auto_key && !path::is_identifier(&self.key_field) {
            return Err(SchemaError::NestedAutoKey {
                collection: self.name.clone(),
                field: self.key_field.clone(),
            });
        }

        let mut seen = HashSet::new();
        for index in &self.indexes {
            if !path::is_identifier(&index.name) {
                return Err(SchemaError::InvalidIndexName {
                    collection: self.name.clone(),
                    index: index.name.clone(),
                });
            }
            if !seen.insert(index.name.as_str()) {
                return Err(SchemaError::DuplicateIndex {
                    collection: self.name.clone(),
                    index: index.name.clone(),
                });
            }
            if !path::is_valid_path(&index.field) {
                return Err(SchemaError::InvalidIndexField {
                    collection: self.name.clone(),
                    index: index.name.clone(),
                    field: index.field.clone(),
                });
            }
        }
        Ok(())
    }
}

/// The versioned set of collections a store is opened with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaSet {
    pub version: u32,
    pub collections: Vec<CollectionSchema>,
}

impl SchemaSet {
    pub fn new(version: u32, collections: Vec<CollectionSchema>) -> Self {
        Self {
            version,
            collections,
        }
    }

    /// Checks names, paths and uniqueness across the whole set.
    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.version == 0 {
            return Err(SchemaError::InvalidVersion);
        }
        let mut names = HashSet::new();
        for collection in &self.collections {
            collection.validate()?;
            if !names.insert(collection.name.as_str()) {
                return Err(SchemaError::DuplicateCollection(collection.name.clone()));
            }
        }
        Ok(())
    }

    /// Looks up a collection by name.
    pub fn get(&self, name: &str) -> Option<&CollectionSchema> {
        self.collections.iter().find(|c| c.name == name)
    }

    /// Names of all declared collections, in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.collections.iter().map(|c| c.name.as_str())
    }

    /// Adds a collection unless one with the same name is already declared.
    pub fn ensure(&mut self, schema: CollectionSchema) {
        if self.get(&schema.name).is_none() {
            self.collections.push(schema);
        }
    }
}

//! Generic CRUD over the collections of an open store.
//!
//! Every operation runs on the blocking pool against the store's single
//! connection, inside its own SQLite transaction. Successful mutations are
//! reported to the [`ObserverHub`] before the connection is released.

use crate::batch::{BatchOp, BatchOutcome, BatchResult, TransactionFailure};
use crate::error::{StorageError, StorageResult};
use crate::observer::{ChangeEvent, ObserverHub, Subscription};
use crate::query::{conditions_filter, Conditions, QueryOptions};
use crate::registry::Database;
use crate::rows::{self, Scan, WriteMode};
use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use stowage_model::{CollectionSchema, Envelope, IndexSpec, WriteOptions};
use stowage_types::{Clock, Key, Operation, Timestamp};
use tracing::debug;

/// Record counts and space usage of a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageStats {
    pub version: u32,
    pub collections: BTreeMap<String, u64>,
    pub usage_bytes: u64,
    /// Configured quota, when one is set.
    pub quota_bytes: Option<u64>,
}

impl StorageStats {
    /// True once the store has grown to its quota.
    pub fn quota_exhausted(&self) -> bool {
        self.quota_bytes.is_some_and(|quota| self.usage_bytes >= quota)
    }
}

/// The storage engine: typed access to every collection of one handle.
#[derive(Clone)]
pub struct Storage {
    db: Arc<Database>,
    hub: Arc<ObserverHub>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage").field("db", &self.db).finish()
    }
}

impl Storage {
    pub fn new(db: Arc<Database>, hub: Arc<ObserverHub>, clock: Arc<dyn Clock>) -> Self {
        Self { db, hub, clock }
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn hub(&self) -> &Arc<ObserverHub> {
        &self.hub
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Registers a change callback for one collection.
    pub fn subscribe(
        &self,
        collection: &str,
        callback: impl Fn(&ChangeEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Subscription {
        self.hub.subscribe(collection, callback)
    }

    async fn run<R, F>(&self, f: F) -> StorageResult<R>
    where
        R: Send + 'static,
        F: FnOnce(&Database, &mut Connection) -> StorageResult<R> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || db.with_conn(|conn| f(db.as_ref(), conn))).await?
    }

    // ── Writes ───────────────────────────────────────────────────

    /// Inserts a record; fails with [`StorageError::Constraint`] if its key exists.
    pub async fn add(
        &self,
        collection: &str,
        value: Value,
        options: WriteOptions,
    ) -> StorageResult<Key> {
        self.write(collection, value, options, WriteMode::Add).await
    }

    /// Inserts or replaces a record by key.
    pub async fn put(
        &self,
        collection: &str,
        value: Value,
        options: WriteOptions,
    ) -> StorageResult<Key> {
        self.write(collection, value, options, WriteMode::Put).await
    }

    /// Serializes and puts a typed record.
    pub async fn put_as<T: Serialize>(
        &self,
        collection: &str,
        value: &T,
        options: WriteOptions,
    ) -> StorageResult<Key> {
        self.put(collection, serde_json::to_value(value)?, options).await
    }

    async fn write(
        &self,
        collection: &str,
        value: Value,
        options: WriteOptions,
        mode: WriteMode,
    ) -> StorageResult<Key> {
        let collection = collection.to_string();
        let hub = Arc::clone(&self.hub);
        let now = self.now();
        self.run(move |db, conn| {
            let schema = db.collection(&collection)?;
            let tx = conn.transaction()?;
            let (key, stored) = rows::write_record(&tx, schema, value, &options, now, mode)?;
            tx.commit()?;
            hub.notify(&ChangeEvent {
                collection,
                operation: match mode {
                    WriteMode::Add => Operation::Add,
                    WriteMode::Put => Operation::Put,
                },
                key: Some(key.clone()),
                value: Some(stored),
            });
            Ok(key)
        })
        .await
    }

    /// Applies `f` to a stored record in a single transaction.
    ///
    /// Returns the updated value, or `None` if no record has that key.
    /// The record's key must not change.
    pub async fn update<F>(
        &self,
        collection: &str,
        key: impl Into<Key>,
        f: F,
    ) -> StorageResult<Option<Value>>
    where
        F: FnOnce(&mut Value) + Send + 'static,
    {
        let collection = collection.to_string();
        let key = key.into();
        let hub = Arc::clone(&self.hub);
        let now = self.now();
        self.run(move |db, conn| {
            let schema = db.collection(&collection)?;
            let tx = conn.transaction()?;
            let Some(mut envelope) = rows::read_envelope(&tx, schema, &key)? else {
                return Ok(None);
            };
            f(&mut envelope.data);
            if rows::record_key(schema, &envelope.data)?.as_ref() != Some(&key) {
                return Err(StorageError::InvalidData(format!(
                    "update of {key} in {collection:?} changed the record key"
                )));
            }
            envelope.last_modified = now;
            rows::replace_envelope(&tx, schema, &key, &envelope)?;
            tx.commit()?;

            let value = envelope.into_data();
            hub.notify(&ChangeEvent {
                collection,
                operation: Operation::Put,
                key: Some(key),
                value: Some(value.clone()),
            });
            Ok(Some(value))
        })
        .await
    }

    /// Removes a record. Returns whether one existed.
    pub async fn delete(&self, collection: &str, key: impl Into<Key>) -> StorageResult<bool> {
        let collection = collection.to_string();
        let key = key.into();
        let hub = Arc::clone(&self.hub);
        self.run(move |db, conn| {
            let schema = db.collection(&collection)?;
            let removed = rows::delete_record(conn, schema, &key)?;
            hub.notify(&ChangeEvent {
                collection,
                operation: Operation::Delete,
                key: Some(key),
                value: None,
            });
            Ok(removed)
        })
        .await
    }

    /// Removes every record of a collection. Returns how many were removed.
    pub async fn clear(&self, collection: &str) -> StorageResult<usize> {
        let collection = collection.to_string();
        let hub = Arc::clone(&self.hub);
        self.run(move |db, conn| {
            let schema = db.collection(&collection)?;
            let removed = rows::clear_records(conn, schema)?;
            hub.notify(&ChangeEvent {
                collection,
                operation: Operation::Clear,
                key: None,
                value: None,
            });
            Ok(removed)
        })
        .await
    }

    /// Removes every record `get_all(collection, options)` would return,
    /// selecting and deleting in one transaction. Returns the removed keys.
    pub async fn delete_matching(
        &self,
        collection: &str,
        options: QueryOptions,
    ) -> StorageResult<Vec<Key>> {
        let collection = collection.to_string();
        let hub = Arc::clone(&self.hub);
        self.run(move |db, conn| {
            let schema = db.collection(&collection)?;
            let index = resolve_index(schema, &collection, options.index.clone())?;
            let tx = conn.transaction()?;
            let scan = Scan {
                index,
                value: options.value.clone(),
                range: options.range.clone(),
            };
            let records = rows::scan(&tx, schema, &scan)?
                .into_iter()
                .map(|(_, envelope)| envelope.into_data())
                .collect();

            let mut removed = Vec::new();
            for record in options.refine(records) {
                let key = rows::record_key(schema, &record)?.ok_or_else(|| {
                    StorageError::InvalidData(format!("record in {collection:?} has no key"))
                })?;
                if rows::delete_record(&tx, schema, &key)? {
                    removed.push(key);
                }
            }
            tx.commit()?;

            for key in &removed {
                hub.notify(&ChangeEvent {
                    collection: collection.clone(),
                    operation: Operation::Delete,
                    key: Some(key.clone()),
                    value: None,
                });
            }
            debug!("deleted {} matching records from {collection}", removed.len());
            Ok(removed)
        })
        .await
    }

    // ── Reads ────────────────────────────────────────────────────

    /// Reads one record; `None` when the key is absent.
    pub async fn get(&self, collection: &str, key: impl Into<Key>) -> StorageResult<Option<Value>> {
        Ok(self
            .get_envelope(collection, key)
            .await?
            .map(Envelope::into_data))
    }

    /// Reads and deserializes one record.
    pub async fn get_as<T: DeserializeOwned>(
        &self,
        collection: &str,
        key: impl Into<Key>,
    ) -> StorageResult<Option<T>> {
        match self.get(collection, key).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Reads one record with its metadata.
    pub async fn get_envelope(
        &self,
        collection: &str,
        key: impl Into<Key>,
    ) -> StorageResult<Option<Envelope>> {
        let collection = collection.to_string();
        let key = key.into();
        self.run(move |db, conn| rows::read_envelope(conn, db.collection(&collection)?, &key))
            .await
    }

    /// Reads records by primary key or index, then filters, sorts and pages
    /// them in memory.
    pub async fn get_all(&self, collection: &str, options: QueryOptions) -> StorageResult<Vec<Value>> {
        let records = self
            .scan(collection, &options)
            .await?
            .into_iter()
            .map(|(_, envelope)| envelope.into_data())
            .collect();
        Ok(options.refine(records))
    }

    /// Every record of a collection with its metadata, in key order.
    pub async fn get_all_envelopes(&self, collection: &str) -> StorageResult<Vec<Envelope>> {
        Ok(self
            .scan(collection, &QueryOptions::default())
            .await?
            .into_iter()
            .map(|(_, envelope)| envelope)
            .collect())
    }

    async fn scan(
        &self,
        collection: &str,
        options: &QueryOptions,
    ) -> StorageResult<Vec<(Key, Envelope)>> {
        let collection = collection.to_string();
        let index = options.index.clone();
        let value = options.value.clone();
        let range = options.range.clone();
        self.run(move |db, conn| {
            let schema = db.collection(&collection)?;
            let index = resolve_index(schema, &collection, index)?;
            rows::scan(conn, schema, &Scan { index, value, range })
        })
        .await
    }

    /// Counts records; with a query, counts what `get_all` would return.
    pub async fn count(&self, collection: &str, query: Option<QueryOptions>) -> StorageResult<u64> {
        match query {
            Some(options) => Ok(self.get_all(collection, options).await?.len() as u64),
            None => {
                let collection = collection.to_string();
                self.run(move |db, conn| rows::count_records(conn, db.collection(&collection)?))
                    .await
            }
        }
    }

    /// Records whose fields satisfy every condition.
    pub async fn query(&self, collection: &str, conditions: Conditions) -> StorageResult<Vec<Value>> {
        let options = QueryOptions {
            filter: Some(conditions_filter(conditions)),
            ..QueryOptions::default()
        };
        self.get_all(collection, options).await
    }

    // ── Batches ──────────────────────────────────────────────────

    /// Applies every operation in one transaction.
    ///
    /// If any step fails the transaction is rolled back and
    /// [`StorageError::Transaction`] reports each step's outcome.
    pub async fn batch(&self, ops: Vec<BatchOp>) -> StorageResult<Vec<BatchResult>> {
        let hub = Arc::clone(&self.hub);
        let now = self.now();
        self.run(move |db, conn| {
            let tx = conn.transaction()?;
            let mut results = Vec::with_capacity(ops.len());
            let mut changes = Vec::with_capacity(ops.len());

            for (i, op) in ops.iter().enumerate() {
                match apply_op(&tx, db, op, now) {
                    Ok((result, change)) => {
                        results.push(result);
                        changes.push(change);
                    }
                    Err(err) => {
                        drop(tx);
                        let reason = err.to_string();
                        debug!("batch aborted at step {i}: {reason}");
                        let mut outcomes: Vec<BatchOutcome> =
                            results.into_iter().map(BatchOutcome::RolledBack).collect();
                        outcomes.push(BatchOutcome::Failed(reason.clone()));
                        outcomes.extend((i + 1..ops.len()).map(|_| BatchOutcome::NotAttempted));
                        return Err(StorageError::Transaction(Box::new(TransactionFailure {
                            failed_index: i,
                            collection: op.collection().to_string(),
                            operation: op.operation(),
                            reason,
                            outcomes,
                        })));
                    }
                }
            }

            tx.commit()?;
            for change in &changes {
                hub.notify(change);
            }
            Ok(results)
        })
        .await
    }

    // ── Administration ───────────────────────────────────────────

    /// Per-collection counts and space usage.
    pub async fn statistics(&self) -> StorageResult<StorageStats> {
        self.run(|db, conn| {
            let mut collections = BTreeMap::new();
            for schema in &db.schemas().collections {
                collections.insert(schema.name.clone(), rows::count_records(conn, schema)?);
            }
            let page_size: i64 = conn.query_row("PRAGMA page_size", [], |row| row.get(0))?;
            let page_count: i64 = conn.query_row("PRAGMA page_count", [], |row| row.get(0))?;
            let quota_bytes = match db.quota_bytes() {
                Some(_) => {
                    let max_pages: i64 =
                        conn.query_row("PRAGMA max_page_count", [], |row| row.get(0))?;
                    Some(u64::try_from(max_pages.saturating_mul(page_size)).unwrap_or(0))
                }
                None => None,
            };
            Ok(StorageStats {
                version: db.version(),
                collections,
                usage_bytes: u64::try_from(page_count.saturating_mul(page_size)).unwrap_or(0),
                quota_bytes,
            })
        })
        .await
    }
}

fn apply_op(
    conn: &Connection,
    db: &Database,
    op: &BatchOp,
    now: Timestamp,
) -> StorageResult<(BatchResult, ChangeEvent)> {
    let schema = db.collection(op.collection())?;
    let change = |key: Option<Key>, value: Option<Value>| ChangeEvent {
        collection: schema.name.clone(),
        operation: op.operation(),
        key,
        value,
    };
    match op {
        BatchOp::Add { value, options, .. } | BatchOp::Put { value, options, .. } => {
            let mode = match op {
                BatchOp::Add { .. } => WriteMode::Add,
                _ => WriteMode::Put,
            };
            let (key, stored) =
                rows::write_record(conn, schema, value.clone(), options, now, mode)?;
            Ok((BatchResult::Written(key.clone()), change(Some(key), Some(stored))))
        }
        BatchOp::Delete { key, .. } => {
            let removed = rows::delete_record(conn, schema, key)?;
            Ok((BatchResult::Deleted(removed), change(Some(key.clone()), None)))
        }
        BatchOp::Clear { .. } => {
            let removed = rows::clear_records(conn, schema)?;
            Ok((BatchResult::Cleared(removed), change(None, None)))
        }
        BatchOp::Restore { envelope, .. } => {
            let key = rows::restore_envelope(conn, schema, envelope)?;
            Ok((
                BatchResult::Written(key.clone()),
                change(Some(key), Some(envelope.data.clone())),
            ))
        }
    }
}

fn resolve_index(
    schema: &CollectionSchema,
    collection: &str,
    index: Option<String>,
) -> StorageResult<Option<IndexSpec>> {
    match index {
        Some(name) => schema
            .find_index(&name)
            .cloned()
            .map(Some)
            .ok_or_else(|| StorageError::UnknownIndex {
                collection: collection.to_string(),
                index: name,
            }),
        None => Ok(None),
    }
}

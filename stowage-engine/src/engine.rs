//! The engine facade.
//!
//! Owns the configuration, the observer hub and, once initialized, the open
//! store and its maintenance scheduler. Every public operation initializes
//! lazily: the first call opens (or upgrades) the store, and concurrent
//! first calls wait for that same open instead of starting their own.

use crate::cache::CacheManager;
use crate::collections::{
    MetricFilter, PerformanceMetric, Setting, DEFAULT_SETTING_CATEGORY, PERFORMANCE_METRICS,
    SETTINGS, SYNC_QUEUE,
};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::maintenance::{Maintenance, MaintenanceReport, Scheduler};
use crate::snapshot::{self, ImportOptions, ImportOutcome, Snapshot};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use stowage_model::{Envelope, SchemaSet, WriteOptions};
use stowage_storage::{
    BatchOp, BatchResult, ChangeEvent, Conditions, Database, HandleRegistry, ObserverHub,
    QueryOptions, Storage, StorageError, Subscription,
};
use stowage_sync::SyncQueue;
use stowage_types::{Clock, Key, SyncStatus, SystemClock};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Store-wide counts and space usage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    pub schema_version: u32,
    pub collections: BTreeMap<String, u64>,
    pub usage_bytes: u64,
    pub quota_bytes: Option<u64>,
    pub quota_exhausted: bool,
    pub pending_sync_items: u64,
}

struct Running {
    storage: Storage,
    scheduler: Option<Scheduler>,
}

/// Offline-first storage engine.
pub struct Engine {
    config: EngineConfig,
    schemas: SchemaSet,
    registry: Arc<HandleRegistry>,
    hub: Arc<ObserverHub>,
    clock: Arc<dyn Clock>,
    state: Mutex<Option<Running>>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("name", &self.config.name)
            .field("location", &self.config.location)
            .field("version", &self.config.version)
            .finish()
    }
}

impl Engine {
    /// Creates an engine on the system clock and the process-wide handle
    /// registry. Fails if the configured schemas are malformed.
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        Self::with_parts(config, Arc::new(SystemClock), HandleRegistry::shared())
    }

    /// Creates an engine with an explicit clock and handle registry.
    pub fn with_parts(
        config: EngineConfig,
        clock: Arc<dyn Clock>,
        registry: Arc<HandleRegistry>,
    ) -> EngineResult<Self> {
        let schemas = config.schema_set();
        schemas.validate().map_err(StorageError::from)?;
        Ok(Self {
            config,
            schemas,
            registry,
            hub: ObserverHub::new(),
            clock,
            state: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Opens the store if it is not open yet. Idempotent.
    pub async fn init(&self) -> EngineResult<()> {
        self.storage().await.map(|_| ())
    }

    pub async fn is_initialized(&self) -> bool {
        self.state.lock().await.is_some()
    }

    /// The open store, opening it on first use.
    pub async fn storage(&self) -> EngineResult<Storage> {
        let mut state = self.state.lock().await;
        if let Some(running) = state.as_ref() {
            return Ok(running.storage.clone());
        }

        let options = self.config.open_options(Arc::clone(&self.registry));
        let db = Database::open(&self.config.name, &self.config.location, &self.schemas, &options)
            .await?;
        let storage = Storage::new(db, Arc::clone(&self.hub), Arc::clone(&self.clock));
        let scheduler = self.config.maintenance.enabled.then(|| {
            Scheduler::start(Maintenance::new(
                storage.clone(),
                self.config.maintenance.clone(),
            ))
        });
        info!(
            "Engine ready: store {} at version {}",
            self.config.name,
            storage.database().version()
        );

        *state = Some(Running {
            storage: storage.clone(),
            scheduler,
        });
        Ok(storage)
    }

    /// Stops maintenance and releases the store. A later call re-opens it.
    pub async fn close(&self) {
        let Some(running) = self.state.lock().await.take() else {
            return;
        };
        if let Some(scheduler) = running.scheduler {
            scheduler.stop().await;
        }
        let db = Arc::clone(running.storage.database());
        if let Err(e) = tokio::task::spawn_blocking(move || db.close()).await {
            warn!("closing store {} failed: {e}", self.config.name);
        }
        info!("Engine closed: store {}", self.config.name);
    }

    /// Closes the engine and removes the whole store.
    ///
    /// Fails with [`StorageError::Blocked`] while another handle on the
    /// store is open.
    pub async fn delete_database(&self) -> EngineResult<()> {
        self.close().await;
        let name = self.config.name.clone();
        let location = self.config.location.clone();
        let registry = Arc::clone(&self.registry);
        tokio::task::spawn_blocking(move || Database::delete_database(&name, &location, &registry))
            .await??;
        Ok(())
    }

    // ── Records ──────────────────────────────────────────────────

    pub async fn add(&self, collection: &str, value: Value, options: WriteOptions) -> EngineResult<Key> {
        Ok(self.storage().await?.add(collection, value, options).await?)
    }

    pub async fn put(&self, collection: &str, value: Value, options: WriteOptions) -> EngineResult<Key> {
        Ok(self.storage().await?.put(collection, value, options).await?)
    }

    pub async fn put_as<T: Serialize>(
        &self,
        collection: &str,
        value: &T,
        options: WriteOptions,
    ) -> EngineResult<Key> {
        Ok(self.storage().await?.put_as(collection, value, options).await?)
    }

    pub async fn get(&self, collection: &str, key: impl Into<Key>) -> EngineResult<Option<Value>> {
        Ok(self.storage().await?.get(collection, key).await?)
    }

    pub async fn get_as<T: DeserializeOwned>(
        &self,
        collection: &str,
        key: impl Into<Key>,
    ) -> EngineResult<Option<T>> {
        Ok(self.storage().await?.get_as(collection, key).await?)
    }

    pub async fn get_envelope(
        &self,
        collection: &str,
        key: impl Into<Key>,
    ) -> EngineResult<Option<Envelope>> {
        Ok(self.storage().await?.get_envelope(collection, key).await?)
    }

    pub async fn get_all(&self, collection: &str, options: QueryOptions) -> EngineResult<Vec<Value>> {
        Ok(self.storage().await?.get_all(collection, options).await?)
    }

    pub async fn update<F>(
        &self,
        collection: &str,
        key: impl Into<Key>,
        f: F,
    ) -> EngineResult<Option<Value>>
    where
        F: FnOnce(&mut Value) + Send + 'static,
    {
        Ok(self.storage().await?.update(collection, key, f).await?)
    }

    pub async fn delete(&self, collection: &str, key: impl Into<Key>) -> EngineResult<bool> {
        Ok(self.storage().await?.delete(collection, key).await?)
    }

    pub async fn clear(&self, collection: &str) -> EngineResult<usize> {
        Ok(self.storage().await?.clear(collection).await?)
    }

    pub async fn count(&self, collection: &str, query: Option<QueryOptions>) -> EngineResult<u64> {
        Ok(self.storage().await?.count(collection, query).await?)
    }

    pub async fn query(&self, collection: &str, conditions: Conditions) -> EngineResult<Vec<Value>> {
        Ok(self.storage().await?.query(collection, conditions).await?)
    }

    pub async fn batch(&self, ops: Vec<BatchOp>) -> EngineResult<Vec<BatchResult>> {
        Ok(self.storage().await?.batch(ops).await?)
    }

    /// Registers a change callback. Subscriptions outlive `close()`.
    pub fn subscribe(
        &self,
        collection: &str,
        callback: impl Fn(&ChangeEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Subscription {
        self.hub.subscribe(collection, callback)
    }

    // ── Specialized collections ──────────────────────────────────

    pub async fn sync_queue(&self) -> EngineResult<SyncQueue> {
        Ok(SyncQueue::new(self.storage().await?))
    }

    pub async fn cache(&self) -> EngineResult<CacheManager> {
        Ok(CacheManager::new(self.storage().await?))
    }

    pub async fn get_setting(&self, key: &str) -> EngineResult<Option<Value>> {
        let setting = self.storage().await?.get_as::<Setting>(SETTINGS, key).await?;
        Ok(setting.map(|s| s.value))
    }

    pub async fn get_setting_as<T: DeserializeOwned>(&self, key: &str) -> EngineResult<Option<T>> {
        match self.get_setting(key).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Writes a setting; the category defaults to `general`.
    pub async fn set_setting(
        &self,
        key: &str,
        value: Value,
        category: Option<&str>,
    ) -> EngineResult<Setting> {
        let storage = self.storage().await?;
        let setting = Setting {
            key: key.to_string(),
            value,
            category: category.unwrap_or(DEFAULT_SETTING_CATEGORY).to_string(),
            last_modified: storage.now(),
        };
        storage.put_as(SETTINGS, &setting, WriteOptions::default()).await?;
        Ok(setting)
    }

    /// Every setting, optionally restricted to one category, in key order.
    pub async fn settings(&self, category: Option<&str>) -> EngineResult<Vec<Setting>> {
        let options = match category {
            Some(category) => QueryOptions::new().index("category").value(category),
            None => QueryOptions::new(),
        };
        let mut settings = self
            .storage()
            .await?
            .get_all(SETTINGS, options)
            .await?
            .into_iter()
            .map(serde_json::from_value::<Setting>)
            .collect::<Result<Vec<_>, _>>()?;
        settings.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(settings)
    }

    /// Appends one performance measurement. Returns its id.
    pub async fn record_metric(
        &self,
        metric: &str,
        value: f64,
        category: &str,
        metadata: Map<String, Value>,
    ) -> EngineResult<i64> {
        let storage = self.storage().await?;
        let record = PerformanceMetric {
            id: None,
            metric: metric.to_string(),
            value,
            category: category.to_string(),
            timestamp: storage.now(),
            metadata,
        };
        let write = WriteOptions::default().with_sync_status(SyncStatus::Synced);
        let key = storage
            .add(PERFORMANCE_METRICS, serde_json::to_value(&record)?, write)
            .await?;
        key.as_int().ok_or_else(|| {
            EngineError::Storage(StorageError::InvalidData(format!(
                "metric stored under non-integer key {key}"
            )))
        })
    }

    /// Recorded metrics matching `filter`, oldest first.
    pub async fn metrics(&self, filter: MetricFilter) -> EngineResult<Vec<PerformanceMetric>> {
        let mut options = match &filter.metric {
            Some(metric) => QueryOptions::new().index("metric").value(metric.as_str()),
            None => QueryOptions::new(),
        };
        let category = filter.category.clone();
        let since = filter.since.map(|t| t.as_millis());
        options = options.filter(move |record| {
            let category_ok = category
                .as_deref()
                .is_none_or(|c| record.get("category").and_then(Value::as_str) == Some(c));
            let since_ok = since.is_none_or(|s| {
                record
                    .get("timestamp")
                    .and_then(Value::as_i64)
                    .is_some_and(|t| t >= s)
            });
            category_ok && since_ok
        });

        let mut metrics = self
            .storage()
            .await?
            .get_all(PERFORMANCE_METRICS, options)
            .await?
            .into_iter()
            .map(serde_json::from_value::<PerformanceMetric>)
            .collect::<Result<Vec<_>, _>>()?;
        metrics.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
        if let Some(limit) = filter.limit {
            metrics.truncate(limit);
        }
        Ok(metrics)
    }

    // ── Administration ───────────────────────────────────────────

    pub async fn statistics(&self) -> EngineResult<Statistics> {
        let stats = self.storage().await?.statistics().await?;
        Ok(Statistics {
            schema_version: stats.version,
            pending_sync_items: stats.collections.get(SYNC_QUEUE).copied().unwrap_or(0),
            quota_exhausted: stats.quota_exhausted(),
            collections: stats.collections,
            usage_bytes: stats.usage_bytes,
            quota_bytes: stats.quota_bytes,
        })
    }

    /// Runs one maintenance cycle now, independent of the scheduler.
    pub async fn run_maintenance(&self) -> EngineResult<MaintenanceReport> {
        let storage = self.storage().await?;
        Ok(Maintenance::new(storage, self.config.maintenance.clone())
            .run_cycle()
            .await)
    }

    /// Dumps `collections`, or every declared collection.
    pub async fn export(&self, collections: Option<&[String]>) -> EngineResult<Snapshot> {
        snapshot::export(&self.storage().await?, collections).await
    }

    /// Restores a snapshot. Outcomes are reported per collection.
    pub async fn import(
        &self,
        snapshot: &Snapshot,
        options: &ImportOptions,
    ) -> EngineResult<BTreeMap<String, ImportOutcome>> {
        Ok(snapshot::import(&self.storage().await?, snapshot, options).await)
    }
}

//! Offline-first storage engine for Stowage.
//!
//! [`Engine`] ties the pieces together: it opens the store lazily from an
//! [`EngineConfig`], exposes generic record CRUD, and layers the built-in
//! collections on top:
//!
//! - `syncQueue`: pending mutations for the external sync worker ([`stowage_sync::SyncQueue`])
//! - `apiCache`: TTL cache of network payloads ([`CacheManager`])
//! - `performanceMetrics`: append-only measurements, pruned by age
//! - `settings`: last-write-wins key/value settings
//!
//! A background [`maintenance`] cycle sweeps expired cache entries, prunes
//! old metrics and drops sync items that are both old and out of retries.
//! [`snapshot`] dumps and restores whole stores.
//!
//! # Example
//!
//! ```no_run
//! use serde_json::json;
//! use stowage_engine::{Engine, EngineConfig};
//! use stowage_model::{CollectionSchema, WriteOptions};
//!
//! # async fn demo() -> stowage_engine::EngineResult<()> {
//! let config = EngineConfig {
//!     name: "app".into(),
//!     schemas: vec![CollectionSchema::new("tasks", "id").index("status")],
//!     ..EngineConfig::default()
//! };
//! let engine = Engine::new(config)?;
//! engine.put("tasks", json!({"id": "t1", "status": "open"}), WriteOptions::default()).await?;
//! let task = engine.get("tasks", "t1").await?;
//! engine.close().await;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod collections;
mod config;
mod engine;
mod error;
pub mod maintenance;
pub mod snapshot;

pub use cache::{CacheEntry, CacheManager, CacheOptions};
pub use collections::{MetricFilter, PerformanceMetric, Setting};
pub use config::{EngineConfig, MaintenanceConfig};
pub use engine::{Engine, Statistics};
pub use error::{EngineError, EngineResult};
pub use maintenance::{Maintenance, MaintenanceReport, TaskOutcome};
pub use snapshot::{ImportOptions, ImportOutcome, Snapshot};

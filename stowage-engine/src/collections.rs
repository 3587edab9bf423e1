//! Built-in collections every engine store carries, and their record types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use stowage_model::CollectionSchema;
use stowage_types::Timestamp;

pub use stowage_sync::SYNC_QUEUE;

pub const API_CACHE: &str = "apiCache";
pub const PERFORMANCE_METRICS: &str = "performanceMetrics";
pub const SETTINGS: &str = "settings";

/// Category given to settings written without one.
pub const DEFAULT_SETTING_CATEGORY: &str = "general";

pub fn api_cache_schema() -> CollectionSchema {
    CollectionSchema::new(API_CACHE, "url")
        .index("expiry")
        .index("timestamp")
}

pub fn performance_metrics_schema() -> CollectionSchema {
    CollectionSchema::new(PERFORMANCE_METRICS, "id")
        .auto_key()
        .index("metric")
        .index("category")
        .index("timestamp")
}

pub fn settings_schema() -> CollectionSchema {
    CollectionSchema::new(SETTINGS, "key").index("category")
}

/// All built-in schemas, in the order they are created.
pub fn builtin_schemas() -> Vec<CollectionSchema> {
    vec![
        stowage_sync::sync_queue_schema(),
        api_cache_schema(),
        performance_metrics_schema(),
        settings_schema(),
    ]
}

/// One named setting. Last write wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Setting {
    pub key: String,
    pub value: Value,
    pub category: String,
    pub last_modified: Timestamp,
}

/// One recorded measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetric {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub metric: String,
    pub value: f64,
    pub category: String,
    pub timestamp: Timestamp,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Restricts [`crate::Engine::metrics`]. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricFilter {
    pub metric: Option<String>,
    pub category: Option<String>,
    /// Only metrics recorded at or after this instant.
    pub since: Option<Timestamp>,
    pub limit: Option<usize>,
}

impl MetricFilter {
    pub fn metric(name: impl Into<String>) -> Self {
        Self {
            metric: Some(name.into()),
            ..Self::default()
        }
    }
}

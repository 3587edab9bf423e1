//! Engine configuration.

use crate::collections::builtin_schemas;
use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use stowage_model::{CollectionSchema, SchemaSet};
use stowage_storage::{HandleRegistry, OpenOptions, StoreLocation};

const HOUR_SECS: u64 = 60 * 60;

/// Configuration for [`crate::Engine`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Store name; on disk the file is `<location>/<name>.db`.
    pub name: String,
    pub location: StoreLocation,
    /// Schema version of `schemas`.
    pub version: u32,
    /// Application collections. The built-in ones are added automatically.
    pub schemas: Vec<CollectionSchema>,
    pub busy_timeout_ms: u64,
    pub quota_bytes: Option<u64>,
    pub maintenance: MaintenanceConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            name: "stowage".to_string(),
            location: StoreLocation::Memory,
            version: 1,
            schemas: Vec::new(),
            busy_timeout_ms: 5_000,
            quota_bytes: None,
            maintenance: MaintenanceConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Loads a JSON configuration file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("cannot read {}: {e}", path.display())))?;
        serde_json::from_str(&raw)
            .map_err(|e| EngineError::Config(format!("invalid config {}: {e}", path.display())))
    }

    /// The declared schemas plus every built-in collection.
    pub fn schema_set(&self) -> SchemaSet {
        let mut set = SchemaSet::new(self.version, self.schemas.clone());
        for schema in builtin_schemas() {
            set.ensure(schema);
        }
        set
    }

    pub(crate) fn open_options(&self, registry: Arc<HandleRegistry>) -> OpenOptions {
        OpenOptions {
            busy_timeout: Duration::from_millis(self.busy_timeout_ms),
            quota_bytes: self.quota_bytes,
            registry,
        }
    }
}

/// Settings for the recurring maintenance cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// Whether the scheduler runs at all.
    pub enabled: bool,
    pub interval_secs: u64,
    /// Metrics older than this are pruned.
    pub metric_retention_secs: u64,
    /// Exhausted sync items older than this are pruned.
    pub sync_item_max_age_secs: u64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: HOUR_SECS,
            metric_retention_secs: 7 * 24 * HOUR_SECS,
            sync_item_max_age_secs: 24 * HOUR_SECS,
        }
    }
}

impl MaintenanceConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn metric_retention(&self) -> Duration {
        Duration::from_secs(self.metric_retention_secs)
    }

    pub fn sync_item_max_age(&self) -> Duration {
        Duration::from_secs(self.sync_item_max_age_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_always_present() {
        let config = EngineConfig {
            schemas: vec![CollectionSchema::new("tasks", "id")],
            ..EngineConfig::default()
        };
        let schema_set = config.schema_set();
        let names: Vec<&str> = schema_set.names().collect();
        assert_eq!(
            names,
            vec!["tasks", "syncQueue", "apiCache", "performanceMetrics", "settings"]
        );
    }

    #[test]
    fn partial_json_takes_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"name": "app", "maintenance": {"enabled": false}}"#).unwrap();
        assert_eq!(config.name, "app");
        assert_eq!(config.version, 1);
        assert!(!config.maintenance.enabled);
        assert_eq!(config.maintenance.interval_secs, 3600);
        assert_eq!(config.location, StoreLocation::Memory);
    }

    #[test]
    fn directory_location_from_json() {
        let config: EngineConfig = serde_json::from_str(
            r#"{"location": {"kind": "directory", "path": "/var/lib/app"},
                "schemas": [{"name": "tasks", "keyField": "id",
                             "indexes": [{"name": "status", "field": "status"}]}]}"#,
        )
        .unwrap();
        assert_eq!(config.location, StoreLocation::directory("/var/lib/app"));
        assert_eq!(config.schemas[0].indexes[0].field, "status");
        assert!(!config.schemas[0].indexes[0].unique);
    }
}

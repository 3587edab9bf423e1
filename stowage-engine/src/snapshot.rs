//! Whole-store export and import.
//!
//! A snapshot carries raw envelopes, so metadata (`lastModified`,
//! `syncStatus`, `version`) survives a round trip. Each collection is
//! imported in its own atomic batch; one failing collection never stops
//! the others.

use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use stowage_model::Envelope;
use stowage_storage::{BatchOp, Storage};
use stowage_types::Timestamp;
use tracing::{info, warn};

/// Serializable dump of a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Schema version of the exporting store.
    pub version: u32,
    /// When the export was taken.
    pub timestamp: Timestamp,
    /// Envelopes per collection, in key order.
    pub data: BTreeMap<String, Vec<Envelope>>,
}

impl Snapshot {
    pub fn to_json_string(&self) -> EngineResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json_str(raw: &str) -> EngineResult<Self> {
        serde_json::from_str(raw).map_err(|e| EngineError::Snapshot(e.to_string()))
    }

    /// Total number of records across collections.
    pub fn record_count(&self) -> usize {
        self.data.values().map(Vec::len).sum()
    }
}

/// Options for [`import`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportOptions {
    /// Clear each imported collection first.
    pub overwrite: bool,
    /// Import only these collections; `None` imports everything in the snapshot.
    pub collections: Option<Vec<String>>,
}

/// What happened to one collection during import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ImportOutcome {
    Imported { count: usize },
    Failed { error: String },
}

impl ImportOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ImportOutcome::Imported { .. })
    }
}

/// Dumps `collections`, or every collection the store was opened with.
/// Collections left on disk by an older schema set are not included.
pub async fn export(storage: &Storage, collections: Option<&[String]>) -> EngineResult<Snapshot> {
    let names: Vec<String> = match collections {
        Some(names) => names.to_vec(),
        None => storage.database().declared_collections().to_vec(),
    };

    let mut data = BTreeMap::new();
    for name in names {
        let envelopes = storage.get_all_envelopes(&name).await?;
        data.insert(name, envelopes);
    }
    let snapshot = Snapshot {
        version: storage.database().version(),
        timestamp: storage.now(),
        data,
    };
    info!(
        "Exported {} records from {} collections",
        snapshot.record_count(),
        snapshot.data.len()
    );
    Ok(snapshot)
}

/// Restores `snapshot` collection by collection.
pub async fn import(
    storage: &Storage,
    snapshot: &Snapshot,
    options: &ImportOptions,
) -> BTreeMap<String, ImportOutcome> {
    let current = storage.database().version();
    if snapshot.version > current {
        warn!(
            "Importing snapshot of version {} into store at version {current}",
            snapshot.version
        );
    }

    let mut outcomes = BTreeMap::new();
    for (name, envelopes) in &snapshot.data {
        if options
            .collections
            .as_ref()
            .is_some_and(|only| !only.contains(name))
        {
            continue;
        }

        let mut ops = Vec::with_capacity(envelopes.len() + 1);
        if options.overwrite {
            ops.push(BatchOp::clear(name.as_str()));
        }
        ops.extend(
            envelopes
                .iter()
                .map(|envelope| BatchOp::restore(name.as_str(), envelope.clone())),
        );

        let outcome = match storage.batch(ops).await {
            Ok(_) => ImportOutcome::Imported {
                count: envelopes.len(),
            },
            Err(e) => {
                warn!("Import of {name} failed: {e}");
                ImportOutcome::Failed {
                    error: e.to_string(),
                }
            }
        };
        outcomes.insert(name.clone(), outcome);
    }
    outcomes
}

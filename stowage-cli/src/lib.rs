//! Administration commands for Stowage stores.
//!
//! The binary in `main.rs` parses arguments and sets up logging; everything
//! that touches a store lives here so it can be driven from tests.

use anyhow::{Context, Result};
use clap::Subcommand;
use serde_json::Value;
use std::path::{Path, PathBuf};
use stowage_engine::{Engine, EngineConfig, ImportOptions, Snapshot};
use stowage_storage::StoreLocation;
use stowage_sync::QueueFilter;
use tracing::info;

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print record counts and space usage
    Stats,

    /// Write a snapshot of the store as JSON
    Export {
        /// Output file; prints to stdout when omitted
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Only export these collections
        #[arg(short, long = "collection")]
        collections: Vec<String>,
    },

    /// Restore a snapshot written by `export`
    Import {
        /// Snapshot file
        file: PathBuf,

        /// Clear each imported collection first
        #[arg(long)]
        overwrite: bool,

        /// Only import these collections
        #[arg(short, long = "collection")]
        collections: Vec<String>,
    },

    /// Run one maintenance cycle
    Maintain,

    /// List pending sync items in processing order
    Queue {
        /// Only items targeting this collection
        #[arg(short, long)]
        store: Option<String>,
    },
}

/// Builds the engine configuration: the JSON file if given, then the
/// `--dir` and `--name` overrides on top.
pub fn resolve_config(
    config: Option<&Path>,
    dir: Option<&Path>,
    name: Option<&str>,
) -> Result<EngineConfig> {
    let mut resolved = match config {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };
    if let Some(dir) = dir {
        resolved.location = StoreLocation::directory(dir);
    }
    if let Some(name) = name {
        resolved.name = name.to_string();
    }
    // One-shot commands never want the background scheduler.
    resolved.maintenance.enabled = false;
    Ok(resolved)
}

/// Runs `command` against `engine` and returns the JSON to print, if any.
pub async fn run(engine: &Engine, command: Command) -> Result<Option<Value>> {
    match command {
        Command::Stats => {
            let stats = engine.statistics().await?;
            Ok(Some(serde_json::to_value(stats)?))
        }
        Command::Export { out, collections } => {
            let only = (!collections.is_empty()).then_some(collections);
            let snapshot = engine.export(only.as_deref()).await?;
            match out {
                Some(path) => {
                    tokio::fs::write(&path, snapshot.to_json_string()?)
                        .await
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    info!(
                        "Wrote {} records to {}",
                        snapshot.record_count(),
                        path.display()
                    );
                    Ok(None)
                }
                None => Ok(Some(serde_json::to_value(&snapshot)?)),
            }
        }
        Command::Import {
            file,
            overwrite,
            collections,
        } => {
            let raw = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let snapshot = Snapshot::from_json_str(&raw)?;
            let options = ImportOptions {
                overwrite,
                collections: (!collections.is_empty()).then_some(collections),
            };
            let outcomes = engine.import(&snapshot, &options).await?;
            Ok(Some(serde_json::to_value(outcomes)?))
        }
        Command::Maintain => {
            let report = engine.run_maintenance().await?;
            Ok(Some(serde_json::to_value(report)?))
        }
        Command::Queue { store } => {
            let filter = store.map(QueueFilter::store);
            let items = engine.sync_queue().await?.list(filter).await?;
            Ok(Some(serde_json::to_value(items)?))
        }
    }
}

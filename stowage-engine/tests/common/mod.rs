//! Shared test helpers for engine tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use stowage_engine::{Engine, EngineConfig, MaintenanceConfig};
use stowage_model::CollectionSchema;
use stowage_storage::HandleRegistry;
use stowage_types::{ManualClock, Timestamp};

pub const START: Timestamp = Timestamp::from_millis(1_700_000_000_000);

pub fn unique_name(prefix: &str) -> String {
    static NEXT: AtomicUsize = AtomicUsize::new(0);
    format!("{prefix}_{}_{}", std::process::id(), NEXT.fetch_add(1, Ordering::SeqCst))
}

/// In-memory config with two application collections and no scheduler.
pub fn config(name: &str) -> EngineConfig {
    EngineConfig {
        name: name.to_string(),
        schemas: vec![
            CollectionSchema::new("tasks", "id").index("status"),
            CollectionSchema::new("notes", "id").auto_key(),
        ],
        maintenance: MaintenanceConfig {
            enabled: false,
            ..MaintenanceConfig::default()
        },
        ..EngineConfig::default()
    }
}

pub struct TestEngine {
    pub engine: Engine,
    pub clock: Arc<ManualClock>,
    pub registry: Arc<HandleRegistry>,
}

pub fn engine_with(config: EngineConfig) -> TestEngine {
    let clock = Arc::new(ManualClock::new(START));
    let registry = Arc::new(HandleRegistry::new());
    let engine = Engine::with_parts(config, clock.clone(), Arc::clone(&registry)).unwrap();
    TestEngine {
        engine,
        clock,
        registry,
    }
}

pub fn memory_engine() -> TestEngine {
    engine_with(config(&unique_name("engine")))
}

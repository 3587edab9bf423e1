//! Shared test helpers for storage tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use stowage_model::{CollectionSchema, SchemaSet};
use stowage_storage::{Database, HandleRegistry, ObserverHub, OpenOptions, Storage, StoreLocation};
use stowage_types::{ManualClock, Timestamp};

/// A store name no other test in this binary uses.
pub fn unique_name(prefix: &str) -> String {
    static NEXT: AtomicUsize = AtomicUsize::new(0);
    format!("{prefix}_{}_{}", std::process::id(), NEXT.fetch_add(1, Ordering::SeqCst))
}

pub fn tasks_schema() -> CollectionSchema {
    CollectionSchema::new("tasks", "id")
        .index("status")
        .unique_index("slug")
        .named_index("owner", "meta.owner", false)
}

pub fn notes_schema() -> CollectionSchema {
    CollectionSchema::new("notes", "id").auto_key().index("tag")
}

pub fn schemas(version: u32) -> SchemaSet {
    SchemaSet::new(version, vec![tasks_schema(), notes_schema()])
}

/// Options with a private handle registry so tests never see each other's handles.
pub fn private_options() -> OpenOptions {
    OpenOptions {
        registry: Arc::new(HandleRegistry::new()),
        ..OpenOptions::default()
    }
}

pub struct TestStore {
    pub storage: Storage,
    pub clock: Arc<ManualClock>,
    pub hub: Arc<ObserverHub>,
}

/// Opens a fresh in-memory store with the default test collections.
pub fn open_store() -> TestStore {
    let name = unique_name("store");
    let db = Database::open_or_upgrade(&name, &StoreLocation::Memory, &schemas(1), &private_options())
        .unwrap();
    let clock = Arc::new(ManualClock::new(Timestamp::from_millis(1_000_000)));
    let hub = ObserverHub::new();
    let storage = Storage::new(Arc::new(db), Arc::clone(&hub), clock.clone());
    TestStore { storage, clock, hub }
}

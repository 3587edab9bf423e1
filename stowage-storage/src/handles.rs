//! Tracks which stores currently have open handles in this process.
//!
//! SQLite happily lets any number of connections share a file, so the
//! "another handle is open" conditions that block upgrades and deletion are
//! enforced here rather than by the database itself.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

/// Per-process count of open handles, keyed by store identity.
#[derive(Debug, Default)]
pub struct HandleRegistry {
    open: Mutex<HashMap<String, usize>>,
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry shared by every store in the process.
    pub fn shared() -> Arc<Self> {
        static SHARED: OnceLock<Arc<HandleRegistry>> = OnceLock::new();
        Arc::clone(SHARED.get_or_init(|| Arc::new(HandleRegistry::new())))
    }

    /// Number of handles currently open on `store_id`.
    pub fn open_count(&self, store_id: &str) -> usize {
        let open = self.open.lock().unwrap_or_else(|e| e.into_inner());
        open.get(store_id).copied().unwrap_or(0)
    }

    /// Records a new handle; the count drops again when the guard is dropped.
    pub fn acquire(self: &Arc<Self>, store_id: &str) -> HandleGuard {
        let mut open = self.open.lock().unwrap_or_else(|e| e.into_inner());
        *open.entry(store_id.to_string()).or_insert(0) += 1;
        HandleGuard {
            registry: Arc::clone(self),
            store_id: store_id.to_string(),
        }
    }

    fn release(&self, store_id: &str) {
        let mut open = self.open.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(count) = open.get_mut(store_id) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                open.remove(store_id);
            }
        }
    }
}

/// Keeps one handle registered while alive.
#[derive(Debug)]
pub struct HandleGuard {
    registry: Arc<HandleRegistry>,
    store_id: String,
}

impl HandleGuard {
    pub fn store_id(&self) -> &str {
        &self.store_id
    }
}

impl Drop for HandleGuard {
    fn drop(&mut self) {
        self.registry.release(&self.store_id);
    }
}

//! Schema registry: opens a store and applies the declared schema set.
//!
//! Upgrades are additive only. Missing collections are created with their
//! key configuration and missing indexes are added; nothing that exists on
//! disk is ever dropped, even when it is no longer declared. What has been
//! applied is recorded in three catalog tables so later opens can tell what
//! is already present.

use crate::error::{StorageError, StorageResult};
use crate::handles::{HandleGuard, HandleRegistry};
use crate::rows::{field_expr, index_name, table};
use rusqlite::{params, Connection, ErrorCode, OpenFlags, OptionalExtension, TransactionBehavior};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stowage_model::{CollectionSchema, IndexSpec, SchemaSet};
use tracing::{debug, info, warn};

const CATALOG_DDL: &str = "
    CREATE TABLE IF NOT EXISTS _stowage_meta (
        name TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS _stowage_collections (
        name TEXT PRIMARY KEY,
        key_field TEXT NOT NULL,
        auto_key INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS _stowage_indexes (
        collection TEXT NOT NULL,
        name TEXT NOT NULL,
        field TEXT NOT NULL,
        is_unique INTEGER NOT NULL,
        PRIMARY KEY (collection, name)
    );
";

/// Where a store's bytes live.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreLocation {
    /// `<path>/<name>.db` on disk.
    Directory { path: PathBuf },
    /// A named in-memory database; its contents vanish once the last
    /// handle closes.
    #[default]
    Memory,
}

impl StoreLocation {
    pub fn directory(path: impl Into<PathBuf>) -> Self {
        StoreLocation::Directory { path: path.into() }
    }

    /// Path of the database file, for on-disk stores.
    pub fn file_path(&self, name: &str) -> Option<PathBuf> {
        match self {
            StoreLocation::Directory { path } => Some(path.join(format!("{name}.db"))),
            StoreLocation::Memory => None,
        }
    }

    /// Identity used for handle tracking.
    pub fn store_id(&self, name: &str) -> String {
        match self.file_path(name) {
            Some(path) => path.to_string_lossy().into_owned(),
            None => format!("memory:{name}"),
        }
    }

    fn connect(&self, name: &str) -> StorageResult<Connection> {
        let result = match self {
            StoreLocation::Directory { path } => {
                std::fs::create_dir_all(path).map_err(|e| {
                    StorageError::Open(format!("cannot create {}: {e}", path.display()))
                })?;
                Connection::open(path.join(format!("{name}.db")))
            }
            StoreLocation::Memory => Connection::open_with_flags(
                format!("file:stowage-{name}?mode=memory&cache=shared"),
                OpenFlags::default() | OpenFlags::SQLITE_OPEN_URI,
            ),
        };
        result.map_err(|e| StorageError::Open(format!("{name}: {e}")))
    }
}

/// Connection-level settings applied on open.
#[derive(Debug, Clone)]
pub struct OpenOptions {
    pub busy_timeout: Duration,
    /// Upper bound on the database size; writes past it fail with
    /// [`StorageError::QuotaExceeded`].
    pub quota_bytes: Option<u64>,
    pub registry: Arc<HandleRegistry>,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_millis(5_000),
            quota_bytes: None,
            registry: HandleRegistry::shared(),
        }
    }
}

/// An open store handle.
///
/// Holds the single SQLite connection for the store and the effective
/// schema set (everything in the catalog, which is a superset of what was
/// declared).
pub struct Database {
    name: String,
    location: StoreLocation,
    version: u32,
    schemas: SchemaSet,
    declared: Vec<String>,
    quota_bytes: Option<u64>,
    conn: Mutex<Option<Connection>>,
    guard: Mutex<Option<HandleGuard>>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.name)
            .field("location", &self.location)
            .field("version", &self.version)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Database {
    /// Opens the named store, creating or upgrading it to `schemas`.
    ///
    /// Fails with [`StorageError::Open`] when the medium is unavailable or
    /// the requested version is older than the stored one, and with
    /// [`StorageError::Blocked`] when the version must increase while
    /// another handle on the same store is open.
    pub fn open_or_upgrade(
        name: &str,
        location: &StoreLocation,
        schemas: &SchemaSet,
        options: &OpenOptions,
    ) -> StorageResult<Self> {
        schemas.validate()?;
        let store_id = location.store_id(name);
        let mut conn = location.connect(name)?;
        configure(&conn, location, options)?;

        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| {
                if busy(&e) {
                    StorageError::Blocked(format!("{store_id} is locked by another connection"))
                } else {
                    StorageError::Open(e.to_string())
                }
            })?;
        tx.execute_batch(CATALOG_DDL)?;

        let stored = stored_version(&tx)?;
        if schemas.version < stored {
            return Err(StorageError::Open(format!(
                "{name}: requested version {} is older than stored version {stored}",
                schemas.version
            )));
        }
        let upgrading = schemas.version > stored;
        if upgrading && stored > 0 {
            let others = options.registry.open_count(&store_id);
            if others > 0 {
                return Err(StorageError::Blocked(format!(
                    "upgrade of {name} to version {} needs {others} other handle(s) closed",
                    schemas.version
                )));
            }
        }

        let before = load_catalog(&tx)?;
        let applied = apply_schemas(&tx, &before, schemas)?;
        let version = schemas.version.max(stored);
        if upgrading {
            tx.execute(
                "INSERT INTO _stowage_meta (name, value) VALUES ('version', ?1)
                 ON CONFLICT(name) DO UPDATE SET value = excluded.value",
                params![version.to_string()],
            )?;
        }
        let effective = load_catalog(&tx)?;
        tx.commit()?;

        if upgrading {
            info!(
                "Upgraded store {name} from version {stored} to {version} ({applied} schema objects created)"
            );
        } else {
            debug!("Opened store {name} at version {version}");
        }

        let guard = options.registry.acquire(&store_id);
        Ok(Self {
            name: name.to_string(),
            location: location.clone(),
            version,
            schemas: SchemaSet::new(version, effective),
            declared: schemas.names().map(str::to_string).collect(),
            quota_bytes: options.quota_bytes,
            conn: Mutex::new(Some(conn)),
            guard: Mutex::new(Some(guard)),
        })
    }

    /// Async wrapper running the open on the blocking pool.
    pub async fn open(
        name: &str,
        location: &StoreLocation,
        schemas: &SchemaSet,
        options: &OpenOptions,
    ) -> StorageResult<Arc<Self>> {
        let name = name.to_string();
        let location = location.clone();
        let schemas = schemas.clone();
        let options = options.clone();
        let db = tokio::task::spawn_blocking(move || {
            Database::open_or_upgrade(&name, &location, &schemas, &options)
        })
        .await??;
        Ok(Arc::new(db))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn location(&self) -> &StoreLocation {
        &self.location
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Every collection present in the store.
    pub fn schemas(&self) -> &SchemaSet {
        &self.schemas
    }

    /// Collections declared by the schema set this handle was opened with.
    pub fn declared_collections(&self) -> &[String] {
        &self.declared
    }

    pub fn quota_bytes(&self) -> Option<u64> {
        self.quota_bytes
    }

    /// Looks up a collection present in the store.
    pub fn collection(&self, name: &str) -> StorageResult<&CollectionSchema> {
        self.schemas
            .get(name)
            .ok_or_else(|| StorageError::UnknownCollection(name.to_string()))
    }

    /// Runs `f` with exclusive access to the connection.
    ///
    /// A panic inside `f` poisons the mutex but leaves the connection usable:
    /// any open transaction is rolled back when it is dropped during unwind.
    pub fn with_conn<R>(
        &self,
        f: impl FnOnce(&mut Connection) -> StorageResult<R>,
    ) -> StorageResult<R> {
        let mut guard = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let conn = guard.as_mut().ok_or(StorageError::Closed)?;
        f(conn)
    }

    pub fn is_closed(&self) -> bool {
        self.conn.lock().unwrap_or_else(|e| e.into_inner()).is_none()
    }

    /// Releases the connection and the handle registration. Idempotent.
    pub fn close(&self) {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner()).take();
        let guard = self.guard.lock().unwrap_or_else(|e| e.into_inner()).take();
        if conn.is_some() {
            debug!("Closed store {}", self.name);
        }
        drop(conn);
        drop(guard);
    }

    /// Removes a store entirely.
    ///
    /// Fails with [`StorageError::Blocked`] while any handle on it is open.
    pub fn delete_database(
        name: &str,
        location: &StoreLocation,
        registry: &HandleRegistry,
    ) -> StorageResult<()> {
        let store_id = location.store_id(name);
        let open = registry.open_count(&store_id);
        if open > 0 {
            return Err(StorageError::Blocked(format!(
                "cannot delete {name}: {open} handle(s) still open"
            )));
        }
        if let Some(path) = location.file_path(name) {
            for suffix in ["", "-wal", "-shm"] {
                let mut file = path.clone().into_os_string();
                file.push(suffix);
                match std::fs::remove_file(&file) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
        info!("Deleted store {name}");
        Ok(())
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        self.close();
    }
}

fn busy(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}

fn configure(conn: &Connection, location: &StoreLocation, options: &OpenOptions) -> StorageResult<()> {
    conn.busy_timeout(options.busy_timeout)?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    if matches!(location, StoreLocation::Directory { .. }) {
        let mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        debug!("journal mode: {mode}");
    }
    if let Some(quota) = options.quota_bytes {
        let page_size: i64 = conn.query_row("PRAGMA page_size", [], |row| row.get(0))?;
        let pages = (quota / u64::try_from(page_size.max(1)).unwrap_or(4096)).max(1);
        let applied: i64 =
            conn.query_row(&format!("PRAGMA max_page_count = {pages}"), [], |row| row.get(0))?;
        debug!("storage quota: {quota} bytes ({applied} pages)");
    }
    Ok(())
}

fn stored_version(conn: &Connection) -> StorageResult<u32> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value FROM _stowage_meta WHERE name = 'version'",
            [],
            |row| row.get(0),
        )
        .optional()?;
    match raw {
        Some(v) => v
            .parse()
            .map_err(|_| StorageError::Open(format!("corrupt schema version {v:?}"))),
        None => Ok(0),
    }
}

/// Reads the catalog back into schemas, in creation order.
pub(crate) fn load_catalog(conn: &Connection) -> StorageResult<Vec<CollectionSchema>> {
    let mut stmt =
        conn.prepare("SELECT name, key_field, auto_key FROM _stowage_collections ORDER BY rowid")?;
    let mut collections = stmt
        .query_map([], |row| {
            Ok(CollectionSchema {
                name: row.get(0)?,
                key_field: row.get(1)?,
                auto_key: row.get(2)?,
                indexes: Vec::new(),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare(
        "SELECT collection, name, field, is_unique FROM _stowage_indexes ORDER BY rowid",
    )?;
    let indexes = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                IndexSpec {
                    name: row.get(1)?,
                    field: row.get(2)?,
                    unique: row.get(3)?,
                },
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    for (collection, index) in indexes {
        if let Some(c) = collections.iter_mut().find(|c| c.name == collection) {
            c.indexes.push(index);
        }
    }
    Ok(collections)
}

/// Creates whatever the catalog is missing. Returns how many tables and
/// indexes were created.
fn apply_schemas(
    conn: &Connection,
    catalog: &[CollectionSchema],
    schemas: &SchemaSet,
) -> StorageResult<usize> {
    let mut created = 0;
    for schema in &schemas.collections {
        let existing = catalog.iter().find(|c| c.name == schema.name);
        match existing {
            None => {
                let key_column = if schema.auto_key {
                    "key INTEGER PRIMARY KEY AUTOINCREMENT"
                } else {
                    "key PRIMARY KEY NOT NULL"
                };
                conn.execute_batch(&format!(
                    "CREATE TABLE IF NOT EXISTS {} ({key_column}, envelope TEXT NOT NULL);",
                    table(&schema.name)
                ))?;
                conn.execute(
                    "INSERT INTO _stowage_collections (name, key_field, auto_key) VALUES (?1, ?2, ?3)",
                    params![schema.name, schema.key_field, schema.auto_key],
                )?;
                debug!("created collection {}", schema.name);
                created += 1;
            }
            Some(current) => {
                if current.key_field != schema.key_field || current.auto_key != schema.auto_key {
                    warn!(
                        "collection {} keeps its stored key configuration ({}, auto={}); declared ({}, auto={}) ignored",
                        schema.name,
                        current.key_field,
                        current.auto_key,
                        schema.key_field,
                        schema.auto_key
                    );
                }
            }
        }

        for index in &schema.indexes {
            let present = existing.and_then(|c| c.find_index(&index.name));
            match present {
                None => {
                    create_index(conn, &schema.name, index)?;
                    created += 1;
                }
                Some(current) if current != index => {
                    warn!(
                        "index {}.{} keeps its stored definition; declared change ignored",
                        schema.name, index.name
                    );
                }
                Some(_) => {}
            }
        }
    }
    Ok(created)
}

fn create_index(conn: &Connection, collection: &str, index: &IndexSpec) -> StorageResult<()> {
    let unique = if index.unique { "UNIQUE " } else { "" };
    conn.execute_batch(&format!(
        "CREATE {unique}INDEX IF NOT EXISTS {} ON {} ({});",
        index_name(collection, &index.name),
        table(collection),
        field_expr(&index.field)
    ))?;
    conn.execute(
        "INSERT INTO _stowage_indexes (collection, name, field, is_unique) VALUES (?1, ?2, ?3, ?4)",
        params![collection, index.name, index.field, index.unique],
    )?;
    debug!("created index {collection}.{}", index.name);
    Ok(())
}

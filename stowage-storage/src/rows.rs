//! Row-level SQL for collection tables.
//!
//! Every function here runs against a caller-provided connection or
//! transaction; transaction boundaries are decided by `Storage`.

use crate::error::{StorageError, StorageResult};
use crate::query::KeyRange;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde_json::Value;
use stowage_model::{path, CollectionSchema, Envelope, IndexSpec, WriteOptions};
use stowage_types::{Key, Timestamp};

/// Quoted table name for a collection.
pub(crate) fn table(collection: &str) -> String {
    format!("\"c_{collection}\"")
}

/// Quoted SQLite index name for a collection index.
pub(crate) fn index_name(collection: &str, index: &str) -> String {
    format!("\"ix_{collection}__{index}\"")
}

/// SQL expression reading a record field out of the stored envelope.
pub(crate) fn field_expr(field: &str) -> String {
    format!("json_extract(envelope, '$.data.{field}')")
}

pub(crate) fn key_to_sql(key: &Key) -> SqlValue {
    match key {
        Key::Int(i) => SqlValue::Integer(*i),
        Key::Text(s) => SqlValue::Text(s.clone()),
    }
}

/// Converts a JSON value to what `json_extract` yields for it.
pub(crate) fn json_to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Array(_) | Value::Object(_) => SqlValue::Text(value.to_string()),
    }
}

fn sql_to_key(value: SqlValue) -> StorageResult<Key> {
    match value {
        SqlValue::Integer(i) => Ok(Key::Int(i)),
        SqlValue::Text(s) => Ok(Key::Text(s)),
        other => Err(StorageError::InvalidData(format!(
            "unexpected key type in table: {other:?}"
        ))),
    }
}

fn decode(raw: &str) -> StorageResult<Envelope> {
    Ok(serde_json::from_str(raw)?)
}

/// Whether a write may replace an existing record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteMode {
    Add,
    Put,
}

/// Extracts the record key, if the record carries one.
pub(crate) fn record_key(schema: &CollectionSchema, value: &Value) -> StorageResult<Option<Key>> {
    match path::lookup(value, &schema.key_field) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => Ok(Some(Key::from_json(v)?)),
    }
}

fn exists(conn: &Connection, schema: &CollectionSchema, key: &Key) -> StorageResult<bool> {
    let sql = format!("SELECT 1 FROM {} WHERE key = ?1", table(&schema.name));
    Ok(conn
        .query_row(&sql, params![key_to_sql(key)], |_| Ok(()))
        .optional()?
        .is_some())
}

/// Wraps and writes one record, returning its key and the stored value
/// (which gains the generated key on auto-key collections).
pub(crate) fn write_record(
    conn: &Connection,
    schema: &CollectionSchema,
    value: Value,
    options: &WriteOptions,
    now: Timestamp,
    mode: WriteMode,
) -> StorageResult<(Key, Value)> {
    let t = table(&schema.name);
    match record_key(schema, &value)? {
        None if schema.auto_key => {
            if !value.is_object() {
                return Err(StorageError::InvalidData(format!(
                    "records in auto-key collection {:?} must be objects",
                    schema.name
                )));
            }
            let mut envelope = Envelope::wrap(value, options, now);
            conn.execute(
                &format!("INSERT INTO {t} (envelope) VALUES (?1)"),
                params![serde_json::to_string(&envelope)?],
            )?;
            let id = conn.last_insert_rowid();
            path::set(&mut envelope.data, &schema.key_field, Value::from(id));
            conn.execute(
                &format!("UPDATE {t} SET envelope = ?1 WHERE key = ?2"),
                params![serde_json::to_string(&envelope)?, id],
            )?;
            Ok((Key::Int(id), envelope.into_data()))
        }
        None => Err(StorageError::InvalidData(format!(
            "record for {:?} has no key field {:?}",
            schema.name, schema.key_field
        ))),
        Some(key) => {
            if schema.auto_key && key.as_int().is_none() {
                return Err(StorageError::InvalidData(format!(
                    "auto-key collection {:?} requires integer keys, got {key}",
                    schema.name
                )));
            }
            let envelope = Envelope::wrap(value, options, now);
            let raw = serde_json::to_string(&envelope)?;
            match mode {
                WriteMode::Add => {
                    if exists(conn, schema, &key)? {
                        return Err(StorageError::Constraint(format!(
                            "key {key} already exists in {:?}",
                            schema.name
                        )));
                    }
                    conn.execute(
                        &format!("INSERT INTO {t} (key, envelope) VALUES (?1, ?2)"),
                        params![key_to_sql(&key), raw],
                    )?;
                }
                WriteMode::Put => {
                    conn.execute(
                        &format!(
                            "INSERT INTO {t} (key, envelope) VALUES (?1, ?2) \
                             ON CONFLICT(key) DO UPDATE SET envelope = excluded.envelope"
                        ),
                        params![key_to_sql(&key), raw],
                    )?;
                }
            }
            Ok((key, envelope.into_data()))
        }
    }
}

/// Writes a previously exported envelope verbatim (insert-or-replace).
pub(crate) fn restore_envelope(
    conn: &Connection,
    schema: &CollectionSchema,
    envelope: &Envelope,
) -> StorageResult<Key> {
    let key = record_key(schema, &envelope.data)?.ok_or_else(|| {
        StorageError::InvalidData(format!(
            "restored record for {:?} has no key field {:?}",
            schema.name, schema.key_field
        ))
    })?;
    conn.execute(
        &format!(
            "INSERT INTO {} (key, envelope) VALUES (?1, ?2) \
             ON CONFLICT(key) DO UPDATE SET envelope = excluded.envelope",
            table(&schema.name)
        ),
        params![key_to_sql(&key), serde_json::to_string(envelope)?],
    )?;
    Ok(key)
}

/// Overwrites the envelope of an existing record.
pub(crate) fn replace_envelope(
    conn: &Connection,
    schema: &CollectionSchema,
    key: &Key,
    envelope: &Envelope,
) -> StorageResult<()> {
    conn.execute(
        &format!("UPDATE {} SET envelope = ?1 WHERE key = ?2", table(&schema.name)),
        params![serde_json::to_string(envelope)?, key_to_sql(key)],
    )?;
    Ok(())
}

pub(crate) fn read_envelope(
    conn: &Connection,
    schema: &CollectionSchema,
    key: &Key,
) -> StorageResult<Option<Envelope>> {
    let sql = format!("SELECT envelope FROM {} WHERE key = ?1", table(&schema.name));
    let raw: Option<String> = conn
        .query_row(&sql, params![key_to_sql(key)], |row| row.get(0))
        .optional()?;
    raw.as_deref().map(decode).transpose()
}

pub(crate) fn delete_record(
    conn: &Connection,
    schema: &CollectionSchema,
    key: &Key,
) -> StorageResult<bool> {
    let sql = format!("DELETE FROM {} WHERE key = ?1", table(&schema.name));
    Ok(conn.execute(&sql, params![key_to_sql(key)])? > 0)
}

pub(crate) fn clear_records(conn: &Connection, schema: &CollectionSchema) -> StorageResult<usize> {
    Ok(conn.execute(&format!("DELETE FROM {}", table(&schema.name)), [])?)
}

pub(crate) fn count_records(conn: &Connection, schema: &CollectionSchema) -> StorageResult<u64> {
    let n: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM {}", table(&schema.name)),
        [],
        |row| row.get(0),
    )?;
    Ok(u64::try_from(n).unwrap_or(0))
}

/// The SQL-side part of a `get_all`: which rows to read and in what order.
#[derive(Debug, Clone, Default)]
pub(crate) struct Scan {
    pub index: Option<IndexSpec>,
    pub value: Option<Value>,
    pub range: Option<KeyRange>,
}

/// Reads records by primary key order, or by index order when an index is
/// given. Index scans skip records that lack the indexed field.
pub(crate) fn scan(
    conn: &Connection,
    schema: &CollectionSchema,
    scan: &Scan,
) -> StorageResult<Vec<(Key, Envelope)>> {
    let target = match &scan.index {
        Some(index) => field_expr(&index.field),
        None => "key".to_string(),
    };

    let mut clauses = Vec::new();
    let mut args = Vec::new();
    if scan.index.is_some() {
        clauses.push(format!("{target} IS NOT NULL"));
    }
    if let Some(value) = &scan.value {
        clauses.push(format!("{target} IS ?"));
        args.push(json_to_sql(value));
    }
    if let Some(range) = &scan.range {
        if let Some(lower) = &range.lower {
            let op = if range.lower_open { ">" } else { ">=" };
            clauses.push(format!("{target} {op} ?"));
            args.push(json_to_sql(lower));
        }
        if let Some(upper) = &range.upper {
            let op = if range.upper_open { "<" } else { "<=" };
            clauses.push(format!("{target} {op} ?"));
            args.push(json_to_sql(upper));
        }
    }

    let mut sql = format!("SELECT key, envelope FROM {}", table(&schema.name));
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    if scan.index.is_some() {
        sql.push_str(&format!(" ORDER BY {target}, key"));
    } else {
        sql.push_str(" ORDER BY key");
    }

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(args), |row| {
        Ok((row.get::<_, SqlValue>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut out = Vec::new();
    for row in rows {
        let (key, raw) = row?;
        out.push((sql_to_key(key)?, decode(&raw)?));
    }
    Ok(out)
}

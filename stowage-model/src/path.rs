//! Dotted field paths into JSON records.
//!
//! A path is one or more identifier segments joined by `.`
//! (`"status"`, `"meta.owner"`). Segments are restricted to ASCII
//! identifiers so paths can be embedded in SQL JSON-path expressions.

use serde_json::{Map, Value};
use std::cmp::Ordering;

/// Returns true for `[A-Za-z_][A-Za-z0-9_]*`.
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Returns true if every dot-separated segment is an identifier.
pub fn is_valid_path(path: &str) -> bool {
    !path.is_empty() && path.split('.').all(is_identifier)
}

/// Resolves a dotted path, returning `None` if any segment is missing.
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(value, |current, segment| current.as_object()?.get(segment))
}

/// Writes `new` at a dotted path, creating intermediate objects.
///
/// Returns false if an intermediate segment exists but is not an object.
pub fn set(value: &mut Value, path: &str, new: Value) -> bool {
    let mut current = value;
    let mut segments = path.split('.').peekable();
    while let Some(segment) = segments.next() {
        let Some(object) = current.as_object_mut() else {
            return false;
        };
        if segments.peek().is_none() {
            object.insert(segment.to_string(), new);
            return true;
        }
        current = object
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    false
}

/// Total order over JSON values used for in-memory sorting.
///
/// Types rank `null < bool < number < string < array < object`; values of
/// the same type compare naturally, arrays element-wise, objects by their
/// serialized form.
pub fn compare(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => {
                let x = x.as_f64().unwrap_or(f64::NAN);
                let y = y.as_f64().unwrap_or(f64::NAN);
                x.total_cmp(&y)
            }
        },
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => x
            .iter()
            .zip(y.iter())
            .map(|(l, r)| compare(l, r))
            .find(|o| o.is_ne())
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        (Value::Object(_), Value::Object(_)) => a.to_string().cmp(&b.to_string()),
        _ => rank(a).cmp(&rank(b)),
    }
}

//! Primary keys for stored records.

use crate::Error;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// The primary key of a record within a collection.
///
/// Keys are either integers (auto-generated or caller-supplied) or strings.
/// Integers sort before strings, matching the order SQLite uses for
/// mixed-type columns.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Key {
    Int(i64),
    Text(String),
}

impl Key {
    /// Interprets a JSON value as a key.
    ///
    /// Only integral numbers and strings are valid keys.
    pub fn from_json(value: &Value) -> Result<Self, Error> {
        match value {
            Value::String(s) => Ok(Key::Text(s.clone())),
            Value::Number(n) => n
                .as_i64()
                .map(Key::Int)
                .ok_or_else(|| Error::InvalidKey(format!("non-integral number {n}"))),
            other => Err(Error::InvalidKey(format!("unsupported key value {other}"))),
        }
    }

    /// Converts the key back into its JSON form.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Key::Int(i) => Value::from(*i),
            Key::Text(s) => Value::from(s.as_str()),
        }
    }

    /// Returns the integer form, if this is an integer key.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Key::Int(i) => Some(*i),
            Key::Text(_) => None,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Int(i) => write!(f, "{i}"),
            Key::Text(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<i64> for Key {
    fn from(value: i64) -> Self {
        Key::Int(value)
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Key::Text(value.to_string())
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Key::Text(value)
    }
}

//! Bookkeeping enums shared by the storage engine and the sync queue.

use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Whether a record has been confirmed against the remote system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Written locally, not yet confirmed remotely.
    #[default]
    Pending,
    /// Confirmed remotely.
    Synced,
    /// The remote system rejected or diverged from the local write.
    Conflict,
}

impl SyncStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Synced => "synced",
            SyncStatus::Conflict => "conflict",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SyncStatus::Pending),
            "synced" => Ok(SyncStatus::Synced),
            "conflict" => Ok(SyncStatus::Conflict),
            other => Err(Error::UnknownVariant {
                kind: "sync status",
                value: other.to_string(),
            }),
        }
    }
}

/// Processing priority of a queued mutation.
///
/// The derived ordering is `Low < Normal < High`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

impl Priority {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Priority::Low),
            "normal" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            other => Err(Error::UnknownVariant {
                kind: "priority",
                value: other.to_string(),
            }),
        }
    }
}

/// The kind of mutation applied to a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Add,
    Put,
    Delete,
    Clear,
}

impl Operation {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Operation::Add => "add",
            Operation::Put => "put",
            Operation::Delete => "delete",
            Operation::Clear => "clear",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "add" => Ok(Operation::Add),
            "put" => Ok(Operation::Put),
            "delete" => Ok(Operation::Delete),
            "clear" => Ok(Operation::Clear),
            other => Err(Error::UnknownVariant {
                kind: "operation",
                value: other.to_string(),
            }),
        }
    }
}

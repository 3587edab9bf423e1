use serde::{Deserialize, Serialize};
use serde_json::Value;
use stowage_types::{SyncStatus, Timestamp};

/// Caller-supplied metadata for a single write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_status: Option<SyncStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
}

impl WriteOptions {
    #[must_use]
    pub fn with_sync_status(mut self, status: SyncStatus) -> Self {
        self.sync_status = Some(status);
        self
    }

    #[must_use]
    pub fn with_version(mut self, version: u32) -> Self {
        self.version = Some(version);
        self
    }
}

/// A record as persisted: the caller's value plus engine metadata.
///
/// Callers never see this type through the CRUD API; [`Envelope::wrap`] and
/// [`Envelope::into_data`] are the only two mappings between the stored and
/// the returned form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<T = Value> {
    pub data: T,
    pub last_modified: Timestamp,
    pub sync_status: SyncStatus,
    pub version: u32,
}

impl<T> Envelope<T> {
    /// Wraps a value for storage, filling unspecified metadata with defaults.
    pub fn wrap(data: T, options: &WriteOptions, now: Timestamp) -> Self {
        Self {
            data,
            last_modified: now,
            sync_status: options.sync_status.unwrap_or_default(),
            version: options.version.unwrap_or(1),
        }
    }

    /// Strips the metadata, returning the caller's value.
    pub fn into_data(self) -> T {
        self.data
    }

    /// Borrows the caller's value.
    pub fn data(&self) -> &T {
        &self.data
    }
}

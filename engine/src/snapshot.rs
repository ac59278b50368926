//! Stored form of a record.
//!
//! This is what a local store persists and what [`crate::Store::load`] reads
//! back. Field maps keep their key order, so serialization is deterministic.

use crate::{error::Result, Error, Fields, Record, RecordKey, Status};
use serde::{Deserialize, Serialize};

/// Version of the stored record format.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// A record as written to the local store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRecord {
    /// Stored format version
    pub format_version: u32,
    /// Identity key
    pub key: RecordKey,
    /// Working fields
    pub fields: Fields,
    /// Last confirmed save, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved: Option<Fields>,
    /// In-flight save snapshot, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saving: Option<Fields>,
    /// Pending live broadcast data, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish: Option<Fields>,
    /// Sync status at the time of the write
    pub status: Status,
}

impl StoredRecord {
    /// Capture a record for persistence.
    pub fn capture(key: RecordKey, record: &Record) -> Self {
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            key,
            fields: record.fields.clone(),
            saved: record.saved.clone(),
            saving: record.saving.clone(),
            publish: record.publish.clone(),
            status: record.status,
        }
    }

    /// Rebuild the in-memory record.
    pub fn restore(&self) -> Record {
        Record {
            fields: self.fields.clone(),
            saved: self.saved.clone(),
            saving: self.saving.clone(),
            publish: self.publish.clone(),
            status: self.status,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::InvalidSnapshot(e.to_string()))
    }

    /// Deserialize and check the format version.
    pub fn from_json(json: &str) -> Result<Self> {
        let stored: Self =
            serde_json::from_str(json).map_err(|e| Error::InvalidSnapshot(e.to_string()))?;

        if stored.format_version > SNAPSHOT_FORMAT_VERSION {
            return Err(Error::InvalidSnapshot(format!(
                "unsupported format version: {} (max supported: {})",
                stored.format_version, SNAPSHOT_FORMAT_VERSION
            )));
        }

        Ok(stored)
    }
}

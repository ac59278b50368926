//! Record state: working fields plus the shadow copies sync needs.

use crate::Fields;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a record within its store.
///
/// Built from the key field values, joined with `/` for composite keys.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordKey(String);

impl RecordKey {
    pub fn new(key: impl Into<String>) -> Self {
        RecordKey(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordKey {
    fn from(key: &str) -> Self {
        RecordKey(key.to_string())
    }
}

impl From<String> for RecordKey {
    fn from(key: String) -> Self {
        RecordKey(key)
    }
}

/// Sync status of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Status {
    /// No remote work outstanding
    #[default]
    Synced,
    /// A save has not been confirmed by the remote service yet
    SavePending,
    /// A removal has not been confirmed by the remote service yet
    RemovePending,
    /// Gone for good. Absorbing.
    Deleted,
}

impl Status {
    /// True once removal has been requested.
    pub fn is_deleted(self) -> bool {
        matches!(self, Status::RemovePending | Status::Deleted)
    }

    /// True while remote work is outstanding.
    pub fn is_pending(self) -> bool {
        matches!(self, Status::SavePending | Status::RemovePending)
    }
}

/// A record's field values and sync bookkeeping.
///
/// `saving` only holds data while `status` is [`Status::SavePending`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    /// What the application sees and edits
    pub fields: Fields,
    /// Last field set the remote service accepted
    pub saved: Option<Fields>,
    /// Changed fields captured when the in-flight save started
    pub saving: Option<Fields>,
    /// Fields waiting for the next live broadcast
    pub publish: Option<Fields>,
    /// Sync status
    pub status: Status,
}

impl Record {
    /// A record that only exists locally.
    pub fn new(fields: Fields) -> Self {
        Self {
            fields,
            ..Self::default()
        }
    }

    /// A record received from the remote service, already confirmed.
    pub fn from_remote(fields: Fields) -> Self {
        Self {
            saved: Some(fields.clone()),
            fields,
            ..Self::default()
        }
    }

    /// Whether the remote service has accepted this record at least once.
    pub fn is_saved(&self) -> bool {
        self.saved.is_some()
    }

    pub fn is_deleted(&self) -> bool {
        self.status.is_deleted()
    }

    /// Fields whose working value differs from the last confirmed save.
    ///
    /// Every field counts as changed until the first confirmed save.
    pub fn changes(&self) -> Fields {
        match &self.saved {
            None => self.fields.clone(),
            Some(saved) => self
                .fields
                .iter()
                .filter(|(name, value)| saved.get(name.as_str()) != Some(value))
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
        }
    }

    /// Accumulate data for the next live broadcast.
    pub fn queue_publish(&mut self, data: &Fields) {
        let publish = self.publish.get_or_insert_with(Fields::new);
        for (name, value) in data {
            publish.insert(name.clone(), value.clone());
        }
    }

    /// Enter [`Status::SavePending`] with `changes` as the in-flight snapshot.
    pub fn begin_save(&mut self, changes: Fields) {
        self.status = Status::SavePending;
        self.saving = Some(changes);
    }

    /// Transfer the in-flight snapshot into the confirmed copy.
    ///
    /// The confirmed copy is created on first transfer even when the
    /// snapshot is empty.
    pub fn confirm_saving(&mut self) {
        let saved = self.saved.get_or_insert_with(Fields::new);
        if let Some(saving) = &self.saving {
            for (name, value) in saving {
                saved.insert(name.clone(), value.clone());
            }
        }
    }

    /// Merge data the remote service says is current.
    ///
    /// A field is overwritten only if the application has not changed it
    /// since the last confirmed save; `protected` fields (the key) are never
    /// overwritten. The confirmed copy always takes the remote value.
    /// Returns true when a working field changed.
    pub fn merge_remote(&mut self, data: &Fields, protected: &[String]) -> bool {
        let saved = self.saved.get_or_insert_with(Fields::new);
        let mut changed = false;

        for (name, remote) in data {
            let current = self.fields.get(name);
            let untouched = current == saved.get(name);
            let is_protected = protected.iter().any(|p| p == name);

            if untouched && !is_protected && current != Some(remote) {
                self.fields.insert(name.clone(), remote.clone());
                changed = true;
            }
            saved.insert(name.clone(), remote.clone());
        }

        changed
    }

    /// Drop the in-flight snapshot and publish data.
    pub fn clear_pending(&mut self) {
        self.saving = None;
        self.publish = None;
    }

    /// Back to [`Status::Synced`] with nothing pending.
    pub fn mark_synced(&mut self) {
        self.status = Status::Synced;
        self.clear_pending();
    }

    /// Enter [`Status::Deleted`] and forget every shadow copy.
    pub fn mark_deleted(&mut self) {
        self.status = Status::Deleted;
        self.saved = None;
        self.clear_pending();
    }
}

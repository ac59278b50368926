//! Events a store reports to its subscribers.

use crate::{error::SyncFailure, RecordKey};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NotificationKind {
    LocalSave,
    LocalSaveFailure,
    LocalRemove,
    LocalRemoveFailure,
    RemoteSave,
    RemoteSaveFailure,
    RemoteSaveOffline,
    RemoteRemove,
    RemoteRemoveFailure,
    RemoteRemoveOffline,
    /// Remote data changed working fields
    RemoteUpdate,
    /// A peer removed the record
    LiveRemove,
}

impl NotificationKind {
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            NotificationKind::LocalSaveFailure
                | NotificationKind::LocalRemoveFailure
                | NotificationKind::RemoteSaveFailure
                | NotificationKind::RemoteRemoveFailure
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Model name
    pub model: String,
    /// Record the event is about
    pub key: RecordKey,
    /// What happened
    pub kind: NotificationKind,
    /// Failure classification, for failures and resolved conflicts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<SyncFailure>,
    /// Response body or changed fields, when there is one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl Notification {
    pub fn new(model: impl Into<String>, key: RecordKey, kind: NotificationKind) -> Self {
        Self {
            model: model.into(),
            key,
            kind,
            failure: None,
            payload: None,
        }
    }

    pub fn with_failure(mut self, failure: Option<SyncFailure>) -> Self {
        self.failure = failure;
        self
    }

    pub fn with_payload(mut self, payload: Option<Value>) -> Self {
        self.payload = payload;
        self
    }
}

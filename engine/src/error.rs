//! Error types for the Ferry engine.
//!
//! Two families live here. [`Error`] is returned to callers that misuse the
//! API (missing keys, saving a deleted record). [`SyncFailure`] classifies
//! the routine failures of reconciliation; those are never returned as
//! `Err`, they ride along on notifications instead.

use crate::RecordKey;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// All possible errors from the Ferry engine API.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Identity errors
    #[error("missing key field '{field}' for model {model}")]
    MissingKeyField { model: String, field: String },

    #[error("key field '{0}' cannot change once a key is assigned")]
    KeyImmutable(String),

    #[error("key {0} can only be removed from a record that was never saved")]
    KeyInUse(RecordKey),

    #[error("record already exists: {0}")]
    RecordAlreadyExists(RecordKey),

    // Validation errors
    #[error("unknown field '{field}' for model {model}")]
    UnknownField { model: String, field: String },

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    // State errors
    #[error("operation on deleted record: {0}")]
    OperationOnDeleted(RecordKey),

    #[error("record belongs to model {0}")]
    ForeignModel(String),

    #[error("store has been dropped")]
    StoreClosed,

    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("local store error: {0}")]
    Store(#[from] StoreError),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures reported by a local store implementation.
///
/// These are logged and surfaced as notifications. They never stop the
/// reconciliation state machine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt entry for {key}: {reason}")]
    Corrupt { key: RecordKey, reason: String },
}

/// Classification of a failed (or deferred) synchronization attempt.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncFailure {
    /// The remote rejected the write on a version or precondition mismatch.
    /// Resolved by accepting the server's data.
    #[error("remote reported a conflict")]
    Conflict,

    /// The remote no longer has the record. Resolved by deleting locally.
    #[error("record no longer exists remotely")]
    NotFound,

    /// The network is unreachable. The operation waits for a reconnect.
    #[error("network unreachable")]
    OfflineUnreachable,

    /// Any other remote error. Not retried automatically.
    #[error("remote error (status {0})")]
    TransientServerError(u16),

    /// A record this one depends on has not been saved yet.
    #[error("dependent record not saved yet")]
    DependencyNotReady,
}

impl SyncFailure {
    /// Failures the engine resolves without the application's help.
    pub fn is_resolved_internally(&self) -> bool {
        matches!(self, SyncFailure::Conflict | SyncFailure::DependencyNotReady)
    }
}

//! Operations: units of work bound to one record.
//!
//! A record never mutates its sync state directly. Every intent (save,
//! remove, remote ingestion) becomes an [`Operation`] on the record's queue,
//! and an operation that finishes may insert follow-ups.

use crate::Cascade;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for an operation.
pub type OperationId = Uuid;

/// What an operation does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationKind {
    /// Persist the working state locally, then hand over to `SaveRemote`
    SaveLocal,
    /// Remote leg of a save
    SaveRemote,
    /// Write the stored form to the local store
    SaveNow,
    /// Persist the pending removal locally, then hand over to `RemoveRemote`
    RemoveLocal,
    /// Remote leg of a removal
    RemoveRemote,
    /// Purge from the dataset and the local store
    RemoveNow,
    /// Drop the local copy of a synced record
    RemoveCache,
}

impl OperationKind {
    /// Whether enqueuing this kind supersedes operations still waiting.
    pub fn interrupts(self) -> bool {
        matches!(
            self,
            OperationKind::RemoveLocal | OperationKind::RemoveRemote | OperationKind::RemoveNow
        )
    }

    pub fn is_remove(self) -> bool {
        matches!(
            self,
            OperationKind::RemoveLocal
                | OperationKind::RemoveRemote
                | OperationKind::RemoveNow
                | OperationKind::RemoveCache
        )
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationKind::SaveLocal => "SaveLocal",
            OperationKind::SaveRemote => "SaveRemote",
            OperationKind::SaveNow => "SaveNow",
            OperationKind::RemoveLocal => "RemoveLocal",
            OperationKind::RemoveRemote => "RemoveRemote",
            OperationKind::RemoveNow => "RemoveNow",
            OperationKind::RemoveCache => "RemoveCache",
        };
        f.write_str(name)
    }
}

/// Lifecycle of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationState {
    #[default]
    Created,
    Queued,
    Running,
    Succeeded,
    Failed,
    /// Dropped from the queue by an interrupting operation before it ran
    Superseded,
    /// Parked until a dependent saves or the network comes back
    Deferred,
}

impl OperationState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OperationState::Succeeded
                | OperationState::Failed
                | OperationState::Superseded
                | OperationState::Deferred
        )
    }
}

/// A unit of work bound to one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    /// Operation ID
    pub id: OperationId,
    /// What to do
    pub kind: OperationKind,
    /// Which collaborators it may touch
    pub cascade: Cascade,
    /// Where it is in its lifecycle
    pub state: OperationState,
}

impl Operation {
    pub fn new(kind: OperationKind, cascade: Cascade) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            cascade,
            state: OperationState::Created,
        }
    }

    pub fn interrupts(&self) -> bool {
        self.kind.interrupts()
    }
}

/// How a running operation finished, and what it wants done next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// Terminal state
    pub state: OperationState,
    /// Operations to run next, in order, ahead of older queued work
    pub follow_ups: Vec<Operation>,
}

impl Completion {
    pub fn succeeded() -> Self {
        Self::with_state(OperationState::Succeeded)
    }

    pub fn failed() -> Self {
        Self::with_state(OperationState::Failed)
    }

    pub fn deferred() -> Self {
        Self::with_state(OperationState::Deferred)
    }

    fn with_state(state: OperationState) -> Self {
        Self {
            state,
            follow_ups: Vec::new(),
        }
    }

    /// Append a follow-up.
    pub fn then(&mut self, kind: OperationKind, cascade: Cascade) {
        self.follow_ups.push(Operation::new(kind, cascade));
    }

    pub fn follow_up_kinds(&self) -> Vec<OperationKind> {
        self.follow_ups.iter().map(|op| op.kind).collect()
    }
}

//! Boundaries to the services the engine drives but does not implement.
//!
//! The remote service, the local persistent store and the live channel are
//! all injected. Each call returns a future so transports can be as slow as
//! they like; the engine awaits them one record at a time.

use crate::{error::StoreError, snapshot::StoredRecord, Fields, RecordKey};
use futures::future::{self, LocalBoxFuture};
use serde_json::Value;
use std::fmt;
use std::rc::Rc;

/// Failure category reported by the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteStatus {
    /// Version or precondition mismatch. The body is authoritative.
    Conflict,
    /// The record does not exist remotely.
    NotFound,
    /// The service could not be reached.
    Offline,
    /// Anything else, with the transport's status code.
    Other(u16),
}

impl RemoteStatus {
    /// Classify an HTTP status code. `0` means no response at all.
    pub fn from_http(code: u16) -> Self {
        match code {
            0 => RemoteStatus::Offline,
            404 | 410 => RemoteStatus::NotFound,
            409 | 412 => RemoteStatus::Conflict,
            other => RemoteStatus::Other(other),
        }
    }
}

impl fmt::Display for RemoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteStatus::Conflict => write!(f, "conflict"),
            RemoteStatus::NotFound => write!(f, "not found"),
            RemoteStatus::Offline => write!(f, "offline"),
            RemoteStatus::Other(code) => write!(f, "status {code}"),
        }
    }
}

/// A failed remote call.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteFailure {
    pub status: RemoteStatus,
    pub body: Option<Value>,
}

impl RemoteFailure {
    pub fn new(status: RemoteStatus) -> Self {
        Self { status, body: None }
    }

    pub fn with_body(status: RemoteStatus, body: Value) -> Self {
        Self {
            status,
            body: Some(body),
        }
    }
}

/// Outcome of a remote call: an optional body either way.
pub type RemoteResult = Result<Option<Value>, RemoteFailure>;

/// The remote (REST) service.
pub trait RemoteService {
    fn create(&self, key: &RecordKey, fields: &Fields) -> LocalBoxFuture<'static, RemoteResult>;
    fn update(&self, key: &RecordKey, fields: &Fields) -> LocalBoxFuture<'static, RemoteResult>;
    fn remove(&self, key: &RecordKey) -> LocalBoxFuture<'static, RemoteResult>;
}

/// The local persistent store. Best effort: failures are logged and
/// reported, never fatal.
pub trait LocalStore {
    fn put(
        &self,
        key: &RecordKey,
        record: &StoredRecord,
    ) -> LocalBoxFuture<'static, Result<(), StoreError>>;
    fn remove(&self, key: &RecordKey) -> LocalBoxFuture<'static, Result<(), StoreError>>;
    fn all(&self) -> LocalBoxFuture<'static, Result<Vec<StoredRecord>, StoreError>>;
}

/// The live broadcast channel. Fire and forget.
pub trait LiveChannel {
    fn publish(&self, key: &RecordKey, fields: &Fields);
    fn remove(&self, key: &RecordKey);
}

/// Local store that keeps nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullStore;

impl LocalStore for NullStore {
    fn put(&self, _: &RecordKey, _: &StoredRecord) -> LocalBoxFuture<'static, Result<(), StoreError>> {
        Box::pin(future::ready(Ok(())))
    }

    fn remove(&self, _: &RecordKey) -> LocalBoxFuture<'static, Result<(), StoreError>> {
        Box::pin(future::ready(Ok(())))
    }

    fn all(&self) -> LocalBoxFuture<'static, Result<Vec<StoredRecord>, StoreError>> {
        Box::pin(future::ready(Ok(Vec::new())))
    }
}

/// Live channel that broadcasts nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLive;

impl LiveChannel for NullLive {
    fn publish(&self, _: &RecordKey, _: &Fields) {}
    fn remove(&self, _: &RecordKey) {}
}

/// The collaborators one store talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub remote: Rc<dyn RemoteService>,
    pub local: Rc<dyn LocalStore>,
    pub live: Rc<dyn LiveChannel>,
}

impl Collaborators {
    /// Remote only: no local persistence, no live channel.
    pub fn new(remote: Rc<dyn RemoteService>) -> Self {
        Self {
            remote,
            local: Rc::new(NullStore),
            live: Rc::new(NullLive),
        }
    }

    pub fn with_local(mut self, local: Rc<dyn LocalStore>) -> Self {
        self.local = local;
        self
    }

    pub fn with_live(mut self, live: Rc<dyn LiveChannel>) -> Self {
        self.live = live;
        self
    }
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

//! In-memory collaborators for tests and examples.
//!
//! [`MockRemote`] records every call and answers from a queue of scripted
//! responses (an empty body success when the queue runs dry). It can also
//! hold each call open for a few scheduler turns and reports how many calls
//! overlapped, overall and per record.

use crate::collaborators::{
    LiveChannel, LocalStore, RemoteFailure, RemoteResult, RemoteService, RemoteStatus,
};
use crate::error::StoreError;
use crate::network::ReachabilityProbe;
use crate::snapshot::StoredRecord;
use crate::{Fields, RecordKey};
use futures::future::{self, LocalBoxFuture};
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;
use std::task::Poll;

/// One call received by [`MockRemote`].
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCall {
    Create { key: RecordKey, fields: Fields },
    Update { key: RecordKey, fields: Fields },
    Remove { key: RecordKey },
}

impl RemoteCall {
    pub fn key(&self) -> &RecordKey {
        match self {
            RemoteCall::Create { key, .. }
            | RemoteCall::Update { key, .. }
            | RemoteCall::Remove { key } => key,
        }
    }

    /// Fields sent, for creates and updates.
    pub fn fields(&self) -> Option<&Fields> {
        match self {
            RemoteCall::Create { fields, .. } | RemoteCall::Update { fields, .. } => Some(fields),
            RemoteCall::Remove { .. } => None,
        }
    }
}

#[derive(Default)]
struct RemoteState {
    calls: Vec<RemoteCall>,
    responses: VecDeque<RemoteResult>,
    latency: usize,
    in_flight: BTreeMap<RecordKey, usize>,
    max_in_flight: usize,
    max_in_flight_per_key: usize,
}

/// Scripted remote service.
#[derive(Clone, Default)]
pub struct MockRemote {
    state: Rc<RefCell<RemoteState>>,
}

impl MockRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every call open for `turns` scheduler turns.
    pub fn with_latency(self, turns: usize) -> Self {
        self.state.borrow_mut().latency = turns;
        self
    }

    /// Queue a success with `body`.
    pub fn push_ok(&self, body: Value) {
        self.push_response(Ok(Some(body)));
    }

    /// Queue a success without a body.
    pub fn push_empty(&self) {
        self.push_response(Ok(None));
    }

    pub fn push_failure(&self, status: RemoteStatus) {
        self.push_response(Err(RemoteFailure::new(status)));
    }

    pub fn push_failure_with_body(&self, status: RemoteStatus, body: Value) {
        self.push_response(Err(RemoteFailure::with_body(status, body)));
    }

    pub fn push_response(&self, response: RemoteResult) {
        self.state.borrow_mut().responses.push_back(response);
    }

    /// Every call so far, in order.
    pub fn calls(&self) -> Vec<RemoteCall> {
        self.state.borrow().calls.clone()
    }

    pub fn calls_for(&self, key: &RecordKey) -> Vec<RemoteCall> {
        self.state
            .borrow()
            .calls
            .iter()
            .filter(|call| call.key() == key)
            .cloned()
            .collect()
    }

    /// Most calls open at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.state.borrow().max_in_flight
    }

    /// Most calls open at the same time for a single record.
    pub fn max_in_flight_per_key(&self) -> usize {
        self.state.borrow().max_in_flight_per_key
    }

    fn respond(&self, call: RemoteCall) -> LocalBoxFuture<'static, RemoteResult> {
        let key = call.key().clone();
        let (response, latency) = {
            let mut state = self.state.borrow_mut();
            state.calls.push(call);

            let open = state.in_flight.entry(key.clone()).or_default();
            *open += 1;
            let open = *open;
            let total: usize = state.in_flight.values().sum();
            state.max_in_flight_per_key = state.max_in_flight_per_key.max(open);
            state.max_in_flight = state.max_in_flight.max(total);

            (state.responses.pop_front().unwrap_or(Ok(None)), state.latency)
        };

        let state = self.state.clone();
        Box::pin(async move {
            for _ in 0..latency {
                yield_once().await;
            }

            let mut state = state.borrow_mut();
            if let Some(open) = state.in_flight.get_mut(&key) {
                *open -= 1;
                if *open == 0 {
                    state.in_flight.remove(&key);
                }
            }
            response
        })
    }
}

impl RemoteService for MockRemote {
    fn create(&self, key: &RecordKey, fields: &Fields) -> LocalBoxFuture<'static, RemoteResult> {
        self.respond(RemoteCall::Create {
            key: key.clone(),
            fields: fields.clone(),
        })
    }

    fn update(&self, key: &RecordKey, fields: &Fields) -> LocalBoxFuture<'static, RemoteResult> {
        self.respond(RemoteCall::Update {
            key: key.clone(),
            fields: fields.clone(),
        })
    }

    fn remove(&self, key: &RecordKey) -> LocalBoxFuture<'static, RemoteResult> {
        self.respond(RemoteCall::Remove { key: key.clone() })
    }
}

/// Give other futures one turn.
async fn yield_once() {
    let mut yielded = false;
    future::poll_fn(move |cx| {
        if yielded {
            Poll::Ready(())
        } else {
            yielded = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    })
    .await
}

/// Local store backed by a map.
#[derive(Clone, Default)]
pub struct MemoryStore {
    records: Rc<RefCell<BTreeMap<RecordKey, StoredRecord>>>,
    failing: Rc<Cell<bool>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record directly.
    pub fn insert(&self, record: StoredRecord) {
        self.records.borrow_mut().insert(record.key.clone(), record);
    }

    pub fn get(&self, key: &RecordKey) -> Option<StoredRecord> {
        self.records.borrow().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.records.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.borrow().is_empty()
    }

    /// Make every write fail until reset.
    pub fn set_failing(&self, failing: bool) {
        self.failing.set(failing);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.failing.get() {
            Err(StoreError::Unavailable("memory store set to fail".into()))
        } else {
            Ok(())
        }
    }
}

impl LocalStore for MemoryStore {
    fn put(
        &self,
        key: &RecordKey,
        record: &StoredRecord,
    ) -> LocalBoxFuture<'static, Result<(), StoreError>> {
        let result = self.check().map(|()| {
            self.records.borrow_mut().insert(key.clone(), record.clone());
        });
        Box::pin(future::ready(result))
    }

    fn remove(&self, key: &RecordKey) -> LocalBoxFuture<'static, Result<(), StoreError>> {
        let result = self.check().map(|()| {
            self.records.borrow_mut().remove(key);
        });
        Box::pin(future::ready(result))
    }

    fn all(&self) -> LocalBoxFuture<'static, Result<Vec<StoredRecord>, StoreError>> {
        let records = self.records.borrow().values().cloned().collect();
        Box::pin(future::ready(Ok(records)))
    }
}

/// Live channel that remembers what it was asked to broadcast.
#[derive(Clone, Default)]
pub struct RecordingLive {
    published: Rc<RefCell<Vec<(RecordKey, Fields)>>>,
    removed: Rc<RefCell<Vec<RecordKey>>>,
}

impl RecordingLive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<(RecordKey, Fields)> {
        self.published.borrow().clone()
    }

    pub fn removed(&self) -> Vec<RecordKey> {
        self.removed.borrow().clone()
    }
}

impl LiveChannel for RecordingLive {
    fn publish(&self, key: &RecordKey, fields: &Fields) {
        self.published
            .borrow_mut()
            .push((key.clone(), fields.clone()));
    }

    fn remove(&self, key: &RecordKey) {
        self.removed.borrow_mut().push(key.clone());
    }
}

/// Reachability probe with a settable answer.
#[derive(Clone, Debug)]
pub struct FixedProbe(Rc<Cell<bool>>);

impl FixedProbe {
    pub fn new(reachable: bool) -> Self {
        FixedProbe(Rc::new(Cell::new(reachable)))
    }

    pub fn set(&self, reachable: bool) {
        self.0.set(reachable);
    }
}

impl ReachabilityProbe for FixedProbe {
    fn probe(&self) -> bool {
        self.0.get()
    }
}

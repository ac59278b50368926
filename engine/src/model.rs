//! Model handles: one synchronizable record plus its operation queue.
//!
//! A [`Model`] is a cheap clone of a shared cell. The application reads and
//! edits fields through it and asks it to save or remove itself; the
//! reconciliation state lives alongside and is mutated only by the running
//! operation.

use crate::engine::Scheduler;
use crate::operation::{Completion, Operation, OperationKind};
use crate::queue::OperationQueue;
use crate::store::StoreInner;
use crate::{error::Result, reconcile, Cascade, Error, Fields, Record, RecordKey, Status};
use futures::future::LocalBoxFuture;
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use tracing::debug;

type SettledListener = Box<dyn FnOnce()>;

pub(crate) struct ModelCell {
    pub(crate) store: Weak<StoreInner>,
    pub(crate) record: RefCell<Record>,
    pub(crate) key: RefCell<Option<RecordKey>>,
    pub(crate) queue: RefCell<OperationQueue>,
    /// Sitting in the scheduler's ready list
    pub(crate) scheduled: Cell<bool>,
    pub(crate) dependents: RefCell<Vec<Weak<ModelCell>>>,
    pub(crate) settled_listeners: RefCell<Vec<SettledListener>>,
    /// A reconnect replay is registered
    pub(crate) listening_online: Cell<bool>,
    /// Cascade the reconnect replay runs with
    pub(crate) resume_cascade: Cell<Cascade>,
}

/// Handle to one record of a [`crate::Store`].
#[derive(Clone)]
pub struct Model(pub(crate) Rc<ModelCell>);

impl Model {
    pub(crate) fn new(store: Weak<StoreInner>, record: Record, key: Option<RecordKey>) -> Self {
        Model(Rc::new(ModelCell {
            store,
            record: RefCell::new(record),
            key: RefCell::new(key),
            queue: RefCell::new(OperationQueue::new()),
            scheduled: Cell::new(false),
            dependents: RefCell::new(Vec::new()),
            settled_listeners: RefCell::new(Vec::new()),
            listening_online: Cell::new(false),
            resume_cascade: Cell::new(Cascade::ALL),
        }))
    }

    pub(crate) fn downgrade(&self) -> Weak<ModelCell> {
        Rc::downgrade(&self.0)
    }

    pub(crate) fn upgrade(cell: &Weak<ModelCell>) -> Option<Model> {
        cell.upgrade().map(Model)
    }

    pub(crate) fn store(&self) -> Result<Rc<StoreInner>> {
        self.0.store.upgrade().ok_or(Error::StoreClosed)
    }

    // ===== fields =====

    /// Identity key, once assigned.
    pub fn key(&self) -> Option<RecordKey> {
        self.0.key.borrow().clone()
    }

    pub(crate) fn set_key(&self, key: Option<RecordKey>) {
        *self.0.key.borrow_mut() = key;
    }

    pub fn get(&self, field: &str) -> Option<Value> {
        self.0.record.borrow().fields.get(field).cloned()
    }

    /// Working fields.
    pub fn fields(&self) -> Fields {
        self.0.record.borrow().fields.clone()
    }

    /// Change a working field.
    ///
    /// Key fields cannot change once the key is assigned.
    pub fn set(&self, field: &str, value: Value) -> Result<()> {
        let store = self.store()?;
        store.schema.check_field(field)?;

        if store.schema.is_key_field(field) && self.0.key.borrow().is_some() {
            let current = self.get(field);
            if current.as_ref() != Some(&value) {
                return Err(Error::KeyImmutable(field.to_string()));
            }
        }

        self.0
            .record
            .borrow_mut()
            .fields
            .insert(field.to_string(), value);
        Ok(())
    }

    /// Change several working fields at once.
    pub fn set_all(&self, data: &Fields) -> Result<()> {
        for (field, value) in data {
            self.set(field, value.clone())?;
        }
        Ok(())
    }

    pub fn status(&self) -> Status {
        self.0.record.borrow().status
    }

    /// Last field set the remote service accepted.
    pub fn saved(&self) -> Option<Fields> {
        self.0.record.borrow().saved.clone()
    }

    /// Fields currently being saved remotely.
    pub fn saving(&self) -> Option<Fields> {
        self.0.record.borrow().saving.clone()
    }

    /// Fields waiting for a live broadcast.
    pub fn publish(&self) -> Option<Fields> {
        self.0.record.borrow().publish.clone()
    }

    /// Working fields that differ from the last confirmed save.
    pub fn changes(&self) -> Fields {
        self.0.record.borrow().changes()
    }

    pub fn is_saved(&self) -> bool {
        self.0.record.borrow().is_saved()
    }

    /// True from the moment removal is requested.
    pub fn is_deleted(&self) -> bool {
        self.0.record.borrow().is_deleted()
    }

    /// Snapshot of the record state.
    pub fn record(&self) -> Record {
        self.0.record.borrow().clone()
    }

    pub(crate) fn with_record<R>(&self, f: impl FnOnce(&Record) -> R) -> R {
        f(&self.0.record.borrow())
    }

    pub(crate) fn with_record_mut<R>(&self, f: impl FnOnce(&mut Record) -> R) -> R {
        f(&mut self.0.record.borrow_mut())
    }

    // ===== dependents =====

    /// Require `other` to be saved remotely before this record is.
    pub fn depends_on(&self, other: &Model) {
        if other == self {
            return;
        }
        let mut dependents = self.0.dependents.borrow_mut();
        if !dependents.iter().any(|d| d.ptr_eq(&other.downgrade())) {
            dependents.push(other.downgrade());
        }
    }

    /// Dependents that still block a remote save.
    ///
    /// A dependent that was deleted or dropped can never be saved and no
    /// longer blocks.
    pub(crate) fn unsaved_dependents(&self) -> Vec<Model> {
        self.0
            .dependents
            .borrow()
            .iter()
            .filter_map(Model::upgrade)
            .filter(|d| !d.is_saved() && d.status() != Status::Deleted)
            .collect()
    }

    pub fn dependents_saved(&self) -> bool {
        self.unsaved_dependents().is_empty()
    }

    /// Run `listener` once this record is saved remotely or deleted.
    pub(crate) fn on_settled(&self, listener: impl FnOnce() + 'static) {
        self.0.settled_listeners.borrow_mut().push(Box::new(listener));
    }

    pub(crate) fn fire_settled(&self) {
        let listeners: Vec<SettledListener> =
            self.0.settled_listeners.borrow_mut().drain(..).collect();
        for listener in listeners {
            listener();
        }
    }

    // ===== sync =====

    /// Save with the store's default cascade.
    pub fn save(&self) -> Result<()> {
        let store = self.store()?;
        store.save_model(self, store.config.save_cascade)
    }

    pub fn save_with(&self, cascade: Cascade) -> Result<()> {
        self.store()?.save_model(self, cascade)
    }

    /// Remove with the store's default cascade.
    pub fn remove(&self) -> Result<()> {
        let store = self.store()?;
        store.remove_model(self, store.config.remove_cascade)
    }

    pub fn remove_with(&self, cascade: Cascade) -> Result<()> {
        self.store()?.remove_model(self, cascade)
    }

    /// Whether any operation is queued or running.
    pub fn has_pending_operations(&self) -> bool {
        !self.0.queue.borrow().is_idle()
    }

    pub fn running_operation(&self) -> Option<OperationKind> {
        self.0.queue.borrow().running().map(|op| op.kind)
    }

    // ===== queue =====

    /// Queue an operation and make sure the scheduler will look at it.
    pub(crate) fn enqueue(&self, kind: OperationKind, cascade: Cascade) {
        let op = Operation::new(kind, cascade);
        debug!(key = ?self.key(), op = %op.id, kind = %kind, "enqueue");

        let (superseded, ready) = {
            let mut queue = self.0.queue.borrow_mut();
            let superseded = queue.enqueue(op);
            (superseded, queue.has_ready())
        };

        for op in &superseded {
            debug!(key = ?self.key(), op = %op.id, kind = %op.kind, "superseded");
        }

        if ready {
            self.schedule();
        }
    }

    fn schedule(&self) {
        if let Some(scheduler) = self.scheduler() {
            scheduler.schedule(self);
        }
    }

    fn scheduler(&self) -> Option<Rc<Scheduler>> {
        self.0.store.upgrade().map(|store| store.scheduler.clone())
    }

    /// Start the head operation, if nothing is running.
    pub(crate) fn start_next(&self) -> Option<LocalBoxFuture<'static, (Model, Completion)>> {
        let op = self.0.queue.borrow_mut().start_next()?;
        debug!(key = ?self.key(), op = %op.id, kind = %op.kind, "run");

        let model = self.clone();
        Some(Box::pin(async move {
            let completion = reconcile::execute(&model, &op).await;
            (model, completion)
        }))
    }

    /// Finish the running operation and queue its follow-ups.
    pub(crate) fn complete(&self, completion: Completion) {
        let Completion { state, follow_ups } = completion;
        let (finished, ready) = {
            let mut queue = self.0.queue.borrow_mut();
            let finished = queue.finish(state, follow_ups);
            (finished, queue.has_ready())
        };

        if let Some(op) = finished {
            debug!(key = ?self.key(), op = %op.id, kind = %op.kind, state = ?op.state, "finished");
        }

        if ready {
            self.schedule();
        }
    }
}

impl Drop for ModelCell {
    /// A dropped record releases whoever waits on it.
    fn drop(&mut self) {
        for listener in self.settled_listeners.get_mut().drain(..) {
            listener();
        }
    }
}

impl PartialEq for Model {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Model {}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let record = self.0.record.borrow();
        f.debug_struct("Model")
            .field("key", &self.0.key.borrow())
            .field("status", &record.status)
            .field("fields", &record.fields)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::mock::MockRemote;
    use crate::{Collaborators, Engine, ModelSchema, OperationKind, Store, SyncConfig};
    use serde_json::json;
    use std::rc::Rc;

    fn setup() -> (Engine, Store) {
        let engine = Engine::default();
        let store = engine
            .store(
                ModelSchema::new("users"),
                SyncConfig::default(),
                Collaborators::new(Rc::new(MockRemote::new())),
            )
            .unwrap();
        (engine, store)
    }

    #[test]
    fn depends_on_ignores_self_and_duplicates() {
        let (_engine, store) = setup();
        let a = store.build(json!({"id": "a"})).unwrap();
        let b = store.build(json!({"id": "b"})).unwrap();

        a.depends_on(&a);
        a.depends_on(&b);
        a.depends_on(&b);

        assert_eq!(a.0.dependents.borrow().len(), 1);
        assert_eq!(a.unsaved_dependents(), vec![b.clone()]);
    }

    #[test]
    fn dropped_dependent_stops_blocking() {
        let (_engine, store) = setup();
        let a = store.build(json!({"id": "a"})).unwrap();
        {
            let b = store.build(json!({"id": "b"})).unwrap();
            a.depends_on(&b);
            assert!(!a.dependents_saved());
        }
        assert!(a.dependents_saved());
    }

    #[test]
    fn settled_listeners_fire_once() {
        let (_engine, store) = setup();
        let a = store.build(json!({"id": "a"})).unwrap();
        let fired = Rc::new(std::cell::Cell::new(0));

        let counter = fired.clone();
        a.on_settled(move || counter.set(counter.get() + 1));
        a.fire_settled();
        a.fire_settled();

        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn enqueue_schedules_once() {
        let (engine, store) = setup();
        let a = store.build(json!({"id": "a"})).unwrap();

        a.enqueue(OperationKind::SaveNow, crate::Cascade::LOCAL);
        a.enqueue(OperationKind::SaveNow, crate::Cascade::LOCAL);

        assert!(a.has_pending_operations());
        assert!(!engine.is_idle());
        assert_eq!(a.running_operation(), None);
    }

    #[tokio::test]
    async fn running_operation_clears_after_run() {
        let (engine, store) = setup();
        let a = store.create(json!({"id": "a"})).unwrap();
        engine.run_until_idle().await;

        assert!(!a.has_pending_operations());
        assert_eq!(a.running_operation(), None);
    }
}

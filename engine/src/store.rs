//! Store - the active dataset of one model.
//!
//! A store hands out [`Model`] handles, turns save/remove requests into
//! queued operations, ingests remote and live data, and reports what
//! happened through [`Notification`]s.

use crate::collaborators::Collaborators;
use crate::engine::Scheduler;
use crate::network::NetworkMonitor;
use crate::notification::{Notification, NotificationKind};
use crate::operation::OperationKind;
use crate::snapshot::StoredRecord;
use crate::{
    error::Result, CacheMode, Cascade, Error, Fields, Model, ModelSchema, Record, RecordKey,
    Status, SyncConfig, SyncFailure,
};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub(crate) struct StoreInner {
    pub(crate) schema: ModelSchema,
    pub(crate) config: SyncConfig,
    pub(crate) collaborators: Collaborators,
    pub(crate) network: Rc<NetworkMonitor>,
    pub(crate) scheduler: Rc<Scheduler>,
    /// Active dataset, ordered by key
    models: RefCell<BTreeMap<RecordKey, Model>>,
    subscribers: RefCell<Vec<mpsc::UnboundedSender<Notification>>>,
    this: Weak<StoreInner>,
}

/// The active dataset of one model, bound to its collaborators.
#[derive(Clone)]
pub struct Store(Rc<StoreInner>);

impl Store {
    pub(crate) fn new(
        schema: ModelSchema,
        config: SyncConfig,
        collaborators: Collaborators,
        network: Rc<NetworkMonitor>,
        scheduler: Rc<Scheduler>,
    ) -> Self {
        Store(Rc::new_cyclic(|this| StoreInner {
            schema,
            config,
            collaborators,
            network,
            scheduler,
            models: RefCell::new(BTreeMap::new()),
            subscribers: RefCell::new(Vec::new()),
            this: this.clone(),
        }))
    }

    pub fn schema(&self) -> &ModelSchema {
        &self.0.schema
    }

    pub fn config(&self) -> &SyncConfig {
        &self.0.config
    }

    pub fn network(&self) -> &NetworkMonitor {
        &self.0.network
    }

    /// Build a detached model from `data`.
    ///
    /// Undeclared fields are dropped, defaults applied, and a single key
    /// field is generated when absent. The model joins the dataset on its
    /// first save.
    pub fn build(&self, data: Value) -> Result<Model> {
        let fields = self.0.schema.prepare(&object(data)?)?;
        let key = self.0.schema.build_key(&fields)?;
        Ok(Model::new(self.0.this.clone(), Record::new(fields), Some(key)))
    }

    /// Build a model and save it with the default cascade.
    pub fn create(&self, data: Value) -> Result<Model> {
        let model = self.build(data)?;
        model.save()?;
        Ok(model)
    }

    pub fn get(&self, key: impl Into<RecordKey>) -> Option<Model> {
        self.0.models.borrow().get(&key.into()).cloned()
    }

    /// Every active model, ordered by key.
    pub fn all(&self) -> Vec<Model> {
        self.0.models.borrow().values().cloned().collect()
    }

    pub fn contains(&self, key: impl Into<RecordKey>) -> bool {
        self.0.models.borrow().contains_key(&key.into())
    }

    pub fn len(&self) -> usize {
        self.0.models.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.models.borrow().is_empty()
    }

    /// Receive every notification emitted from now on.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<Notification> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.0.subscribers.borrow_mut().push(tx);
        rx
    }

    /// Clear the key of a model that was never saved, and take it out of
    /// the dataset. The next save assigns a new key.
    pub fn remove_key(&self, model: &Model) -> Result<()> {
        self.0.check_owner(model)?;
        let Some(key) = model.key() else {
            return Ok(());
        };
        if model.is_saved() || model.has_pending_operations() {
            return Err(Error::KeyInUse(key));
        }

        model.with_record_mut(|record| self.0.schema.remove_key(&mut record.fields));
        self.0.purge(&key, model);
        model.set_key(None);
        debug!(model = %self.0.schema.name, key = %key, "key removed");
        Ok(())
    }

    /// Ingest a record the remote service says is current.
    ///
    /// Unknown keys enter the dataset confirmed and synced. Known records
    /// merge the data without losing local edits. Records being removed
    /// ignore it.
    pub fn put_remote_data(&self, data: Value) -> Result<Model> {
        let fields = self.0.schema.project(&object(data)?);
        let key = self.0.schema.build_key(&fields)?;

        let existing = self.get(key.clone());
        let model = match existing {
            Some(model) => {
                if model.is_deleted() {
                    debug!(key = %key, "remote data for deleted record ignored");
                    return Ok(model);
                }
                self.0.merge_remote(&model, &key, &fields);
                model
            }
            None => {
                let model = Model::new(
                    self.0.this.clone(),
                    Record::from_remote(fields),
                    Some(key.clone()),
                );
                self.0.models.borrow_mut().insert(key, model.clone());
                model
            }
        };

        model.fire_settled();
        model.enqueue(OperationKind::SaveNow, Cascade::LOCAL);
        Ok(model)
    }

    /// Apply a removal broadcast by a peer.
    pub fn live_remove(&self, key: impl Into<RecordKey>) -> bool {
        let key = key.into();
        let Some(model) = self.get(key.clone()) else {
            return false;
        };

        model.with_record_mut(Record::mark_deleted);
        self.0.purge(&key, &model);
        model.enqueue(OperationKind::RemoveNow, Cascade::LOCAL);
        self.0.notify(&key, NotificationKind::LiveRemove, None, None);
        model.fire_settled();
        info!(model = %self.0.schema.name, key = %key, "removed by peer");
        true
    }

    /// Rebuild the dataset from the local store and resume unfinished work.
    ///
    /// Records stored mid-save are saved again, records stored mid-removal
    /// are removed again, and leftovers of finished removals are cleaned up.
    /// Returns the number of records restored.
    pub async fn load(&self) -> Result<usize> {
        if self.0.config.cache == CacheMode::None {
            return Ok(0);
        }

        let stored = self.0.collaborators.local.all().await?;
        let mut restored = 0;

        for entry in stored {
            let key = entry.key.clone();

            if entry.status == Status::Deleted {
                if let Err(e) = self.0.collaborators.local.remove(&key).await {
                    warn!(key = %key, error = %e, "failed to clean up deleted record");
                }
                continue;
            }

            if self.contains(key.clone()) {
                debug!(key = %key, "already loaded");
                continue;
            }

            let model = Model::new(self.0.this.clone(), entry.restore(), Some(key.clone()));

            match entry.status {
                Status::Synced => {
                    self.0.models.borrow_mut().insert(key, model);
                }
                Status::SavePending => {
                    self.0.models.borrow_mut().insert(key, model.clone());
                    model.enqueue(OperationKind::SaveRemote, self.0.config.save_cascade);
                }
                Status::RemovePending => {
                    model.enqueue(OperationKind::RemoveRemote, self.0.config.remove_cascade);
                }
                Status::Deleted => continue,
            }
            restored += 1;
        }

        info!(model = %self.0.schema.name, restored, "loaded from local store");
        Ok(restored)
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("model", &self.0.schema.name)
            .field("len", &self.len())
            .finish()
    }
}

impl StoreInner {
    fn check_owner(&self, model: &Model) -> Result<()> {
        if Weak::ptr_eq(&model.0.store, &self.this) {
            Ok(())
        } else {
            Err(Error::ForeignModel(self.schema.name.clone()))
        }
    }

    pub(crate) fn save_model(&self, model: &Model, cascade: Cascade) -> Result<()> {
        self.check_owner(model)?;

        let key = match model.key() {
            Some(key) => key,
            None => model.with_record_mut(|record| {
                self.schema.ensure_key(&mut record.fields);
                self.schema.build_key(&record.fields)
            })?,
        };

        if model.is_deleted() {
            return Err(Error::OperationOnDeleted(key));
        }

        {
            let mut models = self.models.borrow_mut();
            match models.get(&key) {
                Some(existing) if existing != model => {
                    return Err(Error::RecordAlreadyExists(key));
                }
                Some(_) => {}
                None => {
                    models.insert(key.clone(), model.clone());
                }
            }
        }
        model.set_key(Some(key.clone()));

        model.with_record_mut(|record| {
            let changes = record.changes();
            record.queue_publish(&changes);
        });

        debug!(model = %self.schema.name, key = %key, cascade = %cascade, "save");
        model.enqueue(OperationKind::SaveLocal, cascade);
        Ok(())
    }

    pub(crate) fn remove_model(&self, model: &Model, cascade: Cascade) -> Result<()> {
        self.check_owner(model)?;

        match model.status() {
            Status::Deleted => return Ok(()),
            Status::RemovePending if model.has_pending_operations() => return Ok(()),
            _ => {}
        }

        let Some(key) = model.key() else {
            model.with_record_mut(|record| record.status = Status::Deleted);
            model.fire_settled();
            return Ok(());
        };

        model.with_record_mut(|record| record.status = Status::RemovePending);
        self.purge(&key, model);

        debug!(model = %self.schema.name, key = %key, cascade = %cascade, "remove");
        model.enqueue(OperationKind::RemoveLocal, cascade);
        Ok(())
    }

    /// Merge remote data into a model, reporting changed working fields.
    pub(crate) fn merge_remote(&self, model: &Model, key: &RecordKey, data: &Fields) -> bool {
        let changed = model.with_record_mut(|record| record.merge_remote(data, &self.schema.key));
        if changed {
            self.notify(
                key,
                NotificationKind::RemoteUpdate,
                None,
                Some(Value::Object(data.clone())),
            );
        }
        changed
    }

    /// Take a model out of the active dataset.
    pub(crate) fn purge(&self, key: &RecordKey, model: &Model) {
        let mut models = self.models.borrow_mut();
        if models.get(key) == Some(model) {
            models.remove(key);
        }
    }

    /// Put a model back into the active dataset. Fails if another model
    /// took its key in the meantime.
    pub(crate) fn restore(&self, key: &RecordKey, model: &Model) -> bool {
        let mut models = self.models.borrow_mut();
        match models.get(key) {
            Some(existing) => existing == model,
            None => {
                models.insert(key.clone(), model.clone());
                true
            }
        }
    }

    pub(crate) fn stored(&self, key: &RecordKey, model: &Model) -> StoredRecord {
        model.with_record(|record| StoredRecord::capture(key.clone(), record))
    }

    /// Keep the declared fields of an object body; anything else is empty.
    pub(crate) fn resolve(&self, body: Option<&Value>) -> Fields {
        match body {
            Some(Value::Object(data)) => self.schema.project(data),
            _ => Fields::new(),
        }
    }

    pub(crate) fn notify(
        &self,
        key: &RecordKey,
        kind: NotificationKind,
        failure: Option<SyncFailure>,
        payload: Option<Value>,
    ) {
        let notification = Notification::new(self.schema.name.clone(), key.clone(), kind)
            .with_failure(failure)
            .with_payload(payload);
        self.subscribers
            .borrow_mut()
            .retain(|tx| tx.send(notification.clone()).is_ok());
    }
}

fn object(data: Value) -> Result<Fields> {
    match data {
        Value::Object(fields) => Ok(fields),
        other => Err(Error::InvalidPayload(format!(
            "expected an object, got {other}"
        ))),
    }
}

//! Reconciliation: what each operation does when it runs.
//!
//! Every operation receives a [`Context`] and returns a [`Completion`]
//! naming its terminal state and the follow-ups to insert. Save and remove
//! outcomes all funnel through two primitives: [`Context::mark_synced`] and
//! [`Context::handle_data`].

mod local;
mod remove;
mod save;

use crate::notification::NotificationKind;
use crate::operation::{Completion, Operation, OperationKind};
use crate::store::StoreInner;
use crate::{CacheMode, Cascade, Fields, Model, Record, RecordKey, Status, SyncFailure};
use serde_json::Value;
use std::rc::Rc;
use tracing::{debug, info};

/// Run one operation to completion.
pub(crate) async fn execute(model: &Model, op: &Operation) -> Completion {
    let Ok(store) = model.store() else {
        debug!(op = %op.id, kind = %op.kind, "store dropped, operation abandoned");
        return Completion::failed();
    };
    let Some(key) = model.key() else {
        debug!(op = %op.id, kind = %op.kind, "record has no key, operation abandoned");
        return Completion::failed();
    };

    let ctx = Context {
        store,
        model,
        op,
        key,
    };

    match op.kind {
        OperationKind::SaveLocal => save::save_local(&ctx).await,
        OperationKind::SaveRemote => save::save_remote(&ctx).await,
        OperationKind::SaveNow => local::save_now(&ctx).await,
        OperationKind::RemoveLocal => remove::remove_local(&ctx).await,
        OperationKind::RemoveRemote => remove::remove_remote(&ctx).await,
        OperationKind::RemoveNow => local::remove_now(&ctx).await,
        OperationKind::RemoveCache => local::remove_cache(&ctx).await,
    }
}

pub(crate) struct Context<'a> {
    store: Rc<StoreInner>,
    model: &'a Model,
    op: &'a Operation,
    key: RecordKey,
}

impl Context<'_> {
    fn cache(&self) -> CacheMode {
        self.store.config.cache
    }

    fn can(&self, cascade: Cascade) -> bool {
        self.op.cascade.can_cascade(cascade)
    }

    /// The local store is written only when caching and allowed to.
    fn writes_local(&self) -> bool {
        self.cache() != CacheMode::None && self.can(Cascade::LOCAL)
    }

    /// Best known reachability, probing when the last known state is offline.
    fn online(&self) -> bool {
        self.store.network.is_online() || self.store.network.check_now()
    }

    fn notify(&self, kind: NotificationKind, failure: Option<SyncFailure>, payload: Option<Value>) {
        self.store.notify(&self.key, kind, failure, payload);
    }

    /// Back to synced: clear pending data, optionally write the local copy,
    /// and report.
    fn mark_synced(
        &self,
        completion: &mut Completion,
        save_now: bool,
        kind: NotificationKind,
        failure: Option<SyncFailure>,
        payload: Option<Value>,
    ) {
        self.model.with_record_mut(Record::mark_synced);
        if save_now {
            completion.then(OperationKind::SaveNow, self.op.cascade);
        }
        self.notify(kind, failure, payload);
    }

    /// Accept data from the remote service after a save.
    ///
    /// The in-flight snapshot becomes confirmed, the response is merged
    /// without clobbering edits made during the flight, and the result is
    /// broadcast.
    fn handle_data(&self, completion: &mut Completion, data: &Fields, failure: Option<SyncFailure>) {
        if self.model.is_deleted() {
            // the remote copy exists now, so the pending removal must reach it
            debug!(key = %self.key, "deleted during save, response dropped");
            self.model.with_record_mut(|record| {
                record.confirm_saving();
                record.clear_pending();
            });
            return;
        }

        self.model.with_record_mut(Record::confirm_saving);
        if !data.is_empty() {
            self.store.merge_remote(self.model, &self.key, data);
        }

        self.publish_live(Some(data));
        self.mark_synced(completion, false, NotificationKind::RemoteSave, failure, None);

        if self.cache() == CacheMode::Pending {
            completion.then(OperationKind::RemoveCache, self.op.cascade);
        } else {
            completion.then(OperationKind::SaveNow, self.op.cascade);
        }

        info!(key = %self.key, op = %self.op.id, conflict = failure.is_some(), "saved");
        self.model.fire_settled();
    }

    /// Merge `data` into the publish set and broadcast it if allowed.
    fn publish_live(&self, data: Option<&Fields>) {
        if let Some(data) = data {
            self.model.with_record_mut(|record| record.queue_publish(data));
        }
        if !self.can(Cascade::LIVE) {
            return;
        }

        let publish = self
            .model
            .with_record(|record| record.publish.clone())
            .filter(|publish| !publish.is_empty());
        if let Some(publish) = publish {
            debug!(key = %self.key, "publish live");
            self.store.collaborators.live.publish(&self.key, &publish);
        }
    }

    /// Replay the remote leg once the network comes back.
    ///
    /// At most one registration per record; a later call only updates the
    /// cascade the replay will use.
    fn listen_for_online(&self) {
        let cell = &self.model.0;
        cell.resume_cascade.set(self.op.cascade);
        if cell.listening_online.replace(true) {
            return;
        }

        let model = self.model.clone();
        self.store.network.notify_on_reconnect(move || {
            model.0.listening_online.set(false);
            if model.store().is_err() {
                return;
            }

            let cascade = model.0.resume_cascade.get();
            match model.status() {
                Status::SavePending => model.enqueue(OperationKind::SaveRemote, cascade),
                Status::RemovePending => model.enqueue(OperationKind::RemoveRemote, cascade),
                Status::Synced | Status::Deleted => {}
            }
        });
    }
}

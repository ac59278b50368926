//! Save: local leg, then the remote leg with its entry guards.

use super::Context;
use crate::collaborators::{RemoteFailure, RemoteStatus};
use crate::notification::NotificationKind;
use crate::operation::{Completion, OperationKind};
use crate::{Cascade, Model, Record, Status, SyncFailure};
use serde_json::Value;
use std::cell::Cell;
use std::rc::Rc;
use tracing::{debug, warn};

/// Persist the working state locally, then hand over to the remote leg.
pub(super) async fn save_local(ctx: &Context<'_>) -> Completion {
    let mut completion = Completion::succeeded();

    if ctx.model.is_deleted() {
        debug!(key = %ctx.key, "save of deleted record skipped");
        return completion;
    }

    let remote = ctx.can(Cascade::REMOTE);
    if remote {
        ctx.model
            .with_record_mut(|record| record.status = Status::SavePending);
    }

    if ctx.writes_local() {
        let stored = ctx.store.stored(&ctx.key, ctx.model);
        match ctx.store.collaborators.local.put(&ctx.key, &stored).await {
            Ok(()) => ctx.notify(NotificationKind::LocalSave, None, None),
            Err(e) => {
                warn!(key = %ctx.key, error = %e, "local save failed");
                ctx.notify(
                    NotificationKind::LocalSaveFailure,
                    None,
                    Some(Value::String(e.to_string())),
                );
            }
        }
    }

    if remote {
        completion.then(OperationKind::SaveRemote, ctx.op.cascade);
    }
    completion
}

/// Remote leg of a save.
pub(super) async fn save_remote(ctx: &Context<'_>) -> Completion {
    if ctx.model.is_deleted() {
        debug!(key = %ctx.key, "remote save of deleted record skipped");
        ctx.model.with_record_mut(Record::clear_pending);
        ctx.notify(NotificationKind::RemoteSaveFailure, None, None);
        return Completion::failed();
    }

    let unsaved = ctx.model.unsaved_dependents();
    if !unsaved.is_empty() {
        debug!(
            key = %ctx.key,
            waiting = unsaved.len(),
            reason = %SyncFailure::DependencyNotReady,
            "deferring"
        );
        wait_for_dependents(ctx, &unsaved);
        return Completion::deferred();
    }

    let changes = ctx.model.changes();
    if changes.is_empty() || ctx.op.cascade.not_cascade(Cascade::REST) {
        debug!(key = %ctx.key, "nothing to send");
        let mut completion = Completion::succeeded();
        ctx.publish_live(None);
        ctx.mark_synced(&mut completion, true, NotificationKind::RemoteSave, None, None);
        return completion;
    }

    let was_saved = ctx.model.is_saved();
    ctx.model
        .with_record_mut(|record| record.begin_save(changes.clone()));

    if !ctx.online() {
        debug!(key = %ctx.key, "offline, remote save not attempted");
        return offline(ctx, None);
    }

    let remote = &ctx.store.collaborators.remote;
    let call = if was_saved {
        remote.update(&ctx.key, &changes)
    } else {
        remote.create(&ctx.key, &changes)
    };

    match call.await {
        Ok(body) => {
            let mut completion = Completion::succeeded();
            let data = ctx.store.resolve(body.as_ref());
            ctx.handle_data(&mut completion, &data, None);
            completion
        }
        Err(failure) => on_failure(ctx, failure),
    }
}

fn on_failure(ctx: &Context<'_>, failure: RemoteFailure) -> Completion {
    let RemoteFailure { status, body } = failure;

    match status {
        RemoteStatus::Conflict => {
            debug!(key = %ctx.key, "save conflict, accepting remote data");
            let mut completion = Completion::succeeded();
            let data = ctx.store.resolve(body.as_ref());
            ctx.handle_data(&mut completion, &data, Some(SyncFailure::Conflict));
            completion
        }
        RemoteStatus::NotFound => {
            warn!(key = %ctx.key, "record no longer exists remotely");
            let mut completion = Completion::failed();
            completion.then(OperationKind::RemoveNow, ctx.op.cascade);

            ctx.store.purge(&ctx.key, ctx.model);
            ctx.model.with_record_mut(|record| {
                record.status = Status::Deleted;
                record.clear_pending();
            });
            ctx.notify(
                NotificationKind::RemoteSaveFailure,
                Some(SyncFailure::NotFound),
                body,
            );
            ctx.model.fire_settled();
            completion
        }
        RemoteStatus::Offline => {
            if ctx.store.network.confirm_offline() {
                offline(ctx, body)
            } else {
                transient(ctx, 0, body)
            }
        }
        RemoteStatus::Other(code) => transient(ctx, code, body),
    }
}

/// Park the save until the network comes back. Status stays `SavePending`.
fn offline(ctx: &Context<'_>, body: Option<Value>) -> Completion {
    ctx.listen_for_online();
    ctx.notify(
        NotificationKind::RemoteSaveOffline,
        Some(SyncFailure::OfflineUnreachable),
        body,
    );
    Completion::deferred()
}

/// Give up on this attempt. Local edits stay, no retry.
fn transient(ctx: &Context<'_>, code: u16, body: Option<Value>) -> Completion {
    warn!(key = %ctx.key, status = code, "remote save failed");
    let mut completion = Completion::failed();
    ctx.mark_synced(
        &mut completion,
        true,
        NotificationKind::RemoteSaveFailure,
        Some(SyncFailure::TransientServerError(code)),
        body,
    );
    completion
}

/// Queue a fresh save once every unsaved dependent is saved.
fn wait_for_dependents(ctx: &Context<'_>, unsaved: &[Model]) {
    let waiting = Rc::new(Cell::new(unsaved.len()));
    let cascade = ctx.op.cascade;

    for dependent in unsaved {
        let waiting = waiting.clone();
        let model = ctx.model.downgrade();
        dependent.on_settled(move || {
            let left = waiting.get().saturating_sub(1);
            waiting.set(left);
            if left > 0 {
                return;
            }
            if let Some(model) = Model::upgrade(&model) {
                if !model.is_deleted() {
                    model.enqueue(OperationKind::SaveLocal, cascade);
                }
            }
        });
    }
}

//! Remove: local leg, then the remote leg.

use super::Context;
use crate::collaborators::{RemoteFailure, RemoteStatus};
use crate::notification::NotificationKind;
use crate::operation::{Completion, OperationKind};
use crate::{Cascade, Record, Status, SyncFailure};
use serde_json::Value;
use tracing::{debug, info, warn};

/// Persist the pending removal locally, then hand over to the remote leg.
pub(super) async fn remove_local(ctx: &Context<'_>) -> Completion {
    let mut completion = Completion::succeeded();

    if ctx.writes_local() {
        let stored = ctx.store.stored(&ctx.key, ctx.model);
        match ctx.store.collaborators.local.put(&ctx.key, &stored).await {
            Ok(()) => ctx.notify(NotificationKind::LocalRemove, None, None),
            Err(e) => {
                warn!(key = %ctx.key, error = %e, "local remove failed");
                ctx.notify(
                    NotificationKind::LocalRemoveFailure,
                    None,
                    Some(Value::String(e.to_string())),
                );
            }
        }
    }

    if ctx.can(Cascade::REMOTE) {
        completion.then(OperationKind::RemoveRemote, ctx.op.cascade);
    } else {
        completion.then(OperationKind::RemoveNow, ctx.op.cascade);
    }
    completion
}

/// Remote leg of a removal.
pub(super) async fn remove_remote(ctx: &Context<'_>) -> Completion {
    if ctx.model.status() != Status::RemovePending {
        debug!(key = %ctx.key, status = ?ctx.model.status(), "no removal pending");
        return Completion::succeeded();
    }

    if !ctx.model.is_saved() {
        debug!(key = %ctx.key, "never saved remotely, removing locally");
        return finish(ctx, false);
    }

    if ctx.op.cascade.not_cascade(Cascade::REST) {
        return finish(ctx, true);
    }

    if !ctx.online() {
        debug!(key = %ctx.key, "offline, remote remove not attempted");
        return offline(ctx, None);
    }

    match ctx.store.collaborators.remote.remove(&ctx.key).await {
        Ok(_) => finish(ctx, true),
        Err(failure) => on_failure(ctx, failure),
    }
}

fn on_failure(ctx: &Context<'_>, failure: RemoteFailure) -> Completion {
    let RemoteFailure { status, body } = failure;

    match status {
        RemoteStatus::NotFound => {
            debug!(key = %ctx.key, "already gone remotely");
            finish(ctx, false)
        }
        RemoteStatus::Conflict => conflict(ctx, body),
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

/// The removal is confirmed: forget everything and purge.
///
/// `broadcast` is false when peers cannot know the record.
fn finish(ctx: &Context<'_>, broadcast: bool) -> Completion {
    let mut completion = Completion::succeeded();

    ctx.model.with_record_mut(Record::mark_deleted);
    ctx.store.purge(&ctx.key, ctx.model);
    ctx.notify(NotificationKind::RemoteRemove, None, None);

    if broadcast && ctx.can(Cascade::LIVE) {
        ctx.store.collaborators.live.remove(&ctx.key);
    }

    completion.then(OperationKind::RemoveNow, ctx.op.cascade);
    info!(key = %ctx.key, op = %ctx.op.id, "removed");
    ctx.model.fire_settled();
    completion
}

/// The remote service refused the removal; its data wins and the record
/// comes back.
fn conflict(ctx: &Context<'_>, body: Option<Value>) -> Completion {
    warn!(key = %ctx.key, "remove conflict, record restored");
    let mut completion = Completion::failed();

    let data = ctx.store.resolve(body.as_ref());
    ctx.model.with_record_mut(Record::mark_synced);
    if !data.is_empty() {
        ctx.store.merge_remote(ctx.model, &ctx.key, &data);
    }
    if !ctx.store.restore(&ctx.key, ctx.model) {
        warn!(key = %ctx.key, "key taken by another record, not restored");
    }

    ctx.notify(
        NotificationKind::RemoteRemoveFailure,
        Some(SyncFailure::Conflict),
        body,
    );
    completion.then(OperationKind::SaveNow, ctx.op.cascade);
    completion
}

/// Park the removal until the network comes back. Status stays
/// `RemovePending`.
fn offline(ctx: &Context<'_>, body: Option<Value>) -> Completion {
    ctx.listen_for_online();
    ctx.notify(
        NotificationKind::RemoteRemoveOffline,
        Some(SyncFailure::OfflineUnreachable),
        body,
    );
    Completion::deferred()
}

/// Report and leave the record `RemovePending` so the removal can be
/// issued again.
fn transient(ctx: &Context<'_>, code: u16, body: Option<Value>) -> Completion {
    warn!(key = %ctx.key, status = code, "remote remove failed");
    ctx.notify(
        NotificationKind::RemoteRemoveFailure,
        Some(SyncFailure::TransientServerError(code)),
        body,
    );
    Completion::failed()
}

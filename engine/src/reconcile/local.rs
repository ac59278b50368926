//! Local store housekeeping. These run regardless of the cascade.

use super::Context;
use crate::notification::NotificationKind;
use crate::operation::Completion;
use crate::{CacheMode, Record};
use serde_json::Value;
use tracing::{debug, warn};

/// Write the stored form when every record is cached.
pub(super) async fn save_now(ctx: &Context<'_>) -> Completion {
    if ctx.cache() != CacheMode::All || ctx.model.is_deleted() {
        return Completion::succeeded();
    }

    let stored = ctx.store.stored(&ctx.key, ctx.model);
    match ctx.store.collaborators.local.put(&ctx.key, &stored).await {
        Ok(()) => debug!(key = %ctx.key, status = ?stored.status, "stored"),
        Err(e) => {
            warn!(key = %ctx.key, error = %e, "local save failed");
            ctx.notify(
                NotificationKind::LocalSaveFailure,
                None,
                Some(Value::String(e.to_string())),
            );
        }
    }
    Completion::succeeded()
}

/// Purge from the dataset and the local store.
pub(super) async fn remove_now(ctx: &Context<'_>) -> Completion {
    ctx.model.with_record_mut(Record::mark_deleted);
    ctx.store.purge(&ctx.key, ctx.model);

    if ctx.cache() != CacheMode::None {
        match ctx.store.collaborators.local.remove(&ctx.key).await {
            Ok(()) => debug!(key = %ctx.key, "local copy removed"),
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

    ctx.model.fire_settled();
    Completion::succeeded()
}

/// Drop the local copy of a record the remote service has confirmed.
pub(super) async fn remove_cache(ctx: &Context<'_>) -> Completion {
    if ctx.cache() == CacheMode::None {
        return Completion::succeeded();
    }

    if let Err(e) = ctx.store.collaborators.local.remove(&ctx.key).await {
        warn!(key = %ctx.key, error = %e, "failed to drop cached copy");
    }
    Completion::succeeded()
}

// src/core/reconcile/handlers.rs

//! Per-command local-apply handlers run by the minion reconciliation loop
//! (spec.md §4.3 "Command handlers"). Each handler validates the instance
//! exists locally (except `create`/`*_all`/`sentinel_*`), checks
//! `item.uuid == local.uuid`, invokes the local lifecycle primitive, and is
//! idempotent against its own target state.

use crate::core::commandlog::{Command, LogItem};
use crate::core::errors::RdsError;
use crate::core::instance::model::{Instance, ReplicationType};
use crate::core::lifecycle::ops::{LifecycleOps, instance_port};
use crate::core::redis_client::RedisClient;
use crate::core::reconcile::sync_blocker::{self, SyncOutcome};
use std::time::Duration;

/// Everything a handler needs to act on a single command: the local
/// lifecycle primitives, the Redis version to render configs against, the
/// master's ip (for `REPLICAOF`), and the configured sync-blocker deadline.
///
/// `is_origin` distinguishes the two places this dispatch machinery runs:
/// on a minion, a `replica`-type instance is brought up pointed at the
/// master via `REPLICAOF` and blocked on sync convergence; on the master
/// itself, the local instance behind a given id *is* the Redis-protocol
/// origin, so `is_origin = true` skips both (spec.md §2 "performs local
/// lifecycle operations ... on its host").
pub struct HandlerContext<'a> {
    pub ops: &'a LifecycleOps,
    pub redis_version: &'a str,
    pub master_ip: &'a str,
    pub max_sync_wait: Duration,
    pub is_origin: bool,
}

/// Loads the local instance for `item`'s target id, dropping the command
/// with a warning if the instance is absent locally or its uuid doesn't
/// match the item's (spec.md §4.3 "checks item.uuid == local.uuid, else
/// logs and drops").
fn require_local(ctx: &HandlerContext<'_>, item: &LogItem) -> Result<Option<Instance>, RdsError> {
    let Some(local) = ctx.ops.store.load(item.instance_id)? else {
        tracing::warn!(id = item.instance_id, command = ?item.command, "command received for instance absent locally, dropping");
        return Ok(None);
    };
    if local.uuid != item.instance_uuid {
        tracing::warn!(id = item.instance_id, local_uuid = %local.uuid, item_uuid = %item.instance_uuid, "uuid mismatch, dropping item");
        return Ok(None);
    }
    Ok(Some(local))
}

/// Starts an instance and, for replica-type instances, issues `REPLICAOF`
/// against the master's corresponding Redis server and blocks on sync
/// convergence (spec.md §8 scenario 1).
pub async fn start_instance(ctx: &HandlerContext<'_>, instance: &Instance) -> Result<(), RdsError> {
    ctx.ops.start(instance).await?;

    if ctx.is_origin || instance.replication_type != ReplicationType::Replica {
        return Ok(());
    }

    let local_port = instance_port(ctx.ops.start_port, instance.id)?;
    let auth = (instance.auth.user.as_str(), instance.preferencies.admin.as_str());

    if let Ok(mut client) = RedisClient::connect(local_port, Some(auth)).await {
        let _ = client.replicaof(ctx.master_ip, local_port).await;
    }

    match sync_blocker::wait_for_sync(local_port, Some(auth), ctx.max_sync_wait).await? {
        SyncOutcome::Converged => Ok(()),
        SyncOutcome::TimedOut => Err(RdsError::Transient(format!(
            "instance {} did not converge sync within the configured deadline",
            instance.id
        ))),
        SyncOutcome::Abandoned => Err(RdsError::Fatal(format!(
            "instance {} sync abandoned as a likely version mismatch",
            instance.id
        ))),
    }
}

async fn handle_create(ctx: &HandlerContext<'_>, item: LogItem) -> Result<(), RdsError> {
    let Some(instance) = item.payload else {
        return Err(RdsError::Validation("create item missing instance payload".to_string()));
    };
    if ctx.ops.store.load(instance.id)?.is_some() {
        tracing::warn!(id = instance.id, "create received for instance that already exists locally, skipping");
        return Ok(());
    }
    let created = ctx.ops.create(instance, ctx.redis_version).await?;
    if created.state.is_works() {
        start_instance(ctx, &created).await?;
    }
    Ok(())
}

async fn handle_destroy(ctx: &HandlerContext<'_>, item: LogItem) -> Result<(), RdsError> {
    let Some(local) = ctx.ops.store.load(item.instance_id)? else {
        tracing::warn!(id = item.instance_id, "destroy received for instance absent locally, skipping");
        return Ok(());
    };
    if local.uuid != item.instance_uuid {
        tracing::warn!(id = item.instance_id, "destroy uuid mismatch, dropping item");
        return Ok(());
    }
    ctx.ops.destroy(&local).await
}

async fn handle_edit(ctx: &HandlerContext<'_>, item: LogItem) -> Result<(), RdsError> {
    let Some(remote) = item.payload else {
        return Err(RdsError::Validation("edit item missing instance payload".to_string()));
    };
    let Some(mut local) = require_local(ctx, &item)? else {
        return Ok(());
    };
    local.desc = remote.desc;
    local.tags = remote.tags;
    local.replication_type = remote.replication_type;
    local.auth = remote.auth;
    local.storage = remote.storage;
    local.is_save_disabled = remote.is_save_disabled;
    ctx.ops.regen(local, ctx.redis_version).await?;
    Ok(())
}

async fn handle_start(ctx: &HandlerContext<'_>, item: LogItem) -> Result<(), RdsError> {
    let Some(local) = require_local(ctx, &item)? else {
        return Ok(());
    };
    if local.state.is_works() {
        tracing::warn!(id = local.id, "start requested but instance already works");
        return Ok(());
    }
    start_instance(ctx, &local).await
}

async fn handle_stop(ctx: &HandlerContext<'_>, item: LogItem) -> Result<(), RdsError> {
    let Some(local) = require_local(ctx, &item)? else {
        return Ok(());
    };
    if local.state.is_stopped() {
        tracing::warn!(id = local.id, "stop requested but instance already stopped");
        return Ok(());
    }
    ctx.ops.stop(&local, false).await
}

async fn handle_restart(ctx: &HandlerContext<'_>, item: LogItem) -> Result<(), RdsError> {
    let Some(local) = require_local(ctx, &item)? else {
        return Ok(());
    };
    if local.state.is_works() {
        ctx.ops.stop(&local, true).await?;
    }
    start_instance(ctx, &local).await
}

async fn handle_start_all(ctx: &HandlerContext<'_>) -> Result<(), RdsError> {
    for instance in ctx.ops.store.load_all()? {
        if instance.state.is_stopped() {
            if let Err(e) = start_instance(ctx, &instance).await {
                tracing::error!(id = instance.id, error = %e, "start_all: failed to start instance, continuing");
            }
        }
    }
    Ok(())
}

async fn handle_stop_all(ctx: &HandlerContext<'_>) -> Result<(), RdsError> {
    for instance in ctx.ops.store.load_all()? {
        if instance.state.is_works() {
            if let Err(e) = ctx.ops.stop(&instance, false).await {
                tracing::error!(id = instance.id, error = %e, "stop_all: failed to stop instance, continuing");
            }
        }
    }
    Ok(())
}

async fn handle_restart_all(ctx: &HandlerContext<'_>) -> Result<(), RdsError> {
    for instance in ctx.ops.store.load_all()? {
        if instance.state.is_works() {
            if let Err(e) = ctx.ops.stop(&instance, true).await {
                tracing::error!(id = instance.id, error = %e, "restart_all: failed to stop instance, continuing");
                continue;
            }
        }
        if let Err(e) = start_instance(ctx, &instance).await {
            tracing::error!(id = instance.id, error = %e, "restart_all: failed to start instance, continuing");
        }
    }
    Ok(())
}

/// Dispatches a single pulled item to its handler. Sentinel-only commands
/// are not applicable on a minion and are dropped with a debug log.
pub async fn dispatch_item(ctx: &HandlerContext<'_>, item: LogItem) -> Result<(), RdsError> {
    match item.command {
        Command::Create => handle_create(ctx, item).await,
        Command::Destroy => handle_destroy(ctx, item).await,
        Command::Edit => handle_edit(ctx, item).await,
        Command::Start => handle_start(ctx, item).await,
        Command::Stop => handle_stop(ctx, item).await,
        Command::Restart => handle_restart(ctx, item).await,
        Command::StartAll => handle_start_all(ctx).await,
        Command::StopAll => handle_stop_all(ctx).await,
        Command::RestartAll => handle_restart_all(ctx).await,
        Command::SentinelStart | Command::SentinelStop => {
            tracing::debug!(command = ?item.command, "sentinel-only command ignored on minion");
            Ok(())
        }
    }
}

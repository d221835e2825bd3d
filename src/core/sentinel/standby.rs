// src/core/sentinel/standby.rs

//! Standby failover (spec.md §4.4 "Standby failover"): no Sentinel daemon is
//! involved; follower-hosted instances of replication type `standby` sit
//! stopped until an operator promotes one manually. `replication-role-set`
//! rewrites the local config for the new role and, if the instance is
//! running, drives the Redis-level transition: promoting to master issues
//! `REPLICAOF NO ONE` + `FLUSHALL ASYNC`; the inverse (reattaching as a
//! replica) issues `REPLICAOF <master>` and blocks on sync convergence.

use crate::core::errors::RdsError;
use crate::core::instance::model::{Instance, ReplicationType};
use crate::core::lifecycle::ops::{LifecycleOps, instance_port};
use crate::core::redis_client::RedisClient;
use crate::core::reconcile::sync_blocker::{self, SyncOutcome};
use std::time::Duration;

/// The Redis-protocol-level role `replication-role-set` is driving the
/// instance towards. Distinct from [`ReplicationType`], which classifies
/// how the fleet's reconciliation loop is supposed to treat the instance
/// (kept running vs kept stopped until promoted).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetRole {
    Master,
    Replica,
}

fn instance_auth(instance: &Instance) -> (&str, &str) {
    (instance.auth.user.as_str(), instance.preferencies.admin.as_str())
}

/// Promotes a standby instance to master: `REPLICAOF NO ONE` then
/// `FLUSHALL ASYNC` if it is currently running, after rewriting its local
/// config to stop tracking an upstream master.
pub async fn promote_to_master(
    ops: &LifecycleOps,
    instance: &Instance,
    redis_version: &str,
) -> Result<Instance, RdsError> {
    let mut updated = instance.clone();
    updated.replication_type = ReplicationType::Standby;
    let updated = ops.regen(updated, redis_version).await?;

    if instance.state.is_works() {
        let port = instance_port(ops.start_port, instance.id)?;
        let auth = instance_auth(instance);
        let mut client = RedisClient::connect(port, Some(auth)).await?;
        client.replicaof_no_one().await?;
        client.flushall_async().await?;
        tracing::info!(id = instance.id, "promoted standby instance to master");
    }

    Ok(updated)
}

/// Reattaches an instance as a replica of `master_ip`: rewrites the local
/// config to classify it as `replica`, then, if running, issues
/// `REPLICAOF` against the configured master and blocks until sync
/// converges or the configured deadline elapses.
///
/// Per spec.md §9's unresolved ambiguity, the "config is effectively
/// read-only" warning only fires on this path, not on a Sentinel-driven
/// switch.
pub async fn demote_to_replica(
    ops: &LifecycleOps,
    instance: &Instance,
    master_ip: &str,
    redis_version: &str,
    max_sync_wait: Duration,
) -> Result<(Instance, Option<SyncOutcome>), RdsError> {
    let mut updated = instance.clone();
    updated.replication_type = ReplicationType::Replica;
    let updated = ops.regen(updated, redis_version).await?;

    if !instance.state.is_works() {
        return Ok((updated, None));
    }

    let port = instance_port(ops.start_port, instance.id)?;
    let auth = instance_auth(instance);

    if instance.is_save_disabled {
        tracing::warn!(id = instance.id, "instance has saves disabled; config is effectively read-only for persistence purposes during standby reattachment");
    }

    let mut client = RedisClient::connect(port, Some(auth)).await?;
    client.replicaof(master_ip, port).await?;
    drop(client);

    let outcome = sync_blocker::wait_for_sync(port, Some(auth), max_sync_wait).await?;
    Ok((updated, Some(outcome)))
}

/// Dispatches a `replication-role-set` request to the matching transition.
pub async fn replication_role_set(
    ops: &LifecycleOps,
    instance: &Instance,
    target: TargetRole,
    master_ip: &str,
    redis_version: &str,
    max_sync_wait: Duration,
) -> Result<Instance, RdsError> {
    match target {
        TargetRole::Master => promote_to_master(ops, instance, redis_version).await,
        TargetRole::Replica => {
            let (updated, outcome) =
                demote_to_replica(ops, instance, master_ip, redis_version, max_sync_wait).await?;
            if let Some(SyncOutcome::TimedOut) = outcome {
                tracing::warn!(id = instance.id, "standby reattachment did not converge within the configured deadline");
            }
            Ok(updated)
        }
    }
}

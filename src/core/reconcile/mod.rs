// src/core/reconcile/mod.rs

//! The minion's follower reconciliation loop (spec.md §4.3): `hello`,
//! `fetch`, a convergent reconciliation pass, then a 1s `pull`/dispatch
//! tick loop until shutdown.

pub mod client;
pub mod dispatch;
pub mod handlers;
pub mod sync_blocker;

use crate::config::Config;
use crate::core::api::SuperuserAuth;
use crate::core::api::dto::HelloResponse;
use crate::core::api::handlers::Compatibility;
use crate::core::commandlog::NodeRole;
use crate::core::errors::RdsError;
use crate::core::instance::model::Instance;
use crate::core::lifecycle::ops::LifecycleOps;
use client::MasterClient;
use handlers::HandlerContext;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, broadcast};
use tokio::time::sleep;

const INITIAL_RECONNECT_DELAY: Duration = Duration::from_secs(1);
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(60);
const PULL_TICK: Duration = Duration::from_secs(1);

/// Process-wide state for the minion role, threaded through the
/// reconciliation loop the same way `MasterState` is threaded through axum
/// handlers (spec.md §9 design note).
pub struct MinionState {
    pub config: Arc<Config>,
    pub ops: LifecycleOps,
    pub client: MasterClient,
    pub cid: RwLock<String>,
    pub redis_version: String,
}

/// One step of the plan computed by [`plan_reconciliation`]: what must
/// happen locally to converge to the master's roster.
#[derive(Debug, Clone)]
pub enum ReconcileAction {
    /// `id ∈ L \ R`: destroy locally.
    Destroy(Instance),
    /// `id ∈ R`, absent locally: create from the roster's metadata.
    Create(Instance),
    /// `id ∈ R`, local `uuid` differs: destroy then recreate.
    Recreate { old: Instance, new: Instance },
    /// Same `uuid`, a monitored field differs: update metadata in place.
    Update(Instance),
    /// Master has `works`, local does not: start.
    AlignStart(Instance),
    /// Master has `stopped`, local does not: stop.
    AlignStop(Instance),
}

fn monitored_fields_differ(local: &Instance, remote: &Instance) -> bool {
    local.desc != remote.desc
        || local.replication_type != remote.replication_type
        || local.auth != remote.auth
        || local.tags != remote.tags
        || local.storage != remote.storage
}

/// Computes the reconciliation plan for local ids `L` versus roster ids `R`
/// (spec.md §4.3 "Reconciliation pass").
pub fn plan_reconciliation(local: &[Instance], remote: &[Instance]) -> Vec<ReconcileAction> {
    let remote_by_id: HashMap<u32, &Instance> = remote.iter().map(|i| (i.id, i)).collect();
    let local_by_id: HashMap<u32, &Instance> = local.iter().map(|i| (i.id, i)).collect();
    let mut plan = Vec::new();

    for l in local {
        if !remote_by_id.contains_key(&l.id) {
            plan.push(ReconcileAction::Destroy(l.clone()));
        }
    }

    for r in remote {
        match local_by_id.get(&r.id) {
            None => plan.push(ReconcileAction::Create(r.clone())),
            Some(l) if l.uuid != r.uuid => plan.push(ReconcileAction::Recreate {
                old: (*l).clone(),
                new: r.clone(),
            }),
            Some(l) => {
                if monitored_fields_differ(l, r) {
                    plan.push(ReconcileAction::Update(r.clone()));
                }
                if r.state.is_works() && !l.state.is_works() {
                    plan.push(ReconcileAction::AlignStart(r.clone()));
                } else if r.state.is_stopped() && !l.state.is_stopped() {
                    plan.push(ReconcileAction::AlignStop(r.clone()));
                }
            }
        }
    }

    plan
}

/// Executes a reconciliation plan against local lifecycle primitives. Each
/// action's failure is logged and does not abort the remaining plan.
pub async fn apply_plan(ctx: &HandlerContext<'_>, plan: Vec<ReconcileAction>) {
    for action in plan {
        let result = run_action(ctx, action).await;
        if let Err(e) = result {
            tracing::error!(error = %e, "reconciliation action failed, continuing");
        }
    }
}

async fn run_action(ctx: &HandlerContext<'_>, action: ReconcileAction) -> Result<(), RdsError> {
    match action {
        ReconcileAction::Destroy(instance) => ctx.ops.destroy(&instance).await,
        ReconcileAction::Recreate { old, new } => {
            ctx.ops.destroy(&old).await?;
            let created = ctx.ops.create(new, ctx.redis_version).await?;
            if created.state.is_works() {
                handlers::start_instance(ctx, &created).await?;
            }
            Ok(())
        }
        ReconcileAction::Create(instance) => {
            let created = ctx.ops.create(instance, ctx.redis_version).await?;
            if created.state.is_works() {
                handlers::start_instance(ctx, &created).await?;
            }
            Ok(())
        }
        ReconcileAction::Update(instance) => ctx.ops.regen(instance, ctx.redis_version).await.map(|_| ()),
        ReconcileAction::AlignStart(instance) => handlers::start_instance(ctx, &instance).await,
        ReconcileAction::AlignStop(instance) => ctx.ops.stop(&instance, true).await,
    }
}

/// Registers with the master (spec.md §4.3 startup step 1). An incompatible
/// major version is fatal; a partial (same-major) mismatch is logged and
/// tolerated.
pub async fn bootstrap_hello(
    client: &MasterClient,
    hostname: &str,
    role: NodeRole,
    version: &str,
) -> Result<(String, SuperuserAuth), RdsError> {
    let resp: HelloResponse = client.hello(hostname, role, version).await?;
    match crate::core::api::handlers::check_compatibility(&resp.master_version, version) {
        Compatibility::Incompatible => Err(RdsError::IncompatibleCoreVersion(format!(
            "master is {}, follower is {version}",
            resp.master_version
        ))),
        Compatibility::Partial => {
            tracing::warn!(master_version = %resp.master_version, follower_version = %version, "partial version compatibility, continuing");
            Ok(superuser_of(resp))
        }
        Compatibility::Full => Ok(superuser_of(resp)),
    }
}

fn superuser_of(resp: HelloResponse) -> (String, SuperuserAuth) {
    (
        resp.cid,
        SuperuserAuth {
            pepper: resp.superuser.pepper,
            hash: resp.superuser.hash,
        },
    )
}

/// The minion's full run loop: `hello`, `fetch`, reconcile, then `pull`
/// every second until `shutdown_rx` fires, at which point the follower
/// issues `bye` before returning.
pub async fn run(state: Arc<MinionState>, mut shutdown_rx: broadcast::Receiver<()>) -> Result<(), RdsError> {
    let hostname = sysinfo::System::host_name().unwrap_or_else(|| "unknown".to_string());
    let version = env!("CARGO_PKG_VERSION");

    let cid = loop {
        match bootstrap_hello(&state.client, &hostname, NodeRole::Minion, version).await {
            Ok((cid, _superuser)) => break cid,
            Err(e @ RdsError::IncompatibleCoreVersion(_)) => {
                tracing::error!(error = %e, "incompatible core version, exiting");
                return Err(e);
            }
            Err(e) => {
                tracing::warn!(error = %e, "hello failed, retrying");
                sleep(INITIAL_RECONNECT_DELAY).await;
            }
        }
    };
    *state.cid.write().await = cid.clone();
    tracing::info!(%cid, "registered with master");

    let ctx = HandlerContext {
        ops: &state.ops,
        redis_version: &state.redis_version,
        master_ip: &state.config.master_ip,
        max_sync_wait: state.config.max_sync_wait,
        is_origin: false,
    };

    let fetch = state.client.fetch(&cid).await?;
    let local = state.ops.store.load_all()?;
    let plan = plan_reconciliation(&local, &fetch.instances);
    apply_plan(&ctx, plan).await;

    let mut reconnect_delay = INITIAL_RECONNECT_DELAY;
    let mut ticker = tokio::time::interval(PULL_TICK);
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                let _ = state.client.bye(&cid).await;
                return Ok(());
            }
            _ = ticker.tick() => {
                match state.client.pull(&cid).await {
                    Ok(resp) => {
                        reconnect_delay = INITIAL_RECONNECT_DELAY;
                        dispatch::apply_batch(&ctx, resp.items).await;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "pull failed, backing off before retry");
                        sleep(reconnect_delay).await;
                        reconnect_delay = (reconnect_delay * 2).min(MAX_RECONNECT_DELAY);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::instance::model::{Auth, ConfigInfo, Preferencies, ReplicationType};
    use crate::core::instance::state::State;
    use std::collections::HashMap as Map;

    fn instance(id: u32, uuid: &str, state: State) -> Instance {
        Instance {
            id,
            uuid: uuid.to_string(),
            desc: "d".to_string(),
            tags: vec![],
            created: 0,
            compatible: "7.2".to_string(),
            replication_type: ReplicationType::Replica,
            is_save_disabled: false,
            auth: Auth {
                user: "a".to_string(),
                pepper: "p".to_string(),
                hash: "h".to_string(),
            },
            preferencies: Preferencies::default(),
            config_info: ConfigInfo::default(),
            storage: Map::new(),
            meta_version: crate::core::instance::model::CURRENT_META_VERSION,
            state,
        }
    }

    #[test]
    fn local_only_instance_is_destroyed() {
        let local = vec![instance(1, "a", State::stopped())];
        let plan = plan_reconciliation(&local, &[]);
        assert!(matches!(plan.as_slice(), [ReconcileAction::Destroy(i)] if i.id == 1));
    }

    #[test]
    fn remote_only_instance_is_created() {
        let remote = vec![instance(2, "b", State::stopped())];
        let plan = plan_reconciliation(&[], &remote);
        assert!(matches!(plan.as_slice(), [ReconcileAction::Create(i)] if i.id == 2));
    }

    #[test]
    fn uuid_mismatch_triggers_recreate() {
        let local = vec![instance(3, "old-uuid", State::stopped())];
        let remote = vec![instance(3, "new-uuid", State::stopped())];
        let plan = plan_reconciliation(&local, &remote);
        assert!(matches!(
            plan.as_slice(),
            [ReconcileAction::Recreate { old, new }] if old.uuid == "old-uuid" && new.uuid == "new-uuid"
        ));
    }

    #[test]
    fn running_state_aligns_to_master() {
        let local = vec![instance(4, "same", State::stopped())];
        let remote = vec![instance(4, "same", State::works(Default::default()))];
        let plan = plan_reconciliation(&local, &remote);
        assert!(matches!(plan.as_slice(), [ReconcileAction::AlignStart(i)] if i.id == 4));
    }

    #[test]
    fn matching_instances_produce_no_plan() {
        let local = vec![instance(5, "same", State::stopped())];
        let remote = vec![instance(5, "same", State::stopped())];
        assert!(plan_reconciliation(&local, &remote).is_empty());
    }
}

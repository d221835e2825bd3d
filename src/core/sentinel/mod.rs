// src/core/sentinel/mod.rs

//! The two failover regimes built on top of the reconciliation loop
//! (spec.md §4.4): Sentinel-driven monitoring and master switches, and the
//! standby regime's manual `replication-role-set` promotion/demotion.

pub mod monitor;
pub mod standby;
pub mod switch;

use crate::config::Config;
use crate::core::api::dto::FetchResponse;
use crate::core::commandlog::NodeRole as FollowerNodeRole;
use crate::core::errors::RdsError;
use crate::core::reconcile::client::MasterClient;
use monitor::MonitorParams;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::sleep;

const FETCH_TICK: Duration = Duration::from_secs(1);
const INITIAL_RECONNECT_DELAY: Duration = Duration::from_secs(1);
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(60);

/// Process-wide state for the Sentinel role: no local Redis data instances,
/// only the Sentinel daemon's own port and the monitoring parameters
/// derived from config.
pub struct SentinelNodeState {
    pub config: Arc<Config>,
    pub client: MasterClient,
    pub cid: tokio::sync::RwLock<String>,
    pub monitored: tokio::sync::RwLock<Vec<String>>,
}

fn monitor_params(config: &Config) -> MonitorParams<'_> {
    MonitorParams {
        name_prefix: &config.sentinel_name_prefix,
        start_port: config.start_port,
        quorum: config.sentinel_quorum,
        down_after_ms: config.sentinel_down_after_ms,
        failover_timeout_ms: config.sentinel_failover_timeout_ms,
        parallel_syncs: config.sentinel_parallel_syncs,
    }
}

/// One `fetch`-driven pass: reset Sentinel's monitored set to exactly the
/// replica-type instances whose master-side state is `works` (spec.md
/// §4.4). Returns the new set of monitored names so the caller can track
/// what to remove on the next pass.
async fn apply_fetch(state: &SentinelNodeState, fetch: &FetchResponse) -> Result<Vec<String>, RdsError> {
    let params = monitor_params(&state.config);
    let currently_monitored = state.monitored.read().await.clone();

    monitor::rebuild_monitoring(
        state.config.sentinel_port,
        &state.config.master_ip,
        &params,
        &fetch.instances,
        &currently_monitored,
    )
    .await?;

    let new_names: Vec<String> = fetch
        .instances
        .iter()
        .filter(|i| i.replication_type == crate::core::instance::model::ReplicationType::Replica && i.state.is_works())
        .map(|i| monitor::monitor_name(params.name_prefix, i.id))
        .collect();
    Ok(new_names)
}

/// The Sentinel node's run loop: `hello`, then `fetch` on a 1s tick,
/// rebuilding Sentinel's monitored set each time, until `shutdown_rx` fires.
pub async fn run(state: Arc<SentinelNodeState>, mut shutdown_rx: broadcast::Receiver<()>) -> Result<(), RdsError> {
    let hostname = sysinfo::System::host_name().unwrap_or_else(|| "unknown".to_string());
    let version = env!("CARGO_PKG_VERSION");

    let mut reconnect_delay = INITIAL_RECONNECT_DELAY;
    let cid = loop {
        match state.client.hello(&hostname, FollowerNodeRole::Sentinel, version).await {
            Ok(resp) => break resp.cid,
            Err(e @ RdsError::IncompatibleCoreVersion(_)) => {
                tracing::error!(error = %e, "incompatible core version, exiting");
                return Err(e);
            }
            Err(e) => {
                tracing::warn!(error = %e, "hello failed, retrying");
                sleep(reconnect_delay).await;
                reconnect_delay = (reconnect_delay * 2).min(MAX_RECONNECT_DELAY);
            }
        }
    };
    *state.cid.write().await = cid.clone();
    tracing::info!(%cid, "sentinel node registered with master");

    let mut ticker = tokio::time::interval(FETCH_TICK);
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                let _ = state.client.bye(&cid).await;
                return Ok(());
            }
            _ = ticker.tick() => {
                match state.client.fetch(&cid).await {
                    Ok(resp) => {
                        match apply_fetch(&state, &resp).await {
                            Ok(names) => *state.monitored.write().await = names,
                            Err(e) => tracing::error!(error = %e, "failed to rebuild sentinel monitoring, continuing"),
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "sentinel fetch failed, will retry next tick");
                    }
                }
            }
        }
    }
}

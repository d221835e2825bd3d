// src/core/api/handlers.rs

//! The eight control-API endpoint handlers (spec.md §4.2).

use crate::core::api::MasterState;
use crate::core::api::dto::*;
use crate::core::commandlog::{LogItem, NodeRole};
use crate::core::errors::RdsError;
use crate::core::reconcile::handlers::{self as reconcile_handlers, HandlerContext};
use axum::{
    Json,
    extract::{ConnectInfo, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::Ordering;

fn err_response(err: &RdsError) -> (StatusCode, Json<StatusResponse>) {
    let status = match err {
        RdsError::WrongAuthToken => StatusCode::UNAUTHORIZED,
        RdsError::IpMismatch => StatusCode::FORBIDDEN,
        RdsError::InstanceNotFound(_) | RdsError::UnknownClient => StatusCode::NOT_FOUND,
        RdsError::IncompatibleCoreVersion(_) | RdsError::IncompatibleMetaVersion { .. } => {
            StatusCode::CONFLICT
        }
        _ => StatusCode::BAD_REQUEST,
    };
    (status, Json(StatusResponse::error(err.wire_code(), err.to_string())))
}

/// Compares `major.minor` prefixes. Exact major match is full compatibility;
/// same major, different minor, is "partial" (warn and continue); different
/// major is incompatible (caller must exit).
#[derive(Debug, PartialEq, Eq)]
pub enum Compatibility {
    Full,
    Partial,
    Incompatible,
}

pub fn check_compatibility(master_version: &str, follower_version: &str) -> Compatibility {
    let major = |v: &str| v.split('.').next().unwrap_or("").to_string();
    if master_version == follower_version {
        Compatibility::Full
    } else if major(master_version) == major(follower_version) {
        Compatibility::Partial
    } else {
        Compatibility::Incompatible
    }
}

pub async fn hello(
    State(state): State<Arc<MasterState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(req): Json<HelloRequest>,
) -> Response {
    match check_compatibility(&state.version, &req.version) {
        Compatibility::Incompatible => {
            return err_response(&RdsError::IncompatibleCoreVersion(format!(
                "master is {}, follower is {}",
                state.version, req.version
            )))
            .into_response();
        }
        Compatibility::Partial => {
            tracing::warn!(follower_version = %req.version, master_version = %state.version, "partial version compatibility");
        }
        Compatibility::Full => {}
    }

    let now = crate::core::timestamp::now();
    let record = state
        .followers
        .register(req.hostname, addr.ip().to_string(), req.role, req.version, now);

    let superuser = state.superuser.read().clone();
    Json(HelloResponse {
        cid: record.cid,
        master_version: state.version.clone(),
        sentinel_active: state.sentinel_active.load(Ordering::Relaxed),
        superuser: SuperuserAuthDto {
            pepper: superuser.pepper,
            hash: superuser.hash,
        },
    })
    .into_response()
}

pub async fn fetch(
    State(state): State<Arc<MasterState>>,
    Json(req): Json<CidRequest>,
) -> Response {
    let Some(_record) = state.followers.get(&req.cid) else {
        return err_response(&RdsError::UnknownClient).into_response();
    };
    state.followers.set_syncing(&req.cid, true);

    let instances = match state.ops.store.load_all() {
        Ok(instances) => instances,
        Err(e) => return err_response(&e).into_response(),
    };

    state.followers.set_syncing(&req.cid, false);
    let now = crate::core::timestamp::now();
    state.followers.touch(&req.cid, now, None);

    Json(FetchResponse { instances }).into_response()
}

pub async fn pull(
    State(state): State<Arc<MasterState>>,
    Json(req): Json<CidRequest>,
) -> Response {
    let Some(record) = state.followers.get(&req.cid) else {
        return err_response(&RdsError::UnknownClient).into_response();
    };
    let items = state.queue.since(record.last_sync);
    let now = crate::core::timestamp::now();
    let new_last_sync = items.last().map(|i| i.timestamp).unwrap_or(record.last_sync);
    state.followers.touch(&req.cid, now, Some(new_last_sync));

    Json(PullResponse { items }).into_response()
}

pub async fn info(
    State(state): State<Arc<MasterState>>,
    Json(req): Json<InfoRequest>,
) -> Response {
    if state.followers.get(&req.cid).is_none() {
        return err_response(&RdsError::UnknownClient).into_response();
    }
    // Any authenticated request revives a `down`/`possible_down` follower
    // back to `online` (spec.md §3, §8 scenario 6), not just `fetch`/`pull`.
    state.followers.touch(&req.cid, crate::core::timestamp::now(), None);

    match state.ops.cache.get(req.id) {
        Some(instance) if instance.uuid == req.uuid => Json(InfoResponse { instance }).into_response(),
        Some(_) => err_response(&RdsError::InstanceNotFound(req.id)).into_response(),
        None => match state.ops.store.load(req.id) {
            Ok(Some(instance)) if instance.uuid == req.uuid => {
                state.ops.cache.set(instance.clone());
                Json(InfoResponse { instance }).into_response()
            }
            Ok(Some(_)) | Ok(None) => err_response(&RdsError::InstanceNotFound(req.id)).into_response(),
            Err(e) => err_response(&e).into_response(),
        },
    }
}

fn is_authorized_pusher(addr: &SocketAddr, master_ip: &str) -> bool {
    let ip = addr.ip().to_string();
    ip == "127.0.0.1" || ip == "::1" || ip == master_ip
}

pub async fn push(
    State(state): State<Arc<MasterState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(req): Json<PushRequest>,
) -> Response {
    if !is_authorized_pusher(&addr, &state.config.master_ip) {
        return err_response(&RdsError::IpMismatch).into_response();
    }

    let item = LogItem {
        command: req.command,
        instance_id: req.instance_id,
        instance_uuid: req.instance_uuid,
        initiator: req.initiator,
        timestamp: crate::core::timestamp::now(),
        payload: req.payload,
    };

    // Spec.md §2's data flow is "master local handler → (a) local effect +
    // (b) enqueue onto command log" — apply the command against the
    // master's own instances first (spec.md §3 "an instance is born when
    // `create` succeeds on the master"); only enqueue for followers once
    // the local effect itself has succeeded.
    let ctx = HandlerContext {
        ops: &state.ops,
        redis_version: &state.redis_version,
        master_ip: &state.config.master_ip,
        max_sync_wait: state.config.max_sync_wait,
        is_origin: true,
    };
    if let Err(e) = reconcile_handlers::dispatch_item(&ctx, item.clone()).await {
        tracing::error!(id = item.instance_id, command = ?item.command, error = %e, "local apply of pushed command failed");
        return err_response(&e).into_response();
    }

    state.queue.push(item);
    crate::core::metrics::COMMANDS_APPENDED_TOTAL.inc();

    Json(StatusResponse::ok("command appended")).into_response()
}

pub async fn bye(
    State(state): State<Arc<MasterState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(req): Json<CidRequest>,
) -> Response {
    match state.followers.get(&req.cid) {
        Some(record) if record.ip == addr.ip().to_string() => {
            state.followers.remove(&req.cid);
            Json(StatusResponse::ok("unregistered")).into_response()
        }
        Some(_) => err_response(&RdsError::IpMismatch).into_response(),
        None => err_response(&RdsError::UnknownClient).into_response(),
    }
}

pub async fn replication(State(state): State<Arc<MasterState>>) -> Response {
    let now = crate::core::timestamp::now();
    let followers = state
        .followers
        .all()
        .into_iter()
        .map(|f| FollowerLagDto {
            cid: f.cid,
            role: f.role,
            hostname: f.hostname,
            ip: f.ip,
            health: format!("{:?}", f.health).to_lowercase(),
            lag_seconds: now - f.last_seen,
            sync_lag_seconds: now - f.last_sync,
        })
        .collect();

    Json(ReplicationResponse {
        master_version: state.version.clone(),
        followers,
    })
    .into_response()
}

pub async fn stats(State(state): State<Arc<MasterState>>) -> Response {
    let now = crate::core::timestamp::now();
    let all = state.followers.all();

    let mut by_role: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
    let mut max_lag = 0i64;
    let mut max_sync_lag = 0i64;
    for f in &all {
        let key = match f.role {
            NodeRole::Minion => "minion",
            NodeRole::Sentinel => "sentinel",
        };
        *by_role.entry(key.to_string()).or_insert(0) += 1;
        max_lag = max_lag.max(now - f.last_seen);
        max_sync_lag = max_sync_lag.max(now - f.last_sync);
    }

    crate::core::metrics::MAX_FOLLOWER_LAG_SECONDS.set(max_lag as f64);
    crate::core::metrics::MAX_SYNC_LAG_SECONDS.set(max_sync_lag as f64);
    crate::core::metrics::COMMAND_QUEUE_DEPTH.set(state.queue.len() as f64);

    Json(StatsResponse {
        followers_by_role: by_role,
        max_lag_seconds: max_lag,
        max_sync_lag_seconds: max_sync_lag,
        queue_depth: state.queue.len(),
    })
    .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compatibility_matches_full_partial_incompatible() {
        assert_eq!(check_compatibility("1.2.0", "1.2.0"), Compatibility::Full);
        assert_eq!(check_compatibility("1.2.0", "1.3.0"), Compatibility::Partial);
        assert_eq!(check_compatibility("1.2.0", "2.0.0"), Compatibility::Incompatible);
    }
}

// src/core/api/mod.rs

//! The master's HTTP control API: axum router, bearer-auth middleware, and
//! the shared `MasterState` threaded through every handler (spec.md §4.2).

pub mod dto;
pub mod handlers;

use crate::config::Config;
use crate::core::commandlog::{CommandQueue, FollowerRegistry};
use crate::core::lifecycle::ops::LifecycleOps;
use axum::{
    Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use hmac::{Hmac, Mac};
use parking_lot::RwLock;
use rand::RngCore;
use sha2::Sha256;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

/// Superuser credentials (spec.md §3 "Superuser auth"): stored once on the
/// master and replicated to followers on `hello`.
#[derive(Debug, Clone, Default)]
pub struct SuperuserAuth {
    pub pepper: String,
    pub hash: String,
}

impl SuperuserAuth {
    /// Generates a fresh superuser credential: a random pepper and an
    /// HMAC-SHA256 hash of a second random secret keyed by that pepper.
    /// Called once, the first time a master boots with no `su.dat` on disk.
    pub fn generate() -> Self {
        let mut pepper_bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut pepper_bytes);
        let pepper = hex::encode(pepper_bytes);

        let mut secret = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut secret);

        let mut mac = Hmac::<Sha256>::new_from_slice(pepper.as_bytes())
            .expect("hmac accepts a key of any length");
        mac.update(&secret);
        let hash = hex::encode(mac.finalize().into_bytes());

        Self { pepper, hash }
    }
}

/// The single process-wide struct passed to every axum handler and to the
/// liveness tick, per the §9 design note ("pass them explicitly through a
/// `Control` context").
///
/// `ops` is the master's own lifecycle primitives: `push` applies a
/// command's local effect through it before the item is enqueued, the same
/// "local effect + enqueue" data flow spec.md §2 describes for the master
/// (the master's local instances are never `REPLICAOF` anything — see
/// `reconcile::handlers::HandlerContext::is_origin`).
pub struct MasterState {
    pub config: Arc<Config>,
    pub queue: CommandQueue,
    pub followers: FollowerRegistry,
    pub ops: LifecycleOps,
    pub redis_version: String,
    pub superuser: RwLock<SuperuserAuth>,
    pub sentinel_active: AtomicBool,
    pub version: String,
}

/// Bearer-auth middleware applied to every endpoint except the catch-all
/// fallback. The token must match the 64-character value configured
/// identically on all nodes (spec.md §4.1 "Push authorization").
async fn require_bearer_token(
    State(state): State<Arc<MasterState>>,
    headers: HeaderMap,
    request: axum::extract::Request,
    next: Next,
) -> Response {
    let provided = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match provided {
        Some(token) if token == state.config.token => next.run(request).await,
        _ => (
            StatusCode::UNAUTHORIZED,
            axum::Json(dto::StatusResponse::error("wrong_auth_token", "invalid or missing bearer token")),
        )
            .into_response(),
    }
}

async fn wrong_request() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        axum::Json(dto::StatusResponse::error("wrong_request", "no such endpoint")),
    )
}

/// Stamps every response with `Server: RDS-Sync/<version>` (spec.md §6).
/// `axum::Json` already sets `Content-Type: application/json`.
async fn add_server_header(request: axum::extract::Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    response.headers_mut().insert(
        axum::http::header::SERVER,
        axum::http::HeaderValue::from_str(&format!("RDS-Sync/{}", env!("CARGO_PKG_VERSION")))
            .expect("version string is a valid header value"),
    );
    response
}

/// Builds the axum `Router` serving `hello`, `fetch`, `pull`, `info`,
/// `push`, `bye`, `replication`, `stats`, with bearer auth on every route
/// except the catch-all.
pub fn router(state: Arc<MasterState>) -> Router {
    Router::new()
        .route("/hello", post(handlers::hello))
        .route("/fetch", post(handlers::fetch))
        .route("/pull", post(handlers::pull))
        .route("/info", post(handlers::info))
        .route("/push", post(handlers::push))
        .route("/bye", post(handlers::bye))
        .route("/replication", get(handlers::replication))
        .route("/stats", get(handlers::stats))
        .layer(middleware::from_fn_with_state(state.clone(), require_bearer_token))
        .layer(middleware::from_fn(add_server_header))
        .fallback(wrong_request)
        .with_state(state)
}

// src/server/master.rs

//! Master process bootstrap (spec.md §4.1, §4.2): builds the shared
//! `MasterState`, binds the control-API HTTP server, and runs the
//! one-minute liveness/cleanup tick until shutdown.

use crate::config::Config;
use crate::core::api::{self, MasterState, SuperuserAuth};
use crate::core::commandlog::{CommandQueue, FollowerRegistry};
use crate::core::instance::{MetadataCache, MetadataStore};
use crate::core::lifecycle::ops::{LifecycleOps, LifecycleRoots};
use crate::core::lifecycle::template::DefaultTemplate;
use crate::core::persistence;
use anyhow::Context;
use parking_lot::RwLock;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing_subscriber::{filter::EnvFilter, reload};

const LIVENESS_TICK: Duration = Duration::from_secs(60);

/// Runs the master role until a shutdown signal arrives.
pub async fn run(
    config: Config,
    log_reload_handle: Arc<reload::Handle<EnvFilter, tracing_subscriber::Registry>>,
) -> anyhow::Result<()> {
    super::check_environment()?;

    let config = Arc::new(config);
    let su_dat = config.main_dir.join("su.dat");
    let superuser = match persistence::load_superuser(&su_dat)? {
        Some(auth) => auth,
        None => {
            let auth = SuperuserAuth::generate();
            persistence::save_superuser(&su_dat, &auth)?;
            tracing::info!("generated a new superuser credential");
            auth
        }
    };

    let redis_version =
        persistence::resolve_redis_version(&config.redis_binary, &config.main_dir.join("redis.dat")).await?;
    tracing::info!(version = %redis_version, "resolved local redis-server version");

    let store = MetadataStore::new(
        config.meta_dir.clone(),
        config.main_dir.join("ids.dat"),
        config.max_id,
        config.reuse_ids,
    );

    // The master runs its own Redis instances directly on its host (spec.md
    // §2 "performs local lifecycle operations ... on its host"), the same
    // `LifecycleOps` primitives a minion uses.
    let ops = LifecycleOps {
        store,
        cache: MetadataCache::default(),
        template: Arc::new(DefaultTemplate),
        roots: LifecycleRoots {
            config_dir: config.config_dir.clone(),
            data_dir: config.data_dir.clone(),
            log_dir: config.log_dir.clone(),
            pid_dir: config.pid_dir.clone(),
        },
        redis_binary: config.redis_binary.clone(),
        redis_user: config.redis_user.clone(),
        start_port: config.start_port,
        delay_start: config.delay_start,
        delay_stop: config.delay_stop,
    };

    // state-restore on master startup (spec.md §4.7): reconcile whatever
    // states.dat was last persisted against what is actually running now.
    if let Err(e) = persistence::restore_states(&ops, &config.main_dir.join("states.dat")).await {
        tracing::error!(error = %e, "state-restore failed during master startup, continuing");
    }

    let state = Arc::new(MasterState {
        config: Arc::clone(&config),
        queue: CommandQueue::new(),
        followers: FollowerRegistry::default(),
        ops,
        redis_version,
        superuser: RwLock::new(superuser),
        sentinel_active: AtomicBool::new(config.failover_method == crate::config::FailoverMethod::Sentinel),
        version: env!("CARGO_PKG_VERSION").to_string(),
    });

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let listener = TcpListener::bind((config.bind.as_str(), config.api_port))
        .await
        .with_context(|| format!("failed to bind control API on {}:{}", config.bind, config.api_port))?;
    tracing::info!(bind = %config.bind, port = config.api_port, "control API listening");

    let app = api::router(Arc::clone(&state)).into_make_service_with_connect_info::<SocketAddr>();

    let mut server_shutdown_rx = shutdown_tx.subscribe();
    let server_task = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = server_shutdown_rx.recv().await;
            })
            .await
    });

    let tick_shutdown_rx = shutdown_tx.subscribe();
    let tick_state = Arc::clone(&state);
    let tick_task = tokio::spawn(async move { liveness_tick_loop(tick_state, tick_shutdown_rx).await });

    loop {
        tokio::select! {
            biased;

            _ = super::await_shutdown_signal() => {
                break;
            }
            _ = super::await_sighup() => {
                if let Err(e) = log_reload_handle.reload(EnvFilter::new(config.log_level.clone())) {
                    tracing::warn!(error = %e, "failed to reload log filter on SIGHUP");
                } else {
                    tracing::info!("log filter reloaded on SIGHUP");
                }
            }
        }
    }

    let _ = shutdown_tx.send(());
    let deadline = Duration::from_secs(15);
    if tokio::time::timeout(deadline, server_task).await.is_err() {
        tracing::warn!("control API did not shut down within the grace period");
    }
    if tokio::time::timeout(deadline, tick_task).await.is_err() {
        tracing::warn!("liveness tick task did not shut down within the grace period");
    }

    Ok(())
}

async fn liveness_tick_loop(state: Arc<MasterState>, mut shutdown_rx: broadcast::Receiver<()>) {
    let mut ticker = tokio::time::interval(LIVENESS_TICK);
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => return,
            _ = ticker.tick() => run_tick(&state),
        }
    }
}

fn run_tick(state: &Arc<MasterState>) {
    let now = crate::core::timestamp::now();
    state.followers.liveness_tick(now);
    state.queue.cleanup(now);

    let followers = state.followers.all();
    let mut by_role: std::collections::HashMap<&'static str, i64> = std::collections::HashMap::new();
    let mut by_health: std::collections::HashMap<&'static str, i64> = std::collections::HashMap::new();
    for f in &followers {
        let role_key = match f.role {
            crate::core::commandlog::NodeRole::Minion => "minion",
            crate::core::commandlog::NodeRole::Sentinel => "sentinel",
        };
        let health_key = match f.health {
            crate::core::commandlog::FollowerHealth::Online => "online",
            crate::core::commandlog::FollowerHealth::PossibleDown => "possible_down",
            crate::core::commandlog::FollowerHealth::Down => "down",
            crate::core::commandlog::FollowerHealth::Dead => "dead",
            crate::core::commandlog::FollowerHealth::Syncing => "syncing",
        };
        *by_role.entry(role_key).or_insert(0) += 1;
        *by_health.entry(health_key).or_insert(0) += 1;
    }
    for (role, count) in by_role {
        crate::core::metrics::FOLLOWERS_BY_ROLE.with_label_values(&[role]).set(count as f64);
    }
    for (health, count) in by_health {
        crate::core::metrics::FOLLOWERS_BY_HEALTH.with_label_values(&[health]).set(count as f64);
    }
    crate::core::metrics::COMMAND_QUEUE_DEPTH.set(state.queue.len() as f64);

    match state.ops.store.load_all() {
        Ok(instances) => {
            let mut by_state: std::collections::HashMap<&'static str, i64> = std::collections::HashMap::new();
            for i in &instances {
                let key = match i.state.base {
                    crate::core::instance::BaseState::Stopped => "stopped",
                    crate::core::instance::BaseState::Works => "works",
                    crate::core::instance::BaseState::Dead => "dead",
                };
                *by_state.entry(key).or_insert(0) += 1;
            }
            for (key, count) in by_state {
                crate::core::metrics::INSTANCES_BY_STATE.with_label_values(&[key]).set(count as f64);
            }
        }
        Err(e) => tracing::error!(error = %e, "failed to enumerate instances during liveness tick"),
    }
}

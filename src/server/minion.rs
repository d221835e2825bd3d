// src/server/minion.rs

//! Minion process bootstrap (spec.md §4.3): builds a `LifecycleOps` bound to
//! the local filesystem layout, resolves the local Redis binary's version,
//! and hands off to the reconciliation loop.

use crate::config::Config;
use crate::core::instance::cache::MetadataCache;
use crate::core::instance::store::MetadataStore;
use crate::core::lifecycle::ops::{LifecycleOps, LifecycleRoots};
use crate::core::lifecycle::template::DefaultTemplate;
use crate::core::persistence;
use crate::core::reconcile::{self, MinionState, client::MasterClient};
use std::sync::Arc;
use tokio::sync::{RwLock, broadcast};
use tracing_subscriber::{filter::EnvFilter, reload};

/// Runs the minion role until a shutdown signal arrives.
pub async fn run(
    config: Config,
    log_reload_handle: Arc<reload::Handle<EnvFilter, tracing_subscriber::Registry>>,
) -> anyhow::Result<()> {
    super::check_environment()?;

    let config = Arc::new(config);

    let redis_version =
        persistence::resolve_redis_version(&config.redis_binary, &config.main_dir.join("redis.dat")).await?;
    tracing::info!(version = %redis_version, "resolved local redis-server version");

    let store = MetadataStore::new(
        config.meta_dir.clone(),
        config.main_dir.join("ids.dat"),
        config.max_id,
        config.reuse_ids,
    );
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

    let client = MasterClient::new(&config.master_ip, config.api_port, config.token.clone())?;

    let state = Arc::new(MinionState {
        config: Arc::clone(&config),
        ops,
        client,
        cid: RwLock::new(String::new()),
        redis_version,
    });

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let reconcile_shutdown_rx = shutdown_tx.subscribe();
    let reconcile_state = Arc::clone(&state);
    let reconcile_task = tokio::spawn(async move { reconcile::run(reconcile_state, reconcile_shutdown_rx).await });

    loop {
        tokio::select! {
            biased;

            _ = super::await_shutdown_signal() => break,
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
    match tokio::time::timeout(std::time::Duration::from_secs(15), reconcile_task).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => tracing::error!(error = %e, "reconciliation loop exited with an error"),
        Ok(Err(e)) => tracing::error!(error = %e, "reconciliation task panicked"),
        Err(_) => tracing::warn!("reconciliation loop did not shut down within the grace period"),
    }

    Ok(())
}

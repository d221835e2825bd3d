// src/server/sentinel_node.rs

//! Sentinel process bootstrap (spec.md §4.4): `redis-server --sentinel` is
//! spawned as its own daemon (Sentinel mode lives in the same binary as a
//! normal Redis server), then the control-plane Sentinel loop drives it via
//! `SENTINEL MONITOR`/`SENTINEL SET` against its local port.

use crate::config::Config;
use crate::core::errors::RdsError;
use crate::core::lifecycle::process;
use crate::core::reconcile::client::MasterClient;
use crate::core::sentinel::{self, SentinelNodeState};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{RwLock, broadcast};
use tracing_subscriber::{filter::EnvFilter, reload};

/// Runs the Sentinel role until a shutdown signal arrives: spawns the
/// `redis-server --sentinel` daemon, then runs the fetch/monitor loop, and
/// finally tears the daemon down.
pub async fn run(
    config: Config,
    log_reload_handle: Arc<reload::Handle<EnvFilter, tracing_subscriber::Registry>>,
) -> anyhow::Result<()> {
    let config = Arc::new(config);

    let conf_path = config.config_dir.join("sentinel.conf");
    let pid_path = config.pid_dir.join("sentinel.pid");
    let pid = spawn_sentinel_daemon(&config, &conf_path, &pid_path).await?;
    tracing::info!(pid, port = config.sentinel_port, "sentinel daemon started");

    let client = MasterClient::new(&config.master_ip, config.api_port, config.token.clone())?;
    let state = Arc::new(SentinelNodeState {
        config: Arc::clone(&config),
        client,
        cid: RwLock::new(String::new()),
        monitored: RwLock::new(Vec::new()),
    });

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let loop_shutdown_rx = shutdown_tx.subscribe();
    let loop_state = Arc::clone(&state);
    let loop_task = tokio::spawn(async move { sentinel::run(loop_state, loop_shutdown_rx).await });

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
    match tokio::time::timeout(std::time::Duration::from_secs(15), loop_task).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => tracing::error!(error = %e, "sentinel loop exited with an error"),
        Ok(Err(e)) => tracing::error!(error = %e, "sentinel loop task panicked"),
        Err(_) => tracing::warn!("sentinel loop did not shut down within the grace period"),
    }

    stop_sentinel_daemon(&pid_path).await;

    Ok(())
}

async fn stop_sentinel_daemon(pid_path: &Path) {
    let pid = tokio::fs::read_to_string(pid_path)
        .await
        .ok()
        .and_then(|s| s.trim().parse::<u32>().ok());
    if let Some(pid) = pid {
        if let Err(e) = process::sigkill(pid) {
            tracing::warn!(error = %e, "failed to stop sentinel daemon during shutdown");
        }
    }
    let _ = process::remove_pidfile(pid_path).await;
}

async fn spawn_sentinel_daemon(config: &Config, conf_path: &Path, pid_path: &Path) -> Result<u32, RdsError> {
    if let Some(parent) = conf_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let rendered = render_sentinel_conf(config, pid_path);
    tokio::fs::write(conf_path, rendered).await?;

    let status = tokio::process::Command::new("runuser")
        .arg("-u")
        .arg(&config.redis_user)
        .arg("--")
        .arg(&config.redis_binary)
        .arg(conf_path)
        .arg("--sentinel")
        .arg("--daemonize")
        .arg("yes")
        .status()
        .await
        .map_err(|e| RdsError::Fatal(format!("failed to spawn sentinel daemon: {e}")))?;

    if !status.success() {
        return Err(RdsError::Fatal(format!(
            "redis-server --sentinel exited with status {status}"
        )));
    }

    process::wait_for_pidfile(pid_path, config.delay_start).await
}

fn render_sentinel_conf(config: &Config, pid_path: &Path) -> String {
    format!(
        "port {}\ndir {}\npidfile {}\nsentinel deny-scripts-reconfig yes\n",
        config.sentinel_port,
        config.main_dir.display(),
        pid_path.display(),
    )
}

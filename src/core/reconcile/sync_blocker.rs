// src/core/reconcile/sync_blocker.rs

//! After starting a configured replica-type instance, the follower must not
//! dispatch the next command for that instance until replication converges,
//! times out, or is judged abandoned (spec.md §4.3 "Sync blocker").

use crate::core::errors::RdsError;
use crate::core::redis_client::RedisClient;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::time::sleep;

const POLL_INTERVAL: Duration = Duration::from_secs(1);
const PROGRESS_LOG_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// `master_sync_in_progress=0 ∧ master_link_status=up ∧ loading=0`.
    Converged,
    /// `max_sync_wait` elapsed with no convergence.
    TimedOut,
    /// Progress stalled after previously advancing — treated as a version
    /// mismatch and abandoned with an error log, per spec.md §4.3.
    Abandoned,
}

/// Checks the three documented convergence conditions against a parsed
/// `INFO` map.
pub fn sync_converged(info: &HashMap<String, String>) -> bool {
    info.get("master_sync_in_progress").map(String::as_str) == Some("0")
        && info.get("master_link_status").map(String::as_str) == Some("up")
        && info.get("loading").map(String::as_str) == Some("0")
}

/// Bytes remaining to transfer, per `master_sync_left_bytes`. A value
/// `< -1` signals a diskless sync in progress (spec.md §4.3), in which case
/// the caller should track received bytes instead of remaining bytes.
pub fn sync_left_bytes(info: &HashMap<String, String>) -> Option<i64> {
    info.get("master_sync_left_bytes").and_then(|v| v.parse().ok())
}

pub fn is_diskless_sync(left_bytes: i64) -> bool {
    left_bytes < -1
}

/// Result of comparing two successive "bytes left" readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressCheck {
    /// Positive `left` delta (or a first reading with no prior baseline).
    Progressing(i64),
    /// Two consecutive identical readings: transfer is not moving.
    Stalled,
}

/// Computes `prev_left − current_left` per second, the progress metric
/// spec.md §4.3 defines for logging and stall detection.
pub fn check_progress(prev_left: Option<i64>, current_left: Option<i64>) -> ProgressCheck {
    match (prev_left, current_left) {
        (Some(prev), Some(cur)) if prev > cur => ProgressCheck::Progressing(prev - cur),
        (Some(prev), Some(cur)) if prev == cur => ProgressCheck::Stalled,
        _ => ProgressCheck::Progressing(0),
    }
}

/// Polls the instance's own Redis server once a second until sync converges,
/// `max_wait` elapses, or the transfer is judged stalled after previously
/// making progress. Progress is logged at most once every 15 seconds.
pub async fn wait_for_sync(
    port: u16,
    auth: Option<(&str, &str)>,
    max_wait: Duration,
) -> Result<SyncOutcome, RdsError> {
    let deadline = Instant::now() + max_wait;
    let mut prev_left: Option<i64> = None;
    let mut made_progress = false;
    let mut last_logged = Instant::now() - PROGRESS_LOG_INTERVAL;

    loop {
        if Instant::now() >= deadline {
            return Ok(SyncOutcome::TimedOut);
        }

        let info = match RedisClient::connect(port, auth).await {
            Ok(mut client) => client.info().await.unwrap_or_default(),
            Err(_) => HashMap::new(),
        };

        if sync_converged(&info) {
            tracing::info!(port, "completed sync");
            return Ok(SyncOutcome::Converged);
        }

        let current_left = sync_left_bytes(&info);
        match check_progress(prev_left, current_left) {
            ProgressCheck::Progressing(delta) if delta > 0 => made_progress = true,
            ProgressCheck::Stalled if made_progress => {
                let in_progress = info.get("master_sync_in_progress").map(String::as_str) == Some("1");
                if in_progress {
                    tracing::error!(port, "sync stalled with no further bytes after prior progress, abandoning as version mismatch");
                    return Ok(SyncOutcome::Abandoned);
                }
            }
            _ => {}
        }
        prev_left = current_left;

        if last_logged.elapsed() >= PROGRESS_LOG_INTERVAL {
            tracing::info!(port, left = ?current_left, "sync in progress");
            last_logged = Instant::now();
        }

        sleep(POLL_INTERVAL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn converged_requires_all_three_fields() {
        let ok = info(&[
            ("master_sync_in_progress", "0"),
            ("master_link_status", "up"),
            ("loading", "0"),
        ]);
        assert!(sync_converged(&ok));

        let not_yet = info(&[
            ("master_sync_in_progress", "1"),
            ("master_link_status", "up"),
            ("loading", "0"),
        ]);
        assert!(!sync_converged(&not_yet));
    }

    #[test]
    fn diskless_sync_signaled_by_left_bytes_below_minus_one() {
        assert!(is_diskless_sync(-2));
        assert!(!is_diskless_sync(-1));
        assert!(!is_diskless_sync(100));
    }

    #[test]
    fn progress_check_detects_advance_and_stall() {
        assert_eq!(check_progress(Some(100), Some(40)), ProgressCheck::Progressing(60));
        assert_eq!(check_progress(Some(40), Some(40)), ProgressCheck::Stalled);
        assert_eq!(check_progress(None, Some(40)), ProgressCheck::Progressing(0));
    }
}

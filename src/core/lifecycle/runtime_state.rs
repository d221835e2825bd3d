// src/core/lifecycle/runtime_state.rs

//! Detects an instance's extended state flags from its Redis `INFO` output.
//! Extended flags are computed on demand (spec.md §3) — never cached as a
//! source of truth, since they can change between any two observations.

use crate::core::instance::state::{BaseState, ExtendedFlags, State};
use crate::core::lifecycle::process::is_process_alive;
use std::collections::HashMap;

/// Computes the base state from pidfile/process liveness, independent of
/// INFO (a dead or absent process can't be queried over the wire anyway).
pub fn base_state_from_pid(pid: Option<u32>) -> BaseState {
    match pid {
        None => BaseState::Stopped,
        Some(pid) if is_process_alive(pid) => BaseState::Works,
        Some(_) => BaseState::Dead,
    }
}

/// Derives extended flags from a parsed `INFO` map for an instance known to
/// be in the `Works` base state.
pub fn extended_flags_from_info(info: &HashMap<String, String>) -> ExtendedFlags {
    let mut flags = ExtendedFlags::empty();

    let get = |k: &str| info.get(k).map(String::as_str);

    if get("loading") == Some("1") {
        flags |= ExtendedFlags::LOADING;
    }
    if get("rdb_bgsave_in_progress") == Some("1") || get("aof_rewrite_in_progress") == Some("1") {
        flags |= ExtendedFlags::SAVING;
    }
    if get("master_sync_in_progress") == Some("1") {
        flags |= ExtendedFlags::SYNCING;
    }

    match get("master_link_status") {
        Some("up") => flags |= ExtendedFlags::MASTER_UP,
        Some("down") => flags |= ExtendedFlags::MASTER_DOWN,
        _ => {}
    }

    let connected_slaves: i64 = get("connected_slaves").and_then(|v| v.parse().ok()).unwrap_or(0);
    if connected_slaves == 0 {
        flags |= ExtendedFlags::NO_REPLICA;
    } else {
        flags |= ExtendedFlags::WITH_REPLICA;
    }

    if flags.is_empty() {
        flags |= ExtendedFlags::IDLE;
    }

    flags
}

/// Combines base state and, when applicable, extended flags observed over
/// the wire into the instance's current `State`.
pub fn compute_state(pid: Option<u32>, info: Option<&HashMap<String, String>>) -> State {
    let base = base_state_from_pid(pid);
    match base {
        BaseState::Works => State {
            base,
            flags: info.map(extended_flags_from_info).unwrap_or(ExtendedFlags::HANG),
        },
        other => State {
            base: other,
            flags: ExtendedFlags::empty(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn detects_syncing_and_master_up() {
        let info = info(&[
            ("master_sync_in_progress", "1"),
            ("master_link_status", "up"),
            ("connected_slaves", "0"),
        ]);
        let flags = extended_flags_from_info(&info);
        assert!(flags.contains(ExtendedFlags::SYNCING));
        assert!(flags.contains(ExtendedFlags::MASTER_UP));
        assert!(flags.contains(ExtendedFlags::NO_REPLICA));
    }

    #[test]
    fn idle_when_nothing_else_applies() {
        let info = info(&[("connected_slaves", "1")]);
        let flags = extended_flags_from_info(&info);
        assert!(flags.contains(ExtendedFlags::WITH_REPLICA));
    }

    #[test]
    fn hangs_when_works_but_info_unreachable() {
        let state = compute_state(Some(1), None);
        if state.base == BaseState::Works {
            assert!(state.flags.contains(ExtendedFlags::HANG));
        }
    }
}

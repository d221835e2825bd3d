// src/core/stats.rs

//! Aggregated fleet statistics (spec.md §2 component 8): per-state instance
//! counts and the follower-roster summaries already exposed by the
//! `stats`/`replication` control-API endpoints. Kept separate from the
//! handlers so the same aggregation can be reused by a future CLI `stats`
//! subcommand without going through HTTP.

use crate::core::commandlog::{FollowerHealth, FollowerRecord, NodeRole};
use crate::core::instance::model::Instance;
use crate::core::instance::state::BaseState;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Default, Serialize)]
pub struct FleetStats {
    pub total_instances: usize,
    pub instances_by_state: HashMap<String, usize>,
    pub followers_by_role: HashMap<String, usize>,
    pub followers_by_health: HashMap<String, usize>,
    pub max_follower_lag_seconds: i64,
    pub max_sync_lag_seconds: i64,
}

fn base_state_key(base: BaseState) -> &'static str {
    match base {
        BaseState::Stopped => "stopped",
        BaseState::Works => "works",
        BaseState::Dead => "dead",
    }
}

fn role_key(role: NodeRole) -> &'static str {
    match role {
        NodeRole::Minion => "minion",
        NodeRole::Sentinel => "sentinel",
    }
}

fn health_key(health: FollowerHealth) -> &'static str {
    match health {
        FollowerHealth::Online => "online",
        FollowerHealth::PossibleDown => "possible_down",
        FollowerHealth::Down => "down",
        FollowerHealth::Dead => "dead",
        FollowerHealth::Syncing => "syncing",
    }
}

/// Builds the aggregated view from a point-in-time snapshot of instances and
/// the follower roster.
pub fn aggregate(instances: &[Instance], followers: &[FollowerRecord], now: i64) -> FleetStats {
    let mut stats = FleetStats {
        total_instances: instances.len(),
        ..Default::default()
    };

    for instance in instances {
        *stats
            .instances_by_state
            .entry(base_state_key(instance.state.base).to_string())
            .or_insert(0) += 1;
    }

    for follower in followers {
        *stats
            .followers_by_role
            .entry(role_key(follower.role).to_string())
            .or_insert(0) += 1;
        *stats
            .followers_by_health
            .entry(health_key(follower.health).to_string())
            .or_insert(0) += 1;
        stats.max_follower_lag_seconds = stats.max_follower_lag_seconds.max(now - follower.last_seen);
        stats.max_sync_lag_seconds = stats.max_sync_lag_seconds.max(now - follower.last_sync);
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::instance::model::{Auth, ConfigInfo, Preferencies, ReplicationType};
    use crate::core::instance::state::State;
    use std::collections::HashMap as Map;

    fn instance(id: u32, state: State) -> Instance {
        Instance {
            id,
            uuid: format!("u{id}"),
            desc: String::new(),
            tags: vec![],
            created: 0,
            compatible: "7.2".to_string(),
            replication_type: ReplicationType::Replica,
            is_save_disabled: false,
            auth: Auth {
                user: "a".to_string(),
                pepper: "p".to_string(),
                hash: "h".to_string(),
            },
            preferencies: Preferencies::default(),
            config_info: ConfigInfo::default(),
            storage: Map::new(),
            meta_version: crate::core::instance::model::CURRENT_META_VERSION,
            state,
        }
    }

    #[test]
    fn counts_instances_by_base_state() {
        let instances = vec![
            instance(1, State::works(Default::default())),
            instance(2, State::stopped()),
            instance(3, State::works(Default::default())),
        ];
        let stats = aggregate(&instances, &[], 0);
        assert_eq!(stats.total_instances, 3);
        assert_eq!(stats.instances_by_state["works"], 2);
        assert_eq!(stats.instances_by_state["stopped"], 1);
    }
}

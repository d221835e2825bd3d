// src/core/sentinel/switch.rs

//! Sentinel-driven master switch (spec.md §4.4: "Any node with
//! `failover_method=sentinel` can invoke a master switch").

use crate::config::{Config, FailoverMethod, NodeRole};
use crate::core::errors::RdsError;
use crate::core::instance::model::Instance;
use crate::core::redis_client::RedisClient;
use std::time::{Duration, Instant};
use tokio::time::sleep;

/// Upper bound on how long a master switch polls for the promoted replica
/// to report `role=master` (spec.md §5: `MAX_SWITCH_WAIT=15 min`).
pub const MAX_SWITCH_WAIT: Duration = Duration::from_secs(15 * 60);
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Preconditions a caller must satisfy before a switch is attempted
/// (spec.md §4.4: "rejected if caller is not the control-plane master role,
/// target instance is not in works, or target role is not slave").
pub fn check_preconditions(
    caller_role: NodeRole,
    config: &Config,
    target: &Instance,
    target_replication_role: &str,
) -> Result<(), RdsError> {
    if caller_role != NodeRole::Master {
        return Err(RdsError::WrongRole("master switch must be initiated from the master role".to_string()));
    }
    if config.failover_method != FailoverMethod::Sentinel {
        return Err(RdsError::WrongRole("failover_method is not sentinel".to_string()));
    }
    if !target.state.is_works() {
        return Err(RdsError::WrongState(format!("instance {} is not running", target.id)));
    }
    if target_replication_role != "slave" {
        return Err(RdsError::WrongReplicaRole(format!(
            "instance {} reports role {target_replication_role}, expected slave",
            target.id
        )));
    }
    Ok(())
}

/// Performs a master switch against the replica local to `target_port`: set
/// `slave-priority=1`, `SENTINEL FAILOVER`, poll `replication:role` until it
/// reports `master` or [`MAX_SWITCH_WAIT`] elapses, then restore the prior
/// priority unconditionally (spec.md §4.4 and §8 scenario 5).
pub async fn switch_master(
    sentinel_port: u16,
    target_port: u16,
    auth: Option<(&str, &str)>,
    sentinel_name: &str,
) -> Result<bool, RdsError> {
    let mut target_client = RedisClient::connect(target_port, auth).await?;
    let prior_priority = target_client
        .config_get("slave-priority")
        .await?
        .unwrap_or_else(|| "100".to_string());

    target_client.config_set("slave-priority", "1").await?;

    let mut sentinel_client = RedisClient::connect(sentinel_port, None).await?;
    let failover_result = sentinel_client.sentinel_failover(sentinel_name).await;

    let promoted = if failover_result.is_ok() {
        poll_until_master(target_port, auth).await?
    } else {
        false
    };

    let _ = target_client.config_set("slave-priority", &prior_priority).await;
    failover_result?;

    Ok(promoted)
}

async fn poll_until_master(target_port: u16, auth: Option<(&str, &str)>) -> Result<bool, RdsError> {
    let deadline = Instant::now() + MAX_SWITCH_WAIT;
    loop {
        if Instant::now() >= deadline {
            return Ok(false);
        }
        if let Ok(mut client) = RedisClient::connect(target_port, auth).await {
            if let Ok(info) = client.info().await {
                if info.get("role").map(String::as_str) == Some("master") {
                    return Ok(true);
                }
            }
        }
        sleep(POLL_INTERVAL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::instance::model::{Auth, ConfigInfo, Preferencies, ReplicationType};
    use crate::core::instance::state::State;
    use std::collections::HashMap;

    fn target(state: State) -> Instance {
        Instance {
            id: 1,
            uuid: "u".to_string(),
            desc: "d".to_string(),
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
            storage: HashMap::new(),
            meta_version: 1,
            state,
        }
    }

    fn minion_config() -> Config {
        let toml_str = format!(
            "[main]\nrole = \"master\"\ntoken = \"{}\"\n\n[replication]\nfailover_method = \"sentinel\"\n",
            "a".repeat(64)
        );
        let raw: crate::config::RawConfig = toml::from_str(&toml_str).unwrap();
        Config::from_raw(raw).unwrap()
    }

    #[test]
    fn rejects_when_caller_is_not_master() {
        let cfg = minion_config();
        let err = check_preconditions(NodeRole::Minion, &cfg, &target(State::works(Default::default())), "slave");
        assert!(err.is_err());
    }

    #[test]
    fn rejects_when_target_is_not_running() {
        let cfg = minion_config();
        let err = check_preconditions(NodeRole::Master, &cfg, &target(State::stopped()), "slave");
        assert!(err.is_err());
    }

    #[test]
    fn rejects_when_target_is_not_a_slave() {
        let cfg = minion_config();
        let err = check_preconditions(NodeRole::Master, &cfg, &target(State::works(Default::default())), "master");
        assert!(err.is_err());
    }

    #[test]
    fn accepts_a_valid_switch_request() {
        let cfg = minion_config();
        let ok = check_preconditions(NodeRole::Master, &cfg, &target(State::works(Default::default())), "slave");
        assert!(ok.is_ok());
    }
}

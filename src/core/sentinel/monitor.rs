// src/core/sentinel/monitor.rs

//! Enable/disable Sentinel monitoring, driven by `fetch` (spec.md §4.4:
//! "Treats fetch as the source of truth for what Sentinel should monitor").

use crate::core::errors::RdsError;
use crate::core::instance::model::{Instance, ReplicationType};
use crate::core::redis_client::RedisClient;

/// Stable monitoring name for an instance: `<prefix><id>`, per spec.md §4.4
/// ("instance naming uses a stable prefix plus numeric id").
pub fn monitor_name(prefix: &str, id: u32) -> String {
    format!("{prefix}{id}")
}

pub struct MonitorParams<'a> {
    pub name_prefix: &'a str,
    pub start_port: u16,
    pub quorum: u32,
    pub down_after_ms: u64,
    pub failover_timeout_ms: u64,
    pub parallel_syncs: u32,
}

/// Resets Sentinel's monitored set to exactly the replica-type instances
/// whose master-side state is `works`. Per spec.md §4.4, this is a full
/// reset-and-rebuild on every `fetch`, not an incremental diff.
pub async fn rebuild_monitoring(
    sentinel_port: u16,
    master_ip: &str,
    params: &MonitorParams<'_>,
    instances: &[Instance],
    currently_monitored: &[String],
) -> Result<(), RdsError> {
    let mut client = RedisClient::connect(sentinel_port, None).await?;

    for name in currently_monitored {
        let _ = client.sentinel_remove(name).await;
    }

    for instance in instances {
        if instance.replication_type != ReplicationType::Replica || !instance.state.is_works() {
            continue;
        }
        add_one(&mut client, master_ip, params, instance).await?;
    }

    Ok(())
}

/// Adds a single instance to Sentinel monitoring, used both by
/// [`rebuild_monitoring`] and by incremental `sentinel_start` handling.
pub async fn add_one(
    client: &mut RedisClient,
    master_ip: &str,
    params: &MonitorParams<'_>,
    instance: &Instance,
) -> Result<(), RdsError> {
    let name = monitor_name(params.name_prefix, instance.id);
    let port = crate::core::lifecycle::ops::instance_port(params.start_port, instance.id)?;
    client
        .sentinel_monitor(&name, master_ip, port, params.quorum)
        .await?;
    client
        .sentinel_set(&name, "auth-user", &instance.auth.user)
        .await?;
    client
        .sentinel_set(&name, "auth-pass", &instance.preferencies.sentinel)
        .await?;
    client
        .sentinel_set(&name, "down-after-milliseconds", &params.down_after_ms.to_string())
        .await?;
    client
        .sentinel_set(&name, "failover-timeout", &params.failover_timeout_ms.to_string())
        .await?;
    client
        .sentinel_set(&name, "parallel-syncs", &params.parallel_syncs.to_string())
        .await?;
    Ok(())
}

/// Removes an instance from Sentinel monitoring. Per spec.md §9's
/// ambiguity resolution, a `sentinel_stop`/`stop_all` command received on a
/// Sentinel node means exactly this, not "re-enable" as the known-buggy
/// original behaves.
pub async fn remove_one(sentinel_port: u16, name_prefix: &str, instance_id: u32) -> Result<(), RdsError> {
    let mut client = RedisClient::connect(sentinel_port, None).await?;
    let name = monitor_name(name_prefix, instance_id);
    client.sentinel_remove(&name).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monitor_name_is_prefix_plus_id() {
        assert_eq!(monitor_name("rds-", 7), "rds-7");
    }
}

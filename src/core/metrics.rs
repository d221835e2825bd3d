// src/core/metrics.rs

//! Defines and registers Prometheus metrics for the control plane.
//!
//! Uses `lazy_static` so metrics are registered exactly once for the
//! lifetime of the process, mirroring the teacher's own metrics module.

use lazy_static::lazy_static;
use prometheus::{
    Counter, Gauge, GaugeVec, TextEncoder, register_counter, register_gauge, register_gauge_vec,
};

lazy_static! {
    /// Number of instances currently known to the registry, by base state.
    pub static ref INSTANCES_BY_STATE: GaugeVec = register_gauge_vec!(
        "rds_instances_by_state",
        "Number of instances in each base state.",
        &["state"]
    )
    .unwrap();

    /// Number of registered followers, by role.
    pub static ref FOLLOWERS_BY_ROLE: GaugeVec = register_gauge_vec!(
        "rds_followers_by_role",
        "Number of registered followers, labeled by role.",
        &["role"]
    )
    .unwrap();

    /// Number of followers in each health state.
    pub static ref FOLLOWERS_BY_HEALTH: GaugeVec = register_gauge_vec!(
        "rds_followers_by_health",
        "Number of registered followers, labeled by health state.",
        &["health"]
    )
    .unwrap();

    /// Depth of the command log queue after the last cleanup tick.
    pub static ref COMMAND_QUEUE_DEPTH: Gauge = register_gauge!(
        "rds_command_queue_depth",
        "Number of items currently retained in the command log."
    )
    .unwrap();

    /// Largest observed follower lag (seconds since last_seen) at the last liveness tick.
    pub static ref MAX_FOLLOWER_LAG_SECONDS: Gauge = register_gauge!(
        "rds_max_follower_lag_seconds",
        "Largest time since last_seen across all registered followers."
    )
    .unwrap();

    /// Largest observed sync lag (seconds since last_sync) at the last liveness tick.
    pub static ref MAX_SYNC_LAG_SECONDS: Gauge = register_gauge!(
        "rds_max_sync_lag_seconds",
        "Largest time since last_sync across all registered followers."
    )
    .unwrap();

    /// Total number of administrative commands appended to the log.
    pub static ref COMMANDS_APPENDED_TOTAL: Counter = register_counter!(
        "rds_commands_appended_total",
        "Total number of administrative commands appended to the command log."
    )
    .unwrap();

    /// Total number of follower health-state transitions observed.
    pub static ref HEALTH_TRANSITIONS_TOTAL: Counter = register_counter!(
        "rds_health_transitions_total",
        "Total number of follower health state transitions."
    )
    .unwrap();
}

/// Gathers all registered metrics and encodes them in the Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode_to_string(&metric_families).unwrap()
}

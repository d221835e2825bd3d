// src/config.rs

//! Loads, resolves and validates the hierarchical RDS configuration file.
//!
//! Sections mirror spec.md §6: `main`, `log`, `redis`, `sentinel`,
//! `keepalived`, `templates`, `path`, `replication`, `delay`. Parsing
//! follows a `RawConfig` deserialization target with per-field defaults,
//! resolved into a final `Config` whose `validate()` collects every
//! violation instead of stopping at the first one (spec.md §9 "error
//! fan-in on startup").

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// The three control-plane node roles (spec.md §2, §9 "Node role is a
/// three-variant tag").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    Master,
    Minion,
    Sentinel,
}

/// Failover method a node can be configured with (spec.md §9 "Failover
/// method is a two-variant tag").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailoverMethod {
    Sentinel,
    Standby,
}

#[derive(Debug, Clone, Deserialize)]
struct RawMainConfig {
    role: NodeRole,
    #[serde(default = "default_bind")]
    bind: String,
    #[serde(default = "default_api_port")]
    api_port: u16,
    token: String,
    #[serde(default)]
    master_ip: String,
    #[serde(default = "default_max_id")]
    max_id: u32,
    #[serde(default)]
    reuse_ids: bool,
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}
fn default_api_port() -> u16 {
    16379
}
fn default_max_id() -> u32 {
    1024
}

#[derive(Debug, Clone, Deserialize)]
struct RawLogConfig {
    #[serde(default = "default_log_level")]
    level: String,
    #[serde(default)]
    file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Deserialize)]
struct RawRedisConfig {
    #[serde(default = "default_redis_binary")]
    binary: String,
    #[serde(default = "default_start_port")]
    start_port: u16,
    #[serde(default = "default_redis_user")]
    user: String,
}

fn default_redis_binary() -> String {
    "/usr/bin/redis-server".to_string()
}
fn default_start_port() -> u16 {
    20000
}
fn default_redis_user() -> String {
    "redis".to_string()
}

#[derive(Debug, Clone, Deserialize)]
struct RawSentinelConfig {
    #[serde(default = "default_sentinel_port")]
    port: u16,
    #[serde(default = "default_quorum")]
    quorum: u32,
    #[serde(default = "default_down_after_ms")]
    down_after_milliseconds: u64,
    #[serde(default = "default_failover_timeout_ms")]
    failover_timeout_ms: u64,
    #[serde(default = "default_parallel_syncs")]
    parallel_syncs: u32,
    #[serde(default = "default_name_prefix")]
    name_prefix: String,
}

fn default_sentinel_port() -> u16 {
    26379
}
fn default_quorum() -> u32 {
    2
}
fn default_down_after_ms() -> u64 {
    30_000
}
fn default_failover_timeout_ms() -> u64 {
    180_000
}
fn default_parallel_syncs() -> u32 {
    1
}
fn default_name_prefix() -> String {
    "rds".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawKeepalivedConfig {
    #[serde(default)]
    enabled: bool,
    #[serde(default)]
    virtual_ip: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawTemplatesConfig {
    #[serde(default = "default_templates_dir")]
    dir: String,
}

fn default_templates_dir() -> String {
    "/etc/rds/templates".to_string()
}

#[derive(Debug, Clone, Deserialize)]
struct RawPathConfig {
    #[serde(default = "default_main_dir")]
    main_dir: String,
    #[serde(default = "default_meta_dir")]
    meta_dir: String,
    #[serde(default = "default_config_dir")]
    config_dir: String,
    #[serde(default = "default_data_dir")]
    data_dir: String,
    #[serde(default = "default_log_dir")]
    log_dir: String,
    #[serde(default = "default_pid_dir")]
    pid_dir: String,
}

fn default_main_dir() -> String {
    "/var/lib/rds".to_string()
}
fn default_meta_dir() -> String {
    "/var/lib/rds/meta".to_string()
}
fn default_config_dir() -> String {
    "/etc/rds/instances".to_string()
}
fn default_data_dir() -> String {
    "/var/lib/rds/data".to_string()
}
fn default_log_dir() -> String {
    "/var/log/rds/instances".to_string()
}
fn default_pid_dir() -> String {
    "/var/run/rds".to_string()
}

#[derive(Debug, Clone, Deserialize)]
struct RawReplicationConfig {
    #[serde(default = "default_failover_method")]
    failover_method: FailoverMethod,
}

fn default_failover_method() -> FailoverMethod {
    FailoverMethod::Standby
}

#[derive(Debug, Clone, Deserialize)]
struct RawDelayConfig {
    #[serde(default = "default_start_delay_secs", with = "humantime_serde::option")]
    start: Option<Duration>,
    #[serde(default = "default_stop_delay_secs", with = "humantime_serde::option")]
    stop: Option<Duration>,
    #[serde(default = "default_max_sync_wait_secs", with = "humantime_serde::option")]
    max_sync_wait: Option<Duration>,
}

fn default_start_delay_secs() -> Option<Duration> {
    Some(Duration::from_secs(1))
}
fn default_stop_delay_secs() -> Option<Duration> {
    Some(Duration::from_secs(30))
}
fn default_max_sync_wait_secs() -> Option<Duration> {
    Some(Duration::from_secs(3600))
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawConfig {
    main: RawMainConfig,
    #[serde(default = "default_log")]
    log: RawLogConfig,
    #[serde(default = "default_redis")]
    redis: RawRedisConfig,
    #[serde(default = "default_sentinel")]
    sentinel: RawSentinelConfig,
    #[serde(default)]
    keepalived: RawKeepalivedConfig,
    #[serde(default = "default_templates")]
    templates: RawTemplatesConfig,
    #[serde(default = "default_path")]
    path: RawPathConfig,
    #[serde(default = "default_replication")]
    replication: RawReplicationConfig,
    #[serde(default = "default_delay")]
    delay: RawDelayConfig,
}

fn default_log() -> RawLogConfig {
    RawLogConfig {
        level: default_log_level(),
        file: None,
    }
}
fn default_redis() -> RawRedisConfig {
    RawRedisConfig {
        binary: default_redis_binary(),
        start_port: default_start_port(),
        user: default_redis_user(),
    }
}
fn default_sentinel() -> RawSentinelConfig {
    RawSentinelConfig {
        port: default_sentinel_port(),
        quorum: default_quorum(),
        down_after_milliseconds: default_down_after_ms(),
        failover_timeout_ms: default_failover_timeout_ms(),
        parallel_syncs: default_parallel_syncs(),
        name_prefix: default_name_prefix(),
    }
}
fn default_templates() -> RawTemplatesConfig {
    RawTemplatesConfig {
        dir: default_templates_dir(),
    }
}
fn default_path() -> RawPathConfig {
    RawPathConfig {
        main_dir: default_main_dir(),
        meta_dir: default_meta_dir(),
        config_dir: default_config_dir(),
        data_dir: default_data_dir(),
        log_dir: default_log_dir(),
        pid_dir: default_pid_dir(),
    }
}
fn default_replication() -> RawReplicationConfig {
    RawReplicationConfig {
        failover_method: default_failover_method(),
    }
}
fn default_delay() -> RawDelayConfig {
    RawDelayConfig {
        start: default_start_delay_secs(),
        stop: default_stop_delay_secs(),
        max_sync_wait: default_max_sync_wait_secs(),
    }
}

/// The fully resolved, validated configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub role: NodeRole,
    pub bind: String,
    pub api_port: u16,
    pub token: String,
    pub master_ip: String,
    pub max_id: u32,
    pub reuse_ids: bool,

    pub log_level: String,
    pub log_file: Option<String>,

    pub redis_binary: String,
    pub start_port: u16,
    pub redis_user: String,

    pub sentinel_port: u16,
    pub sentinel_quorum: u32,
    pub sentinel_down_after_ms: u64,
    pub sentinel_failover_timeout_ms: u64,
    pub sentinel_parallel_syncs: u32,
    pub sentinel_name_prefix: String,

    pub keepalived_enabled: bool,
    pub keepalived_virtual_ip: Option<String>,

    pub templates_dir: PathBuf,

    pub main_dir: PathBuf,
    pub meta_dir: PathBuf,
    pub config_dir: PathBuf,
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub pid_dir: PathBuf,

    pub failover_method: FailoverMethod,

    pub delay_start: Duration,
    pub delay_stop: Duration,
    pub max_sync_wait: Duration,
}

impl Config {
    /// Reads and parses `path` into a fully validated `Config`.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("Failed to read config file at '{path}'"))?;
        let raw: RawConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse TOML from '{path}'"))?;
        Self::from_raw(raw)
    }

    pub(crate) fn from_raw(raw: RawConfig) -> Result<Self> {
        let config = Config {
            role: raw.main.role,
            bind: raw.main.bind,
            api_port: raw.main.api_port,
            token: raw.main.token,
            master_ip: raw.main.master_ip,
            max_id: raw.main.max_id,
            reuse_ids: raw.main.reuse_ids,

            log_level: raw.log.level,
            log_file: raw.log.file,

            redis_binary: raw.redis.binary,
            start_port: raw.redis.start_port,
            redis_user: raw.redis.user,

            sentinel_port: raw.sentinel.port,
            sentinel_quorum: raw.sentinel.quorum,
            sentinel_down_after_ms: raw.sentinel.down_after_milliseconds,
            sentinel_failover_timeout_ms: raw.sentinel.failover_timeout_ms,
            sentinel_parallel_syncs: raw.sentinel.parallel_syncs,
            sentinel_name_prefix: raw.sentinel.name_prefix,

            keepalived_enabled: raw.keepalived.enabled,
            keepalived_virtual_ip: raw.keepalived.virtual_ip,

            templates_dir: PathBuf::from(raw.templates.dir),

            main_dir: PathBuf::from(raw.path.main_dir),
            meta_dir: PathBuf::from(raw.path.meta_dir),
            config_dir: PathBuf::from(raw.path.config_dir),
            data_dir: PathBuf::from(raw.path.data_dir),
            log_dir: PathBuf::from(raw.path.log_dir),
            pid_dir: PathBuf::from(raw.path.pid_dir),

            failover_method: raw.replication.failover_method,

            delay_start: raw.delay.start.unwrap_or(Duration::from_secs(1)),
            delay_stop: raw.delay.stop.unwrap_or(Duration::from_secs(30)),
            max_sync_wait: raw.delay.max_sync_wait.unwrap_or(Duration::from_secs(3600)),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates every independent constraint and reports all violations at
    /// once rather than stopping at the first (spec.md §9 "error fan-in").
    fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        if self.token.len() != 64 {
            errors.push(format!(
                "main.token must be exactly 64 characters, got {}",
                self.token.len()
            ));
        }
        if self.api_port == 0 {
            errors.push("main.api_port cannot be 0".to_string());
        }
        if self.max_id == 0 || self.max_id > 1024 {
            errors.push(format!("main.max_id must be in [1, 1024], got {}", self.max_id));
        }
        if self.role == NodeRole::Master && self.bind.trim().is_empty() {
            errors.push("main.bind cannot be empty for the master role".to_string());
        }

        if self.start_port == 0 {
            errors.push("redis.start_port cannot be 0".to_string());
        }
        let max_port = self.start_port as u32 + self.max_id;
        if max_port > 65535 {
            errors.push(format!(
                "redis.start_port ({}) + main.max_id ({}) = {} exceeds 65535",
                self.start_port, self.max_id, max_port
            ));
        }

        if self.sentinel_quorum == 0 {
            errors.push("sentinel.quorum cannot be 0".to_string());
        }

        if self.keepalived_enabled && self.keepalived_virtual_ip.is_none() {
            errors.push("keepalived.virtual_ip must be set when keepalived.enabled is true".to_string());
        }

        if self.delay_start < Duration::from_secs(1) || self.delay_start > Duration::from_secs(300) {
            errors.push("delay.start must be between 1s and 300s".to_string());
        }
        if self.max_sync_wait < Duration::from_secs(60) || self.max_sync_wait > Duration::from_secs(3 * 3600) {
            errors.push("delay.max_sync_wait must be between 1min and 3h".to_string());
        }

        if self.role == NodeRole::Minion && self.master_ip.trim().is_empty() {
            errors.push("main.master_ip must be set for the minion role".to_string());
        }
        if self.role == NodeRole::Sentinel && self.master_ip.trim().is_empty() {
            errors.push("main.master_ip must be set for the sentinel role".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            for e in &errors {
                warn!("configuration error: {e}");
            }
            Err(anyhow!("invalid configuration:\n  - {}", errors.join("\n  - ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_toml(extra: &str) -> String {
        format!(
            "[main]\nrole = \"master\"\ntoken = \"{}\"\n{extra}\n",
            "a".repeat(64)
        )
    }

    #[test]
    fn loads_minimal_master_config_with_defaults() {
        let raw: RawConfig = toml::from_str(&raw_toml("")).unwrap();
        let config = Config::from_raw(raw).unwrap();
        assert_eq!(config.api_port, default_api_port());
        assert_eq!(config.start_port, default_start_port());
    }

    #[test]
    fn rejects_non_64_char_token() {
        let raw: RawConfig = toml::from_str("[main]\nrole = \"master\"\ntoken = \"short\"\n").unwrap();
        assert!(Config::from_raw(raw).is_err());
    }

    #[test]
    fn rejects_minion_without_master_ip() {
        let toml_str = format!("[main]\nrole = \"minion\"\ntoken = \"{}\"\n", "b".repeat(64));
        let raw: RawConfig = toml::from_str(&toml_str).unwrap();
        assert!(Config::from_raw(raw).is_err());
    }

    #[test]
    fn fan_in_reports_every_violation_not_just_the_first() {
        let toml_str = "[main]\nrole = \"master\"\ntoken = \"short\"\napi_port = 0\n".to_string();
        let raw: RawConfig = toml::from_str(&toml_str).unwrap();
        let err = Config::from_raw(raw).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("token"));
        assert!(msg.contains("api_port"));
    }
}

// src/core/api/dto.rs

//! JSON request/response types for the control API (spec.md §4.2, §6).

use crate::core::commandlog::{Command, LogItem, NodeRole};
use crate::core::instance::model::Instance;
use serde::{Deserialize, Serialize};

/// Every control-API response carries this envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub code: String,
    pub desc: String,
}

impl StatusResponse {
    pub fn ok(desc: impl Into<String>) -> Self {
        Self {
            code: "ok".to_string(),
            desc: desc.into(),
        }
    }

    pub fn error(code: &str, desc: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            desc: desc.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuperuserAuthDto {
    pub pepper: String,
    pub hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloRequest {
    pub hostname: String,
    pub role: NodeRole,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloResponse {
    pub cid: String,
    pub master_version: String,
    pub sentinel_active: bool,
    pub superuser: SuperuserAuthDto,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CidRequest {
    pub cid: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchResponse {
    pub instances: Vec<Instance>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullResponse {
    pub items: Vec<LogItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfoRequest {
    pub cid: String,
    pub id: u32,
    pub uuid: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfoResponse {
    pub instance: Instance,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushRequest {
    pub command: Command,
    pub instance_id: u32,
    pub instance_uuid: String,
    pub initiator: String,
    #[serde(default)]
    pub payload: Option<Instance>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowerLagDto {
    pub cid: String,
    pub role: NodeRole,
    pub hostname: String,
    pub ip: String,
    pub health: String,
    pub lag_seconds: i64,
    pub sync_lag_seconds: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationResponse {
    pub master_version: String,
    pub followers: Vec<FollowerLagDto>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub followers_by_role: std::collections::HashMap<String, usize>,
    pub max_lag_seconds: i64,
    pub max_sync_lag_seconds: i64,
    pub queue_depth: usize,
}

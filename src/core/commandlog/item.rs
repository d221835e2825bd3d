// src/core/commandlog/item.rs

//! A single administrative command and the append-only item wrapping it.

use crate::core::instance::model::Instance;
use serde::{Deserialize, Serialize};

/// The administrative mutations the master can fan out to followers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    Create,
    Destroy,
    Edit,
    Start,
    Stop,
    Restart,
    StartAll,
    StopAll,
    RestartAll,
    SentinelStart,
    SentinelStop,
}

impl Command {
    /// Commands that target `*_all` or `sentinel_*` semantics are not
    /// required to reference an existing local instance at dispatch time
    /// (spec.md §4.3).
    pub fn targets_single_instance(&self) -> bool {
        !matches!(
            self,
            Command::StartAll | Command::StopAll | Command::RestartAll
        )
    }
}

/// `{command, instance_id, instance_uuid, initiator, timestamp}` from
/// spec.md §3, plus an optional metadata payload for commands that carry a
/// full instance record (`create`, `edit`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogItem {
    pub command: Command,
    pub instance_id: u32,
    pub instance_uuid: String,
    pub initiator: String,
    pub timestamp: i64,
    #[serde(default)]
    pub payload: Option<Instance>,
}

impl LogItem {
    pub fn new(command: Command, instance_id: u32, instance_uuid: impl Into<String>, initiator: impl Into<String>) -> Self {
        Self {
            command,
            instance_id,
            instance_uuid: instance_uuid.into(),
            initiator: initiator.into(),
            timestamp: crate::core::timestamp::now(),
            payload: None,
        }
    }

    pub fn with_payload(mut self, instance: Instance) -> Self {
        self.payload = Some(instance);
        self
    }
}

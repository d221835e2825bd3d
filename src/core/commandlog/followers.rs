// src/core/commandlog/followers.rs

//! The master-side follower registry and its health state machine
//! (spec.md §4.1).

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Node roles a follower can register as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    Minion,
    Sentinel,
}

/// Health states evaluated on the one-minute liveness tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FollowerHealth {
    Online,
    PossibleDown,
    Down,
    /// Terminal: the record has already been unregistered by the time this
    /// would be observed externally.
    Dead,
    /// Overrides the liveness-derived state while a `fetch` bootstrap is in
    /// flight for this follower.
    Syncing,
}

pub const ONLINE_THRESHOLD_SECS: i64 = 15;
pub const POSSIBLE_DOWN_THRESHOLD_SECS: i64 = 60;
pub const DOWN_THRESHOLD_SECS: i64 = 900;

/// Evaluates liveness health purely from elapsed time since `last_seen`,
/// per the table in spec.md §4.1.
pub fn health_for_lag(lag_secs: i64) -> FollowerHealth {
    if lag_secs <= ONLINE_THRESHOLD_SECS {
        FollowerHealth::Online
    } else if lag_secs <= POSSIBLE_DOWN_THRESHOLD_SECS {
        FollowerHealth::PossibleDown
    } else if lag_secs <= DOWN_THRESHOLD_SECS {
        FollowerHealth::Down
    } else {
        FollowerHealth::Dead
    }
}

/// Master-side record of a registered follower.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowerRecord {
    pub cid: String,
    pub role: NodeRole,
    pub version: String,
    pub hostname: String,
    pub ip: String,
    pub connection_date: i64,
    pub last_seen: i64,
    pub last_sync: i64,
    pub health: FollowerHealth,
    pub syncing: bool,
}

/// `dashmap`-backed registry keyed by `cid`, with a secondary `ip -> cid`
/// index to support "collisions are resolved by re-registration displacing
/// any prior record with the same ip" (spec.md §3).
#[derive(Default)]
pub struct FollowerRegistry {
    by_cid: DashMap<String, FollowerRecord>,
    by_ip: DashMap<String, String>,
}

impl FollowerRegistry {
    /// Registers (or re-registers) a follower, evicting any prior record
    /// sharing the same ip, and returns the new record.
    pub fn register(&self, hostname: String, ip: String, role: NodeRole, version: String, now: i64) -> FollowerRecord {
        if let Some((_, old_cid)) = self.by_ip.remove(&ip) {
            self.by_cid.remove(&old_cid);
        }
        let cid = new_cid(now, &ip);
        let record = FollowerRecord {
            cid: cid.clone(),
            role,
            version,
            hostname,
            ip: ip.clone(),
            connection_date: now,
            last_seen: now,
            last_sync: now,
            health: FollowerHealth::Online,
            syncing: false,
        };
        self.by_cid.insert(cid.clone(), record.clone());
        self.by_ip.insert(ip, cid);
        record
    }

    pub fn get(&self, cid: &str) -> Option<FollowerRecord> {
        self.by_cid.get(cid).map(|r| r.clone())
    }

    pub fn get_by_ip(&self, ip: &str) -> Option<FollowerRecord> {
        self.by_ip.get(ip).and_then(|cid| self.get(&cid))
    }

    /// Updates `last_seen` (every authenticated request) and, for `pull`,
    /// `last_sync`.
    pub fn touch(&self, cid: &str, now: i64, new_last_sync: Option<i64>) {
        if let Some(mut record) = self.by_cid.get_mut(cid) {
            record.last_seen = now;
            if let Some(ts) = new_last_sync {
                record.last_sync = ts;
            }
            if record.health != FollowerHealth::Syncing {
                let transitioned = record.health != FollowerHealth::Online;
                record.health = FollowerHealth::Online;
                if transitioned {
                    tracing::info!(cid, "follower health: -> online");
                }
            }
        }
    }

    pub fn set_syncing(&self, cid: &str, syncing: bool) {
        if let Some(mut record) = self.by_cid.get_mut(cid) {
            record.syncing = syncing;
        }
    }

    pub fn remove(&self, cid: &str) {
        if let Some((_, record)) = self.by_cid.remove(cid) {
            self.by_ip.remove(&record.ip);
        }
    }

    pub fn all(&self) -> Vec<FollowerRecord> {
        self.by_cid.iter().map(|e| e.value().clone()).collect()
    }

    /// Runs the one-minute liveness tick: evaluates health transitions,
    /// logs changes, and unregisters anything that reached `dead`.
    pub fn liveness_tick(&self, now: i64) {
        let mut dead = Vec::new();
        for mut entry in self.by_cid.iter_mut() {
            if entry.syncing {
                continue;
            }
            let lag = now - entry.last_seen;
            let new_health = health_for_lag(lag);
            if new_health != entry.health {
                tracing::info!(cid = %entry.cid, from = ?entry.health, to = ?new_health, "follower health transition");
                crate::core::metrics::HEALTH_TRANSITIONS_TOTAL.inc();
                entry.health = new_health;
            }
            if new_health == FollowerHealth::Dead {
                dead.push(entry.cid.clone());
            }
        }
        for cid in dead {
            self.remove(&cid);
        }
    }
}

/// An 8-hex-digit CRC32 of the registration timestamp, per spec.md §3
/// (`CID`).
fn new_cid(now: i64, ip: &str) -> String {
    let crc = crc::Crc::<u32>::new(&crc::CRC_32_ISO_HDLC);
    let digest = crc.checksum(format!("{now}:{ip}").as_bytes());
    format!("{digest:08x}")
}

// src/core/instance/model.rs

//! The `Instance` metadata record and its nested sub-structs.

use crate::core::errors::RdsError;
use crate::core::instance::state::State;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Current on-disk metadata schema version. Anything else is rejected.
pub const CURRENT_META_VERSION: u32 = 1;

/// Maximum length of `Instance::desc`; longer descriptions are truncated,
/// never rejected.
pub const MAX_DESC_LEN: usize = 64;

/// Maximum number of tags an instance may carry.
pub const MAX_TAGS: usize = 3;

/// One-letter color codes recognized as a tag prefix (`color:name`).
const VALID_TAG_COLORS: &[char] = &['r', 'g', 'b', 'y', 'c', 'm', 'k', 'w'];

/// Redis-protocol-level replication model for an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplicationType {
    Replica,
    Standby,
}

/// Owner credentials: `hash = H(password, pepper)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Auth {
    pub user: String,
    pub pepper: String,
    pub hash: String,
}

/// Generated per-role passwords for internal Redis users.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferencies {
    pub admin: String,
    pub sync: String,
    pub sentinel: String,
    pub service: String,
}

/// Hash and generation date of the last rendered config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigInfo {
    pub hash: String,
    pub date: i64,
}

/// A single managed Redis server process, identified by numeric `id` and
/// stable `uuid`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub id: u32,
    pub uuid: String,
    pub desc: String,
    pub tags: Vec<String>,
    pub created: i64,
    pub compatible: String,
    pub replication_type: ReplicationType,
    pub is_save_disabled: bool,
    pub auth: Auth,
    pub preferencies: Preferencies,
    pub config_info: ConfigInfo,
    pub storage: HashMap<String, String>,
    pub meta_version: u32,
    #[serde(default)]
    pub state: State,
}

impl Instance {
    /// Truncates `desc` to exactly [`MAX_DESC_LEN`] characters if longer.
    pub fn truncate_desc(desc: &str) -> String {
        if desc.chars().count() <= MAX_DESC_LEN {
            desc.to_string()
        } else {
            desc.chars().take(MAX_DESC_LEN).collect()
        }
    }

    /// Validates a full tag list: at most [`MAX_TAGS`] entries, each passing
    /// [`validate_tag`].
    pub fn validate_tags(tags: &[String]) -> Result<(), RdsError> {
        if tags.len() > MAX_TAGS {
            return Err(RdsError::Validation(
                "Max number of tags reached.".to_string(),
            ));
        }
        for t in tags {
            validate_tag(t)?;
        }
        Ok(())
    }

    /// Checks the invariants that must hold for any non-nil metadata:
    /// `id >= 1`, non-empty `uuid`, and a matching `meta_version`.
    pub fn validate_invariants(&self) -> Result<(), RdsError> {
        if self.id < 1 {
            return Err(RdsError::Validation("id must be >= 1".to_string()));
        }
        if self.uuid.is_empty() {
            return Err(RdsError::Validation("uuid must not be empty".to_string()));
        }
        if self.meta_version != CURRENT_META_VERSION {
            return Err(RdsError::IncompatibleMetaVersion {
                found: self.meta_version,
                expected: CURRENT_META_VERSION,
            });
        }
        Ok(())
    }
}

/// Validates a single tag: `[A-Za-z0-9_+-]+` optionally prefixed with a
/// one-letter color code and `:`.
pub fn validate_tag(tag: &str) -> Result<(), RdsError> {
    if tag.is_empty() {
        return Err(RdsError::Validation("tag must not be empty".to_string()));
    }

    let name = if let Some((prefix, rest)) = tag.split_once(':') {
        let mut chars = prefix.chars();
        let color = match (chars.next(), chars.next()) {
            (Some(c), None) => c,
            _ => {
                return Err(RdsError::Validation(format!(
                    "invalid tag color prefix in '{tag}'"
                )));
            }
        };
        if !VALID_TAG_COLORS.contains(&color) {
            return Err(RdsError::Validation(format!(
                "unknown tag color '{color}' in '{tag}'"
            )));
        }
        rest
    } else {
        tag
    };

    if name.is_empty()
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '+' || c == '-')
    {
        return Err(RdsError::Validation(format!("invalid tag '{tag}'")));
    }

    Ok(())
}

/// Parses a CLI-style `"id"`, `"id:db"`, or `"id/db"` pair, where `db`
/// defaults to `0` when absent. Used by CLI-facing commands that can target
/// a specific logical database inside an instance.
pub fn parse_id_db_pair(s: &str) -> Result<(u32, u32), RdsError> {
    if s.is_empty() {
        return Err(RdsError::Validation(
            "id/db pair must not be empty".to_string(),
        ));
    }
    let (id_part, db_part) = if let Some(idx) = s.find(':') {
        (&s[..idx], Some(&s[idx + 1..]))
    } else if let Some(idx) = s.find('/') {
        (&s[..idx], Some(&s[idx + 1..]))
    } else {
        (s, None)
    };

    let id: u32 = id_part
        .parse()
        .map_err(|_| RdsError::Validation(format!("invalid id '{id_part}'")))?;
    let db: u32 = match db_part {
        Some(d) => d
            .parse()
            .map_err(|_| RdsError::Validation(format!("invalid db '{d}'")))?,
        None => 0,
    };
    Ok((id, db))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_and_colored_tags() {
        assert!(validate_tag("abc").is_ok());
        assert!(validate_tag("r:abc").is_ok());
        assert!(validate_tag("A_b-1").is_ok());
    }

    #[test]
    fn rejects_empty_unknown_color_and_bad_chars() {
        assert!(validate_tag("").is_err());
        assert!(validate_tag("x:abc").is_err());
        assert!(validate_tag("bad.tag").is_err());
        assert!(validate_tag("bad tag").is_err());
    }

    #[test]
    fn truncates_description_to_exactly_64() {
        let long = "a".repeat(100);
        let truncated = Instance::truncate_desc(&long);
        assert_eq!(truncated.chars().count(), MAX_DESC_LEN);
    }

    #[test]
    fn leaves_short_description_untouched() {
        assert_eq!(Instance::truncate_desc("short"), "short");
    }

    #[test]
    fn rejects_more_than_three_tags() {
        let tags = vec![
            "one".to_string(),
            "two".to_string(),
            "three".to_string(),
            "four".to_string(),
        ];
        let err = Instance::validate_tags(&tags).unwrap_err();
        assert!(matches!(err, RdsError::Validation(_)));
    }

    #[test]
    fn parses_id_db_pair_variants() {
        assert_eq!(parse_id_db_pair("7").unwrap(), (7, 0));
        assert_eq!(parse_id_db_pair("7:3").unwrap(), (7, 3));
        assert_eq!(parse_id_db_pair("7/3").unwrap(), (7, 3));
        assert!(parse_id_db_pair("").is_err());
    }
}

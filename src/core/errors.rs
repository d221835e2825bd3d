// src/core/errors.rs

//! Defines the primary error type for the entire application.

use std::sync::Arc;
use thiserror::Error;

/// The main error enum, representing all possible failures within the control
/// plane. Using `thiserror` allows for clean error definitions and automatic
/// `From` trait implementations, the same shape as a Redis-protocol error
/// enum keyed on structured variants rather than strings.
#[derive(Error, Debug)]
pub enum RdsError {
    #[error("IO error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("JSON error: {0}")]
    Json(String),

    // --- Validation errors: bad input, rejected before any mutation. ---
    #[error("{0}")]
    Validation(String),

    // --- Precondition errors: caller asked for something that can't apply. ---
    #[error("unknown_instance: no instance with id {0}")]
    InstanceNotFound(u32),

    #[error("instance {0} already exists")]
    InstanceExists(u32),

    #[error("instance is in the wrong state for this operation: {0}")]
    WrongState(String),

    #[error("caller does not hold the required role for this operation: {0}")]
    WrongRole(String),

    #[error("instance is not in the expected replication role: {0}")]
    WrongReplicaRole(String),

    #[error("meta_version {found} is incompatible, expected {expected}")]
    IncompatibleMetaVersion { found: u32, expected: u32 },

    #[error("sentinel is not running on this node")]
    SentinelStopped,

    #[error("unknown_client: no follower record for this caller")]
    UnknownClient,

    #[error("incorrect_request: ip does not match the expected caller")]
    IpMismatch,

    #[error("wrong_auth_token")]
    WrongAuthToken,

    #[error("incompatible_core_version: {0}")]
    IncompatibleCoreVersion(String),

    // --- Transient I/O errors: logged once, retried next tick. ---
    #[error("transient error: {0}")]
    Transient(String),

    // --- Fatal environment errors: refuse to start. ---
    #[error("fatal environment error: {0}")]
    Fatal(String),

    #[error("instance still works and refused to stop")]
    InstanceStillWorks,

    #[error("internal error: {0}")]
    Internal(String),
}

// Manual Clone because `std::io::Error` is not cloneable; wrap it in an Arc
// for cheap shared cloning, the same trick the teacher uses for its own
// io-error variant.
impl Clone for RdsError {
    fn clone(&self) -> Self {
        match self {
            RdsError::Io(e) => RdsError::Io(Arc::clone(e)),
            RdsError::HttpClient(s) => RdsError::HttpClient(s.clone()),
            RdsError::Json(s) => RdsError::Json(s.clone()),
            RdsError::Validation(s) => RdsError::Validation(s.clone()),
            RdsError::InstanceNotFound(id) => RdsError::InstanceNotFound(*id),
            RdsError::InstanceExists(id) => RdsError::InstanceExists(*id),
            RdsError::WrongState(s) => RdsError::WrongState(s.clone()),
            RdsError::WrongRole(s) => RdsError::WrongRole(s.clone()),
            RdsError::WrongReplicaRole(s) => RdsError::WrongReplicaRole(s.clone()),
            RdsError::IncompatibleMetaVersion { found, expected } => {
                RdsError::IncompatibleMetaVersion {
                    found: *found,
                    expected: *expected,
                }
            }
            RdsError::SentinelStopped => RdsError::SentinelStopped,
            RdsError::UnknownClient => RdsError::UnknownClient,
            RdsError::IpMismatch => RdsError::IpMismatch,
            RdsError::WrongAuthToken => RdsError::WrongAuthToken,
            RdsError::IncompatibleCoreVersion(s) => RdsError::IncompatibleCoreVersion(s.clone()),
            RdsError::Transient(s) => RdsError::Transient(s.clone()),
            RdsError::Fatal(s) => RdsError::Fatal(s.clone()),
            RdsError::InstanceStillWorks => RdsError::InstanceStillWorks,
            RdsError::Internal(s) => RdsError::Internal(s.clone()),
        }
    }
}

impl From<std::io::Error> for RdsError {
    fn from(e: std::io::Error) -> Self {
        RdsError::Io(Arc::new(e))
    }
}

impl From<reqwest::Error> for RdsError {
    fn from(e: reqwest::Error) -> Self {
        RdsError::HttpClient(e.to_string())
    }
}

impl From<serde_json::Error> for RdsError {
    fn from(e: serde_json::Error) -> Self {
        RdsError::Json(e.to_string())
    }
}

impl From<std::num::ParseIntError> for RdsError {
    fn from(e: std::num::ParseIntError) -> Self {
        RdsError::Validation(format!("not an integer: {e}"))
    }
}

/// Maps an [`RdsError`] onto the wire error code taxonomy from the control
/// API (`wrong_args`, `unknown_instance`, ...).
impl RdsError {
    pub fn wire_code(&self) -> &'static str {
        match self {
            RdsError::Validation(_) => "wrong_args",
            RdsError::InstanceNotFound(_) => "unknown_instance",
            RdsError::InstanceExists(_) => "wrong_args",
            RdsError::WrongState(_) | RdsError::WrongReplicaRole(_) => "wrong_args",
            RdsError::WrongRole(_) => "wrong_args",
            RdsError::IncompatibleMetaVersion { .. } => "incompatible_core_version",
            RdsError::SentinelStopped => "wrong_args",
            RdsError::UnknownClient => "unknown_client",
            RdsError::IpMismatch => "incorrect_request",
            RdsError::WrongAuthToken => "wrong_auth_token",
            RdsError::IncompatibleCoreVersion(_) => "incompatible_core_version",
            _ => "unknown_error",
        }
    }
}

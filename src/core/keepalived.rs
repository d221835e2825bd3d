// src/core/keepalived.rs

//! Virtual-IP state and system-configuration checks are external
//! collaborators (spec.md §1: "low-level OS integrations ... keepalived
//! queries" are out of scope for the core). This module gives them a
//! trait boundary plus the minimal concrete checks the control plane itself
//! needs to perform at startup (spec.md §7 "Fatal environment errors":
//! THP enabled, kernel misconfiguration).

use crate::core::errors::RdsError;

/// Whether this node currently holds the cluster's virtual IP. A real
/// deployment queries `keepalived`'s state file or its `vrrp_script`
/// output; this crate only needs the boolean, not keepalived's own
/// configuration surface.
pub trait VirtualIpState: Send + Sync {
    fn holds_virtual_ip(&self) -> Result<bool, RdsError>;
}

/// A `VirtualIpState` for nodes that don't run keepalived at all — always
/// reports "not holding" since there is no VIP to hold.
pub struct NoKeepalived;

impl VirtualIpState for NoKeepalived {
    fn holds_virtual_ip(&self) -> Result<bool, RdsError> {
        Ok(false)
    }
}

/// Reads `/proc/sys/kernel/mm/transparent_hugepage/enabled` and reports
/// whether THP is set to `always` (the Redis-recommended-against setting).
/// A fatal environment error per spec.md §7 if misconfigured and the caller
/// chooses to treat it as blocking.
pub fn transparent_hugepage_enabled() -> Result<bool, RdsError> {
    let path = "/sys/kernel/mm/transparent_hugepage/enabled";
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(contents.contains("[always]")),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Reads `vm.overcommit_memory` and reports whether it is set to the
/// Redis-recommended `1` (always overcommit).
pub fn overcommit_memory_is_recommended() -> Result<bool, RdsError> {
    let path = "/proc/sys/vm/overcommit_memory";
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(contents.trim() == "1"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(true),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_keepalived_never_holds_the_vip() {
        assert!(!NoKeepalived.holds_virtual_ip().unwrap());
    }
}

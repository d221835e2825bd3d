// src/core/lifecycle/template.rs

//! The on-disk template renderer is an external collaborator (spec.md §1):
//! "render a template" is all the core needs from it. This module defines
//! the trait boundary and a minimal concrete renderer good enough to drive
//! the lifecycle tests without depending on a real templating engine.

use crate::core::errors::RdsError;
use crate::core::instance::model::Instance;

/// Renders a Redis configuration file for an instance, keyed by the
/// major.minor Redis version the config targets.
pub trait ConfigTemplate: Send + Sync {
    fn render(&self, instance: &Instance, redis_version: &str, port: u16) -> Result<String, RdsError>;
}

/// A minimal renderer producing a valid `redis.conf` body from instance
/// metadata. Real deployments are expected to swap in a richer templating
/// engine; this one only needs to be correct enough for the control plane's
/// own tests and for driving a real `redis-server` in the simple cases.
pub struct DefaultTemplate;

impl ConfigTemplate for DefaultTemplate {
    fn render(&self, instance: &Instance, redis_version: &str, port: u16) -> Result<String, RdsError> {
        let mut out = String::new();
        out.push_str(&format!("# rendered for redis {redis_version}\n"));
        out.push_str(&format!("port {port}\n"));
        out.push_str(&format!("dir {}\n", instance.id));
        out.push_str(&format!(
            "requirepass {}\n",
            instance.preferencies.admin
        ));
        out.push_str(&format!("masterauth {}\n", instance.preferencies.sync));
        if instance.is_save_disabled {
            out.push_str("save \"\"\n");
            out.push_str("appendonly no\n");
        }
        Ok(out)
    }
}

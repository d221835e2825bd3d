// src/core/lifecycle/mod.rs

//! Local instance lifecycle: render config, spawn/stop/kill the Redis
//! child process, and detect extended runtime states.

pub mod ops;
pub mod process;
pub mod runtime_state;
pub mod template;

pub use ops::{InstancePaths, LifecycleOps, LifecycleRoots, instance_port};
pub use template::{ConfigTemplate, DefaultTemplate};

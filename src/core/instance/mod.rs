// src/core/instance/mod.rs

//! Instance metadata: the `Instance` record itself, its runtime `State`
//! bitfield, the on-disk metadata store with id allocation, and the TTL
//! metadata cache sitting in front of it.

pub mod cache;
pub mod model;
pub mod state;
pub mod store;

pub use cache::MetadataCache;
pub use model::{Auth, ConfigInfo, Instance, Preferencies, ReplicationType};
pub use state::{BaseState, ExtendedFlags, State};
pub use store::MetadataStore;

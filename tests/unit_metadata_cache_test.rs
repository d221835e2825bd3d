//! Black-box tests for the metadata TTL cache through the public crate API.

use rds::core::instance::cache::MetadataCache;
use rds::core::instance::model::{Auth, ConfigInfo, Instance, Preferencies, ReplicationType};
use rds::core::instance::state::State;
use std::collections::HashMap;
use std::time::Duration;

fn sample_instance(id: u32) -> Instance {
    Instance {
        id,
        uuid: format!("uuid-{id}"),
        desc: "test instance".to_string(),
        tags: vec!["prod".to_string()],
        created: 0,
        compatible: "7.2".to_string(),
        replication_type: ReplicationType::Replica,
        is_save_disabled: false,
        auth: Auth {
            user: "default".to_string(),
            pepper: "p".to_string(),
            hash: "h".to_string(),
        },
        preferencies: Preferencies::default(),
        config_info: ConfigInfo::default(),
        storage: HashMap::new(),
        meta_version: rds::core::instance::model::CURRENT_META_VERSION,
        state: State::stopped(),
    }
}

#[test]
fn a_miss_on_an_empty_cache_returns_none() {
    let cache = MetadataCache::new(Duration::from_secs(5));
    assert!(cache.get(42).is_none());
}

#[test]
fn set_then_get_round_trips_the_value() {
    let cache = MetadataCache::new(Duration::from_secs(5));
    cache.set(sample_instance(7));
    let fetched = cache.get(7).unwrap();
    assert_eq!(fetched.id, 7);
    assert_eq!(fetched.uuid, "uuid-7");
}

#[test]
fn invalidate_removes_a_cached_entry_immediately() {
    let cache = MetadataCache::new(Duration::from_secs(5));
    cache.set(sample_instance(3));
    cache.invalidate(3);
    assert!(cache.get(3).is_none());
}

#[test]
fn set_overwrites_a_prior_entry_for_the_same_id() {
    let cache = MetadataCache::new(Duration::from_secs(5));
    cache.set(sample_instance(1));
    let mut updated = sample_instance(1);
    updated.desc = "changed".to_string();
    cache.set(updated);
    assert_eq!(cache.get(1).unwrap().desc, "changed");
}

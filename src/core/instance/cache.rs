// src/core/instance/cache.rs

//! A thread-safe TTL cache in front of the metadata store. `get` returns a
//! deep clone so callers can never mutate cached state through a shared
//! reference; `set` refreshes the entry's timestamp; stale entries are
//! lazily pruned on every write and on every miss-after-hit.

use crate::core::instance::model::Instance;
use dashmap::DashMap;
use std::time::{Duration, Instant};

const DEFAULT_TTL: Duration = Duration::from_secs(5);

struct CacheEntry {
    value: Instance,
    inserted_at: Instant,
}

/// `Instance` is already plain data (`Vec`/`HashMap` own their storage), so a
/// `Clone` of the struct is a genuine deep clone: `tags` and `storage` are
/// duplicated, never aliased, which is what keeps a cache read from leaking
/// mutations back into the cached entry.
pub struct MetadataCache {
    entries: DashMap<u32, CacheEntry>,
    ttl: Duration,
}

impl Default for MetadataCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl MetadataCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    fn is_stale(&self, entry: &CacheEntry) -> bool {
        entry.inserted_at.elapsed() > self.ttl
    }

    /// Returns a deep clone of the cached instance if present and fresh.
    pub fn get(&self, id: u32) -> Option<Instance> {
        let mut stale = false;
        let result = self.entries.get(&id).and_then(|entry| {
            if self.is_stale(&entry) {
                stale = true;
                None
            } else {
                Some(entry.value.clone())
            }
        });
        if stale {
            self.entries.remove(&id);
        }
        result
    }

    /// Inserts or refreshes an entry's timestamp, then prunes any other
    /// stale entries.
    pub fn set(&self, instance: Instance) {
        let id = instance.id;
        self.entries.insert(
            id,
            CacheEntry {
                value: instance,
                inserted_at: Instant::now(),
            },
        );
        self.prune_stale();
    }

    pub fn invalidate(&self, id: u32) {
        self.entries.remove(&id);
    }

    fn prune_stale(&self) {
        self.entries.retain(|_, entry| !self.is_stale(entry));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::instance::model::{Auth, ConfigInfo, Preferencies, ReplicationType};
    use crate::core::instance::state::State;
    use std::collections::HashMap;
    use std::thread::sleep;

    fn sample(id: u32) -> Instance {
        Instance {
            id,
            uuid: format!("uuid-{id}"),
            desc: "test".to_string(),
            tags: vec!["a".to_string()],
            created: 1,
            compatible: "7.2".to_string(),
            replication_type: ReplicationType::Replica,
            is_save_disabled: false,
            auth: Auth {
                user: "admin".to_string(),
                pepper: "pepper".to_string(),
                hash: "hash".to_string(),
            },
            preferencies: Preferencies::default(),
            config_info: ConfigInfo::default(),
            storage: {
                let mut m = HashMap::new();
                m.insert("k".to_string(), "v".to_string());
                m
            },
            meta_version: crate::core::instance::model::CURRENT_META_VERSION,
            state: State::stopped(),
        }
    }

    #[test]
    fn get_returns_a_deep_clone() {
        let cache = MetadataCache::default();
        cache.set(sample(1));
        let mut fetched = cache.get(1).unwrap();
        fetched.tags.push("mutated".to_string());
        fetched.storage.insert("new".to_string(), "val".to_string());

        let fetched_again = cache.get(1).unwrap();
        assert_eq!(fetched_again.tags, vec!["a".to_string()]);
        assert!(!fetched_again.storage.contains_key("new"));
    }

    #[test]
    fn entries_expire_after_ttl() {
        let cache = MetadataCache::new(Duration::from_millis(10));
        cache.set(sample(2));
        sleep(Duration::from_millis(30));
        assert!(cache.get(2).is_none());
    }

    #[test]
    fn miss_prunes_the_stale_entry() {
        let cache = MetadataCache::new(Duration::from_millis(10));
        cache.set(sample(3));
        sleep(Duration::from_millis(30));
        assert!(cache.get(3).is_none());
        assert_eq!(cache.entries.len(), 0);
    }
}

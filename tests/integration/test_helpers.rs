//! Test helpers and utilities for integration tests.

use rds::config::Config;
use rds::core::api::{MasterState, SuperuserAuth};
use rds::core::commandlog::{CommandQueue, FollowerRegistry};
use rds::core::instance::model::{Auth, ConfigInfo, Instance, Preferencies, ReplicationType};
use rds::core::instance::state::State;
use rds::core::instance::{MetadataCache, MetadataStore};
use rds::core::lifecycle::ops::{LifecycleOps, LifecycleRoots};
use rds::core::lifecycle::template::DefaultTemplate;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;
use tempfile::TempDir;

/// An in-process master: a real `MasterState` backed by a tempdir, built
/// the same way `server::master::run` builds one, minus the axum listener.
/// Tests call the handler functions in `rds::core::api::handlers` directly,
/// passing hand-built extractors, so they exercise real business logic
/// without going through a TCP socket.
pub struct TestMaster {
    pub state: Arc<MasterState>,
    _root: TempDir,
}

impl TestMaster {
    pub async fn new() -> Self {
        Self::with_token(&"a".repeat(64)).await
    }

    pub async fn with_token(token: &str) -> Self {
        let root = tempfile::tempdir().expect("tempdir");
        let meta_dir = root.path().join("meta");
        let ids_dat = root.path().join("ids.dat");

        let config_path = root.path().join("rds.toml");
        let toml_body = format!(
            "[main]\nrole = \"master\"\ntoken = \"{token}\"\nmaster_ip = \"127.0.0.1\"\n"
        );
        tokio::fs::write(&config_path, toml_body).await.expect("write test config");
        let config = Config::from_file(config_path.to_str().unwrap()).expect("valid test config");

        let ops = LifecycleOps {
            store: MetadataStore::new(meta_dir, ids_dat, 1024, false),
            cache: MetadataCache::new(Duration::from_secs(5)),
            template: Arc::new(DefaultTemplate),
            roots: LifecycleRoots {
                config_dir: root.path().join("instances"),
                data_dir: root.path().join("data"),
                log_dir: root.path().join("log"),
                pid_dir: root.path().join("pid"),
            },
            redis_binary: "/bin/true".to_string(),
            redis_user: "redis".to_string(),
            start_port: 20000,
            delay_start: Duration::from_secs(1),
            delay_stop: Duration::from_secs(1),
        };

        let state = Arc::new(MasterState {
            config: Arc::new(config),
            queue: CommandQueue::new(),
            followers: FollowerRegistry::default(),
            ops,
            redis_version: "7.2".to_string(),
            superuser: parking_lot::RwLock::new(SuperuserAuth::generate()),
            sentinel_active: AtomicBool::new(false),
            version: env!("CARGO_PKG_VERSION").to_string(),
        });

        Self { state, _root: root }
    }
}

/// A `LifecycleOps` backed by a fresh tempdir, good enough to exercise
/// `create`/`regen`/`destroy` without a real `redis-server` binary (those
/// operations never spawn a process; only `start` does).
pub fn test_lifecycle_ops() -> (LifecycleOps, TempDir) {
    let root = tempfile::tempdir().expect("tempdir");
    let meta_dir = root.path().join("meta");
    let ids_dat = root.path().join("ids.dat");

    let ops = LifecycleOps {
        store: MetadataStore::new(meta_dir, ids_dat, 1024, false),
        cache: MetadataCache::new(Duration::from_secs(5)),
        template: Arc::new(DefaultTemplate),
        roots: LifecycleRoots {
            config_dir: root.path().join("instances"),
            data_dir: root.path().join("data"),
            log_dir: root.path().join("log"),
            pid_dir: root.path().join("pid"),
        },
        redis_binary: "/bin/true".to_string(),
        redis_user: "redis".to_string(),
        start_port: 20000,
        delay_start: Duration::from_secs(1),
        delay_stop: Duration::from_secs(1),
    };
    (ops, root)
}

pub fn sample_instance(id: u32, uuid: &str) -> Instance {
    Instance {
        id,
        uuid: uuid.to_string(),
        desc: format!("instance {id}"),
        tags: vec![],
        created: 0,
        compatible: "7.2".to_string(),
        replication_type: ReplicationType::Standby,
        is_save_disabled: false,
        auth: Auth {
            user: "default".to_string(),
            pepper: "pepper".to_string(),
            hash: "hash".to_string(),
        },
        preferencies: Preferencies::default(),
        config_info: ConfigInfo::default(),
        storage: HashMap::new(),
        meta_version: rds::core::instance::model::CURRENT_META_VERSION,
        state: State::stopped(),
    }
}

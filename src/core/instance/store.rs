// src/core/instance/store.rs

//! On-disk instance metadata store: one JSON file per instance under
//! `meta_dir/<id>`, plus the id allocator backed by `main_dir/ids.dat`.

use crate::core::errors::RdsError;
use crate::core::instance::model::Instance;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// Owns the metadata directory and the `ids.dat` allocator file.
pub struct MetadataStore {
    meta_dir: PathBuf,
    ids_dat: PathBuf,
    max_id: u32,
    reuse_ids: bool,
}

impl MetadataStore {
    pub fn new(meta_dir: impl Into<PathBuf>, ids_dat: impl Into<PathBuf>, max_id: u32, reuse_ids: bool) -> Self {
        Self {
            meta_dir: meta_dir.into(),
            ids_dat,
            max_id,
            reuse_ids,
        }
    }

    fn path_for(&self, id: u32) -> PathBuf {
        self.meta_dir.join(id.to_string())
    }

    /// Loads a single instance's metadata from disk, if present.
    pub fn load(&self, id: u32) -> Result<Option<Instance>, RdsError> {
        let path = self.path_for(id);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path)?;
        let instance: Instance = serde_json::from_slice(&bytes)?;
        instance.validate_invariants()?;
        Ok(Some(instance))
    }

    /// Loads every instance currently on disk. Files that fail to parse are
    /// skipped with a warning rather than aborting the whole load — a single
    /// corrupt file must not take down the registry.
    pub fn load_all(&self) -> Result<Vec<Instance>, RdsError> {
        let mut out = Vec::new();
        if !self.meta_dir.exists() {
            return Ok(out);
        }
        for entry in fs::read_dir(&self.meta_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if name.parse::<u32>().is_err() {
                continue;
            }
            let bytes = fs::read(entry.path())?;
            match serde_json::from_slice::<Instance>(&bytes) {
                Ok(instance) => {
                    if instance.validate_invariants().is_ok() {
                        out.push(instance);
                    } else {
                        tracing::warn!(file = %name, "skipping metadata file with invalid invariants");
                    }
                }
                Err(e) => {
                    tracing::warn!(file = %name, error = %e, "skipping unparseable metadata file");
                }
            }
        }
        Ok(out)
    }

    /// Atomically writes an instance's metadata: write to a temp file, set
    /// mode 0600, then rename over the final path so readers never observe
    /// a partially written file.
    pub fn save(&self, instance: &Instance) -> Result<(), RdsError> {
        fs::create_dir_all(&self.meta_dir)?;
        let final_path = self.path_for(instance.id);
        let tmp_path = self.meta_dir.join(format!(".{}.tmp", instance.id));
        let bytes = serde_json::to_vec_pretty(instance)?;
        fs::write(&tmp_path, &bytes)?;
        set_mode(&tmp_path, 0o600)?;
        fs::rename(&tmp_path, &final_path)?;
        Ok(())
    }

    /// Removes an instance's metadata file. Idempotent: missing files are
    /// not an error.
    pub fn delete(&self, id: u32) -> Result<(), RdsError> {
        let path = self.path_for(id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Allocates the next instance id.
    ///
    /// With id reuse enabled, returns the lowest free id in `[1, max_id]`.
    /// Otherwise returns one past the last-ever-used id, persisted in
    /// `ids.dat`, ignoring any gaps left by destroyed instances.
    pub fn allocate_id(&self, existing: &HashSet<u32>) -> Result<u32, RdsError> {
        if self.reuse_ids {
            for candidate in 1..=self.max_id {
                if !existing.contains(&candidate) {
                    return Ok(candidate);
                }
            }
            return Err(RdsError::Validation(format!(
                "no free instance id in [1, {}]",
                self.max_id
            )));
        }

        let last = self.read_last_allocated()?;
        let next = last + 1;
        if next > self.max_id {
            return Err(RdsError::Validation(format!(
                "no free instance id: next id {next} exceeds max {}",
                self.max_id
            )));
        }
        self.write_last_allocated(next)?;
        Ok(next)
    }

    fn read_last_allocated(&self) -> Result<u32, RdsError> {
        match fs::read_to_string(&self.ids_dat) {
            Ok(s) => Ok(s.trim().parse().unwrap_or(0)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn write_last_allocated(&self, id: u32) -> Result<(), RdsError> {
        if let Some(parent) = self.ids_dat.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.ids_dat, id.to_string())?;
        Ok(())
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<(), RdsError> {
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(mode);
    fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<(), RdsError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::instance::model::{Auth, ConfigInfo, Preferencies, ReplicationType};
    use crate::core::instance::state::State;
    use std::collections::HashMap;

    fn sample(id: u32) -> Instance {
        Instance {
            id,
            uuid: format!("uuid-{id}"),
            desc: "test".to_string(),
            tags: vec![],
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
            storage: HashMap::new(),
            meta_version: crate::core::instance::model::CURRENT_META_VERSION,
            state: State::stopped(),
        }
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetadataStore::new(dir.path().join("meta"), dir.path().join("ids.dat"), 1024, true);
        let instance = sample(7);
        store.save(&instance).unwrap();
        let loaded = store.load(7).unwrap().unwrap();
        assert_eq!(loaded, instance);
    }

    #[test]
    fn save_is_byte_identical_on_repeat() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetadataStore::new(dir.path().join("meta"), dir.path().join("ids.dat"), 1024, true);
        let instance = sample(3);
        store.save(&instance).unwrap();
        let first = fs::read(dir.path().join("meta").join("3")).unwrap();
        store.save(&instance).unwrap();
        let second = fs::read(dir.path().join("meta").join("3")).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn allocate_id_reuse_picks_lowest_free() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetadataStore::new(dir.path().join("meta"), dir.path().join("ids.dat"), 4, true);
        let mut existing = HashSet::new();
        existing.insert(1u32);
        existing.insert(3u32);
        assert_eq!(store.allocate_id(&existing).unwrap(), 2);
    }

    #[test]
    fn allocate_id_monotonic_ignores_gaps() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetadataStore::new(dir.path().join("meta"), dir.path().join("ids.dat"), 10, false);
        let existing: HashSet<u32> = [1, 2].into_iter().collect();
        assert_eq!(store.allocate_id(&existing).unwrap(), 1);
        let existing2: HashSet<u32> = [].into_iter().collect();
        assert_eq!(store.allocate_id(&existing2).unwrap(), 2);
    }

    #[test]
    fn delete_missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetadataStore::new(dir.path().join("meta"), dir.path().join("ids.dat"), 10, true);
        assert!(store.delete(99).is_ok());
    }
}

//! Model Registry - persisted artifacts and the set currently served
//!
//! The served set lives behind an `Arc` that is swapped whole. Readers take a
//! snapshot per tick, so a retrain that lands mid-tick is only seen by the next
//! one.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use tracing::{debug, info, warn};

use crate::error::RegistryError;
use crate::model::{ModelArtifact, ModelSet};
use crate::types::{PerTarget, Target};

/// Persisted model set plus the in-memory snapshot used for prediction
#[derive(Debug)]
pub struct ModelRegistry {
    models_dir: PathBuf,
    current: RwLock<Option<Arc<ModelSet>>>,
    /// Held while artifacts on disk are read or replaced
    commit_lock: Mutex<()>,
}

impl ModelRegistry {
    pub fn new(models_dir: impl Into<PathBuf>) -> Self {
        Self {
            models_dir: models_dir.into(),
            current: RwLock::new(None),
            commit_lock: Mutex::new(()),
        }
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    pub fn artifact_path(&self, target: Target) -> PathBuf {
        self.models_dir.join(target.artifact_file())
    }

    /// True when all three artifacts are on disk
    pub fn artifacts_exist(&self) -> bool {
        Target::ALL.iter().all(|t| self.artifact_path(*t).exists())
    }

    fn read_artifact(&self, target: Target) -> Result<ModelArtifact, RegistryError> {
        let path = self.artifact_path(target);
        let bytes = std::fs::read(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => RegistryError::Missing { target, path: path.clone() },
            _ => RegistryError::Io { target, source: e },
        })?;
        let artifact: ModelArtifact = serde_json::from_slice(&bytes)
            .map_err(|source| RegistryError::Corrupt { target, path: path.clone(), source })?;
        if artifact.target != target {
            warn!("{} holds a {} model", path.display(), artifact.target);
        }
        Ok(artifact)
    }

    /// Read all three artifacts without touching the served set
    pub fn read_all(&self) -> Result<ModelSet, RegistryError> {
        let _commit = self.lock_commits();
        PerTarget::try_from_fn(|target| self.read_artifact(target))
    }

    /// Read all artifacts and serve them. Fails if any is missing or corrupt,
    /// in which case the previous set stays in service.
    pub fn load(&self) -> Result<Arc<ModelSet>, RegistryError> {
        let set = self.reload()?;
        info!("ML models loaded from {}", self.models_dir.display());
        Ok(set)
    }

    /// Re-read from disk and swap the served set. Commits are held off while
    /// reading, so the three artifacts always come from one pass. On failure
    /// the previous set stays in service.
    pub fn reload(&self) -> Result<Arc<ModelSet>, RegistryError> {
        let _commit = self.lock_commits();
        let set = Arc::new(PerTarget::try_from_fn(|target| self.read_artifact(target))?);
        self.install(set.clone());
        debug!("Model registry reloaded from {}", self.models_dir.display());
        Ok(set)
    }

    fn install(&self, set: Arc<ModelSet>) {
        let mut current = self.current.write().unwrap_or_else(|p| p.into_inner());
        *current = Some(set);
    }

    fn lock_commits(&self) -> MutexGuard<'_, ()> {
        self.commit_lock.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// The set to use for one prediction cycle
    pub fn snapshot(&self) -> Option<Arc<ModelSet>> {
        self.current.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Persist a freshly fitted set and serve exactly that set. Disk and
    /// memory change together; overlapping commits are serialised, so the
    /// served set always comes from a single training pass.
    pub fn commit(&self, set: ModelSet) -> std::io::Result<Arc<ModelSet>> {
        let _commit = self.lock_commits();
        self.write_set(&set)?;
        let set = Arc::new(set);
        self.install(set.clone());
        debug!("Model registry swapped to freshly trained set");
        Ok(set)
    }

    /// Write a complete set to disk without serving it
    pub fn persist(&self, set: &ModelSet) -> std::io::Result<()> {
        let _commit = self.lock_commits();
        self.write_set(set)
    }

    /// Every artifact is staged to a temporary file first. Live files are then
    /// replaced one by one, each moved aside until the last rename lands; any
    /// failure puts the previous files back.
    fn write_set(&self, set: &ModelSet) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.models_dir)?;
        let generation = uuid::Uuid::new_v4();

        let mut staged: Vec<(PathBuf, PathBuf)> = Vec::with_capacity(Target::ALL.len());
        for (target, artifact) in set.iter() {
            let live = self.artifact_path(target);
            let tmp = self
                .models_dir
                .join(format!(".{}.{}.tmp", target.artifact_file(), generation));
            let written = serde_json::to_vec(artifact)
                .map_err(std::io::Error::other)
                .and_then(|bytes| std::fs::write(&tmp, bytes));
            if let Err(e) = written {
                let _ = std::fs::remove_file(&tmp);
                discard(&staged);
                return Err(e);
            }
            staged.push((tmp, live));
        }

        let mut swapped: Vec<(PathBuf, Option<PathBuf>)> = Vec::with_capacity(staged.len());
        for (i, (tmp, live)) in staged.iter().enumerate() {
            let backup = if live.exists() {
                let name = live.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
                let backup = self.models_dir.join(format!(".{}.{}.bak", name, generation));
                if let Err(e) = std::fs::rename(live, &backup) {
                    restore(&swapped);
                    discard(&staged[i..]);
                    return Err(e);
                }
                Some(backup)
            } else {
                None
            };

            if let Err(e) = std::fs::rename(tmp, live) {
                if let Some(backup) = &backup {
                    let _ = std::fs::rename(backup, live);
                }
                restore(&swapped);
                discard(&staged[i..]);
                return Err(e);
            }
            swapped.push((live.clone(), backup));
        }

        for backup in swapped.iter().filter_map(|(_, backup)| backup.as_ref()) {
            let _ = std::fs::remove_file(backup);
        }
        debug!("Persisted {} model artifacts", swapped.len());
        Ok(())
    }
}

fn discard(staged: &[(PathBuf, PathBuf)]) {
    for (tmp, _) in staged {
        let _ = std::fs::remove_file(tmp);
    }
}

/// Undo renames already applied by a failed commit
fn restore(swapped: &[(PathBuf, Option<PathBuf>)]) {
    for (live, backup) in swapped.iter().rev() {
        match backup {
            Some(backup) => {
                if let Err(e) = std::fs::rename(backup, live) {
                    warn!("Could not restore {}: {}", live.display(), e);
                }
            }
            None => {
                let _ = std::fs::remove_file(live);
            }
        }
    }
}

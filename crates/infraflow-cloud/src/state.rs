//! Persisted reconciliation state
//!
//! Each cluster keeps its flat key/value state in
//! `.infraflow/<cluster>.json`, written through a temporary file and renamed
//! into place. The previous file is kept as a backup and
//! concurrent runs on the same machine are fenced with an advisory lock file.

use crate::error::{CloudError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;

const STATE_VERSION: u32 = 1;
const STATE_DIR: &str = ".infraflow";
const LOCK_STALE_AFTER_HOURS: i64 = 1;

/// Writes the exported flat state of a run
#[async_trait]
pub trait StatePersister: Send + Sync {
    async fn persist(&self, state: &BTreeMap<String, String>) -> Result<()>;
}

/// State file contents for one cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterState {
    /// State file version
    pub version: u32,

    /// Last modified timestamp
    pub updated_at: DateTime<Utc>,

    pub cluster: String,

    /// Whiteboard export
    #[serde(default)]
    pub flat_state: BTreeMap<String, String>,
}

impl ClusterState {
    pub fn new(cluster: impl Into<String>) -> Self {
        Self {
            version: STATE_VERSION,
            updated_at: Utc::now(),
            cluster: cluster.into(),
            flat_state: BTreeMap::new(),
        }
    }

    pub fn with_flat_state(mut self, flat_state: BTreeMap<String, String>) -> Self {
        self.flat_state = flat_state;
        self
    }
}

/// File-backed state store for one cluster
#[derive(Debug, Clone)]
pub struct FileStateStore {
    /// Directory that contains `.infraflow/`
    project_root: PathBuf,
    cluster: String,
}

impl FileStateStore {
    pub fn new(project_root: impl AsRef<Path>, cluster: impl Into<String>) -> Self {
        Self {
            project_root: project_root.as_ref().to_path_buf(),
            cluster: cluster.into(),
        }
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    fn state_dir(&self) -> PathBuf {
        self.project_root.join(STATE_DIR)
    }

    pub fn state_path(&self) -> PathBuf {
        self.state_dir().join(format!("{}.json", self.cluster))
    }

    fn backup_path(&self) -> PathBuf {
        self.state_dir().join(format!("{}.json.backup", self.cluster))
    }

    fn temp_path(&self) -> PathBuf {
        self.state_dir().join(format!("{}.json.tmp", self.cluster))
    }

    fn lock_path(&self) -> PathBuf {
        self.state_dir().join(format!("{}.lock", self.cluster))
    }

    async fn ensure_state_dir(&self) -> Result<()> {
        let dir = self.state_dir();
        if !dir.exists() {
            fs::create_dir_all(&dir).await?;
            tracing::debug!("Created state directory: {}", dir.display());
        }
        Ok(())
    }

    /// Load the state, or an empty one if no file exists yet.
    ///
    /// Without a state file the backup is used when one exists.
    pub async fn load(&self) -> Result<ClusterState> {
        let mut path = self.state_path();
        if !path.exists() {
            let backup = self.backup_path();
            if !backup.exists() {
                tracing::debug!(cluster = %self.cluster, "State file not found, returning empty state");
                return Ok(ClusterState::new(&self.cluster));
            }
            tracing::warn!(
                cluster = %self.cluster,
                "State file missing, loading backup {}",
                backup.display()
            );
            path = backup;
        }

        let content = fs::read_to_string(&path).await?;
        let state: ClusterState = serde_json::from_str(&content)?;

        if state.version > STATE_VERSION {
            return Err(CloudError::State(format!(
                "State file version {} is newer than supported version {}",
                state.version, STATE_VERSION
            )));
        }
        if state.cluster != self.cluster {
            return Err(CloudError::State(format!(
                "State file {} belongs to cluster {:?}, expected {:?}",
                path.display(),
                state.cluster,
                self.cluster
            )));
        }

        tracing::debug!(
            cluster = %self.cluster,
            keys = state.flat_state.len(),
            "Loaded state"
        );
        Ok(state)
    }

    pub async fn load_flat_state(&self) -> Result<BTreeMap<String, String>> {
        Ok(self.load().await?.flat_state)
    }

    pub async fn save(&self, state: &ClusterState) -> Result<()> {
        self.ensure_state_dir().await?;

        let path = self.state_path();
        let temp = self.temp_path();

        let content = serde_json::to_string_pretty(state)?;
        fs::write(&temp, content).await?;

        if path.exists() {
            fs::copy(&path, self.backup_path()).await?;
            tracing::debug!("Created state backup");
        }
        fs::rename(&temp, &path).await?;

        tracing::debug!(
            cluster = %self.cluster,
            keys = state.flat_state.len(),
            "Saved state"
        );
        Ok(())
    }

    /// Remove the state file and its backup. Returns whether a state file existed.
    pub async fn clear(&self) -> Result<bool> {
        let path = self.state_path();
        let existed = path.exists();
        if existed {
            fs::remove_file(&path).await?;
        }
        for leftover in [self.backup_path(), self.temp_path()] {
            if leftover.exists() {
                fs::remove_file(&leftover).await?;
            }
        }
        tracing::debug!(cluster = %self.cluster, existed, "Cleared state");
        Ok(existed)
    }

    /// Acquire the advisory lock for this cluster
    pub async fn acquire_lock(&self) -> Result<StateLock> {
        self.ensure_state_dir().await?;

        let lock_path = self.lock_path();

        if lock_path.exists() {
            let content = fs::read_to_string(&lock_path).await?;
            let lock_info: LockInfo = serde_json::from_str(&content)?;

            let age = Utc::now().signed_duration_since(lock_info.acquired_at);
            if age.num_hours() < LOCK_STALE_AFTER_HOURS {
                return Err(CloudError::Lock(format!(
                    "State of {} is locked by {} since {}",
                    self.cluster, lock_info.holder, lock_info.acquired_at
                )));
            }

            tracing::warn!("Removing stale lock from {}", lock_info.holder);
        }

        let lock_info = LockInfo {
            holder: std::env::var("HOSTNAME")
                .or_else(|_| std::env::var("HOST"))
                .unwrap_or_else(|_| "unknown".to_string()),
            acquired_at: Utc::now(),
        };

        let content = serde_json::to_string_pretty(&lock_info)?;
        fs::write(&lock_path, content).await?;

        tracing::debug!(cluster = %self.cluster, "Acquired state lock");
        Ok(StateLock {
            lock_path,
            released: false,
        })
    }
}

#[async_trait]
impl StatePersister for FileStateStore {
    async fn persist(&self, state: &BTreeMap<String, String>) -> Result<()> {
        self.save(&ClusterState::new(&self.cluster).with_flat_state(state.clone()))
            .await
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    holder: String,
    acquired_at: DateTime<Utc>,
}

/// RAII guard for the state lock
pub struct StateLock {
    lock_path: PathBuf,
    released: bool,
}

impl StateLock {
    pub async fn release(mut self) -> Result<()> {
        if !self.released {
            if self.lock_path.exists() {
                fs::remove_file(&self.lock_path).await?;
                tracing::debug!("Released state lock");
            }
            self.released = true;
        }
        Ok(())
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if !self.released && self.lock_path.exists() {
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_state_save_load() {
        let temp_dir = tempdir().unwrap();
        let store = FileStateStore::new(temp_dir.path(), "shoot--dev--a");

        let mut flat = BTreeMap::new();
        flat.insert("Network".to_string(), "n-1".to_string());
        flat.insert("Subnet".to_string(), "<deleted>".to_string());
        store.persist(&flat).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.cluster, "shoot--dev--a");
        assert_eq!(loaded.flat_state, flat);
        assert!(store.state_path().ends_with(".infraflow/shoot--dev--a.json"));
    }

    #[tokio::test]
    async fn test_save_keeps_backup() {
        let temp_dir = tempdir().unwrap();
        let store = FileStateStore::new(temp_dir.path(), "c");

        store.persist(&BTreeMap::new()).await.unwrap();
        store.persist(&BTreeMap::new()).await.unwrap();
        assert!(store.backup_path().exists());

        assert!(store.clear().await.unwrap());
        assert!(!store.backup_path().exists());
        assert!(!store.clear().await.unwrap());
    }

    #[tokio::test]
    async fn test_load_falls_back_to_backup() {
        let temp_dir = tempdir().unwrap();
        let store = FileStateStore::new(temp_dir.path(), "c");

        let first = BTreeMap::from([("Network".to_string(), "n-1".to_string())]);
        let second = BTreeMap::from([("Network".to_string(), "n-2".to_string())]);
        store.persist(&first).await.unwrap();
        store.persist(&second).await.unwrap();
        assert!(!store.temp_path().exists());
        assert_eq!(store.load_flat_state().await.unwrap(), second);

        // primary file lost
        std::fs::remove_file(store.state_path()).unwrap();
        assert_eq!(store.load_flat_state().await.unwrap(), first);
    }

    #[tokio::test]
    async fn test_empty_state() {
        let temp_dir = tempdir().unwrap();
        let store = FileStateStore::new(temp_dir.path(), "c");

        let state = store.load().await.unwrap();
        assert!(state.flat_state.is_empty());
    }

    #[tokio::test]
    async fn test_rejects_newer_version() {
        let temp_dir = tempdir().unwrap();
        let store = FileStateStore::new(temp_dir.path(), "c");
        let mut state = ClusterState::new("c");
        state.version = STATE_VERSION + 1;
        store.save(&state).await.unwrap();

        assert!(matches!(store.load().await, Err(CloudError::State(_))));
    }

    #[tokio::test]
    async fn test_lock_is_exclusive() {
        let temp_dir = tempdir().unwrap();
        let store = FileStateStore::new(temp_dir.path(), "c");

        let lock = store.acquire_lock().await.unwrap();
        assert!(matches!(store.acquire_lock().await, Err(CloudError::Lock(_))));
        lock.release().await.unwrap();

        let again = store.acquire_lock().await.unwrap();
        drop(again);
        assert!(store.acquire_lock().await.is_ok());
    }
}

//! Local file backend for state storage
//!
//! Stores state in a JSON file (default: cumulus.state.json) next to a
//! `.lock` file holding the current `LockInfo`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::backend::{BackendConfig, BackendError, BackendResult, StateBackend};
use crate::lock::{DEFAULT_LOCK_TIMEOUT_SECS, LockInfo};
use crate::state::StateFile;

pub struct LocalBackend {
    state_path: PathBuf,
    lock_path: PathBuf,
    lock_timeout_secs: i64,
}

impl LocalBackend {
    pub const DEFAULT_STATE_FILE: &'static str = "cumulus.state.json";

    pub fn new() -> Self {
        Self::with_path(PathBuf::from(Self::DEFAULT_STATE_FILE))
    }

    pub fn with_path(state_path: PathBuf) -> Self {
        let lock_path = state_path.with_extension("lock");
        Self {
            state_path,
            lock_path,
            lock_timeout_secs: DEFAULT_LOCK_TIMEOUT_SECS,
        }
    }

    /// Reads `path` and `lock_timeout` (seconds) from the configuration
    pub fn from_config(config: &BackendConfig) -> BackendResult<Self> {
        let path = config
            .get_string("path")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(Self::DEFAULT_STATE_FILE));
        let mut backend = Self::with_path(path);

        if let Some(secs) = config.get_i64("lock_timeout") {
            if secs <= 0 {
                return Err(BackendError::configuration("lock_timeout must be positive"));
            }
            backend.lock_timeout_secs = secs;
        }
        Ok(backend)
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    async fn read_lock(&self) -> BackendResult<Option<LockInfo>> {
        let content = match fs::read_to_string(&self.lock_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(BackendError::Io(format!("Failed to read lock file: {}", e))),
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| BackendError::InvalidState(format!("Failed to parse lock file: {}", e)))
    }

    async fn remove_lock(&self) -> BackendResult<()> {
        fs::remove_file(&self.lock_path)
            .await
            .map_err(|e| BackendError::Io(format!("Failed to remove lock file: {}", e)))
    }
}

impl Default for LocalBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateBackend for LocalBackend {
    async fn read_state(&self) -> BackendResult<Option<StateFile>> {
        let content = match fs::read_to_string(&self.state_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(BackendError::Io(format!("Failed to read state file: {}", e))),
        };

        let state: StateFile = serde_json::from_str(&content).map_err(|e| {
            BackendError::InvalidState(format!("Failed to parse state file: {}", e))
        })?;
        Ok(Some(state))
    }

    async fn write_state(&self, state: &StateFile) -> BackendResult<()> {
        if let Some(stored) = self.read_state().await? {
            state.check_lineage(&stored)?;
        }

        let content = serde_json::to_string_pretty(state).map_err(|e| {
            BackendError::Serialization(format!("Failed to serialize state: {}", e))
        })?;

        // Write then rename so a crash never leaves a truncated state file
        let tmp_path = self.state_path.with_extension("tmp");
        fs::write(&tmp_path, content)
            .await
            .map_err(|e| BackendError::Io(format!("Failed to write state file: {}", e)))?;
        fs::rename(&tmp_path, &self.state_path)
            .await
            .map_err(|e| BackendError::Io(format!("Failed to write state file: {}", e)))?;

        log::debug!(
            "wrote state serial {} to {}",
            state.serial,
            self.state_path.display()
        );
        Ok(())
    }

    async fn acquire_lock(&self, operation: &str) -> BackendResult<LockInfo> {
        if let Some(existing) = self.read_lock().await? {
            if !existing.is_expired() {
                return Err(BackendError::locked(&existing));
            }
            log::warn!(
                "Replacing expired lock {} held by {}",
                existing.id,
                existing.who
            );
            self.remove_lock().await?;
        }

        let lock = LockInfo::with_timeout(operation, self.lock_timeout_secs);
        let content = serde_json::to_string_pretty(&lock)
            .map_err(|e| BackendError::Serialization(format!("Failed to serialize lock: {}", e)))?;

        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.lock_path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                // Another process won the race
                return match self.read_lock().await? {
                    Some(winner) => Err(BackendError::locked(&winner)),
                    None => Err(BackendError::Io("lock file vanished while locking".into())),
                };
            }
            Err(e) => return Err(BackendError::Io(format!("Failed to write lock file: {}", e))),
        };
        file.write_all(content.as_bytes())
            .await
            .map_err(|e| BackendError::Io(format!("Failed to write lock file: {}", e)))?;
        file.flush()
            .await
            .map_err(|e| BackendError::Io(format!("Failed to write lock file: {}", e)))?;

        Ok(lock)
    }

    async fn release_lock(&self, lock: &LockInfo) -> BackendResult<()> {
        let Some(existing) = self.read_lock().await? else {
            return Err(BackendError::LockNotFound(lock.id.clone()));
        };

        if existing.id != lock.id {
            return Err(BackendError::LockMismatch {
                expected: lock.id.clone(),
                actual: existing.id,
            });
        }
        self.remove_lock().await
    }

    async fn force_unlock(&self, lock_id: &str) -> BackendResult<()> {
        let Some(existing) = self.read_lock().await? else {
            return Err(BackendError::LockNotFound(lock_id.to_string()));
        };

        if existing.id != lock_id {
            return Err(BackendError::LockMismatch {
                expected: lock_id.to_string(),
                actual: existing.id,
            });
        }
        self.remove_lock().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ResourceState;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_local_backend_read_write() {
        let dir = tempdir().unwrap();
        let backend = LocalBackend::with_path(dir.path().join("test.state.json"));

        assert!(backend.read_state().await.unwrap().is_none());

        let mut state = StateFile::new();
        state.upsert_resource(ResourceState::new("sim_core_vcn", "main", "sim", "ocid1.vcn.a"));
        state.increment_serial();
        backend.write_state(&state).await.unwrap();

        let read = backend.read_state().await.unwrap().unwrap();
        assert_eq!(read.serial, 1);
        assert_eq!(read.resources, state.resources);
        assert!(!dir.path().join("test.state.tmp").exists());
    }

    #[tokio::test]
    async fn test_write_from_other_lineage_is_refused() {
        let dir = tempdir().unwrap();
        let backend = LocalBackend::with_path(dir.path().join("test.state.json"));
        backend.write_state(&StateFile::new()).await.unwrap();

        let result = backend.write_state(&StateFile::new()).await;
        assert!(matches!(result, Err(BackendError::LineageMismatch { .. })));
    }

    #[tokio::test]
    async fn test_corrupt_state_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.state.json");
        std::fs::write(&path, "{ not json").unwrap();

        let result = LocalBackend::with_path(path).read_state().await;
        assert!(matches!(result, Err(BackendError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_local_backend_locking() {
        let dir = tempdir().unwrap();
        let backend = LocalBackend::with_path(dir.path().join("test.state.json"));

        let lock = backend.acquire_lock("apply").await.unwrap();
        assert_eq!(lock.operation, "apply");

        match backend.acquire_lock("destroy").await {
            Err(BackendError::Locked { lock_id, .. }) => assert_eq!(lock_id, lock.id),
            other => panic!("Expected Locked error, got {other:?}"),
        }

        backend.release_lock(&lock).await.unwrap();

        let lock2 = backend.acquire_lock("destroy").await.unwrap();
        assert_eq!(lock2.operation, "destroy");
        backend.release_lock(&lock2).await.unwrap();
    }

    #[tokio::test]
    async fn test_expired_lock_is_replaced() {
        let dir = tempdir().unwrap();
        let backend = LocalBackend::with_path(dir.path().join("test.state.json"));
        let stale = LockInfo::with_timeout("apply", -10);
        std::fs::write(&backend.lock_path, serde_json::to_string(&stale).unwrap()).unwrap();

        let lock = backend.acquire_lock("refresh").await.unwrap();
        assert_ne!(lock.id, stale.id);
    }

    #[tokio::test]
    async fn test_release_with_wrong_lock() {
        let dir = tempdir().unwrap();
        let backend = LocalBackend::with_path(dir.path().join("test.state.json"));
        let _held = backend.acquire_lock("apply").await.unwrap();

        let other = LockInfo::new("apply");
        assert!(matches!(
            backend.release_lock(&other).await,
            Err(BackendError::LockMismatch { .. })
        ));
        assert!(matches!(
            backend.force_unlock("nope").await,
            Err(BackendError::LockMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_force_unlock() {
        let dir = tempdir().unwrap();
        let backend = LocalBackend::with_path(dir.path().join("test.state.json"));

        assert!(matches!(
            backend.force_unlock("missing").await,
            Err(BackendError::LockNotFound(_))
        ));

        let lock = backend.acquire_lock("apply").await.unwrap();
        backend.force_unlock(&lock.id).await.unwrap();
        assert!(backend.acquire_lock("apply").await.is_ok());
    }

    #[test]
    fn test_local_backend_from_config() {
        let config = BackendConfig {
            backend_type: "local".to_string(),
            attributes: HashMap::new(),
        };
        let backend = LocalBackend::from_config(&config).unwrap();
        assert_eq!(backend.state_path(), Path::new("cumulus.state.json"));

        let mut config = BackendConfig::local("custom.state.json");
        config
            .attributes
            .insert("lock_timeout".to_string(), serde_json::json!(0));
        assert!(matches!(
            LocalBackend::from_config(&config),
            Err(BackendError::Configuration(_))
        ));
    }
}

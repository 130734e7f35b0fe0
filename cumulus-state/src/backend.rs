//! State backend trait and error types

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::lock::LockInfo;
use crate::state::StateFile;

/// Failures of a state backend
#[derive(Debug, Error)]
pub enum BackendError {
    /// Another command holds an unexpired lock
    #[error("State is locked by {who} (lock ID: {lock_id}, operation: {operation})")]
    Locked {
        lock_id: String,
        who: String,
        operation: String,
    },

    /// No lock file to release or force-unlock
    #[error("Lock not found: {0}")]
    LockNotFound(String),

    /// The lock on disk belongs to someone else
    #[error("Lock ID mismatch: expected {expected}, got {actual}")]
    LockMismatch { expected: String, actual: String },

    /// Backend type other than "local"
    #[error("Unsupported backend type: {0}")]
    UnsupportedBackend(String),

    /// Missing or invalid backend attribute
    #[error("Backend configuration error: {0}")]
    Configuration(String),

    /// State file that cannot be parsed or is from a newer version
    #[error("Invalid state file: {0}")]
    InvalidState(String),

    /// Write refused because the stored state has another history
    #[error("State lineage mismatch: expected {expected}, got {actual}")]
    LineageMismatch { expected: String, actual: String },

    /// Reading, writing or renaming a file failed
    #[error("I/O error: {0}")]
    Io(String),

    /// The state could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl BackendError {
    /// Locked error naming the holder of `lock`
    pub fn locked(lock: &LockInfo) -> Self {
        Self::Locked {
            lock_id: lock.id.clone(),
            who: lock.who.clone(),
            operation: lock.operation.clone(),
        }
    }

    /// Unsupported backend error
    pub fn unsupported_backend(backend_type: impl Into<String>) -> Self {
        Self::UnsupportedBackend(backend_type.into())
    }

    /// Configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Storage for the state file and its lock
#[async_trait]
pub trait StateBackend: Send + Sync {
    /// Returns `None` if no state has been written yet
    async fn read_state(&self) -> BackendResult<Option<StateFile>>;

    /// Write the state; increment its serial first
    ///
    /// Fails with `LineageMismatch` when the stored state belongs to another
    /// lineage.
    async fn write_state(&self, state: &StateFile) -> BackendResult<()>;

    /// Fails with `Locked` while an unexpired lock is held
    async fn acquire_lock(&self, operation: &str) -> BackendResult<LockInfo>;

    /// Release a lock taken by `acquire_lock`
    ///
    /// Fails with `LockMismatch` when the lock on disk has another id
    async fn release_lock(&self, lock: &LockInfo) -> BackendResult<()>;

    /// Remove the lock with `lock_id` regardless of who holds it
    async fn force_unlock(&self, lock_id: &str) -> BackendResult<()>;
}

/// Configuration for a state backend
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Backend type (currently only "local")
    pub backend_type: String,
    /// Backend specific settings, e.g. `path` and `lock_timeout`
    pub attributes: HashMap<String, serde_json::Value>,
}

impl BackendConfig {
    /// Local file backend storing the state at `path`
    pub fn local(path: impl Into<String>) -> Self {
        Self {
            backend_type: "local".to_string(),
            attributes: HashMap::from([("path".to_string(), serde_json::Value::String(path.into()))]),
        }
    }

    /// String attribute, `None` when absent or not a string
    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(serde_json::Value::as_str)
    }

    /// Integer attribute, `None` when absent or not an integer
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.attributes.get(key).and_then(serde_json::Value::as_i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_locked() {
        let lock = LockInfo::new("apply");
        match BackendError::locked(&lock) {
            BackendError::Locked {
                lock_id,
                who,
                operation,
            } => {
                assert_eq!(lock_id, lock.id);
                assert_eq!(who, lock.who);
                assert_eq!(operation, "apply");
            }
            other => panic!("Expected Locked error, got {other:?}"),
        }
    }

    #[test]
    fn test_backend_error_display() {
        let error = BackendError::unsupported_backend("s3");
        assert_eq!(error.to_string(), "Unsupported backend type: s3");
    }

    #[test]
    fn test_local_config() {
        let config = BackendConfig::local("state.json");
        assert_eq!(config.backend_type, "local");
        assert_eq!(config.get_string("path"), Some("state.json"));
        assert_eq!(config.get_i64("path"), None);
    }
}

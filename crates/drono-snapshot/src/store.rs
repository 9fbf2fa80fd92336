//! Snapshot persistence backends.

use crate::types::{DistributionSnapshot, SessionSnapshot};
use async_trait::async_trait;
use drono_common::{EngineError, EngineResult};
use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// Default application name used for the snapshot subdirectory.
pub const DEFAULT_APP_NAME: &str = "drono-engine";

const SESSION_FILE: &str = "session.json";
const DISTRIBUTION_FILE: &str = "distribution.json";

/// Persistence capability consumed by the session controller and the
/// distribution scheduler. The host invokes save/clear around process
/// lifecycle events; the engine itself persists on pause and clears on
/// stop or completion.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn save_session(&self, snapshot: &SessionSnapshot) -> EngineResult<()>;
    async fn load_session(&self) -> EngineResult<Option<SessionSnapshot>>;
    async fn clear_session(&self) -> EngineResult<()>;

    async fn save_distribution(&self, snapshot: &DistributionSnapshot) -> EngineResult<()>;
    async fn load_distribution(&self) -> EngineResult<Option<DistributionSnapshot>>;
    async fn clear_distribution(&self) -> EngineResult<()>;
}

/// Configuration for the file-backed snapshot store.
#[derive(Debug, Clone)]
pub struct SnapshotConfig {
    /// Base directory for snapshot files (if empty, uses the OS default)
    pub base_directory: Option<String>,
    /// Application name for subdirectory creation
    pub app_name: String,
    /// Create a subdirectory for the app under the base directory
    pub use_subdirectory: bool,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            base_directory: None,
            app_name: DEFAULT_APP_NAME.to_string(),
            use_subdirectory: true,
        }
    }
}

/// File-backed snapshot store writing pretty JSON with atomic
/// temp-file-then-rename semantics.
pub struct FileSnapshotStore {
    config: SnapshotConfig,
}

impl FileSnapshotStore {
    pub fn new(config: SnapshotConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(SnapshotConfig::default())
    }

    /// Create a store rooted at an explicit directory (used by tests and
    /// by hosts that isolate artifacts per device).
    pub fn with_base_directory(base_directory: impl Into<String>) -> Self {
        Self::new(SnapshotConfig {
            base_directory: Some(base_directory.into()),
            ..SnapshotConfig::default()
        })
    }

    /// Resolve the directory snapshot files live in (platform-specific).
    pub fn snapshot_directory(&self) -> PathBuf {
        let base = if let Some(ref base_dir) = self.config.base_directory {
            PathBuf::from(base_dir)
        } else {
            dirs::data_local_dir()
                .unwrap_or_else(|| {
                    dirs::home_dir()
                        .unwrap_or_else(|| PathBuf::from("/tmp"))
                        .join(".local/share")
                })
                .join("drono")
        };

        if self.config.use_subdirectory {
            base.join(&self.config.app_name)
        } else {
            base
        }
    }

    fn session_path(&self) -> PathBuf {
        self.snapshot_directory().join(SESSION_FILE)
    }

    fn distribution_path(&self) -> PathBuf {
        self.snapshot_directory().join(DISTRIBUTION_FILE)
    }

    async fn write_atomic<T: Serialize>(&self, path: &Path, value: &T) -> EngineResult<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                EngineError::snapshot_failed(format!(
                    "failed to create directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let json = serde_json::to_string_pretty(value)
            .map_err(|e| EngineError::snapshot_failed(format!("serialize failed: {}", e)))?;

        // Atomic write: write to temp file, then rename
        let temp_path = path.with_extension("tmp");
        tokio::fs::write(&temp_path, json).await.map_err(|e| {
            EngineError::snapshot_failed(format!(
                "failed to write {}: {}",
                temp_path.display(),
                e
            ))
        })?;

        tokio::fs::rename(&temp_path, path).await.map_err(|e| {
            EngineError::snapshot_failed(format!("failed to rename {}: {}", path.display(), e))
        })?;

        debug!("Snapshot written to {}", path.display());
        Ok(())
    }

    async fn read_optional<T: DeserializeOwned>(&self, path: &Path) -> EngineResult<Option<T>> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(EngineError::snapshot_failed(format!(
                    "failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        let value = serde_json::from_str(&content).map_err(|e| {
            EngineError::snapshot_failed(format!("failed to parse {}: {}", path.display(), e))
        })?;
        Ok(Some(value))
    }

    async fn remove_if_exists(&self, path: &Path) -> EngineResult<()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                debug!("Snapshot cleared: {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(EngineError::snapshot_failed(format!(
                "failed to delete {}: {}",
                path.display(),
                e
            ))),
        }
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn save_session(&self, snapshot: &SessionSnapshot) -> EngineResult<()> {
        self.write_atomic(&self.session_path(), snapshot).await
    }

    async fn load_session(&self) -> EngineResult<Option<SessionSnapshot>> {
        self.read_optional(&self.session_path()).await
    }

    async fn clear_session(&self) -> EngineResult<()> {
        self.remove_if_exists(&self.session_path()).await
    }

    async fn save_distribution(&self, snapshot: &DistributionSnapshot) -> EngineResult<()> {
        self.write_atomic(&self.distribution_path(), snapshot).await
    }

    async fn load_distribution(&self) -> EngineResult<Option<DistributionSnapshot>> {
        self.read_optional(&self.distribution_path()).await
    }

    async fn clear_distribution(&self) -> EngineResult<()> {
        self.remove_if_exists(&self.distribution_path()).await
    }
}

/// In-memory snapshot store for tests and hosts without durable storage.
#[derive(Default)]
pub struct MemorySnapshotStore {
    session: Mutex<Option<SessionSnapshot>>,
    distribution: Mutex<Option<DistributionSnapshot>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn save_session(&self, snapshot: &SessionSnapshot) -> EngineResult<()> {
        *self.session.lock().unwrap() = Some(snapshot.clone());
        Ok(())
    }

    async fn load_session(&self) -> EngineResult<Option<SessionSnapshot>> {
        Ok(self.session.lock().unwrap().clone())
    }

    async fn clear_session(&self) -> EngineResult<()> {
        *self.session.lock().unwrap() = None;
        Ok(())
    }

    async fn save_distribution(&self, snapshot: &DistributionSnapshot) -> EngineResult<()> {
        *self.distribution.lock().unwrap() = Some(snapshot.clone());
        Ok(())
    }

    async fn load_distribution(&self) -> EngineResult<Option<DistributionSnapshot>> {
        Ok(self.distribution.lock().unwrap().clone())
    }

    async fn clear_distribution(&self) -> EngineResult<()> {
        *self.distribution.lock().unwrap() = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_snapshot() -> SessionSnapshot {
        SessionSnapshot {
            target_url: "https://example.com".to_string(),
            current_iteration: 2,
            total_iterations: 5,
            paused: false,
            start_time: Utc::now(),
            accumulated_paused_ms: 0,
            pause_started_at: None,
        }
    }

    #[tokio::test]
    async fn test_file_store_save_load_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::with_base_directory(dir.path().to_str().unwrap());

        assert!(store.load_session().await.unwrap().is_none());

        let snapshot = sample_snapshot();
        store.save_session(&snapshot).await.unwrap();
        let loaded = store.load_session().await.unwrap().unwrap();
        assert_eq!(loaded.current_iteration, 2);
        assert_eq!(loaded.target_url, snapshot.target_url);

        store.clear_session().await.unwrap();
        assert!(store.load_session().await.unwrap().is_none());
        // Clearing an already-clear store is fine
        store.clear_session().await.unwrap();
    }

    #[tokio::test]
    async fn test_file_store_overwrites_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::with_base_directory(dir.path().to_str().unwrap());

        let mut snapshot = sample_snapshot();
        store.save_session(&snapshot).await.unwrap();
        snapshot.current_iteration = 4;
        store.save_session(&snapshot).await.unwrap();

        let loaded = store.load_session().await.unwrap().unwrap();
        assert_eq!(loaded.current_iteration, 4);
    }

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemorySnapshotStore::new();
        store.save_session(&sample_snapshot()).await.unwrap();
        assert!(store.load_session().await.unwrap().is_some());
        store.clear_session().await.unwrap();
        assert!(store.load_session().await.unwrap().is_none());
    }
}

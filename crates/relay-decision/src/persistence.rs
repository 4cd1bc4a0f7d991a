//! Pluggable storage for learned state.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::PersistenceError;

/// Opaque blob storage for the decision engine's snapshot.
#[async_trait]
pub trait PersistencePort: Send + Sync {
    async fn save(&self, blob: Vec<u8>) -> Result<(), PersistenceError>;

    /// `Ok(None)` when nothing has been saved yet.
    async fn load(&self) -> Result<Option<Vec<u8>>, PersistenceError>;
}

/// In-process storage, mainly for tests.
#[derive(Default)]
pub struct MemoryPersistence {
    blob: Mutex<Option<Vec<u8>>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PersistencePort for MemoryPersistence {
    async fn save(&self, blob: Vec<u8>) -> Result<(), PersistenceError> {
        *self.blob.lock().await = Some(blob);
        Ok(())
    }

    async fn load(&self) -> Result<Option<Vec<u8>>, PersistenceError> {
        Ok(self.blob.lock().await.clone())
    }
}

/// Stores the snapshot as a JSON file, replaced atomically on every save.
pub struct JsonFilePersistence {
    path: PathBuf,
}

impl JsonFilePersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl PersistencePort for JsonFilePersistence {
    async fn save(&self, blob: Vec<u8>) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let tmp = self.temp_path();
        tokio::fs::write(&tmp, &blob).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        tracing::debug!(path = %self.path.display(), bytes = blob.len(), "Decision state saved");
        Ok(())
    }

    async fn load(&self) -> Result<Option<Vec<u8>>, PersistenceError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

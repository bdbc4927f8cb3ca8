//! Storage port for the analysis history slot
//!
//! The history lives in a single named slot holding one serialized document.
//! [`Storage`] abstracts where that slot lives so the history store can be
//! exercised against an in-memory fake.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use thiserror::Error;
use tracing::debug;

use crate::error::AppError;

/// Name of the slot holding the serialized history
pub const HISTORY_STORAGE_KEY: &str = "malaria_analysis_history";

/// Storage backend errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {}: {}", .path.display(), .source)]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Storage lock poisoned")]
    Poisoned,
}

impl From<StorageError> for AppError {
    fn from(error: StorageError) -> Self {
        AppError::Storage(error.to_string())
    }
}

/// A single persisted slot
pub trait Storage: Send + Sync {
    /// Current contents, `None` if the slot was never written or was removed.
    ///
    /// # Errors
    /// Returns error if the backend cannot be read.
    fn read(&self) -> Result<Option<String>, StorageError>;

    /// Replace the slot contents.
    ///
    /// # Errors
    /// Returns error if the backend cannot be written.
    fn write(&self, contents: &str) -> Result<(), StorageError>;

    /// Drop the slot entirely.
    ///
    /// # Errors
    /// Returns error if the backend cannot be written.
    fn remove(&self) -> Result<(), StorageError>;
}

/// In-process slot, for tests and ephemeral sessions
#[derive(Debug, Default)]
pub struct MemoryStorage {
    slot: RwLock<Option<String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with pre-existing slot contents
    pub fn with_contents(contents: impl Into<String>) -> Self {
        Self {
            slot: RwLock::new(Some(contents.into())),
        }
    }
}

impl Storage for MemoryStorage {
    fn read(&self) -> Result<Option<String>, StorageError> {
        let slot = self.slot.read().map_err(|_| StorageError::Poisoned)?;
        Ok(slot.clone())
    }

    fn write(&self, contents: &str) -> Result<(), StorageError> {
        let mut slot = self.slot.write().map_err(|_| StorageError::Poisoned)?;
        *slot = Some(contents.to_string());
        Ok(())
    }

    fn remove(&self) -> Result<(), StorageError> {
        let mut slot = self.slot.write().map_err(|_| StorageError::Poisoned)?;
        *slot = None;
        Ok(())
    }
}

/// Slot stored as `<dir>/<key>.json`
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(dir: &Path, key: &str) -> Self {
        Self {
            path: dir.join(format!("{}.json", key)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StorageError {
        StorageError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl Storage for FileStorage {
    fn read(&self) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.io_error(e)),
        }
    }

    fn write(&self, contents: &str) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }

        // Write-then-rename so a crash never leaves a half-written slot
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, contents).map_err(|e| self.io_error(e))?;
        fs::rename(&staging, &self.path).map_err(|e| self.io_error(e))?;

        debug!(path = %self.path.display(), bytes = contents.len(), "History slot written");
        Ok(())
    }

    fn remove(&self) -> Result<(), StorageError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_storage_lifecycle() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.read().unwrap(), None);

        storage.write("[]").unwrap();
        assert_eq!(storage.read().unwrap().as_deref(), Some("[]"));

        storage.remove().unwrap();
        assert_eq!(storage.read().unwrap(), None);
    }

    #[test]
    fn test_file_storage_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(&dir.path().join("nested"), HISTORY_STORAGE_KEY);

        assert_eq!(storage.read().unwrap(), None);

        storage.write(r#"[{"id":"a"}]"#).unwrap();
        assert!(storage.path().ends_with("malaria_analysis_history.json"));
        assert_eq!(storage.read().unwrap().as_deref(), Some(r#"[{"id":"a"}]"#));

        storage.write("[]").unwrap();
        assert_eq!(storage.read().unwrap().as_deref(), Some("[]"));

        storage.remove().unwrap();
        assert_eq!(storage.read().unwrap(), None);
    }

    #[test]
    fn test_file_storage_remove_missing_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path(), HISTORY_STORAGE_KEY);
        assert!(storage.remove().is_ok());
    }

    #[test]
    fn test_storage_error_maps_to_app_error() {
        let error: AppError = StorageError::Poisoned.into();
        assert!(matches!(error, AppError::Storage(_)));
    }
}

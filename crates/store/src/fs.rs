//! Filesystem storage backend.
//!
//! One file per object at `<base>/<entity>/<id>.json`. Writes go through a
//! temporary file and an atomic rename so readers never observe a partial
//! object. Identifiers are restricted to filesystem-safe characters before
//! any path is built.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use crate::backend::{StorageBackend, StorageError, is_valid_storage_id};
use crate::data_dir::default_data_dir;

const OBJECT_EXTENSION: &str = "json";

/// Filesystem-backed [`StorageBackend`].
#[derive(Debug, Clone)]
pub struct FilesystemStorage {
    base: PathBuf,
}

impl FilesystemStorage {
    /// Create a backend rooted at the given directory.
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Create a backend rooted at the default data directory.
    pub fn with_default_dir() -> Self {
        Self::new(default_data_dir())
    }

    /// Root directory this backend writes under.
    pub fn base(&self) -> &Path {
        &self.base
    }

    fn object_path(&self, entity: &str, id: &str) -> Result<PathBuf, StorageError> {
        if !is_valid_storage_id(entity) {
            return Err(StorageError::InvalidId { id: entity.to_string() });
        }
        if !is_valid_storage_id(id) {
            return Err(StorageError::InvalidId { id: id.to_string() });
        }
        Ok(self.base.join(entity).join(format!("{id}.{OBJECT_EXTENSION}")))
    }
}

#[async_trait]
impl StorageBackend for FilesystemStorage {
    async fn save(&self, entity: &str, id: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let path = self.object_path(entity, id)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let temporary_path = path.with_extension(format!("{OBJECT_EXTENSION}.tmp"));
        fs::write(&temporary_path, bytes).await?;
        fs::rename(&temporary_path, &path).await?;
        Ok(())
    }

    async fn load(&self, entity: &str, id: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.object_path(entity, id)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Err(StorageError::not_found(entity, id)),
            Err(error) => Err(error.into()),
        }
    }

    async fn list(&self, entity: &str) -> Result<Vec<String>, StorageError> {
        if !is_valid_storage_id(entity) {
            return Err(StorageError::InvalidId { id: entity.to_string() });
        }
        let directory = self.base.join(entity);

        let mut entries = match fs::read_dir(&directory).await {
            Ok(entries) => entries,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => return Err(error.into()),
        };

        let mut identifiers = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|extension| extension.to_str()) != Some(OBJECT_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                identifiers.push(stem.to_string());
            }
        }
        identifiers.sort();
        Ok(identifiers)
    }

    async fn delete(&self, entity: &str, id: &str) -> Result<(), StorageError> {
        let path = self.object_path(entity, id)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Err(StorageError::not_found(entity, id)),
            Err(error) => Err(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ENTITY_EXECUTIONS;
    use tempfile::tempdir;

    #[tokio::test]
    async fn save_load_round_trip() {
        let directory = tempdir().expect("tempdir");
        let storage = FilesystemStorage::new(directory.path());

        storage
            .save(ENTITY_EXECUTIONS, "exec-1", br#"{"ok": true}"#)
            .await
            .expect("save");
        let bytes = storage.load(ENTITY_EXECUTIONS, "exec-1").await.expect("load");
        assert_eq!(bytes, br#"{"ok": true}"#);
    }

    #[tokio::test]
    async fn load_missing_is_not_found() {
        let directory = tempdir().expect("tempdir");
        let storage = FilesystemStorage::new(directory.path());

        let error = storage.load(ENTITY_EXECUTIONS, "absent").await.expect_err("missing");
        assert!(error.is_not_found());
    }

    #[tokio::test]
    async fn list_returns_sorted_identifiers_and_tolerates_missing_directory() {
        let directory = tempdir().expect("tempdir");
        let storage = FilesystemStorage::new(directory.path());

        assert!(storage.list(ENTITY_EXECUTIONS).await.expect("empty list").is_empty());

        storage.save(ENTITY_EXECUTIONS, "b", b"{}").await.expect("save b");
        storage.save(ENTITY_EXECUTIONS, "a", b"{}").await.expect("save a");
        let identifiers = storage.list(ENTITY_EXECUTIONS).await.expect("list");
        assert_eq!(identifiers, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn list_ignores_foreign_files() {
        let directory = tempdir().expect("tempdir");
        let storage = FilesystemStorage::new(directory.path());
        storage.save(ENTITY_EXECUTIONS, "real", b"{}").await.expect("save");

        let foreign = directory.path().join(ENTITY_EXECUTIONS).join("notes.txt");
        tokio::fs::write(&foreign, b"ignore me").await.expect("write foreign file");

        let identifiers = storage.list(ENTITY_EXECUTIONS).await.expect("list");
        assert_eq!(identifiers, vec!["real".to_string()]);
    }

    #[tokio::test]
    async fn delete_removes_and_reports_missing() {
        let directory = tempdir().expect("tempdir");
        let storage = FilesystemStorage::new(directory.path());

        storage.save(ENTITY_EXECUTIONS, "exec-1", b"{}").await.expect("save");
        storage.delete(ENTITY_EXECUTIONS, "exec-1").await.expect("delete");
        let error = storage.delete(ENTITY_EXECUTIONS, "exec-1").await.expect_err("already gone");
        assert!(error.is_not_found());
    }

    #[tokio::test]
    async fn rejects_path_escaping_identifiers() {
        let directory = tempdir().expect("tempdir");
        let storage = FilesystemStorage::new(directory.path());

        let error = storage.load(ENTITY_EXECUTIONS, "../escape").await.expect_err("invalid id");
        assert!(matches!(error, StorageError::InvalidId { .. }));
    }

    #[tokio::test]
    async fn overwrite_replaces_content() {
        let directory = tempdir().expect("tempdir");
        let storage = FilesystemStorage::new(directory.path());

        storage.save(ENTITY_EXECUTIONS, "exec-1", b"first").await.expect("save first");
        storage.save(ENTITY_EXECUTIONS, "exec-1", b"second").await.expect("save second");
        let bytes = storage.load(ENTITY_EXECUTIONS, "exec-1").await.expect("load");
        assert_eq!(bytes, b"second");
    }
}

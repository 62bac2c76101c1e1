//! In-memory storage backend, primarily for tests.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::backend::{StorageBackend, StorageError};

/// Process-local [`StorageBackend`] holding every object in memory.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    objects: RwLock<HashMap<(String, String), Vec<u8>>>,
}

impl MemoryStorage {
    /// Create an empty in-memory backend.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    async fn save(&self, entity: &str, id: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let mut objects = self.objects.write().expect("storage lock poisoned");
        objects.insert((entity.to_string(), id.to_string()), bytes.to_vec());
        Ok(())
    }

    async fn load(&self, entity: &str, id: &str) -> Result<Vec<u8>, StorageError> {
        let objects = self.objects.read().expect("storage lock poisoned");
        objects
            .get(&(entity.to_string(), id.to_string()))
            .cloned()
            .ok_or_else(|| StorageError::not_found(entity, id))
    }

    async fn list(&self, entity: &str) -> Result<Vec<String>, StorageError> {
        let objects = self.objects.read().expect("storage lock poisoned");
        let mut identifiers: Vec<String> = objects
            .keys()
            .filter(|(stored_entity, _)| stored_entity == entity)
            .map(|(_, id)| id.clone())
            .collect();
        identifiers.sort();
        Ok(identifiers)
    }

    async fn delete(&self, entity: &str, id: &str) -> Result<(), StorageError> {
        let mut objects = self.objects.write().expect("storage lock poisoned");
        objects
            .remove(&(entity.to_string(), id.to_string()))
            .map(|_| ())
            .ok_or_else(|| StorageError::not_found(entity, id))
    }
}

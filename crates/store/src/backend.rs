//! Key-value-per-entity storage seam.
//!
//! A backend persists opaque byte payloads addressed by an entity tag and an
//! identifier. "Not found" is distinguished from every other failure so
//! callers can map it onto their own not-found errors without string
//! matching.

use async_trait::async_trait;
use thiserror::Error;

/// Entity tag for persisted workflow definitions.
pub const ENTITY_WORKFLOWS: &str = "workflows";

/// Entity tag for persisted execution records.
pub const ENTITY_EXECUTIONS: &str = "workflow_executions";

/// Errors surfaced by storage backends.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The addressed object does not exist.
    #[error("{entity} object '{id}' not found")]
    NotFound { entity: String, id: String },

    /// Identifier contains characters the backend refuses to address.
    #[error("invalid storage identifier '{id}'")]
    InvalidId { id: String },

    /// I/O failure while reading or writing the backing medium.
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Payload could not be encoded or decoded.
    #[error("storage serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StorageError {
    /// Build a not-found error for an entity/id pair.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// True when this error is the distinguished not-found signal.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Persists one opaque object per (entity, id) pair.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Write (or overwrite) the object.
    async fn save(&self, entity: &str, id: &str, bytes: &[u8]) -> Result<(), StorageError>;

    /// Read the object; [`StorageError::NotFound`] when absent.
    async fn load(&self, entity: &str, id: &str) -> Result<Vec<u8>, StorageError>;

    /// List every identifier stored under the entity. An entity that was
    /// never written lists as empty.
    async fn list(&self, entity: &str) -> Result<Vec<String>, StorageError>;

    /// Remove the object; [`StorageError::NotFound`] when absent.
    async fn delete(&self, entity: &str, id: &str) -> Result<(), StorageError>;
}

/// Returns true when the identifier is safe to address on any backend.
///
/// The rules match workflow entity names: ASCII alphanumerics, underscore,
/// and dash only, never empty.
pub fn is_valid_storage_id(candidate: &str) -> bool {
    !candidate.is_empty()
        && candidate
            .chars()
            .all(|character| character.is_ascii_alphanumeric() || character == '_' || character == '-')
}

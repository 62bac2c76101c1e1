//! Durable workflow-definition persistence.
//!
//! Definitions live in the backing store under the `workflows` entity, one
//! object per workflow named by the workflow name. Objects are written as
//! pretty JSON; loading parses YAML first and falls back to JSON, so
//! hand-authored manifests in either format load the same way. Unknown
//! top-level fields are ignored.

use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use capstan_store::{ENTITY_WORKFLOWS, StorageBackend, StorageError};
use capstan_types::WorkflowDefinition;

/// Definition codec over a shared [`StorageBackend`].
pub struct DefinitionStore<B: StorageBackend> {
    backend: Arc<B>,
}

impl<B: StorageBackend> DefinitionStore<B> {
    /// Create a definition store over the shared backend.
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }

    /// Persist a definition under its own name.
    pub async fn save(&self, definition: &WorkflowDefinition) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec_pretty(definition)?;
        self.backend.save(ENTITY_WORKFLOWS, &definition.name, &bytes).await
    }

    /// Load and parse one definition by name.
    pub async fn load(&self, name: &str) -> Result<WorkflowDefinition, StorageError> {
        use serde::de::Error as _;

        let bytes = self.backend.load(ENTITY_WORKFLOWS, name).await?;
        let content = String::from_utf8_lossy(&bytes);
        parse_definition(&content).map_err(|error| StorageError::Serialization(serde_json::Error::custom(format!("{error:#}"))))
    }

    /// List the names of every persisted definition.
    pub async fn list_names(&self) -> Result<Vec<String>, StorageError> {
        self.backend.list(ENTITY_WORKFLOWS).await
    }

    /// Remove one definition durably.
    pub async fn delete(&self, name: &str) -> Result<(), StorageError> {
        self.backend.delete(ENTITY_WORKFLOWS, name).await
    }
}

/// Parse a definition manifest, trying YAML first and JSON second.
pub fn parse_definition(content: &str) -> Result<WorkflowDefinition> {
    match serde_yaml::from_str::<WorkflowDefinition>(content) {
        Ok(definition) => Ok(definition),
        Err(yaml_error) => serde_json::from_str::<WorkflowDefinition>(content)
            .map_err(|json_error| anyhow!(format_json_error(json_error)))
            .with_context(|| format_yaml_error(&yaml_error)),
    }
}

fn format_yaml_error(error: &serde_yaml::Error) -> String {
    if let Some(location) = error.location() {
        return format!(
            "parse yaml workflow at line {}, column {}: {}",
            location.line(),
            location.column(),
            error
        );
    }
    format!("parse yaml workflow: {error}")
}

fn format_json_error(error: serde_json::Error) -> String {
    format!("parse json workflow at line {}, column {}: {}", error.line(), error.column(), error)
}

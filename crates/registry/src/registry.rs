//! Workflow registry: definition CRUD, availability, and the execute entry
//! point.
//!
//! The registry keeps an in-memory index of validated definitions backed by
//! durable storage. Availability is never cached: every read asks the tool
//! catalog, so a tool appearing in the catalog immediately makes dependent
//! workflows available.

use std::collections::HashMap;
use std::sync::Arc;

use capstan_engine::{ToolCaller, ToolCatalog};
use capstan_store::{ExecutionStore, StorageBackend, StorageError};
use capstan_types::{ValidationError, WorkflowDefinition, validate_definition};
use serde_json::{Map as JsonMap, Value as JsonValue};
use thiserror::Error;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::definitions::DefinitionStore;
use crate::tracker::{ExecutionTracker, TrackerError};

/// Errors surfaced by registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("workflow '{name}' not found")]
    WorkflowNotFound { name: String },

    #[error("workflow '{name}' already exists")]
    WorkflowAlreadyExists { name: String },

    #[error("workflow '{name}' is unavailable: missing tools {missing:?}")]
    WorkflowUnavailable { name: String, missing: Vec<String> },

    #[error("definition name '{actual}' does not match target '{expected}'")]
    NameMismatch { expected: String, actual: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Execution(#[from] TrackerError),
}

/// In-memory registry of workflow definitions over durable storage.
pub struct WorkflowRegistry<B: StorageBackend> {
    definitions: DefinitionStore<B>,
    executions: Arc<ExecutionStore<B>>,
    tracker: ExecutionTracker<B>,
    workflows: RwLock<HashMap<String, WorkflowDefinition>>,
    caller: Arc<dyn ToolCaller>,
    catalog: Option<Arc<dyn ToolCatalog>>,
}

impl<B: StorageBackend> WorkflowRegistry<B> {
    /// Create a registry over a shared backend, tool transport, and
    /// optional tool catalog. Without a catalog every workflow counts as
    /// available.
    pub fn new(backend: Arc<B>, caller: Arc<dyn ToolCaller>, catalog: Option<Arc<dyn ToolCatalog>>) -> Self {
        let executions = Arc::new(ExecutionStore::new(Arc::clone(&backend)));
        Self {
            definitions: DefinitionStore::new(backend),
            tracker: ExecutionTracker::new(Arc::clone(&executions)),
            executions,
            workflows: RwLock::new(HashMap::new()),
            caller,
            catalog,
        }
    }

    /// Shared execution store; the query surface for execution records.
    pub fn execution_store(&self) -> &Arc<ExecutionStore<B>> {
        &self.executions
    }

    /// Load and validate every persisted definition into memory.
    ///
    /// Malformed or invalid entries are skipped with a warning; they never
    /// abort the load. Returns the number of definitions indexed.
    pub async fn load_all(&self) -> Result<usize, RegistryError> {
        let names = self.definitions.list_names().await?;
        let mut workflows = self.workflows.write().await;
        workflows.clear();

        for name in names {
            let definition = match self.definitions.load(&name).await {
                Ok(definition) => definition,
                Err(error) => {
                    warn!(workflow = name.as_str(), %error, "skipping unreadable workflow definition");
                    continue;
                }
            };
            if let Err(error) = validate_definition(&definition) {
                warn!(workflow = name.as_str(), %error, "skipping invalid workflow definition");
                continue;
            }
            workflows.insert(definition.name.clone(), definition);
        }

        info!(count = workflows.len(), "loaded workflow definitions");
        Ok(workflows.len())
    }

    /// Register a new definition; the name must be unused.
    pub async fn create(&self, mut definition: WorkflowDefinition) -> Result<(), RegistryError> {
        validate_definition(&definition)?;

        let mut workflows = self.workflows.write().await;
        if workflows.contains_key(&definition.name) {
            return Err(RegistryError::WorkflowAlreadyExists {
                name: definition.name.clone(),
            });
        }

        let now = chrono::Utc::now();
        definition.created_at = Some(now);
        definition.updated_at = Some(now);

        self.definitions.save(&definition).await?;
        workflows.insert(definition.name.clone(), definition);
        Ok(())
    }

    /// Overwrite an existing definition.
    pub async fn update(&self, name: &str, mut definition: WorkflowDefinition) -> Result<(), RegistryError> {
        if definition.name != name {
            return Err(RegistryError::NameMismatch {
                expected: name.to_string(),
                actual: definition.name.clone(),
            });
        }
        validate_definition(&definition)?;

        let mut workflows = self.workflows.write().await;
        let Some(existing) = workflows.get(name) else {
            return Err(RegistryError::WorkflowNotFound { name: name.to_string() });
        };

        definition.created_at = existing.created_at;
        definition.updated_at = Some(chrono::Utc::now());

        self.definitions.save(&definition).await?;
        workflows.insert(definition.name.clone(), definition);
        Ok(())
    }

    /// Remove a definition durably, then from memory.
    pub async fn delete(&self, name: &str) -> Result<(), RegistryError> {
        let mut workflows = self.workflows.write().await;
        if !workflows.contains_key(name) {
            return Err(RegistryError::WorkflowNotFound { name: name.to_string() });
        }
        self.definitions.delete(name).await?;
        workflows.remove(name);
        Ok(())
    }

    /// Fetch one definition with its availability recomputed.
    pub async fn get(&self, name: &str) -> Result<WorkflowDefinition, RegistryError> {
        let mut definition = {
            let workflows = self.workflows.read().await;
            workflows
                .get(name)
                .cloned()
                .ok_or_else(|| RegistryError::WorkflowNotFound { name: name.to_string() })?
        };
        definition.available = self.missing_tools(&definition).await.is_empty();
        Ok(definition)
    }

    /// All definitions sorted by name, availability recomputed.
    pub async fn list(&self) -> Vec<WorkflowDefinition> {
        let mut definitions: Vec<WorkflowDefinition> = {
            let workflows = self.workflows.read().await;
            workflows.values().cloned().collect()
        };
        definitions.sort_by(|left, right| left.name.cmp(&right.name));
        for definition in &mut definitions {
            definition.available = self.missing_tools(definition).await.is_empty();
        }
        definitions
    }

    /// The subset of [`list`](Self::list) that is currently available.
    pub async fn list_available(&self) -> Vec<WorkflowDefinition> {
        self.list().await.into_iter().filter(|definition| definition.available).collect()
    }

    /// Whether every tool the named workflow references is available.
    pub async fn is_available(&self, name: &str) -> Result<bool, RegistryError> {
        let definition = {
            let workflows = self.workflows.read().await;
            workflows
                .get(name)
                .cloned()
                .ok_or_else(|| RegistryError::WorkflowNotFound { name: name.to_string() })?
        };
        Ok(self.missing_tools(&definition).await.is_empty())
    }

    /// Execute a workflow through the tracker.
    ///
    /// Fails with [`RegistryError::WorkflowUnavailable`] when any referenced
    /// tool is missing from the catalog. The cancellation token is
    /// propagated to the engine and through it to the tool transport.
    pub async fn execute(
        &self,
        name: &str,
        input: JsonMap<String, JsonValue>,
        cancel: &CancellationToken,
    ) -> Result<JsonValue, RegistryError> {
        let definition = {
            let workflows = self.workflows.read().await;
            workflows
                .get(name)
                .cloned()
                .ok_or_else(|| RegistryError::WorkflowNotFound { name: name.to_string() })?
        };

        let missing = self.missing_tools(&definition).await;
        if !missing.is_empty() {
            return Err(RegistryError::WorkflowUnavailable {
                name: name.to_string(),
                missing,
            });
        }

        Ok(self.tracker.run(&definition, input, self.caller.as_ref(), cancel).await?)
    }

    /// Referenced tools the catalog does not currently resolve. An absent
    /// catalog resolves everything.
    async fn missing_tools(&self, definition: &WorkflowDefinition) -> Vec<String> {
        let Some(catalog) = &self.catalog else {
            return Vec::new();
        };
        let mut missing = Vec::new();
        for tool in definition.referenced_tools() {
            if !catalog.is_tool_available(tool).await && !missing.iter().any(|seen| seen == tool) {
                missing.push(tool.to_string());
            }
        }
        missing
    }
}

impl<B: StorageBackend + 'static> WorkflowRegistry<B> {
    /// Subscribe to tool-catalog change notifications.
    ///
    /// Availability is computed on demand, so there is no cached state to
    /// invalidate; the spawned task re-logs the availability census each
    /// time the catalog reports a change.
    pub fn watch_catalog(self: &Arc<Self>) {
        let Some(mut receiver) = self.catalog.as_ref().and_then(|catalog| catalog.subscribe()) else {
            return;
        };

        let registry = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(()) | Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {
                        let available = registry.list_available().await.len();
                        let total = registry.workflows.read().await.len();
                        info!(available, total, "tool catalog changed; workflow availability re-evaluated");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }
}

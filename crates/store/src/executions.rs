//! Durable execution store with an in-memory summary cache.
//!
//! One JSON object per execution under the `workflow_executions` entity.
//! The cache maps execution ids to listing summaries and is kept coherent
//! synchronously on `store`/`delete`; `list` re-syncs it against the
//! backend's key listing before filtering, so records written by other
//! engine instances sharing the backend eventually appear.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use capstan_types::{
    ExecutionRecord, ExecutionSummary, GetExecutionRequest, ListExecutionsRequest, ListExecutionsResponse, StepExecutionStatus,
};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::warn;

use crate::backend::{ENTITY_EXECUTIONS, StorageBackend, StorageError};

/// Result fields derived from step execution, scrubbed when steps are
/// excluded from a response.
const STEP_DERIVED_RESULT_FIELDS: [&str; 4] = ["steps", "results", "template_vars", "failed_step"];

/// Errors surfaced by the execution store.
#[derive(Debug, Error)]
pub enum ExecutionStoreError {
    #[error("execution '{execution_id}' not found")]
    ExecutionNotFound { execution_id: String },

    #[error("step '{step_id}' not found in execution '{execution_id}'")]
    StepNotFound { execution_id: String, step_id: String },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Execution store layering the summary cache over a [`StorageBackend`].
///
/// A single reader-writer lock coordinates cache and backend: `store` and
/// `delete` take the writer half, `get` the reader half. `list` also takes
/// the writer half because the refresh mutates the cache.
pub struct ExecutionStore<B: StorageBackend> {
    backend: Arc<B>,
    summaries: RwLock<HashMap<String, ExecutionSummary>>,
}

impl<B: StorageBackend> ExecutionStore<B> {
    /// Create a store over the shared backend.
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            summaries: RwLock::new(HashMap::new()),
        }
    }

    /// Persist a record and update the cache. Re-storing under the same
    /// execution id overwrites in place.
    pub async fn store(&self, record: &ExecutionRecord) -> Result<(), ExecutionStoreError> {
        let bytes = serde_json::to_vec_pretty(record).map_err(StorageError::from)?;
        let mut cache = self.summaries.write().await;
        self.backend.save(ENTITY_EXECUTIONS, &record.execution_id, &bytes).await?;
        cache.insert(record.execution_id.clone(), ExecutionSummary::of(record));
        Ok(())
    }

    /// Load the full record for an execution id.
    pub async fn get(&self, execution_id: &str) -> Result<ExecutionRecord, ExecutionStoreError> {
        let _guard = self.summaries.read().await;
        match self.backend.load(ENTITY_EXECUTIONS, execution_id).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes).map_err(StorageError::from)?),
            Err(error) if error.is_not_found() => Err(ExecutionStoreError::ExecutionNotFound {
                execution_id: execution_id.to_string(),
            }),
            Err(error) => Err(error.into()),
        }
    }

    /// Load a record shaped by the query request.
    ///
    /// With `step_id`, the response contains exactly that step, omits the
    /// global result, and keeps record-level `error`/`input` only when that
    /// step failed. With `include_steps` false, step records are omitted
    /// and step-derived fields are scrubbed from the embedded result.
    pub async fn get_execution(&self, request: &GetExecutionRequest) -> Result<ExecutionRecord, ExecutionStoreError> {
        let mut record = self.get(&request.execution_id).await?;

        if let Some(step_id) = &request.step_id {
            let Some(step) = record.steps.iter().find(|step| &step.step_id == step_id).cloned() else {
                return Err(ExecutionStoreError::StepNotFound {
                    execution_id: request.execution_id.clone(),
                    step_id: step_id.clone(),
                });
            };
            let step_failed = step.status == StepExecutionStatus::Failed;
            record.result = None;
            if !step_failed {
                record.error = None;
                record.input = serde_json::Map::new();
            }
            record.steps = vec![step];
            return Ok(record);
        }

        if !request.include_steps {
            record.steps.clear();
            if let Some(JsonValue::Object(result_map)) = &mut record.result {
                for field in STEP_DERIVED_RESULT_FIELDS {
                    result_map.remove(field);
                }
            }
        }

        Ok(record)
    }

    /// Remove a record durably, then evict its summary.
    pub async fn delete(&self, execution_id: &str) -> Result<(), ExecutionStoreError> {
        let mut cache = self.summaries.write().await;
        match self.backend.delete(ENTITY_EXECUTIONS, execution_id).await {
            Ok(()) => {
                cache.remove(execution_id);
                Ok(())
            }
            Err(error) if error.is_not_found() => Err(ExecutionStoreError::ExecutionNotFound {
                execution_id: execution_id.to_string(),
            }),
            Err(error) => Err(error.into()),
        }
    }

    /// List executions, newest first, filtered then paginated.
    pub async fn list(&self, request: &ListExecutionsRequest) -> Result<ListExecutionsResponse, ExecutionStoreError> {
        let mut cache = self.summaries.write().await;
        self.refresh_cache(&mut cache).await?;

        let mut matches: Vec<&ExecutionSummary> = cache
            .values()
            .filter(|summary| {
                request
                    .workflow_name
                    .as_deref()
                    .is_none_or(|name| summary.workflow_name == name)
                    && request.status.is_none_or(|status| summary.status == status)
            })
            .collect();

        matches.sort_by(|left, right| {
            right
                .started_at
                .cmp(&left.started_at)
                .then_with(|| left.execution_id.cmp(&right.execution_id))
        });

        let total = matches.len();
        let limit = request.effective_limit();
        let offset = request.offset;
        let executions: Vec<ExecutionSummary> = matches.into_iter().skip(offset).take(limit).cloned().collect();
        let has_more = offset + executions.len() < total;

        Ok(ListExecutionsResponse {
            executions,
            total,
            limit,
            offset,
            has_more,
        })
    }

    /// Diff the cache against the backend's key listing: load-and-summarize
    /// newly seen keys, evict vanished ones. Unreadable objects are skipped
    /// with a warning and never abort the listing.
    async fn refresh_cache(&self, cache: &mut HashMap<String, ExecutionSummary>) -> Result<(), ExecutionStoreError> {
        let known: Vec<String> = self.backend.list(ENTITY_EXECUTIONS).await?;
        let known_set: HashSet<&str> = known.iter().map(String::as_str).collect();
        cache.retain(|execution_id, _| known_set.contains(execution_id.as_str()));

        for execution_id in &known {
            if cache.contains_key(execution_id) {
                continue;
            }
            match self.backend.load(ENTITY_EXECUTIONS, execution_id).await {
                Ok(bytes) => match serde_json::from_slice::<ExecutionRecord>(&bytes) {
                    Ok(record) => {
                        cache.insert(execution_id.clone(), ExecutionSummary::of(&record));
                    }
                    Err(error) => {
                        warn!(execution_id = execution_id.as_str(), %error, "skipping unreadable execution record");
                    }
                },
                Err(error) => {
                    warn!(execution_id = execution_id.as_str(), %error, "skipping unloadable execution record");
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStorage;
    use capstan_types::{ExecutionStatus, StepRecord};
    use chrono::{Duration, Utc};
    use serde_json::json;

    fn record(execution_id: &str, workflow: &str, status: ExecutionStatus, age_seconds: i64) -> ExecutionRecord {
        ExecutionRecord {
            execution_id: execution_id.to_string(),
            workflow_name: workflow.to_string(),
            status,
            started_at: Utc::now() - Duration::seconds(age_seconds),
            completed_at: Some(Utc::now()),
            duration_ms: 5,
            input: serde_json::Map::new(),
            result: Some(json!({
                "workflow": workflow,
                "results": {"s1": {"ok": true}},
                "template_vars": [],
                "steps": [],
                "status": "completed",
            })),
            error: match status {
                ExecutionStatus::Failed => Some("step 's2' failed: boom".to_string()),
                _ => None,
            },
            steps: vec![
                StepRecord {
                    step_id: "s1".into(),
                    tool: "core_one".into(),
                    status: StepExecutionStatus::Completed,
                    started_at: Utc::now(),
                    completed_at: Some(Utc::now()),
                    duration_ms: 2,
                    input: Some(json!({"a": 1})),
                    result: Some(json!({"ok": true})),
                    error: None,
                    stored_as: Some("s1".into()),
                },
                StepRecord {
                    step_id: "s2".into(),
                    tool: "core_two".into(),
                    status: match status {
                        ExecutionStatus::Failed => StepExecutionStatus::Failed,
                        _ => StepExecutionStatus::Completed,
                    },
                    started_at: Utc::now(),
                    completed_at: Some(Utc::now()),
                    duration_ms: 3,
                    input: None,
                    result: None,
                    error: match status {
                        ExecutionStatus::Failed => Some("boom".to_string()),
                        _ => None,
                    },
                    stored_as: None,
                },
            ],
        }
    }

    fn store() -> ExecutionStore<MemoryStorage> {
        ExecutionStore::new(Arc::new(MemoryStorage::new()))
    }

    #[tokio::test]
    async fn store_get_round_trip() {
        let executions = store();
        let original = record("exec-1", "w", ExecutionStatus::Completed, 0);
        executions.store(&original).await.expect("store");

        let loaded = executions.get("exec-1").await.expect("get");
        assert_eq!(loaded, original);
    }

    #[tokio::test]
    async fn delete_then_get_is_not_found() {
        let executions = store();
        executions
            .store(&record("exec-1", "w", ExecutionStatus::Completed, 0))
            .await
            .expect("store");

        executions.delete("exec-1").await.expect("delete");
        let error = executions.get("exec-1").await.expect_err("gone");
        assert!(matches!(error, ExecutionStoreError::ExecutionNotFound { .. }));

        let error = executions.delete("exec-1").await.expect_err("double delete");
        assert!(matches!(error, ExecutionStoreError::ExecutionNotFound { .. }));
    }

    #[tokio::test]
    async fn restore_overwrites_in_place() {
        let executions = store();
        let mut original = record("exec-1", "w", ExecutionStatus::InProgress, 0);
        executions.store(&original).await.expect("initial store");

        original.status = ExecutionStatus::Completed;
        executions.store(&original).await.expect("terminal store");

        let loaded = executions.get("exec-1").await.expect("get");
        assert_eq!(loaded.status, ExecutionStatus::Completed);

        let listing = executions.list(&ListExecutionsRequest::default()).await.expect("list");
        assert_eq!(listing.total, 1);
        assert_eq!(listing.executions[0].status, ExecutionStatus::Completed);
    }

    #[tokio::test]
    async fn list_filters_sorts_and_paginates() {
        let executions = store();
        for (index, status) in [
            ExecutionStatus::Completed,
            ExecutionStatus::Failed,
            ExecutionStatus::Completed,
            ExecutionStatus::Failed,
            ExecutionStatus::Completed,
            ExecutionStatus::Failed,
            ExecutionStatus::Completed,
        ]
        .into_iter()
        .enumerate()
        {
            executions
                .store(&record(&format!("exec-{index}"), "w", status, index as i64))
                .await
                .expect("store");
        }

        let page = executions
            .list(&ListExecutionsRequest {
                workflow_name: Some("w".into()),
                status: Some(ExecutionStatus::Failed),
                limit: Some(2),
                offset: 0,
            })
            .await
            .expect("list first page");

        assert_eq!(page.total, 3);
        assert_eq!(page.executions.len(), 2);
        assert!(page.has_more);
        // Newest first: exec-1 (age 1) before exec-3 (age 3).
        assert_eq!(page.executions[0].execution_id, "exec-1");
        assert_eq!(page.executions[1].execution_id, "exec-3");

        let page = executions
            .list(&ListExecutionsRequest {
                workflow_name: Some("w".into()),
                status: Some(ExecutionStatus::Failed),
                limit: Some(2),
                offset: 2,
            })
            .await
            .expect("list second page");

        assert_eq!(page.total, 3);
        assert_eq!(page.executions.len(), 1);
        assert!(!page.has_more);
        assert_eq!(page.executions[0].execution_id, "exec-5");
    }

    #[tokio::test]
    async fn list_ties_break_on_execution_id() {
        let executions = store();
        let instant = Utc::now();
        for execution_id in ["exec-b", "exec-a"] {
            let mut entry = record(execution_id, "w", ExecutionStatus::Completed, 0);
            entry.started_at = instant;
            executions.store(&entry).await.expect("store");
        }

        let listing = executions.list(&ListExecutionsRequest::default()).await.expect("list");
        assert_eq!(listing.executions[0].execution_id, "exec-a");
        assert_eq!(listing.executions[1].execution_id, "exec-b");
    }

    #[tokio::test]
    async fn list_discovers_records_written_behind_the_cache() {
        let backend = Arc::new(MemoryStorage::new());
        let executions = ExecutionStore::new(Arc::clone(&backend));

        // Write through a second store sharing the backend; the first
        // store's cache has never seen the record.
        let foreign = ExecutionStore::new(Arc::clone(&backend));
        foreign
            .store(&record("exec-foreign", "w", ExecutionStatus::Completed, 0))
            .await
            .expect("foreign store");

        let listing = executions.list(&ListExecutionsRequest::default()).await.expect("list");
        assert_eq!(listing.total, 1);
        assert_eq!(listing.executions[0].execution_id, "exec-foreign");
    }

    #[tokio::test]
    async fn list_skips_corrupt_records() {
        let backend = Arc::new(MemoryStorage::new());
        backend
            .save(ENTITY_EXECUTIONS, "corrupt", b"not json")
            .await
            .expect("save corrupt");
        let executions = ExecutionStore::new(Arc::clone(&backend));
        executions
            .store(&record("exec-1", "w", ExecutionStatus::Completed, 0))
            .await
            .expect("store");

        let listing = executions.list(&ListExecutionsRequest::default()).await.expect("list");
        assert_eq!(listing.total, 1);
        assert_eq!(listing.executions[0].execution_id, "exec-1");
    }

    #[tokio::test]
    async fn get_execution_narrows_to_one_step() {
        let executions = store();
        executions
            .store(&record("exec-1", "w", ExecutionStatus::Failed, 0))
            .await
            .expect("store");

        // Failed step keeps record-level error and input.
        let narrowed = executions
            .get_execution(&GetExecutionRequest {
                execution_id: "exec-1".into(),
                include_steps: true,
                step_id: Some("s2".into()),
            })
            .await
            .expect("narrowed record");
        assert_eq!(narrowed.steps.len(), 1);
        assert_eq!(narrowed.steps[0].step_id, "s2");
        assert!(narrowed.result.is_none());
        assert!(narrowed.error.is_some());

        // Completed step scrubs record-level error and input.
        let narrowed = executions
            .get_execution(&GetExecutionRequest {
                execution_id: "exec-1".into(),
                include_steps: true,
                step_id: Some("s1".into()),
            })
            .await
            .expect("narrowed record");
        assert_eq!(narrowed.steps[0].step_id, "s1");
        assert!(narrowed.error.is_none());
        assert!(narrowed.input.is_empty());

        let error = executions
            .get_execution(&GetExecutionRequest {
                execution_id: "exec-1".into(),
                include_steps: true,
                step_id: Some("absent".into()),
            })
            .await
            .expect_err("unknown step");
        assert!(matches!(error, ExecutionStoreError::StepNotFound { .. }));
    }

    #[tokio::test]
    async fn get_execution_without_steps_scrubs_derived_fields() {
        let executions = store();
        executions
            .store(&record("exec-1", "w", ExecutionStatus::Completed, 0))
            .await
            .expect("store");

        let trimmed = executions
            .get_execution(&GetExecutionRequest {
                execution_id: "exec-1".into(),
                include_steps: false,
                step_id: None,
            })
            .await
            .expect("trimmed record");

        assert!(trimmed.steps.is_empty());
        let result = trimmed.result.expect("result kept");
        assert!(result.get("results").is_none());
        assert!(result.get("steps").is_none());
        assert!(result.get("template_vars").is_none());
        assert_eq!(result["workflow"], "w");
    }
}

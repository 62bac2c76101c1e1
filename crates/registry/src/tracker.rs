//! Execution tracking around one engine run.
//!
//! The tracker generates the execution id, writes the best-effort initial
//! `in_progress` record, drives the workflow executor, reconciles the
//! step-level records from the engine's structured result (falling back to
//! error-string extraction when no structured result exists), and persists
//! the terminal record exactly once. The initial and terminal writes are
//! independent: a crash between them leaves an `in_progress` record that
//! readers must treat as inconclusive.

use std::sync::Arc;
use std::time::Instant;

use capstan_engine::{EngineError, StepMetadata, ToolCaller, execute_workflow};
use capstan_store::{ExecutionStore, ExecutionStoreError, StorageBackend};
use capstan_types::{ExecutionRecord, ExecutionStatus, StepExecutionStatus, StepRecord, WorkflowDefinition};
use chrono::{DateTime, Utc};
use serde_json::{Map as JsonMap, Value as JsonValue};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use uuid::Uuid;

/// Errors surfaced by tracked execution.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// The workflow failed. The partial result, when any step ran, carries
    /// the embedded execution id like the success payload would.
    #[error("{error}")]
    WorkflowFailed {
        execution_id: String,
        error: EngineError,
        partial_result: Option<JsonValue>,
    },

    /// Persisting the terminal record of a successful run failed.
    #[error(transparent)]
    Store(#[from] ExecutionStoreError),
}

/// Wraps engine runs in durable execution records.
pub struct ExecutionTracker<B: StorageBackend> {
    store: Arc<ExecutionStore<B>>,
}

impl<B: StorageBackend> ExecutionTracker<B> {
    /// Create a tracker persisting through the shared execution store.
    pub fn new(store: Arc<ExecutionStore<B>>) -> Self {
        Self { store }
    }

    /// Execute a workflow and record the run.
    ///
    /// The returned payload carries the `execution_id` at its top level so
    /// consumers can query the record later.
    pub async fn run(
        &self,
        definition: &WorkflowDefinition,
        input: JsonMap<String, JsonValue>,
        caller: &dyn ToolCaller,
        cancel: &CancellationToken,
    ) -> Result<JsonValue, TrackerError> {
        let execution_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let timer = Instant::now();

        let initial_record = ExecutionRecord {
            execution_id: execution_id.clone(),
            workflow_name: definition.name.clone(),
            status: ExecutionStatus::InProgress,
            started_at,
            completed_at: None,
            duration_ms: 0,
            input: input.clone(),
            result: None,
            error: None,
            steps: Vec::new(),
        };
        if let Err(error) = self.store.store(&initial_record).await {
            warn!(
                execution_id = execution_id.as_str(),
                %error,
                "failed to persist initial execution record; continuing"
            );
        }

        let outcome = execute_workflow(definition, input.clone(), caller, cancel).await;
        let completed_at = Utc::now();
        let duration_ms = timer.elapsed().as_millis().try_into().unwrap_or(u64::MAX);

        match outcome {
            Ok(mut result) => {
                embed_execution_id(&mut result, &execution_id);
                let steps = reconstruct_steps(Some(&result), None, started_at);
                let record = ExecutionRecord {
                    execution_id: execution_id.clone(),
                    workflow_name: definition.name.clone(),
                    status: ExecutionStatus::Completed,
                    started_at,
                    completed_at: Some(completed_at),
                    duration_ms,
                    input,
                    result: Some(result.clone()),
                    error: None,
                    steps,
                };
                self.store.store(&record).await?;
                Ok(result)
            }
            Err(failure) => {
                let error_message = failure.error.to_string();
                let mut partial_result = failure.partial_result;
                if let Some(partial) = &mut partial_result {
                    embed_execution_id(partial, &execution_id);
                }
                let steps = reconstruct_steps(partial_result.as_ref(), Some(&error_message), started_at);
                let record = ExecutionRecord {
                    execution_id: execution_id.clone(),
                    workflow_name: definition.name.clone(),
                    status: ExecutionStatus::Failed,
                    started_at,
                    completed_at: Some(completed_at),
                    duration_ms,
                    input,
                    result: partial_result.clone(),
                    error: Some(error_message),
                    steps,
                };
                if let Err(store_error) = self.store.store(&record).await {
                    // The workflow failure is the caller-visible error;
                    // losing the record on top of it is only logged.
                    warn!(
                        execution_id = execution_id.as_str(),
                        %store_error,
                        "failed to persist terminal execution record"
                    );
                }
                Err(TrackerError::WorkflowFailed {
                    execution_id,
                    error: failure.error,
                    partial_result,
                })
            }
        }
    }
}

/// Insert the execution id into an object-shaped payload.
fn embed_execution_id(payload: &mut JsonValue, execution_id: &str) {
    if let JsonValue::Object(map) = payload {
        map.insert("execution_id".to_string(), JsonValue::String(execution_id.to_string()));
    }
}

/// Rebuild step records from the structured result's `steps` array, or fall
/// back to scanning the error string for the failing step id.
fn reconstruct_steps(result: Option<&JsonValue>, error: Option<&str>, started_at: DateTime<Utc>) -> Vec<StepRecord> {
    if let Some(steps_value) = result.and_then(|value| value.get("steps"))
        && let Ok(metadata) = serde_json::from_value::<Vec<StepMetadata>>(steps_value.clone())
    {
        return metadata.into_iter().map(step_record_from_metadata).collect();
    }

    if let Some(message) = error
        && let Some(step_id) = extract_failed_step_id(message)
    {
        return vec![StepRecord {
            step_id,
            tool: String::new(),
            status: StepExecutionStatus::Failed,
            started_at,
            completed_at: None,
            duration_ms: 0,
            input: None,
            result: None,
            error: Some(message.to_string()),
            stored_as: None,
        }];
    }

    Vec::new()
}

fn step_record_from_metadata(metadata: StepMetadata) -> StepRecord {
    StepRecord {
        step_id: metadata.id,
        tool: metadata.tool,
        status: metadata.status,
        started_at: metadata.started_at,
        completed_at: metadata.completed_at,
        duration_ms: metadata.duration_ms,
        input: metadata.input,
        result: metadata.result,
        error: metadata.error,
        stored_as: metadata.stored_as,
    }
}

/// Best-effort extraction of the failing step id from an error message of
/// the engine's `step '<id>' failed:` shape.
fn extract_failed_step_id(message: &str) -> Option<String> {
    let (_, after_marker) = message.split_once("step '")?;
    let (step_id, rest) = after_marker.split_once('\'')?;
    if step_id.is_empty() || !rest.trim_start().starts_with("failed:") {
        return None;
    }
    Some(step_id.to_string())
}

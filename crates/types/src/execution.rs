//! Durable execution record model and the request/response contracts of the
//! execution query surface.
//!
//! Records are created when a run starts and rewritten once when it reaches a
//! terminal state; only those two writes are guaranteed durable. Statuses use
//! compact wire names (`inprogress`, `completed`, `failed`) so records stay
//! grep-friendly on disk.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};

/// Default page size for execution listings.
pub const DEFAULT_LIST_LIMIT: usize = 50;

/// Upper bound applied to caller-provided page sizes.
pub const MAX_LIST_LIMIT: usize = 1000;

/// High-level lifecycle status of one workflow execution.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ExecutionStatus {
    /// The run has started but not reached a terminal state. Readers must
    /// treat records left in this state as inconclusive.
    #[serde(rename = "inprogress")]
    InProgress,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "failed")]
    Failed,
}

impl ExecutionStatus {
    /// Returns true when the status represents a terminal outcome.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Fine-grained status for individual executed steps.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StepExecutionStatus {
    /// The step executed and its tool returned successfully.
    Completed,
    /// The step attempted its tool and the call failed.
    Failed,
    /// The step's condition decided against running; the tool was never
    /// invoked.
    Skipped,
}

/// Durable record of one workflow execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionRecord {
    /// Opaque, collision-resistant identifier generated when the run starts.
    pub execution_id: String,
    /// Name of the workflow that was executed.
    pub workflow_name: String,
    /// Lifecycle status; terminal exactly once.
    pub status: ExecutionStatus,
    /// UTC instant the run began.
    pub started_at: DateTime<Utc>,
    /// UTC instant the run reached a terminal state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Wall-clock duration in integer milliseconds.
    #[serde(default)]
    pub duration_ms: u64,
    /// Caller input after defaults were applied.
    #[serde(default)]
    pub input: JsonMap<String, JsonValue>,
    /// Structured final result returned by the engine, when one exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,
    /// Terminal error message for failed runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Step-level records in declaration order, covering exactly the steps
    /// the engine attempted or explicitly skipped.
    #[serde(default)]
    pub steps: Vec<StepRecord>,
}

/// Durable record of one step within an execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepRecord {
    /// Step identifier from the workflow definition.
    pub step_id: String,
    /// Tool the step invoked (or would have invoked when skipped).
    pub tool: String,
    /// Outcome of the step.
    pub status: StepExecutionStatus,
    /// UTC instant the step began.
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Step duration in integer milliseconds.
    #[serde(default)]
    pub duration_ms: u64,
    /// Resolved arguments the tool was invoked with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<JsonValue>,
    /// Parsed tool result captured for the step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,
    /// Error message when the step failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Results-map slot the step stored into, when storage was requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stored_as: Option<String>,
}

/// Compact listing row derived from an [`ExecutionRecord`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionSummary {
    pub execution_id: String,
    pub workflow_name: String,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_ms: u64,
    /// Number of step records captured for the execution.
    pub step_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionSummary {
    /// Summarize a full record for the listing cache.
    pub fn of(record: &ExecutionRecord) -> Self {
        Self {
            execution_id: record.execution_id.clone(),
            workflow_name: record.workflow_name.clone(),
            status: record.status,
            started_at: record.started_at,
            completed_at: record.completed_at,
            duration_ms: record.duration_ms,
            step_count: record.steps.len(),
            error: record.error.clone(),
        }
    }
}

/// Filterable, paginated listing request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ListExecutionsRequest {
    /// Restrict to executions of this workflow.
    #[serde(default)]
    pub workflow_name: Option<String>,
    /// Restrict to executions in this status.
    #[serde(default)]
    pub status: Option<ExecutionStatus>,
    /// Page size; defaults to [`DEFAULT_LIST_LIMIT`], clamped to
    /// `[1, MAX_LIST_LIMIT]`.
    #[serde(default)]
    pub limit: Option<usize>,
    /// Number of matching rows to skip before the page begins.
    #[serde(default)]
    pub offset: usize,
}

impl ListExecutionsRequest {
    /// The page size after default and clamping rules.
    pub fn effective_limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT)
    }
}

/// Listing response; `total` counts matches before pagination.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListExecutionsResponse {
    pub executions: Vec<ExecutionSummary>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
    pub has_more: bool,
}

/// Single-record fetch request with optional step narrowing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GetExecutionRequest {
    pub execution_id: String,
    /// When false, step records are omitted and step-derived fields are
    /// scrubbed from the embedded result.
    #[serde(default = "default_include_steps")]
    pub include_steps: bool,
    /// When set, the response contains exactly this step and omits the
    /// global result.
    #[serde(default)]
    pub step_id: Option<String>,
}

impl GetExecutionRequest {
    /// Fetch the full record for an execution id.
    pub fn for_execution(execution_id: impl Into<String>) -> Self {
        Self {
            execution_id: execution_id.into(),
            include_steps: true,
            step_id: None,
        }
    }
}

fn default_include_steps() -> bool {
    true
}

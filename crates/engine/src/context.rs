//! Per-run execution context.
//!
//! The context is owned by a single workflow run and never shared across
//! runs, so it needs no synchronization. It accumulates stored step results,
//! template-variable provenance, and the ordered step metadata that becomes
//! the `steps` array of the final result.

use std::collections::{BTreeSet, HashMap};

use capstan_types::{StepExecutionStatus, WorkflowStep};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};

/// Execution state threaded through every step of one workflow run.
#[derive(Debug, Default, Clone)]
pub struct ExecutionContext {
    /// Caller-supplied arguments after defaults were merged in.
    pub input: JsonMap<String, JsonValue>,
    /// Parsed results of completed steps, keyed by their storage slot.
    pub results: HashMap<String, JsonValue>,
    /// User variables; reserved for future use, always resolvable.
    pub vars: HashMap<String, JsonValue>,
    /// Names of input variables referenced by any template, recorded for
    /// provenance.
    pub template_vars: BTreeSet<String>,
    /// One entry per attempted or explicitly skipped step, in declaration
    /// order.
    pub step_metadata: Vec<StepMetadata>,
}

impl ExecutionContext {
    /// Create a context for the given post-default input map.
    pub fn new(input: JsonMap<String, JsonValue>) -> Self {
        Self {
            input,
            ..Self::default()
        }
    }

    /// Template variable names in deterministic order.
    pub fn template_var_list(&self) -> Vec<String> {
        self.template_vars.iter().cloned().collect()
    }
}

/// Metadata describing the outcome of one step.
///
/// Serialized verbatim into the final result's `steps` array; the execution
/// tracker rebuilds durable step records from exactly this shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepMetadata {
    /// Step identifier.
    pub id: String,
    /// Tool the step targets.
    pub tool: String,
    /// Outcome of the step.
    pub status: StepExecutionStatus,
    /// Storage slot the parsed result was written to, when storage was
    /// requested and the step completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stored_as: Option<String>,
    /// Resolved arguments the tool was (or would have been) invoked with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<JsonValue>,
    /// Parsed tool result for completed steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,
    /// Failure message for failed steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Tool the step's condition invoked, when the condition ran one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition_tool: Option<String>,
    /// Observation the condition compared against its expectations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition_evaluation: Option<JsonValue>,
    /// Whether the condition decided the step should run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition_result: Option<bool>,
    /// UTC instant the step began.
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Step duration in integer milliseconds.
    #[serde(default)]
    pub duration_ms: u64,
}

impl StepMetadata {
    /// Tentative entry appended when the executor reaches a step. The status
    /// starts as skipped and is overwritten once the outcome is known.
    pub fn begin(step: &WorkflowStep) -> Self {
        Self {
            id: step.id.clone(),
            tool: step.tool.clone(),
            status: StepExecutionStatus::Skipped,
            stored_as: None,
            input: None,
            result: None,
            error: None,
            condition_tool: None,
            condition_evaluation: None,
            condition_result: None,
            started_at: Utc::now(),
            completed_at: None,
            duration_ms: 0,
        }
    }

    /// Stamp the terminal instant and duration for this entry.
    pub fn finish(&mut self) {
        let completed = Utc::now();
        self.duration_ms = (completed - self.started_at).num_milliseconds().max(0) as u64;
        self.completed_at = Some(completed);
    }
}

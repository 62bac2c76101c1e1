//! Single-step execution.

use capstan_types::{StepExecutionStatus, ToolResult, WorkflowStep};
use serde_json::Value as JsonValue;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::condition::evaluate_condition;
use crate::context::{ExecutionContext, StepMetadata};
use crate::error::EngineError;
use crate::template::resolve_value;
use crate::transport::ToolCaller;

/// How one step concluded, from the driving loop's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StepOutcome {
    /// Tool invoked and succeeded.
    Completed,
    /// Condition decided against running; the tool was never invoked.
    Skipped,
    /// Tool failed but the step allows failure; the workflow continues.
    FailedButAllowed,
}

/// Execute one step against the context.
///
/// Always appends exactly one metadata entry, whatever the outcome. A
/// returned error means the workflow must stop; the metadata entry for the
/// failing step is already recorded when that happens.
pub(crate) async fn execute_step(
    step: &WorkflowStep,
    context: &mut ExecutionContext,
    caller: &dyn ToolCaller,
    cancel: &CancellationToken,
) -> Result<StepOutcome, EngineError> {
    let entry_index = context.step_metadata.len();
    context.step_metadata.push(StepMetadata::begin(step));

    if let Some(condition) = &step.condition {
        match evaluate_condition(condition, context, caller).await {
            Ok(outcome) => {
                let entry = &mut context.step_metadata[entry_index];
                entry.condition_tool = outcome.tool.clone();
                entry.condition_evaluation = Some(outcome.observed.clone());
                entry.condition_result = Some(outcome.should_run);
                if !outcome.should_run {
                    entry.status = StepExecutionStatus::Skipped;
                    entry.finish();
                    debug!(step = step.id.as_str(), "step skipped by condition");
                    return Ok(StepOutcome::Skipped);
                }
            }
            Err(error) => {
                return Err(mark_failed(context, entry_index, error.into()));
            }
        }
    }

    let raw_args = JsonValue::Object(step.args.iter().map(|(key, value)| (key.clone(), value.clone())).collect());
    let resolved_args = match resolve_value(&raw_args, context) {
        Ok(JsonValue::Object(map)) => map,
        Ok(_) => serde_json::Map::new(),
        Err(error) => return Err(mark_failed(context, entry_index, error.into())),
    };
    context.step_metadata[entry_index].input = Some(JsonValue::Object(resolved_args.clone()));

    debug!(step = step.id.as_str(), tool = step.tool.as_str(), "invoking tool");
    let call_result = tokio::select! {
        _ = cancel.cancelled() => {
            return Err(mark_failed(context, entry_index, EngineError::Cancelled));
        }
        result = caller.call_tool(&step.tool, &resolved_args) => result,
    };

    let tool_result = match call_result {
        Ok(result) => result,
        Err(error) => {
            let failure = EngineError::Transport {
                tool: step.tool.clone(),
                message: error.message,
            };
            return handle_tool_failure(step, context, entry_index, failure);
        }
    };

    if tool_result.is_error {
        let message = tool_result.first_text().unwrap_or("tool reported an error").to_string();
        let failure = EngineError::ToolLogical {
            tool: step.tool.clone(),
            message,
        };
        return handle_tool_failure(step, context, entry_index, failure);
    }

    let parsed = parse_tool_payload(&tool_result);
    let slot = step.store.slot(&step.id).map(str::to_string);
    if let Some(slot_name) = &slot {
        context.results.insert(slot_name.clone(), parsed.clone());
    }

    let entry = &mut context.step_metadata[entry_index];
    entry.result = Some(parsed);
    entry.stored_as = slot;
    entry.status = StepExecutionStatus::Completed;
    entry.finish();

    Ok(StepOutcome::Completed)
}

/// Parse the primary text content of a tool result.
///
/// The first text part is parsed as JSON when possible; otherwise the raw
/// text is kept as a string. Results without any text part parse to null.
pub fn parse_tool_payload(result: &ToolResult) -> JsonValue {
    match result.first_text() {
        Some(text) => serde_json::from_str(text).unwrap_or_else(|_| JsonValue::String(text.to_string())),
        None => JsonValue::Null,
    }
}

/// Record a tool failure on the step and decide whether the workflow
/// continues. `allow_failure` applies only to tool failures, never to
/// template or condition errors.
fn handle_tool_failure(
    step: &WorkflowStep,
    context: &mut ExecutionContext,
    entry_index: usize,
    failure: EngineError,
) -> Result<StepOutcome, EngineError> {
    if step.allow_failure {
        let entry = &mut context.step_metadata[entry_index];
        entry.status = StepExecutionStatus::Failed;
        entry.error = Some(failure.to_string());
        entry.finish();
        warn!(step = step.id.as_str(), error = %failure, "step failed; continuing because the step allows failure");
        return Ok(StepOutcome::FailedButAllowed);
    }
    Err(mark_failed(context, entry_index, failure))
}

/// Mark the step's metadata entry failed and hand the error back.
fn mark_failed(context: &mut ExecutionContext, entry_index: usize, failure: EngineError) -> EngineError {
    let entry = &mut context.step_metadata[entry_index];
    entry.status = StepExecutionStatus::Failed;
    entry.error = Some(failure.to_string());
    entry.finish();
    failure
}

//! Per-step condition evaluation.
//!
//! A condition observes either a fresh tool call or a prior step's stored
//! result, then compares the observation against `expect` / `expect_not`
//! expectations to decide whether the step runs. Tool failures during
//! evaluation never escape: they collapse into the "observation failed"
//! branch and the expectations decide what that means.

use capstan_types::{Expectation, StepCondition};
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::context::ExecutionContext;
use crate::error::ConditionError;
use crate::executor::parse_tool_payload;
use crate::template::{resolve_value, select_path};
use crate::transport::ToolCaller;

/// Outcome of evaluating one step condition.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionOutcome {
    /// Whether the guarded step should run.
    pub should_run: bool,
    /// Tool the condition invoked, when it ran one.
    pub tool: Option<String>,
    /// The observation the expectations were compared against.
    pub observed: JsonValue,
    /// Whether the observation source succeeded.
    pub succeeded: bool,
}

/// Evaluate a condition against the current execution context.
pub async fn evaluate_condition(
    condition: &StepCondition,
    context: &mut ExecutionContext,
    caller: &dyn ToolCaller,
) -> Result<ConditionOutcome, ConditionError> {
    let resolved_args = resolve_value(&JsonValue::Object(condition.args.iter().map(|(k, v)| (k.clone(), v.clone())).collect()), context)?;
    let resolved_args = match resolved_args {
        JsonValue::Object(map) => map,
        _ => serde_json::Map::new(),
    };

    let (succeeded, observed) = match (&condition.tool, &condition.from_step) {
        (Some(tool), _) => match caller.call_tool(tool, &resolved_args).await {
            Ok(result) if !result.is_error => (true, parse_tool_payload(&result)),
            Ok(result) => (false, parse_tool_payload(&result)),
            Err(error) => {
                debug!(tool = tool.as_str(), %error, "condition tool call failed; treating as unsuccessful observation");
                (false, JsonValue::Null)
            }
        },
        (None, Some(from_step)) => match context.results.get(from_step) {
            Some(value) => (true, value.clone()),
            None => (false, JsonValue::Null),
        },
        (None, None) => (false, JsonValue::Null),
    };

    let expect_matched = condition.expect.as_ref().map(|expectation| matches(expectation, succeeded, &observed));
    let expect_not_matched = condition
        .expect_not
        .as_ref()
        .map(|expectation| matches(expectation, succeeded, &observed));

    let should_run = match (expect_matched, expect_not_matched) {
        (Some(matched), None) => matched,
        (None, Some(matched)) => !matched,
        (Some(matched), Some(not_matched)) => {
            // expect says run iff matched; expect_not says run iff not
            // matched. They agree only when the two verdicts differ.
            if matched == not_matched {
                return Err(ConditionError::Contradiction {
                    expect_matched: matched,
                    expect_not_matched: not_matched,
                });
            }
            matched
        }
        // Unreachable for validated definitions; err on the side of running.
        (None, None) => true,
    };

    Ok(ConditionOutcome {
        should_run,
        tool: condition.tool.clone(),
        observed,
        succeeded,
    })
}

/// Whether an expectation matches the observation.
fn matches(expectation: &Expectation, succeeded: bool, observed: &JsonValue) -> bool {
    if let Some(expected_success) = expectation.success
        && expected_success != succeeded
    {
        return false;
    }

    expectation
        .json_path
        .iter()
        .all(|(path, expected)| select_path(observed, path).as_ref() == Some(expected))
}

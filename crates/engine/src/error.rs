//! Error types surfaced by the execution engine.
//!
//! The engine recovers nothing automatically: template, condition, and tool
//! failures all propagate to the caller, carrying a partial result whenever
//! any step ran.

use capstan_types::ValidationError;
use serde_json::Value as JsonValue;
use thiserror::Error;

/// Template parsing and rendering failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    /// A `{{` marker without a matching `}}`.
    #[error("unterminated template expression in '{input}'")]
    Unterminated { input: String },

    /// Expression head is not one of `input`, `results`, `context`, `vars`.
    #[error("template '{{{{ {expression} }}}}' references unknown namespace '{namespace}'")]
    UnknownNamespace { expression: String, namespace: String },

    /// A path segment did not resolve. Missing keys are fatal; there is no
    /// silent empty-string fallback.
    #[error("template '{{{{ {expression} }}}}' references missing key '{missing}'")]
    MissingKey { expression: String, missing: String },
}

/// Condition evaluation failures.
#[derive(Debug, Error)]
pub enum ConditionError {
    /// Template failure while resolving condition arguments.
    #[error(transparent)]
    Template(#[from] TemplateError),

    /// `expect` and `expect_not` were both supplied and disagree about
    /// whether the step should run.
    #[error("condition expectations contradict each other (expect matched: {expect_matched}, expect_not matched: {expect_not_matched})")]
    Contradiction {
        expect_matched: bool,
        expect_not_matched: bool,
    },
}

/// Engine-level error taxonomy.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Definition or input failed its declared schema.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Condition(#[from] ConditionError),

    /// Transport-level failure reaching the tool.
    #[error("tool '{tool}' transport failure: {message}")]
    Transport { tool: String, message: String },

    /// Transport succeeded but the result carried the error flag.
    #[error("tool '{tool}' returned an error: {message}")]
    ToolLogical { tool: String, message: String },

    /// A step failed and aborted the workflow. The display shape is load
    /// bearing: the tracker's fallback extractor scans error strings for it.
    #[error("step '{step_id}' failed: {source}")]
    StepFailed {
        step_id: String,
        #[source]
        source: Box<EngineError>,
    },

    /// The cancellation signal fired.
    #[error("workflow execution cancelled")]
    Cancelled,
}

impl EngineError {
    /// Wrap an error as the failure of a named step, unless it already is
    /// one (or is a cancellation, which keeps its own shape).
    pub fn for_step(step_id: &str, error: EngineError) -> EngineError {
        match error {
            already @ (EngineError::StepFailed { .. } | EngineError::Cancelled) => already,
            other => EngineError::StepFailed {
                step_id: step_id.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// The failing step id, when this error identifies one.
    pub fn failed_step(&self) -> Option<&str> {
        match self {
            EngineError::StepFailed { step_id, .. } => Some(step_id),
            _ => None,
        }
    }
}

/// A workflow failure paired with the partial result assembled from the
/// steps that did run. Pre-flight validation failures carry no partial
/// result because no step was attempted.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct ExecutionFailure {
    pub error: EngineError,
    pub partial_result: Option<JsonValue>,
}

impl ExecutionFailure {
    /// Failure with no partial result (nothing ran).
    pub fn bare(error: impl Into<EngineError>) -> Self {
        Self {
            error: error.into(),
            partial_result: None,
        }
    }
}

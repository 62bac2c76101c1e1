//! Strongly typed workflow schema definitions shared across the registry,
//! engine, and store.
//!
//! The models preserve authoring order (via `IndexMap`) so definition round
//! trips keep arguments and step parameters in the sequence the author wrote
//! them.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

pub mod validation;

/// Describes a fully authored workflow: metadata, declared arguments, and the
/// ordered steps executed sequentially at run time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowDefinition {
    /// Canonical workflow identifier (for example, `provision_cluster`).
    pub name: String,
    /// Optional descriptive copy surfaced by listing tools.
    #[serde(default)]
    pub description: Option<String>,
    /// Declarative argument definitions keyed by argument name, preserving
    /// author order.
    #[serde(default = "default_argument_map")]
    pub args: IndexMap<String, ArgumentSpec>,
    /// Ordered list of workflow steps executed sequentially.
    #[serde(default)]
    pub steps: Vec<WorkflowStep>,
    /// Timestamp of first persistence; stamped by the registry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Timestamp of the last registry write.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    /// Computed availability flag: true when every referenced tool is
    /// currently resolvable. Recomputed on read, never authoritative on disk.
    #[serde(default)]
    pub available: bool,
}

impl WorkflowDefinition {
    /// Iterate over every tool name the workflow references, including
    /// condition tools.
    pub fn referenced_tools(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().flat_map(|step| {
            std::iter::once(step.tool.as_str()).chain(
                step.condition
                    .as_ref()
                    .and_then(|condition| condition.tool.as_deref()),
            )
        })
    }
}

/// Declares a single named workflow argument.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArgumentSpec {
    /// Coarse type tag used for input validation.
    pub r#type: ArgumentType,
    /// Whether a value must be supplied before the workflow can run.
    #[serde(default)]
    pub required: bool,
    /// Descriptive text explaining the purpose of the argument.
    #[serde(default)]
    pub description: Option<String>,
    /// Literal default merged into the input map when the caller omits the
    /// argument.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<JsonValue>,
}

/// Coarse argument type tags accepted by workflow definitions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ArgumentType {
    String,
    /// Any JSON number.
    Number,
    /// A JSON number restricted to integral values.
    Integer,
    Boolean,
    Object,
    Array,
}

impl ArgumentType {
    /// Returns true when the candidate value satisfies this type tag.
    pub fn accepts(self, candidate: &JsonValue) -> bool {
        match self {
            Self::String => candidate.is_string(),
            Self::Number => candidate.is_number(),
            Self::Integer => candidate.as_i64().is_some() || candidate.as_u64().is_some(),
            Self::Boolean => candidate.is_boolean(),
            Self::Object => candidate.is_object(),
            Self::Array => candidate.is_array(),
        }
    }

    /// Wire name used in diagnostics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
        }
    }
}

/// Describes a single step within a workflow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowStep {
    /// Unique step identifier referenced by later templates.
    pub id: String,
    /// Name of the tool to invoke through the transport.
    pub tool: String,
    /// Named arguments passed to the tool; values may contain `{{ ... }}`
    /// templates resolved against the execution context.
    #[serde(default = "default_value_map")]
    pub args: IndexMap<String, JsonValue>,
    /// Whether the parsed result is stored for later steps. Also accepts the
    /// legacy string form naming an explicit result slot.
    #[serde(default)]
    pub store: StoreTarget,
    /// When true, a failing tool call does not abort the workflow.
    #[serde(default)]
    pub allow_failure: bool,
    /// Optional guard deciding whether this step runs.
    #[serde(default)]
    pub condition: Option<StepCondition>,
    /// Optional declared output hints; preserved verbatim for consumers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<IndexMap<String, JsonValue>>,
    /// Optional descriptive copy surfaced in execution records.
    #[serde(default)]
    pub description: Option<String>,
}

/// Result-storage directive for a step.
///
/// `true` stores under the step id; the legacy string form names the slot
/// explicitly; `false` (the default) discards the result after forwarding it
/// through the final merge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum StoreTarget {
    Flag(bool),
    Named(String),
}

impl Default for StoreTarget {
    fn default() -> Self {
        Self::Flag(false)
    }
}

impl StoreTarget {
    /// Returns the results-map key for a step, or `None` when the result is
    /// not stored.
    pub fn slot<'a>(&'a self, step_id: &'a str) -> Option<&'a str> {
        match self {
            Self::Flag(true) => Some(step_id),
            Self::Flag(false) => None,
            Self::Named(name) if name.is_empty() => None,
            Self::Named(name) => Some(name.as_str()),
        }
    }

    /// Returns true when any storage slot is requested.
    pub fn is_set(&self) -> bool {
        !matches!(self, Self::Flag(false)) && !matches!(self, Self::Named(name) if name.is_empty())
    }
}

/// Optional per-step guard.
///
/// The observation source is either a direct tool invocation (`tool` +
/// `args`) or a prior step's stored result (`from_step`). At least one of
/// `expect` / `expect_not` declares the outcome that decides whether the
/// step runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepCondition {
    /// Tool invoked to produce the observation.
    #[serde(default)]
    pub tool: Option<String>,
    /// Arguments for the condition tool; templates allowed.
    #[serde(default = "default_value_map")]
    pub args: IndexMap<String, JsonValue>,
    /// Identifier of a prior step whose stored result is the observation.
    #[serde(default)]
    pub from_step: Option<String>,
    /// Expectation that must match for the step to run.
    #[serde(default)]
    pub expect: Option<Expectation>,
    /// Expectation that must *not* match for the step to run.
    #[serde(default)]
    pub expect_not: Option<Expectation>,
}

/// A single condition expectation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Expectation {
    /// Expected success flag of the observation source.
    #[serde(default)]
    pub success: Option<bool>,
    /// Path expression to expected-value pairs; every entry must select an
    /// equal value from the observation.
    #[serde(default)]
    pub json_path: IndexMap<String, JsonValue>,
}

impl Expectation {
    /// Returns true when the expectation declares nothing to check.
    pub fn is_empty(&self) -> bool {
        self.success.is_none() && self.json_path.is_empty()
    }
}

fn default_argument_map() -> IndexMap<String, ArgumentSpec> {
    IndexMap::new()
}

fn default_value_map() -> IndexMap<String, JsonValue> {
    IndexMap::new()
}

//! # Capstan Engine
//!
//! The Capstan engine executes declarative workflow definitions step by step:
//! it resolves `{{ ... }}` template expressions against the execution
//! context, evaluates optional per-step conditions, dispatches tool calls
//! through the pluggable [`ToolCaller`] transport, and assembles a structured
//! result describing exactly what ran.
//!
//! ## Architecture
//!
//! - **`context`**: per-run execution state (inputs, stored results, step
//!   metadata)
//! - **`template`**: template resolution over the `input` / `results` /
//!   `context` / `vars` namespaces
//! - **`condition`**: per-step guard evaluation
//! - **`transport`**: the tool transport and tool catalog seams
//! - **`executor`**: input pre-flight, the sequential driving loop, and
//!   final-result assembly
//!
//! Steps run strictly sequentially within one workflow; concurrency happens
//! at the workflow boundary only. The engine never retries: every failure is
//! surfaced to the caller, together with a partial result whenever any step
//! ran.

pub mod condition;
pub mod context;
pub mod error;
pub mod executor;
pub mod template;
pub mod transport;

pub use condition::{ConditionOutcome, evaluate_condition};
pub use context::{ExecutionContext, StepMetadata};
pub use error::{ConditionError, EngineError, ExecutionFailure, TemplateError};
pub use executor::{execute_workflow, parse_tool_payload, prepare_input};
pub use template::resolve_value;
pub use transport::{NoopToolCaller, ToolCallError, ToolCaller, ToolCatalog};

//! Shared type definitions for the Capstan workflow engine.
//!
//! This crate holds the declarative workflow model (definitions, steps,
//! conditions), the durable execution record model, and the tool-result
//! content shapes exchanged with the tool transport. The engine, store, and
//! registry crates all build on these types; nothing here performs I/O.

pub mod execution;
pub mod tool;
pub mod workflow;

pub use execution::{
    DEFAULT_LIST_LIMIT, ExecutionRecord, ExecutionStatus, ExecutionSummary, GetExecutionRequest, ListExecutionsRequest,
    ListExecutionsResponse, MAX_LIST_LIMIT, StepExecutionStatus, StepRecord,
};
pub use tool::{ToolContent, ToolResult};
pub use workflow::{
    ArgumentSpec, ArgumentType, Expectation, StepCondition, StoreTarget, WorkflowDefinition, WorkflowStep,
    validation::{ValidationError, validate_definition},
};

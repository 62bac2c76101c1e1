//! Workflow registry and execution tracking for the Capstan engine.
//!
//! The [`WorkflowRegistry`] owns validated workflow definitions backed by
//! durable storage, answers availability questions against the tool
//! catalog, and drives executions through the [`ExecutionTracker`], which
//! wraps each engine run in a durable, queryable execution record.

pub mod definitions;
pub mod registry;
pub mod tracker;

pub use definitions::{DefinitionStore, parse_definition};
pub use registry::{RegistryError, WorkflowRegistry};
pub use tracker::{ExecutionTracker, TrackerError};

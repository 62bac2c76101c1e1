//! Seams toward the tool transport and tool catalog.
//!
//! The engine treats tool dispatch as opaque: it hands a tool name and an
//! argument map to a [`ToolCaller`] and interprets only the returned content
//! parts. Availability questions go to the [`ToolCatalog`], which may also
//! broadcast change notifications.

use async_trait::async_trait;
use capstan_types::ToolResult;
use serde_json::{Map as JsonMap, Value as JsonValue};
use thiserror::Error;
use tokio::sync::broadcast;

/// Transport-level failure reaching a tool.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("tool '{tool}' call failed: {message}")]
pub struct ToolCallError {
    pub tool: String,
    pub message: String,
}

impl ToolCallError {
    pub fn new(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            message: message.into(),
        }
    }
}

/// Dispatches a named tool with an argument map.
#[async_trait]
pub trait ToolCaller: Send + Sync {
    /// Invoke the tool and return its content-typed result. A returned
    /// `Ok` with `is_error == true` is a logical failure the engine treats
    /// like a failed call.
    async fn call_tool(&self, name: &str, args: &JsonMap<String, JsonValue>) -> Result<ToolResult, ToolCallError>;
}

/// Reports whether tools are presently resolvable.
#[async_trait]
pub trait ToolCatalog: Send + Sync {
    /// True when the named tool can currently be dispatched.
    async fn is_tool_available(&self, name: &str) -> bool;

    /// Receiver for tools-updated notifications, when the catalog emits
    /// them. The default catalog is static and returns `None`.
    fn subscribe(&self) -> Option<broadcast::Receiver<()>> {
        None
    }
}

/// Tool caller that accepts every call and returns an empty success.
///
/// Useful for dry runs and tests that only exercise control flow.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopToolCaller;

#[async_trait]
impl ToolCaller for NoopToolCaller {
    async fn call_tool(&self, _name: &str, _args: &JsonMap<String, JsonValue>) -> Result<ToolResult, ToolCallError> {
        Ok(ToolResult::default())
    }
}

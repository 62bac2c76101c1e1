//! Content shapes returned by the tool transport.
//!
//! A tool result is an ordered list of typed parts. The engine interprets
//! only the first text part; every other part is preserved verbatim so
//! downstream consumers can still see it.

use serde::{Deserialize, Serialize};

/// One typed part of a tool result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolContent {
    /// Plain text content; the first such part is the engine's input for
    /// result parsing.
    Text { text: String },
    /// Opaque non-text content, carried through untouched.
    Data { mime_type: String, data: String },
}

/// Result of one tool invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ToolResult {
    /// Ordered content parts.
    #[serde(default)]
    pub content: Vec<ToolContent>,
    /// Logical failure flag; treated as a step failure even when the
    /// transport itself returned without error.
    #[serde(default)]
    pub is_error: bool,
}

impl ToolResult {
    /// Build a successful single-text result.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            is_error: false,
        }
    }

    /// Build a failed single-text result.
    pub fn error_text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            is_error: true,
        }
    }

    /// First text part, when one exists.
    pub fn first_text(&self) -> Option<&str> {
        self.content.iter().find_map(|part| match part {
            ToolContent::Text { text } => Some(text.as_str()),
            _ => None,
        })
    }
}

// crates/toolgate-core/src/core/artifact.rs
// ============================================================================
// Module: Tool Envelopes
// Description: Opaque payload, artifact, and failure envelopes for tool calls.
// Purpose: Carry tool inputs and outputs through the core without interpreting them.
// Dependencies: serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Tool handlers are external collaborators. The core only moves their
//! inputs ([`Payload`]) and outputs ([`Artifact`], [`ToolError`]) between the
//! transport and the handler; it never inspects their contents.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Envelopes
// ============================================================================

/// Reference to a file delivered alongside a command or produced by a tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    /// Local filesystem path.
    pub path: PathBuf,
    /// Display name when different from the path's file name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Command payload supplied by the requester.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Payload {
    /// No argument.
    #[default]
    Empty,
    /// Free-text argument.
    Text(String),
    /// Attached file.
    File(FileRef),
}

impl Payload {
    /// Returns the trimmed text argument, if any.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => {
                let trimmed = text.trim();
                (!trimmed.is_empty()).then_some(trimmed)
            }
            Self::Empty | Self::File(_) => None,
        }
    }
}

/// Successful tool output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Artifact {
    /// Plain text reply.
    Text(String),
    /// Produced file.
    File(FileRef),
    /// Structured result.
    Json(Value),
}

/// Opaque tool failure.
///
/// # Invariants
/// - `code` is a short stable label; `message` is user-facing text.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct ToolError {
    /// Stable failure label.
    pub code: String,
    /// Human-readable failure message.
    pub message: String,
}

impl ToolError {
    /// Creates a tool error.
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

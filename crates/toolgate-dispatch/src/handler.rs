// crates/toolgate-dispatch/src/handler.rs
// ============================================================================
// Module: Tool Handlers
// Description: Tool handler contract and the static command table.
// Purpose: Map command names to opaque handler implementations.
// Dependencies: async-trait, toolgate-core
// ============================================================================

//! ## Overview
//! A [`ToolHandler`] performs the actual work behind a command. The dispatcher
//! never inspects handler inputs or outputs. [`HandlerTable`] is built once at
//! startup and is immutable afterwards.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use toolgate_core::Artifact;
use toolgate_core::CommandName;
use toolgate_core::Identity;
use toolgate_core::Payload;
use toolgate_core::ToolError;

// ============================================================================
// SECTION: Handler Contract
// ============================================================================

/// Opaque unit of work behind a command.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Runs the tool for `identity` with the given payload.
    async fn invoke(&self, identity: &Identity, payload: &Payload) -> Result<Artifact, ToolError>;
}

/// Handler for gated commands with no configured implementation.
///
/// # Invariants
/// - Always fails with `tool_unavailable`.
pub struct UnavailableToolHandler {
    /// Command the handler stands in for.
    command: CommandName,
}

impl UnavailableToolHandler {
    /// Creates a stand-in handler for `command`.
    #[must_use]
    pub const fn new(command: CommandName) -> Self {
        Self {
            command,
        }
    }
}

#[async_trait]
impl ToolHandler for UnavailableToolHandler {
    async fn invoke(&self, _identity: &Identity, _payload: &Payload) -> Result<Artifact, ToolError> {
        Err(ToolError::new(
            "tool_unavailable",
            format!("no tool is configured for {}", self.command),
        ))
    }
}

// ============================================================================
// SECTION: Handler Table
// ============================================================================

/// Shared handler reference.
pub type SharedToolHandler = Arc<dyn ToolHandler>;

/// Immutable command to handler table.
#[derive(Clone, Default)]
pub struct HandlerTable {
    /// Registered handlers.
    handlers: BTreeMap<CommandName, SharedToolHandler>,
}

impl HandlerTable {
    /// Starts building a handler table.
    #[must_use]
    pub fn builder() -> HandlerTableBuilder {
        HandlerTableBuilder::default()
    }

    /// Resolves a wire label to its command and handler.
    #[must_use]
    pub fn resolve(&self, label: &str) -> Option<(CommandName, SharedToolHandler)> {
        let command = CommandName::parse(label)?;
        self.handlers.get(&command).map(|handler| (command, Arc::clone(handler)))
    }
}

/// Builder for [`HandlerTable`].
#[derive(Default)]
pub struct HandlerTableBuilder {
    /// Handlers registered so far.
    handlers: BTreeMap<CommandName, SharedToolHandler>,
}

impl HandlerTableBuilder {
    /// Registers `handler` for `command`, replacing any previous handler.
    #[must_use]
    pub fn register(mut self, command: CommandName, handler: impl ToolHandler + 'static) -> Self {
        self.handlers.insert(command, Arc::new(handler));
        self
    }

    /// Fills every gated command without a handler with
    /// [`UnavailableToolHandler`].
    #[must_use]
    pub fn fill_unavailable(mut self) -> Self {
        for command in CommandName::gated() {
            self.handlers
                .entry(command)
                .or_insert_with(|| Arc::new(UnavailableToolHandler::new(command)));
        }
        self
    }

    /// Finalizes the table.
    #[must_use]
    pub fn build(self) -> HandlerTable {
        HandlerTable {
            handlers: self.handlers,
        }
    }
}

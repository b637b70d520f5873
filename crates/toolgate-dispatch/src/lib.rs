// crates/toolgate-dispatch/src/lib.rs
// ============================================================================
// Module: Toolgate Dispatch Library
// Description: Public API surface for command dispatch.
// Purpose: Expose the dispatcher, handler table, built-ins, and audit sinks.
// Dependencies: crate::{audit, builtin, dispatcher, handler}
// ============================================================================

//! ## Overview
//! The dispatch layer sits between a transport and the tool handlers. Every
//! inbound command is counted, authorized through the access-key gate, and
//! executed under a per-identity single-flight slot. Audit records for every
//! dispatch and key lifecycle action flow through an [`AuditSink`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod builtin;
pub mod dispatcher;
pub mod handler;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::AuditSink;
pub use audit::DispatchAuditEvent;
pub use audit::DispatchOutcome;
pub use audit::FileAuditSink;
pub use audit::KeyAction;
pub use audit::KeyLifecycleAuditEvent;
pub use audit::NoopAuditSink;
pub use audit::StderrAuditSink;
pub use builtin::BuiltinSettings;
pub use builtin::format_remaining;
pub use builtin::register_builtins;
pub use dispatcher::DispatchError;
pub use dispatcher::Dispatcher;
pub use handler::HandlerTable;
pub use handler::HandlerTableBuilder;
pub use handler::SharedToolHandler;
pub use handler::ToolHandler;
pub use handler::UnavailableToolHandler;

// crates/toolgate-cli/src/lib.rs
// ============================================================================
// Module: Toolgate CLI Library
// Description: Shared building blocks for the `toolgate` binary.
// Purpose: Expose runtime assembly, the line protocol, and process handlers.
// Dependencies: crate::{i18n, process, render, runtime, serve}
// ============================================================================

//! ## Overview
//! The `toolgate` binary is a thin clap front end over this library: the
//! runtime assembly builds stores and the dispatcher from configuration, the
//! serve loop drives the dispatcher from a line stream, and process handlers
//! bind gated commands to external programs.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod i18n;
pub mod process;
pub mod render;
pub mod runtime;
pub mod serve;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use process::ProcessToolHandler;
pub use runtime::RuntimeError;
pub use runtime::ToolgateDispatcher;
pub use runtime::ToolgateRuntime;
pub use serve::ServeError;
pub use serve::ServeSummary;
pub use serve::serve_lines;

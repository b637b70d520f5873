// crates/toolgate-dispatch/src/audit.rs
// ============================================================================
// Module: Toolgate Audit Logging
// Description: Structured audit events for dispatch and key lifecycle actions.
// Purpose: Emit redacted JSON-lines audit records without a logging framework.
// Dependencies: serde, serde_json, toolgate-core
// ============================================================================

//! ## Overview
//! Every dispatched command and every key lifecycle action produces one audit
//! record. Sinks serialize records as single JSON lines so deployments can
//! route them to any log pipeline. Key ids are always redacted to a short
//! prefix before they reach an event.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Serialize;
use toolgate_core::Identity;
use toolgate_core::KeyId;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Dispatch outcome classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// Handler produced an artifact.
    Ok,
    /// Authorization denied the command.
    Unauthorized,
    /// The identity already had a command in flight.
    Busy,
    /// The command name did not resolve.
    UnknownCommand,
    /// The handler failed.
    HandlerFailed,
    /// Usage or key storage failed.
    StorageError,
}

/// Command dispatch audit event.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Requesting identity.
    pub identity: String,
    /// Command label as received.
    pub command: String,
    /// Outcome classification.
    pub outcome: DispatchOutcome,
    /// Normalized error kind label.
    pub error_kind: Option<&'static str>,
    /// Usage total after this command was counted.
    pub usage_total: Option<u64>,
    /// Time spent in the dispatcher, in milliseconds.
    pub duration_ms: u128,
}

impl DispatchAuditEvent {
    /// Builds a dispatch event stamped with the current time.
    #[must_use]
    pub fn new(
        identity: &Identity,
        command: &str,
        outcome: DispatchOutcome,
        error_kind: Option<&'static str>,
        usage_total: Option<u64>,
        duration_ms: u128,
    ) -> Self {
        Self {
            event: "command_dispatch",
            timestamp_ms: now_millis(),
            identity: identity.as_str().to_string(),
            command: command.to_string(),
            outcome,
            error_kind,
            usage_total,
            duration_ms,
        }
    }
}

/// Key lifecycle action labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyAction {
    /// Key generated.
    Generate,
    /// Key bound to an identity.
    Register,
    /// Key revoked.
    Revoke,
}

/// Key lifecycle audit event.
#[derive(Debug, Clone, Serialize)]
pub struct KeyLifecycleAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Lifecycle action.
    pub action: KeyAction,
    /// Redacted key id, absent when no key was produced.
    pub key_id: Option<String>,
    /// Identity the action was taken for, when known.
    pub identity: Option<String>,
    /// `ok` or the error kind label.
    pub outcome: &'static str,
}

impl KeyLifecycleAuditEvent {
    /// Builds a lifecycle event stamped with the current time.
    #[must_use]
    pub fn new(
        action: KeyAction,
        key_id: Option<&KeyId>,
        identity: Option<&Identity>,
        outcome: &'static str,
    ) -> Self {
        Self {
            event: "key_lifecycle",
            timestamp_ms: now_millis(),
            action,
            key_id: key_id.map(KeyId::redacted),
            identity: identity.map(|identity| identity.as_str().to_string()),
            outcome,
        }
    }
}

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Audit sink for Toolgate events.
pub trait AuditSink: Send + Sync {
    /// Records a dispatch event.
    fn record_dispatch(&self, event: &DispatchAuditEvent);

    /// Records a key lifecycle event.
    fn record_key(&self, event: &KeyLifecycleAuditEvent);
}

/// Audit sink that writes JSON lines to stderr.
pub struct StderrAuditSink;

impl StderrAuditSink {
    /// Serializes an event onto stderr.
    fn emit<T: Serialize>(event: &T) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(io::stderr(), "{payload}");
        }
    }
}

impl AuditSink for StderrAuditSink {
    fn record_dispatch(&self, event: &DispatchAuditEvent) {
        Self::emit(event);
    }

    fn record_key(&self, event: &KeyLifecycleAuditEvent) {
        Self::emit(event);
    }
}

/// Audit sink that appends JSON lines to a file.
pub struct FileAuditSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileAuditSink {
    /// Opens the audit log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    /// Serializes an event onto the log file.
    fn emit<T: Serialize>(&self, event: &T) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

impl AuditSink for FileAuditSink {
    fn record_dispatch(&self, event: &DispatchAuditEvent) {
        self.emit(event);
    }

    fn record_key(&self, event: &KeyLifecycleAuditEvent) {
        self.emit(event);
    }
}

/// No-op audit sink.
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record_dispatch(&self, _event: &DispatchAuditEvent) {}

    fn record_key(&self, _event: &KeyLifecycleAuditEvent) {}
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns the current unix epoch in milliseconds.
fn now_millis() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis()
}

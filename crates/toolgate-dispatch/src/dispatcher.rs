// crates/toolgate-dispatch/src/dispatcher.rs
// ============================================================================
// Module: Command Dispatcher
// Description: Usage accounting, authorization, and single-flight execution.
// Purpose: Sequence every inbound command through the access-key gate.
// Dependencies: thiserror, toolgate-core
// ============================================================================

//! ## Overview
//! [`Dispatcher::handle`] runs every inbound command through a fixed sequence:
//!
//! 1. count the command in the usage meter,
//! 2. resolve the handler (unknown names stop here),
//! 3. authorize gated commands,
//! 4. claim the caller's single-flight slot,
//! 5. invoke the handler and release the slot.
//!
//! The slot is an RAII guard, so it is released when the handler returns,
//! fails, or when the caller drops the dispatch future. A second command from
//! the same identity while the slot is held fails immediately with
//! [`DispatchError::Busy`]; there is no queueing.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Instant;

use thiserror::Error;
use toolgate_core::Artifact;
use toolgate_core::AuthorizationGate;
use toolgate_core::AuthzError;
use toolgate_core::DenyReason;
use toolgate_core::Identity;
use toolgate_core::KeyStore;
use toolgate_core::Payload;
use toolgate_core::StoreError;
use toolgate_core::ToolError;
use toolgate_core::UsageError;
use toolgate_core::UsageMeter;

use crate::audit::AuditSink;
use crate::audit::DispatchAuditEvent;
use crate::audit::DispatchOutcome;
use crate::handler::HandlerTable;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Dispatch errors.
///
/// # Invariants
/// - Every variant except `Usage` is returned after the command was counted.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The caller lacks a usable key for a gated command.
    #[error("unauthorized: {}", .reason.as_str())]
    Unauthorized {
        /// Denial reason.
        reason: DenyReason,
    },
    /// The caller already has a command in flight.
    #[error("another command is still running for this identity")]
    Busy,
    /// The command name is not registered.
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    /// The handler reported a failure.
    #[error("tool failed: {cause}")]
    HandlerFailed {
        /// Handler failure, forwarded unchanged.
        cause: ToolError,
    },
    /// The usage meter could not be updated.
    #[error(transparent)]
    Usage(UsageError),
    /// The key store could not be consulted.
    #[error(transparent)]
    Store(StoreError),
}

impl DispatchError {
    /// Returns a stable label for audit output.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Unauthorized {
                ..
            } => "unauthorized",
            Self::Busy => "busy",
            Self::UnknownCommand(_) => "unknown_command",
            Self::HandlerFailed {
                ..
            } => "handler_failed",
            Self::Usage(_) => "usage_storage",
            Self::Store(err) => err.kind(),
        }
    }

    /// Returns the audit outcome classification.
    #[must_use]
    pub const fn outcome(&self) -> DispatchOutcome {
        match self {
            Self::Unauthorized {
                ..
            } => DispatchOutcome::Unauthorized,
            Self::Busy => DispatchOutcome::Busy,
            Self::UnknownCommand(_) => DispatchOutcome::UnknownCommand,
            Self::HandlerFailed {
                ..
            } => DispatchOutcome::HandlerFailed,
            Self::Usage(_) | Self::Store(_) => DispatchOutcome::StorageError,
        }
    }
}

impl From<AuthzError> for DispatchError {
    fn from(error: AuthzError) -> Self {
        match error {
            AuthzError::Denied {
                reason,
            } => Self::Unauthorized {
                reason,
            },
            AuthzError::Store(err) => Self::Store(err),
        }
    }
}

// ============================================================================
// SECTION: Single-Flight Slots
// ============================================================================

/// Identities with a handler currently running.
#[derive(Debug, Default, Clone)]
struct SlotTable {
    /// Running identities.
    running: Arc<Mutex<HashSet<Identity>>>,
}

impl SlotTable {
    /// Claims the slot for `identity`.
    fn acquire(&self, identity: &Identity) -> Result<FlightGuard, DispatchError> {
        let mut running = self
            .running
            .lock()
            .map_err(|_| DispatchError::Store(StoreError::Store("slot table poisoned".to_string())))?;
        if !running.insert(identity.clone()) {
            return Err(DispatchError::Busy);
        }
        drop(running);
        Ok(FlightGuard {
            running: Arc::clone(&self.running),
            identity: identity.clone(),
        })
    }

    /// Returns true when `identity` holds its slot.
    fn is_running(&self, identity: &Identity) -> bool {
        self.running.lock().is_ok_and(|running| running.contains(identity))
    }
}

/// Held slot; releases on drop.
struct FlightGuard {
    /// Shared slot table.
    running: Arc<Mutex<HashSet<Identity>>>,
    /// Identity owning the slot.
    identity: Identity,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        let mut running = match self.running.lock() {
            Ok(running) => running,
            Err(poisoned) => poisoned.into_inner(),
        };
        running.remove(&self.identity);
    }
}

// ============================================================================
// SECTION: Dispatcher
// ============================================================================

/// Routes commands through usage, authorization, and single-flight.
pub struct Dispatcher<S: KeyStore, U: UsageMeter> {
    /// Invocation counter.
    usage: U,
    /// Authorization gate.
    gate: AuthorizationGate<S>,
    /// Static command table.
    handlers: HandlerTable,
    /// Single-flight slots.
    slots: SlotTable,
    /// Audit sink.
    audit: Arc<dyn AuditSink>,
}

impl<S, U> Dispatcher<S, U>
where
    S: KeyStore,
    U: UsageMeter,
{
    /// Creates a dispatcher from startup-initialized components.
    #[must_use]
    pub fn new(
        usage: U,
        gate: AuthorizationGate<S>,
        handlers: HandlerTable,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            usage,
            gate,
            handlers,
            slots: SlotTable::default(),
            audit,
        }
    }

    /// Returns true while a handler is running for `identity`.
    #[must_use]
    pub fn is_running(&self, identity: &Identity) -> bool {
        self.slots.is_running(identity)
    }

    /// Handles one inbound command.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError`] when the command is unknown, unauthorized,
    /// rejected as busy, fails in its handler, or storage fails.
    pub async fn handle(
        &self,
        identity: &Identity,
        command: &str,
        payload: Payload,
    ) -> Result<Artifact, DispatchError> {
        let started = Instant::now();
        let mut usage_total = None;
        let result = self.run(identity, command, &payload, &mut usage_total).await;
        let (outcome, error_kind) = match &result {
            Ok(_) => (DispatchOutcome::Ok, None),
            Err(err) => (err.outcome(), Some(err.kind())),
        };
        self.audit.record_dispatch(&DispatchAuditEvent::new(
            identity,
            command,
            outcome,
            error_kind,
            usage_total,
            started.elapsed().as_millis(),
        ));
        result
    }

    /// Runs the dispatch sequence.
    async fn run(
        &self,
        identity: &Identity,
        command: &str,
        payload: &Payload,
        usage_total: &mut Option<u64>,
    ) -> Result<Artifact, DispatchError> {
        *usage_total = Some(self.usage.increment().map_err(DispatchError::Usage)?);
        let (name, handler) = self
            .handlers
            .resolve(command)
            .ok_or_else(|| DispatchError::UnknownCommand(command.to_string()))?;
        if name.is_gated() {
            self.gate.authorize(identity, name)?;
        }
        let guard = self.slots.acquire(identity)?;
        let result = handler.invoke(identity, payload).await;
        drop(guard);
        result.map_err(|cause| DispatchError::HandlerFailed {
            cause,
        })
    }
}

// crates/toolgate-core/src/runtime/authz.rs
// ============================================================================
// Module: Authorization Gate
// Description: Allow/deny decisions for commands based on key usability.
// Purpose: Gate tool commands behind a usable, bound access key.
// Dependencies: crate::{core, interfaces, runtime::lifecycle}, thiserror
// ============================================================================

//! ## Overview
//! Gating is uniform: every gated command requires the caller to hold a
//! usable key and free commands are always allowed. Store failures are
//! reported as [`AuthzError::Store`] so the caller can fail closed without
//! confusing an outage with a denial.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use thiserror::Error;

use crate::core::CommandName;
use crate::core::Identity;
use crate::interfaces::KeyStore;
use crate::interfaces::StoreError;
use crate::runtime::lifecycle::KeyLifecycleManager;

// ============================================================================
// SECTION: Decisions
// ============================================================================

/// Reason a command was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// The caller has no key, or its key is expired or revoked.
    NoUsableKey,
}

impl DenyReason {
    /// Returns a stable label for audit output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NoUsableKey => "no_usable_key",
        }
    }
}

/// Authorization errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    /// The command was denied.
    #[error("unauthorized: {}", .reason.as_str())]
    Denied {
        /// Denial reason.
        reason: DenyReason,
    },
    /// The key store could not be consulted.
    #[error(transparent)]
    Store(StoreError),
}

impl AuthzError {
    /// Returns a stable label for audit output.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Denied {
                ..
            } => "unauthorized",
            Self::Store(err) => err.kind(),
        }
    }
}

// ============================================================================
// SECTION: Gate
// ============================================================================

/// Authorization gate backed by the key lifecycle manager.
pub struct AuthorizationGate<S: KeyStore> {
    /// Lifecycle manager consulted for key usability.
    lifecycle: Arc<KeyLifecycleManager<S>>,
}

impl<S: KeyStore> Clone for AuthorizationGate<S> {
    fn clone(&self) -> Self {
        Self {
            lifecycle: Arc::clone(&self.lifecycle),
        }
    }
}

impl<S: KeyStore> AuthorizationGate<S> {
    /// Creates a gate over a shared lifecycle manager.
    #[must_use]
    pub const fn new(lifecycle: Arc<KeyLifecycleManager<S>>) -> Self {
        Self {
            lifecycle,
        }
    }

    /// Returns the lifecycle manager behind the gate.
    #[must_use]
    pub const fn lifecycle(&self) -> &Arc<KeyLifecycleManager<S>> {
        &self.lifecycle
    }

    /// Decides whether `identity` may run `command`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::Denied`] when a gated command is requested without
    /// a usable key and [`AuthzError::Store`] when the store fails.
    pub fn authorize(&self, identity: &Identity, command: CommandName) -> Result<(), AuthzError> {
        if command.is_free() {
            return Ok(());
        }
        if self.lifecycle.is_usable(identity).map_err(AuthzError::Store)? {
            Ok(())
        } else {
            Err(AuthzError::Denied {
                reason: DenyReason::NoUsableKey,
            })
        }
    }
}

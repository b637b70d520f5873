// crates/toolgate-dispatch/src/builtin.rs
// ============================================================================
// Module: Built-In Handlers
// Description: Handlers for the greeting and key-management commands.
// Purpose: Expose the key lifecycle through the command surface.
// Dependencies: async-trait, serde_json, toolgate-core
// ============================================================================

//! ## Overview
//! The free commands are served in-process: `start` and `help` return the
//! welcome text with the command list, `generate_key` issues a key,
//! `set_key <key>` binds a key to the caller and `time_left` reports the
//! caller's remaining validity. Lifecycle failures become [`ToolError`]s whose
//! codes are the lifecycle error kinds.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use toolgate_core::AccessKey;
use toolgate_core::Artifact;
use toolgate_core::CommandName;
use toolgate_core::Identity;
use toolgate_core::KeyId;
use toolgate_core::KeyLifecycleManager;
use toolgate_core::KeyStore;
use toolgate_core::Payload;
use toolgate_core::RemainingValidity;
use toolgate_core::ToolError;
use toolgate_core::core::identifiers::MAX_IDENTIFIER_LENGTH;

use crate::audit::AuditSink;
use crate::audit::KeyAction;
use crate::audit::KeyLifecycleAuditEvent;
use crate::handler::HandlerTableBuilder;
use crate::handler::ToolHandler;

// ============================================================================
// SECTION: Registration
// ============================================================================

/// Settings shared by the built-in handlers.
#[derive(Debug, Clone, Default)]
pub struct BuiltinSettings {
    /// Greeting returned by `start` and `help`.
    pub welcome: String,
    /// Identities allowed to generate keys. Empty allows everyone.
    pub admins: Vec<Identity>,
}

/// Registers the built-in handlers for every free command.
#[must_use]
pub fn register_builtins<S>(
    builder: HandlerTableBuilder,
    lifecycle: &Arc<KeyLifecycleManager<S>>,
    settings: BuiltinSettings,
    audit: &Arc<dyn AuditSink>,
) -> HandlerTableBuilder
where
    S: KeyStore + Send + Sync + 'static,
{
    let welcome = WelcomeHandler::new(settings.welcome);
    builder
        .register(CommandName::Start, welcome.clone())
        .register(CommandName::Help, welcome)
        .register(CommandName::GenerateKey, GenerateKeyHandler {
            lifecycle: Arc::clone(lifecycle),
            admins: settings.admins,
            audit: Arc::clone(audit),
        })
        .register(CommandName::SetKey, SetKeyHandler {
            lifecycle: Arc::clone(lifecycle),
            audit: Arc::clone(audit),
        })
        .register(CommandName::TimeLeft, TimeLeftHandler {
            lifecycle: Arc::clone(lifecycle),
        })
}

// ============================================================================
// SECTION: Welcome
// ============================================================================

/// Serves `start` and `help`.
#[derive(Debug, Clone)]
pub struct WelcomeHandler {
    /// Rendered greeting and command list.
    text: String,
}

impl WelcomeHandler {
    /// Renders the greeting followed by the command list.
    #[must_use]
    pub fn new(welcome: String) -> Self {
        let mut text = welcome;
        text.push_str("\n\nCommands:");
        for command in CommandName::ALL {
            let access = if command.is_free() { "free" } else { "requires key" };
            text.push_str(&format!("\n  /{command} ({access})"));
        }
        Self {
            text,
        }
    }
}

#[async_trait]
impl ToolHandler for WelcomeHandler {
    async fn invoke(&self, _identity: &Identity, _payload: &Payload) -> Result<Artifact, ToolError> {
        Ok(Artifact::Text(self.text.clone()))
    }
}

// ============================================================================
// SECTION: Key Commands
// ============================================================================

/// Serves `generate_key`.
pub struct GenerateKeyHandler<S: KeyStore> {
    /// Lifecycle manager.
    lifecycle: Arc<KeyLifecycleManager<S>>,
    /// Identities allowed to generate keys.
    admins: Vec<Identity>,
    /// Audit sink for lifecycle events.
    audit: Arc<dyn AuditSink>,
}

#[async_trait]
impl<S> ToolHandler for GenerateKeyHandler<S>
where
    S: KeyStore + Send + Sync + 'static,
{
    async fn invoke(&self, identity: &Identity, _payload: &Payload) -> Result<Artifact, ToolError> {
        if !self.admins.is_empty() && !self.admins.contains(identity) {
            self.audit.record_key(&KeyLifecycleAuditEvent::new(
                KeyAction::Generate,
                None,
                Some(identity),
                "not_admin",
            ));
            return Err(ToolError::new("not_admin", "only administrators may generate keys"));
        }
        match self.lifecycle.generate_key() {
            Ok(key) => {
                self.audit.record_key(&KeyLifecycleAuditEvent::new(
                    KeyAction::Generate,
                    Some(&key.id),
                    Some(identity),
                    "ok",
                ));
                Ok(Artifact::Json(json!({
                    "key_id": key.id.as_str(),
                    "issued_at_ms": key.issued_at.as_unix_millis(),
                    "valid_until_ms": key.valid_until.map(|until| until.as_unix_millis()),
                })))
            }
            Err(err) => {
                self.audit.record_key(&KeyLifecycleAuditEvent::new(
                    KeyAction::Generate,
                    None,
                    Some(identity),
                    err.kind(),
                ));
                Err(ToolError::new(err.kind(), err.to_string()))
            }
        }
    }
}

/// Serves `set_key <key>`.
pub struct SetKeyHandler<S: KeyStore> {
    /// Lifecycle manager.
    lifecycle: Arc<KeyLifecycleManager<S>>,
    /// Audit sink for lifecycle events.
    audit: Arc<dyn AuditSink>,
}

#[async_trait]
impl<S> ToolHandler for SetKeyHandler<S>
where
    S: KeyStore + Send + Sync + 'static,
{
    async fn invoke(&self, identity: &Identity, payload: &Payload) -> Result<Artifact, ToolError> {
        let Some(text) = payload.text() else {
            return Err(ToolError::new("missing_key", "usage: set_key <key>"));
        };
        if text.len() > MAX_IDENTIFIER_LENGTH || text.chars().any(char::is_whitespace) {
            return Err(ToolError::new("invalid_key", "key is not well formed"));
        }
        let key_id = KeyId::new(text);
        let outcome = self.lifecycle.register_key(&key_id, identity);
        let label = outcome.as_ref().map_or_else(|err| err.kind(), |_| "ok");
        self.audit.record_key(&KeyLifecycleAuditEvent::new(
            KeyAction::Register,
            Some(&key_id),
            Some(identity),
            label,
        ));
        let key = outcome.map_err(|err| ToolError::new(err.kind(), err.to_string()))?;
        Ok(Artifact::Json(key_summary("registered", &key)))
    }
}

/// Serves `time_left`.
pub struct TimeLeftHandler<S: KeyStore> {
    /// Lifecycle manager.
    lifecycle: Arc<KeyLifecycleManager<S>>,
}

#[async_trait]
impl<S> ToolHandler for TimeLeftHandler<S>
where
    S: KeyStore + Send + Sync + 'static,
{
    async fn invoke(&self, identity: &Identity, _payload: &Payload) -> Result<Artifact, ToolError> {
        match self.lifecycle.remaining_validity(identity) {
            Ok(RemainingValidity::Bounded(remaining)) => Ok(Artifact::Json(json!({
                "unbounded": false,
                "remaining_ms": duration_millis(remaining),
                "remaining": format_remaining(remaining),
            }))),
            Ok(RemainingValidity::Unbounded) => Ok(Artifact::Json(json!({
                "unbounded": true,
            }))),
            Err(err) => Err(ToolError::new(err.kind(), err.to_string())),
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Renders a key as a JSON summary without exposing other owners.
fn key_summary(status: &str, key: &AccessKey) -> serde_json::Value {
    json!({
        "status": status,
        "issued_at_ms": key.issued_at.as_unix_millis(),
        "valid_until_ms": key.valid_until.map(|until| until.as_unix_millis()),
    })
}

/// Converts a duration to whole milliseconds, saturating.
fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Formats a remaining duration as `<h>h <m>m <s>s`.
#[must_use]
pub fn format_remaining(duration: Duration) -> String {
    let total = duration.as_secs();
    let hours = total / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;
    format!("{hours}h {minutes}m {seconds}s")
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::format_remaining;

    #[test]
    fn remaining_time_is_rendered_in_hours_minutes_seconds() {
        assert_eq!(format_remaining(Duration::from_secs(24 * 3_600)), "24h 0m 0s");
        assert_eq!(format_remaining(Duration::from_millis(61_999)), "0h 1m 1s");
    }
}

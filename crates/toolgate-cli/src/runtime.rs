// crates/toolgate-cli/src/runtime.rs
// ============================================================================
// Module: Toolgate Runtime Assembly
// Description: Builds stores, lifecycle, audit sink, and dispatcher from config.
// Purpose: Initialize all process-wide state once at startup.
// Dependencies: thiserror, toolgate-config, toolgate-core, toolgate-dispatch, toolgate-store-sqlite
// ============================================================================

//! ## Overview
//! [`ToolgateRuntime`] owns the components every CLI command needs: the key
//! store, the usage meter, the lifecycle manager, and the audit sink. They are
//! created once from [`ToolgateConfig`] and handed to the dispatcher
//! explicitly. Administrative key actions taken through the runtime are
//! audited the same way as the chat commands.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use thiserror::Error;
use toolgate_config::AuditSinkType;
use toolgate_config::ConfigError;
use toolgate_config::ToolgateConfig;
use toolgate_core::AccessKey;
use toolgate_core::AuthorizationGate;
use toolgate_core::Clock;
use toolgate_core::GenerateError;
use toolgate_core::Identity;
use toolgate_core::InMemoryKeyStore;
use toolgate_core::InMemoryUsageMeter;
use toolgate_core::KeyId;
use toolgate_core::KeyLifecycleManager;
use toolgate_core::KeyStore;
use toolgate_core::KeyValidity;
use toolgate_core::RegisterError;
use toolgate_core::RevokeError;
use toolgate_core::SharedKeyStore;
use toolgate_core::SharedUsageMeter;
use toolgate_core::SystemClock;
use toolgate_dispatch::AuditSink;
use toolgate_dispatch::BuiltinSettings;
use toolgate_dispatch::Dispatcher;
use toolgate_dispatch::FileAuditSink;
use toolgate_dispatch::HandlerTable;
use toolgate_dispatch::KeyAction;
use toolgate_dispatch::KeyLifecycleAuditEvent;
use toolgate_dispatch::NoopAuditSink;
use toolgate_dispatch::StderrAuditSink;
use toolgate_dispatch::register_builtins;
use toolgate_store_sqlite::SqliteStore;

use crate::process::ProcessToolHandler;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Dispatcher over the runtime's shared backends.
pub type ToolgateDispatcher = Dispatcher<SharedKeyStore, SharedUsageMeter>;

/// Runtime assembly errors.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Configuration was rejected.
    #[error("config error: {0}")]
    Config(String),
    /// The store could not be opened.
    #[error("store error: {0}")]
    Store(String),
    /// The lifecycle manager rejected its settings.
    #[error("lifecycle error: {0}")]
    Lifecycle(String),
    /// The audit sink could not be opened.
    #[error("audit error: {0}")]
    Audit(String),
}

impl From<ConfigError> for RuntimeError {
    fn from(error: ConfigError) -> Self {
        Self::Config(error.to_string())
    }
}

/// Process-wide Toolgate components.
pub struct ToolgateRuntime {
    /// Key lifecycle manager over the configured store.
    lifecycle: Arc<KeyLifecycleManager<SharedKeyStore>>,
    /// Usage meter over the configured store.
    usage: SharedUsageMeter,
    /// Audit sink selected by config.
    audit: Arc<dyn AuditSink>,
}

impl ToolgateRuntime {
    /// Builds the runtime on the system clock.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError`] when the store, lifecycle, or audit sink
    /// cannot be initialized.
    pub fn from_config(config: &ToolgateConfig) -> Result<Self, RuntimeError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Builds the runtime on an explicit clock.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError`] when the store, lifecycle, or audit sink
    /// cannot be initialized.
    pub fn with_clock(config: &ToolgateConfig, clock: Arc<dyn Clock>) -> Result<Self, RuntimeError> {
        let (store, usage) = open_backends(config)?;
        store.readiness().map_err(|err| RuntimeError::Store(err.to_string()))?;
        let lifecycle = KeyLifecycleManager::new(store, clock, config.keys.lifecycle_config())
            .map_err(|err| RuntimeError::Lifecycle(err.to_string()))?;
        Ok(Self {
            lifecycle: Arc::new(lifecycle),
            usage,
            audit: open_audit_sink(config)?,
        })
    }

    /// Returns the lifecycle manager.
    #[must_use]
    pub const fn lifecycle(&self) -> &Arc<KeyLifecycleManager<SharedKeyStore>> {
        &self.lifecycle
    }

    /// Returns the usage meter.
    #[must_use]
    pub const fn usage(&self) -> &SharedUsageMeter {
        &self.usage
    }

    /// Builds the dispatcher with built-in and configured tool handlers.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Config`] when tool bindings are invalid.
    pub fn dispatcher(&self, config: &ToolgateConfig) -> Result<ToolgateDispatcher, RuntimeError> {
        let settings = BuiltinSettings {
            welcome: config.messages.welcome.clone(),
            admins: config.keys.admin_identities(),
        };
        let mut builder =
            register_builtins(HandlerTable::builder(), &self.lifecycle, settings, &self.audit);
        for (command, tool) in config.tool_bindings()? {
            builder = builder.register(command, ProcessToolHandler::from_config(command, tool));
        }
        Ok(Dispatcher::new(
            self.usage.clone(),
            AuthorizationGate::new(Arc::clone(&self.lifecycle)),
            builder.fill_unavailable().build(),
            Arc::clone(&self.audit),
        ))
    }

    /// Issues a key and audits the action.
    ///
    /// # Errors
    ///
    /// Returns [`GenerateError`] when no unique id could be stored.
    pub fn generate_key(&self, validity: KeyValidity) -> Result<AccessKey, GenerateError> {
        let outcome = self.lifecycle.generate_key_with(validity);
        let label = outcome.as_ref().map_or_else(GenerateError::kind, |_| "ok");
        let key_id = outcome.as_ref().ok().map(|key| &key.id);
        self.audit.record_key(&KeyLifecycleAuditEvent::new(KeyAction::Generate, key_id, None, label));
        outcome
    }

    /// Binds a key to an identity and audits the action.
    ///
    /// # Errors
    ///
    /// Returns [`RegisterError`] when the key cannot be bound.
    pub fn register_key(&self, id: &KeyId, identity: &Identity) -> Result<AccessKey, RegisterError> {
        let outcome = self.lifecycle.register_key(id, identity);
        let label = outcome.as_ref().map_or_else(RegisterError::kind, |_| "ok");
        self.audit.record_key(&KeyLifecycleAuditEvent::new(
            KeyAction::Register,
            Some(id),
            Some(identity),
            label,
        ));
        outcome
    }

    /// Revokes a key and audits the action.
    ///
    /// # Errors
    ///
    /// Returns [`RevokeError`] when the key is unknown or the store fails.
    pub fn revoke_key(&self, id: &KeyId) -> Result<AccessKey, RevokeError> {
        let outcome = self.lifecycle.revoke_key(id);
        let label = outcome.as_ref().map_or_else(RevokeError::kind, |_| "ok");
        let owner = outcome.as_ref().ok().and_then(|key| key.owner.as_ref());
        self.audit.record_key(&KeyLifecycleAuditEvent::new(KeyAction::Revoke, Some(id), owner, label));
        outcome
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Opens the configured key store and usage meter.
fn open_backends(
    config: &ToolgateConfig,
) -> Result<(SharedKeyStore, SharedUsageMeter), RuntimeError> {
    match config.store.sqlite_config() {
        Some(sqlite) => {
            let store = SqliteStore::new(sqlite).map_err(|err| RuntimeError::Store(err.to_string()))?;
            Ok((SharedKeyStore::from_store(store.clone()), SharedUsageMeter::from_meter(store)))
        }
        None => Ok((
            SharedKeyStore::from_store(InMemoryKeyStore::new()),
            SharedUsageMeter::from_meter(InMemoryUsageMeter::new()),
        )),
    }
}

/// Opens the configured audit sink.
fn open_audit_sink(config: &ToolgateConfig) -> Result<Arc<dyn AuditSink>, RuntimeError> {
    match (config.audit.sink, &config.audit.path) {
        (AuditSinkType::Stderr, _) => Ok(Arc::new(StderrAuditSink)),
        (AuditSinkType::None, _) => Ok(Arc::new(NoopAuditSink)),
        (AuditSinkType::File, Some(path)) => FileAuditSink::new(path)
            .map(|sink| Arc::new(sink) as Arc<dyn AuditSink>)
            .map_err(|err| RuntimeError::Audit(format!("{}: {err}", path.display()))),
        (AuditSinkType::File, None) => {
            Err(RuntimeError::Audit("file audit sink requires path".to_string()))
        }
    }
}

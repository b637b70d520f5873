// crates/toolgate-config/src/config.rs
// ============================================================================
// Module: Toolgate Configuration
// Description: Configuration loading and validation for Toolgate.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: toolgate-core, toolgate-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! Every section has defaults, so an empty file is a valid configuration that
//! persists to `toolgate.db` and audits to stderr. Invalid configuration fails
//! closed before any store is opened.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use toolgate_core::CommandName;
use toolgate_core::DEFAULT_VALIDITY;
use toolgate_core::Identity;
use toolgate_core::LifecycleConfig;
use toolgate_core::core::identifiers::MAX_IDENTIFIER_LENGTH;
use toolgate_core::runtime::DEFAULT_MAX_GENERATION_ATTEMPTS;
use toolgate_core::runtime::DEFAULT_MAX_UPDATE_ATTEMPTS;
use toolgate_store_sqlite::SqliteStoreConfig;
use toolgate_store_sqlite::SqliteStoreMode;
use toolgate_store_sqlite::SqliteSyncMode;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
pub const DEFAULT_CONFIG_NAME: &str = "toolgate.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "TOOLGATE_CONFIG";
/// Maximum configuration file size in bytes.
pub const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Default `SQLite` database path.
pub const DEFAULT_STORE_PATH: &str = "toolgate.db";
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Upper bound for a configured key validity window (ten years).
const MAX_VALIDITY_SECS: u64 = 10 * 365 * 24 * 60 * 60;
/// Upper bound for id generation attempts.
const MAX_GENERATION_ATTEMPTS: u32 = 16;
/// Maximum number of administrator identities.
const MAX_ADMINS: usize = 256;
/// Maximum number of arguments for a tool program.
const MAX_TOOL_ARGS: usize = 64;
/// Maximum length of a single tool argument.
const MAX_TOOL_ARG_LENGTH: usize = 1024;
/// Maximum welcome message length in bytes.
const MAX_WELCOME_LENGTH: usize = 4096;
/// Welcome text shown by `start` and `help`.
const DEFAULT_WELCOME: &str = "Welcome to Toolgate. Generate a key with generate_key, bind it with \
                               set_key <key>, then run any tool command.";

// ============================================================================
// SECTION: Root Config
// ============================================================================

/// Toolgate configuration root.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolgateConfig {
    /// Key lifecycle settings.
    #[serde(default)]
    pub keys: KeysConfig,
    /// Persistence settings.
    #[serde(default)]
    pub store: StoreConfig,
    /// Audit sink settings.
    #[serde(default)]
    pub audit: AuditConfig,
    /// External programs bound to gated commands, keyed by command label.
    #[serde(default)]
    pub tools: BTreeMap<String, ToolConfig>,
    /// User-facing message text.
    #[serde(default)]
    pub messages: MessagesConfig,
}

impl ToolgateConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        Self::from_bytes(&bytes)
    }

    /// Loads configuration like [`ToolgateConfig::load`], falling back to
    /// defaults when no explicit path was given and the default file is absent.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when an existing file fails to load or validate.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        if path.is_none() && env::var_os(CONFIG_ENV_VAR).is_none() && !resolved.exists() {
            let config = Self::default();
            config.validate()?;
            return Ok(config);
        }
        Self::load(Some(&resolved))
    }

    /// Parses and validates configuration bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the input is too large, not UTF-8, not
    /// valid TOML, or fails validation.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ConfigError> {
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.keys.validate()?;
        self.store.validate()?;
        self.audit.validate()?;
        self.tool_bindings()?;
        self.messages.validate()?;
        Ok(())
    }

    /// Resolves `[tools.<command>]` tables to gated commands.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for unknown or built-in command labels
    /// and invalid tool settings.
    pub fn tool_bindings(&self) -> Result<BTreeMap<CommandName, &ToolConfig>, ConfigError> {
        let mut bindings = BTreeMap::new();
        for (label, tool) in &self.tools {
            let command = CommandName::parse(label)
                .ok_or_else(|| ConfigError::Invalid(format!("tools.{label} is not a command")))?;
            if command.is_free() {
                return Err(ConfigError::Invalid(format!(
                    "tools.{label} is a built-in command and cannot be bound to a program"
                )));
            }
            tool.validate(command)?;
            if bindings.insert(command, tool).is_some() {
                return Err(ConfigError::Invalid(format!("tools.{command} is bound twice")));
            }
        }
        Ok(bindings)
    }
}

// ============================================================================
// SECTION: Keys
// ============================================================================

/// Key lifecycle configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeysConfig {
    /// Validity window of generated keys, in seconds.
    #[serde(default = "default_validity_secs")]
    pub default_validity_secs: u64,
    /// Id generation attempts before `generation_failed`.
    #[serde(default = "default_max_generation_attempts")]
    pub max_generation_attempts: u32,
    /// Identities allowed to run `generate_key`. Empty allows everyone.
    #[serde(default)]
    pub admins: Vec<String>,
}

impl Default for KeysConfig {
    fn default() -> Self {
        Self {
            default_validity_secs: default_validity_secs(),
            max_generation_attempts: default_max_generation_attempts(),
            admins: Vec::new(),
        }
    }
}

impl KeysConfig {
    /// Validates key lifecycle settings.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.default_validity_secs == 0 || self.default_validity_secs > MAX_VALIDITY_SECS {
            return Err(ConfigError::Invalid(format!(
                "keys.default_validity_secs must be between 1 and {MAX_VALIDITY_SECS}"
            )));
        }
        if self.max_generation_attempts == 0
            || self.max_generation_attempts > MAX_GENERATION_ATTEMPTS
        {
            return Err(ConfigError::Invalid(format!(
                "keys.max_generation_attempts must be between 1 and {MAX_GENERATION_ATTEMPTS}"
            )));
        }
        if self.admins.len() > MAX_ADMINS {
            return Err(ConfigError::Invalid(format!(
                "keys.admins exceeds max entries ({MAX_ADMINS})"
            )));
        }
        for admin in &self.admins {
            validate_identity("keys.admins", admin)?;
        }
        Ok(())
    }

    /// Returns the lifecycle tuning derived from this section.
    #[must_use]
    pub const fn lifecycle_config(&self) -> LifecycleConfig {
        LifecycleConfig {
            default_validity: Duration::from_secs(self.default_validity_secs),
            max_generation_attempts: self.max_generation_attempts,
            max_update_attempts: DEFAULT_MAX_UPDATE_ATTEMPTS,
        }
    }

    /// Returns the configured administrator identities.
    #[must_use]
    pub fn admin_identities(&self) -> Vec<Identity> {
        self.admins.iter().map(|admin| Identity::new(admin.trim())).collect()
    }
}

/// Returns the default key validity in seconds.
const fn default_validity_secs() -> u64 {
    DEFAULT_VALIDITY.as_secs()
}

/// Returns the default number of generation attempts.
const fn default_max_generation_attempts() -> u32 {
    DEFAULT_MAX_GENERATION_ATTEMPTS
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Persistence backend type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreType {
    /// Durable `SQLite` store.
    #[default]
    Sqlite,
    /// In-memory store; state is lost on exit.
    Memory,
}

/// Persistence configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Store backend type.
    #[serde(rename = "type", default)]
    pub store_type: StoreType,
    /// `SQLite` database path. Defaults to [`DEFAULT_STORE_PATH`].
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` synchronous mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            store_type: StoreType::default(),
            path: None,
            busy_timeout_ms: default_busy_timeout_ms(),
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

impl StoreConfig {
    /// Validates persistence settings.
    fn validate(&self) -> Result<(), ConfigError> {
        match self.store_type {
            StoreType::Memory => {
                if self.path.is_some() {
                    return Err(ConfigError::Invalid("memory store must not set path".to_string()));
                }
                Ok(())
            }
            StoreType::Sqlite => {
                if let Some(path) = &self.path {
                    validate_path_string("store.path", &path.to_string_lossy())?;
                }
                Ok(())
            }
        }
    }

    /// Returns the `SQLite` store settings, or `None` for the memory backend.
    #[must_use]
    pub fn sqlite_config(&self) -> Option<SqliteStoreConfig> {
        match self.store_type {
            StoreType::Memory => None,
            StoreType::Sqlite => Some(SqliteStoreConfig {
                path: self.path.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_PATH)),
                busy_timeout_ms: self.busy_timeout_ms,
                journal_mode: self.journal_mode,
                sync_mode: self.sync_mode,
            }),
        }
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Audit
// ============================================================================

/// Audit sink selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuditSinkType {
    /// JSON lines on stderr.
    #[default]
    Stderr,
    /// JSON lines appended to a file.
    File,
    /// Discard audit events.
    None,
}

/// Audit configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditConfig {
    /// Sink type.
    #[serde(default)]
    pub sink: AuditSinkType,
    /// Log file path for the file sink.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl AuditConfig {
    /// Validates audit settings.
    fn validate(&self) -> Result<(), ConfigError> {
        match (self.sink, &self.path) {
            (AuditSinkType::File, Some(path)) => {
                validate_path_string("audit.path", &path.to_string_lossy())
            }
            (AuditSinkType::File, None) => {
                Err(ConfigError::Invalid("file audit sink requires path".to_string()))
            }
            (AuditSinkType::Stderr | AuditSinkType::None, Some(_)) => Err(ConfigError::Invalid(
                "audit.path is only valid with the file sink".to_string(),
            )),
            (AuditSinkType::Stderr | AuditSinkType::None, None) => Ok(()),
        }
    }
}

// ============================================================================
// SECTION: Tools
// ============================================================================

/// External program bound to a gated command.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolConfig {
    /// Program to execute.
    pub program: String,
    /// Fixed arguments passed to the program.
    #[serde(default)]
    pub args: Vec<String>,
    /// Optional wall-clock limit in milliseconds.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl ToolConfig {
    /// Validates a tool binding.
    fn validate(&self, command: CommandName) -> Result<(), ConfigError> {
        validate_path_string(&format!("tools.{command}.program"), &self.program)?;
        if self.args.len() > MAX_TOOL_ARGS {
            return Err(ConfigError::Invalid(format!(
                "tools.{command}.args exceeds max entries ({MAX_TOOL_ARGS})"
            )));
        }
        if self.args.iter().any(|arg| arg.len() > MAX_TOOL_ARG_LENGTH) {
            return Err(ConfigError::Invalid(format!(
                "tools.{command}.args entry exceeds max length ({MAX_TOOL_ARG_LENGTH})"
            )));
        }
        if self.timeout_ms == Some(0) {
            return Err(ConfigError::Invalid(format!(
                "tools.{command}.timeout_ms must be greater than zero"
            )));
        }
        Ok(())
    }

    /// Returns the configured timeout.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

// ============================================================================
// SECTION: Messages
// ============================================================================

/// User-facing message text.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MessagesConfig {
    /// Greeting returned by `start` and `help`.
    #[serde(default = "default_welcome")]
    pub welcome: String,
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            welcome: default_welcome(),
        }
    }
}

impl MessagesConfig {
    /// Validates message settings.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.welcome.trim().is_empty() {
            return Err(ConfigError::Invalid("messages.welcome must be non-empty".to_string()));
        }
        if self.welcome.len() > MAX_WELCOME_LENGTH {
            return Err(ConfigError::Invalid(format!(
                "messages.welcome exceeds max length ({MAX_WELCOME_LENGTH})"
            )));
        }
        Ok(())
    }
}

/// Returns the default welcome text.
fn default_welcome() -> String {
    DEFAULT_WELCOME.to_string()
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl ConfigError {
    /// Returns a stable label for audit output.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Io(_) => "config_io",
            Self::Parse(_) => "config_parse",
            Self::Invalid(_) => "config_invalid",
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from CLI or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against security limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        if component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        if component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

/// Validates an identity string.
fn validate_identity(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} entries must be non-empty")));
    }
    if trimmed.len() > MAX_IDENTIFIER_LENGTH {
        return Err(ConfigError::Invalid(format!(
            "{field} entry exceeds max length ({MAX_IDENTIFIER_LENGTH})"
        )));
    }
    if trimmed.chars().any(char::is_whitespace) {
        return Err(ConfigError::Invalid(format!("{field} entries must not contain whitespace")));
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

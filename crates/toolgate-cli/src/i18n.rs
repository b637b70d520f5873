// crates/toolgate-cli/src/i18n.rs
// ============================================================================
// Module: CLI Message Catalog
// Description: Message catalog and placeholder substitution for CLI output.
// Purpose: Keep every user-facing CLI string in one table.
// Dependencies: Standard library collections.
// ============================================================================

//! ## Overview
//! All operator-facing output of the `toolgate` binary is looked up in a
//! static catalog through the [`t!`](crate::t) macro. Unknown keys render as
//! the key itself so a missing entry is visible instead of silent.
//!
//! ## Invariants
//! - The catalog is built once and read-only thereafter.
//! - Placeholders use `{name}` with `name` in `[a-z0-9_]`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::OnceLock;

// ============================================================================
// SECTION: Types
// ============================================================================

/// A formatted message argument captured by the [`macro@crate::t`] macro.
#[derive(Clone)]
pub struct MessageArg {
    /// Placeholder name without braces.
    pub key: &'static str,
    /// Preformatted substitution value.
    pub value: String,
}

impl MessageArg {
    /// Constructs a new [`MessageArg`].
    pub fn new(key: &'static str, value: impl Into<String>) -> Self {
        Self {
            key,
            value: value.into(),
        }
    }
}

// ============================================================================
// SECTION: Catalog
// ============================================================================

/// English catalog entries.
const CATALOG: &[(&str, &str)] = &[
    ("main.version", "toolgate {version}"),
    ("output.write_failed", "Failed to write to {stream}: {error}"),
    ("config.load_failed", "Failed to load config: {error}"),
    ("config.validate.ok", "Config valid."),
    ("runtime.init_failed", "Failed to initialize toolgate: {error}"),
    ("serve.failed", "Serve loop failed: {error}"),
    ("serve.summary", "Served {count} commands."),
    ("key.validity_invalid", "--validity-secs must be greater than zero."),
    ("key.generate.ok", "Generated key {key_id} (valid until {valid_until})"),
    ("key.generate.failed", "Failed to generate key: {error}"),
    ("key.register.ok", "Key {key_id} bound to {identity} (valid until {valid_until})"),
    ("key.register.failed", "Failed to register key: {error}"),
    ("key.revoke.ok", "Key {key_id} revoked."),
    ("key.revoke.failed", "Failed to revoke key: {error}"),
    ("key.lookup.failed", "Failed to read keys: {error}"),
    ("key.show.not_found", "Key not found: {key_id}"),
    ("key.list.none", "No keys issued."),
    (
        "key.entry",
        "{key_id} owner={owner} issued={issued_at} valid_until={valid_until} status={status}",
    ),
    ("key.owner.none", "-"),
    ("key.validity.unbounded", "never"),
    ("key.time_left.bounded", "{identity}: {remaining} remaining"),
    ("key.time_left.unbounded", "{identity}: key never expires"),
    ("key.time_left.failed", "No usable key for {identity}: {error}"),
    ("usage.show", "Total commands handled: {total}"),
    ("usage.failed", "Failed to read usage total: {error}"),
];

/// Returns the catalog as a lookup map.
pub(crate) fn catalog() -> &'static HashMap<&'static str, &'static str> {
    static CATALOG_MAP: OnceLock<HashMap<&'static str, &'static str>> = OnceLock::new();
    CATALOG_MAP.get_or_init(|| CATALOG.iter().copied().collect())
}

/// Returns every catalog entry in declaration order.
#[must_use]
pub fn catalog_entries() -> &'static [(&'static str, &'static str)] {
    CATALOG
}

// ============================================================================
// SECTION: Translation
// ============================================================================

/// Renders `key` while substituting `args`.
#[must_use]
pub fn translate(key: &str, args: Vec<MessageArg>) -> String {
    let template = catalog().get(key).copied().unwrap_or(key);
    let mut result = template.to_string();
    for arg in args {
        let placeholder = format!("{{{}}}", arg.key);
        result = result.replace(&placeholder, &arg.value);
    }
    result
}

// ============================================================================
// SECTION: Macro
// ============================================================================

/// Formats a catalog message from a key and named arguments.
#[macro_export]
macro_rules! t {
    ($key:literal $(, $name:ident = $value:expr )* $(,)?) => {{
        let args = ::std::vec![
            $(
                $crate::i18n::MessageArg::new(stringify!($name), $value.to_string()),
            )*
        ];
        $crate::i18n::translate($key, args)
    }};
}

// ============================================================================
// SECTION: Tests
// ============================================================================

// crates/toolgate-core/src/core/identifiers.rs
// ============================================================================
// Module: Toolgate Identifiers
// Description: Opaque identifiers for access keys and requesters.
// Purpose: Provide strongly typed, serializable identifiers with stable wire forms.
// Dependencies: base64, rand, serde
// ============================================================================

//! ## Overview
//! This module defines the two identifiers the key lifecycle revolves around:
//! [`KeyId`], the unguessable access-key token, and [`Identity`], the
//! transport-independent handle of a requester. Both serialize as plain
//! strings.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use rand::rngs::OsRng;
use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Number of random bytes drawn for each generated key id (256 bits).
pub const KEY_ID_ENTROPY_BYTES: usize = 32;
/// Number of leading characters kept when a key id is redacted for logs.
const REDACTED_PREFIX_CHARS: usize = 6;
/// Maximum accepted length for identities and key ids supplied by callers.
pub const MAX_IDENTIFIER_LENGTH: usize = 256;

// ============================================================================
// SECTION: Identifier Types
// ============================================================================

/// Access-key identifier.
///
/// # Invariants
/// - Generated ids carry [`KEY_ID_ENTROPY_BYTES`] of OS randomness encoded as
///   unpadded URL-safe base64.
/// - Ids parsed from user input are opaque; existence is checked by the store.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyId(String);

impl KeyId {
    /// Wraps an existing key id string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Draws a fresh random key id from the operating system RNG.
    #[must_use]
    pub fn random() -> Self {
        let mut bytes = [0u8; KEY_ID_ENTROPY_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns a log-safe prefix of the key id.
    #[must_use]
    pub fn redacted(&self) -> String {
        let prefix: String = self.0.chars().take(REDACTED_PREFIX_CHARS).collect();
        format!("{prefix}...")
    }
}

// Key ids are bearer secrets; Debug output stays redacted.
impl fmt::Debug for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("KeyId").field(&self.redacted()).finish()
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for KeyId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for KeyId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Requester identity.
///
/// # Invariants
/// - Opaque UTF-8 string; transports map their user handles onto it verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Creates a new identity.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identity as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for Identity {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Identity {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

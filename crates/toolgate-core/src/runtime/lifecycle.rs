// crates/toolgate-core/src/runtime/lifecycle.rs
// ============================================================================
// Module: Key Lifecycle Manager
// Description: Generation, registration, validity, and revocation of access keys.
// Purpose: Own every access-key state transition on top of a key store.
// Dependencies: crate::{core, interfaces}, thiserror
// ============================================================================

//! ## Overview
//! [`KeyLifecycleManager`] is the only component that mutates access-key
//! records. Every decision is made against one injected [`Clock`], so tests can
//! move time deterministically.
//!
//! Registration and revocation are read-validate-write cycles. Writes go
//! through the store's revision compare-and-swap; a writer that loses the race
//! re-reads the record and re-validates before trying again.
//!
//! Security posture: key ids are bearer credentials. Generation draws from the
//! OS RNG and never reuses an id already present in the store.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::core::AccessKey;
use crate::core::Clock;
use crate::core::Identity;
use crate::core::KeyId;
use crate::core::Timestamp;
use crate::interfaces::KeyStore;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Validity window applied to newly generated keys.
pub const DEFAULT_VALIDITY: Duration = Duration::from_secs(24 * 60 * 60);

/// Id generation attempts before giving up on collisions.
pub const DEFAULT_MAX_GENERATION_ATTEMPTS: u32 = 3;

/// Compare-and-swap attempts for register/revoke before surfacing a conflict.
pub const DEFAULT_MAX_UPDATE_ATTEMPTS: u32 = 8;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Lifecycle tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleConfig {
    /// Validity applied by [`KeyValidity::Default`].
    pub default_validity: Duration,
    /// Maximum id generation attempts.
    pub max_generation_attempts: u32,
    /// Maximum compare-and-swap attempts per mutation.
    pub max_update_attempts: u32,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            default_validity: DEFAULT_VALIDITY,
            max_generation_attempts: DEFAULT_MAX_GENERATION_ATTEMPTS,
            max_update_attempts: DEFAULT_MAX_UPDATE_ATTEMPTS,
        }
    }
}

impl LifecycleConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::InvalidConfig`] for a zero validity window or
    /// zero attempt limits.
    pub fn validate(&self) -> Result<(), LifecycleError> {
        if self.default_validity.is_zero() {
            return Err(LifecycleError::InvalidConfig(
                "default_validity must be greater than zero".to_string(),
            ));
        }
        if self.max_generation_attempts == 0 {
            return Err(LifecycleError::InvalidConfig(
                "max_generation_attempts must be at least 1".to_string(),
            ));
        }
        if self.max_update_attempts == 0 {
            return Err(LifecycleError::InvalidConfig(
                "max_update_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Validity requested for a newly generated key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyValidity {
    /// Use [`LifecycleConfig::default_validity`].
    #[default]
    Default,
    /// Expire after the given duration.
    For(Duration),
    /// Never expire; only revocation ends the key.
    Unbounded,
}

/// Remaining validity of an identity's key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemainingValidity {
    /// Time left until expiry. Always strictly positive.
    Bounded(Duration),
    /// The key has no expiry.
    Unbounded,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Lifecycle construction errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    /// Configuration rejected.
    #[error("invalid lifecycle config: {0}")]
    InvalidConfig(String),
}

/// Key generation errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GenerateError {
    /// Every attempt collided with an existing id.
    #[error("key generation failed after {attempts} attempts")]
    GenerationFailed {
        /// Attempts made.
        attempts: u32,
    },
    /// Store failure.
    #[error(transparent)]
    Store(StoreError),
}

impl GenerateError {
    /// Returns a stable label for audit output.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::GenerationFailed {
                ..
            } => "generation_failed",
            Self::Store(err) => err.kind(),
        }
    }
}

/// Key registration errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegisterError {
    /// No key with that id exists.
    #[error("key not found")]
    NotFound,
    /// The key was revoked.
    #[error("key has been revoked")]
    AlreadyRevoked,
    /// The key's validity window has passed.
    #[error("key has expired")]
    Expired,
    /// The key is bound to a different identity.
    #[error("key is already bound to another identity")]
    AlreadyBound,
    /// Store failure.
    #[error(transparent)]
    Store(StoreError),
}

impl RegisterError {
    /// Returns a stable label for audit output.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::AlreadyRevoked => "already_revoked",
            Self::Expired => "expired",
            Self::AlreadyBound => "already_bound",
            Self::Store(err) => err.kind(),
        }
    }
}

/// Remaining-validity lookup errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LookupError {
    /// The identity has no bound key.
    #[error("no key registered")]
    NoKeyRegistered,
    /// The identity's key has expired.
    #[error("key has expired")]
    Expired,
    /// The identity's key was revoked.
    #[error("key has been revoked")]
    Revoked,
    /// Store failure.
    #[error(transparent)]
    Store(StoreError),
}

impl LookupError {
    /// Returns a stable label for audit output.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NoKeyRegistered => "no_key_registered",
            Self::Expired => "expired",
            Self::Revoked => "revoked",
            Self::Store(err) => err.kind(),
        }
    }
}

/// Key revocation errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RevokeError {
    /// No key with that id exists.
    #[error("key not found")]
    NotFound,
    /// Store failure.
    #[error(transparent)]
    Store(StoreError),
}

impl RevokeError {
    /// Returns a stable label for audit output.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Store(err) => err.kind(),
        }
    }
}

// ============================================================================
// SECTION: Lifecycle Manager
// ============================================================================

/// Source of candidate key ids.
pub type KeyIdSource = fn() -> KeyId;

/// Owns access-key state transitions.
///
/// # Invariants
/// - Generated keys start unbound, unrevoked, at revision zero.
/// - Mutations only succeed against the revision they validated.
pub struct KeyLifecycleManager<S: KeyStore> {
    /// Backing key store.
    store: S,
    /// Process-wide clock.
    clock: Arc<dyn Clock>,
    /// Lifecycle tuning.
    config: LifecycleConfig,
    /// Candidate id generator.
    id_source: KeyIdSource,
}

impl<S: KeyStore> fmt::Debug for KeyLifecycleManager<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyLifecycleManager").field("config", &self.config).finish_non_exhaustive()
    }
}

impl<S: KeyStore> KeyLifecycleManager<S> {
    /// Creates a lifecycle manager.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError`] when the configuration is invalid.
    pub fn new(
        store: S,
        clock: Arc<dyn Clock>,
        config: LifecycleConfig,
    ) -> Result<Self, LifecycleError> {
        config.validate()?;
        Ok(Self {
            store,
            clock,
            config,
            id_source: KeyId::random,
        })
    }

    /// Replaces the id generator. Used to exercise collision handling.
    #[must_use]
    pub fn with_id_source(mut self, id_source: KeyIdSource) -> Self {
        self.id_source = id_source;
        self
    }

    /// Returns the current time from the configured clock.
    #[must_use]
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Generates a key with the default validity window.
    ///
    /// # Errors
    ///
    /// Returns [`GenerateError`] when every attempt collides or the store fails.
    pub fn generate_key(&self) -> Result<AccessKey, GenerateError> {
        self.generate_key_with(KeyValidity::Default)
    }

    /// Generates a key with an explicit validity.
    ///
    /// # Errors
    ///
    /// Returns [`GenerateError`] when every attempt collides or the store fails.
    pub fn generate_key_with(&self, validity: KeyValidity) -> Result<AccessKey, GenerateError> {
        let issued_at = self.now();
        let valid_until = match validity {
            KeyValidity::Default => Some(issued_at.saturating_add(self.config.default_validity)),
            KeyValidity::For(duration) => Some(issued_at.saturating_add(duration)),
            KeyValidity::Unbounded => None,
        };
        for _ in 0 .. self.config.max_generation_attempts {
            let key = AccessKey::new((self.id_source)(), issued_at, valid_until);
            match self.store.insert(&key) {
                Ok(()) => return Ok(key),
                Err(StoreError::DuplicateId) => {}
                Err(err) => return Err(GenerateError::Store(err)),
            }
        }
        Err(GenerateError::GenerationFailed {
            attempts: self.config.max_generation_attempts,
        })
    }

    /// Binds `id` to `identity`.
    ///
    /// Registering a key already bound to the same identity succeeds without
    /// writing.
    ///
    /// # Errors
    ///
    /// Returns [`RegisterError`] when the key is missing, revoked, expired,
    /// bound elsewhere, or the store fails.
    pub fn register_key(&self, id: &KeyId, identity: &Identity) -> Result<AccessKey, RegisterError> {
        for _ in 0 .. self.config.max_update_attempts {
            let now = self.now();
            let key = self.store.find(id).map_err(RegisterError::Store)?.ok_or(RegisterError::NotFound)?;
            if key.revoked {
                return Err(RegisterError::AlreadyRevoked);
            }
            if key.is_expired(now) {
                return Err(RegisterError::Expired);
            }
            match &key.owner {
                Some(owner) if owner == identity => return Ok(key),
                Some(_) => return Err(RegisterError::AlreadyBound),
                None => {}
            }
            let mut bound = key;
            bound.owner = Some(identity.clone());
            match self.store.update(&bound) {
                Ok(stored) => return Ok(stored),
                Err(StoreError::Conflict) => {}
                Err(StoreError::NotFound) => return Err(RegisterError::NotFound),
                Err(err) => return Err(RegisterError::Store(err)),
            }
        }
        Err(RegisterError::Store(StoreError::Conflict))
    }

    /// Returns how long `identity`'s key remains valid.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError`] when the identity has no key, the key is
    /// revoked or expired, or the store fails.
    pub fn remaining_validity(&self, identity: &Identity) -> Result<RemainingValidity, LookupError> {
        let now = self.now();
        let key = self
            .store
            .find_by_owner(identity, now)
            .map_err(LookupError::Store)?
            .ok_or(LookupError::NoKeyRegistered)?;
        if key.revoked {
            return Err(LookupError::Revoked);
        }
        match key.valid_until {
            None => Ok(RemainingValidity::Unbounded),
            Some(until) => now.until(until).map(RemainingValidity::Bounded).ok_or(LookupError::Expired),
        }
    }

    /// Returns true when `identity` holds a usable key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store fails.
    pub fn is_usable(&self, identity: &Identity) -> Result<bool, StoreError> {
        let now = self.now();
        Ok(self.store.find_by_owner(identity, now)?.is_some_and(|key| key.is_usable(now)))
    }

    /// Revokes `id`. Revoking an already revoked key succeeds unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`RevokeError`] when the key is missing or the store fails.
    pub fn revoke_key(&self, id: &KeyId) -> Result<AccessKey, RevokeError> {
        for _ in 0 .. self.config.max_update_attempts {
            let key = self.store.find(id).map_err(RevokeError::Store)?.ok_or(RevokeError::NotFound)?;
            if key.revoked {
                return Ok(key);
            }
            let mut revoked = key;
            revoked.revoked = true;
            match self.store.update(&revoked) {
                Ok(stored) => return Ok(stored),
                Err(StoreError::Conflict) => {}
                Err(StoreError::NotFound) => return Err(RevokeError::NotFound),
                Err(err) => return Err(RevokeError::Store(err)),
            }
        }
        Err(RevokeError::Store(StoreError::Conflict))
    }

    /// Loads a key by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store fails.
    pub fn find_key(&self, id: &KeyId) -> Result<Option<AccessKey>, StoreError> {
        self.store.find(id)
    }

    /// Loads the key currently representing `identity`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store fails.
    pub fn key_for(&self, identity: &Identity) -> Result<Option<AccessKey>, StoreError> {
        self.store.find_by_owner(identity, self.now())
    }

    /// Lists every key ordered by issue time.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store fails.
    pub fn list_keys(&self) -> Result<Vec<AccessKey>, StoreError> {
        self.store.list()
    }
}

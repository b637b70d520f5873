// crates/toolgate-core/src/core/key.rs
// ============================================================================
// Module: Access Keys
// Description: Access-key record and usability rules.
// Purpose: Define the single source of truth for key usability and owner lookup.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! An [`AccessKey`] is generated unbound, bound to exactly one identity by
//! registration, and becomes permanently unusable once revoked or expired.
//! Every store backend selects the key for an owner through
//! [`select_owner_key`] so the tie-break rules cannot drift between backends.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::Identity;
use crate::core::identifiers::KeyId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Access Key
// ============================================================================

/// Persisted access-key record.
///
/// # Invariants
/// - `id` is unique for the lifetime of the store.
/// - `revision` increases by one on every successful store update.
/// - `revoked` is only ever set by administrative action and never cleared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessKey {
    /// Opaque key identifier.
    pub id: KeyId,
    /// Identity the key is bound to, if registered.
    pub owner: Option<Identity>,
    /// Creation instant.
    pub issued_at: Timestamp,
    /// Expiry instant; `None` never expires.
    pub valid_until: Option<Timestamp>,
    /// Administrative revocation flag.
    pub revoked: bool,
    /// Store revision used for compare-and-swap updates.
    pub revision: u64,
}

impl AccessKey {
    /// Creates a fresh, unbound key record at revision zero.
    #[must_use]
    pub const fn new(id: KeyId, issued_at: Timestamp, valid_until: Option<Timestamp>) -> Self {
        Self {
            id,
            owner: None,
            issued_at,
            valid_until,
            revoked: false,
            revision: 0,
        }
    }

    /// Returns true once `now` has reached the expiry instant.
    #[must_use]
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.valid_until.is_some_and(|until| now >= until)
    }

    /// Returns true when the key is bound to some identity.
    #[must_use]
    pub const fn is_bound(&self) -> bool {
        self.owner.is_some()
    }

    /// Returns true when the key is bound to `identity`.
    #[must_use]
    pub fn is_owned_by(&self, identity: &Identity) -> bool {
        self.owner.as_ref() == Some(identity)
    }

    /// Returns true when the key grants access at `now`.
    #[must_use]
    pub fn is_usable(&self, now: Timestamp) -> bool {
        !self.revoked && !self.is_expired(now) && self.is_bound()
    }
}

// ============================================================================
// SECTION: Owner Selection
// ============================================================================

/// Selects the key that represents `owner` at `now`.
///
/// Usable keys win over unusable ones; within each group the latest
/// `issued_at` wins, with the key id as a final deterministic tie-break. When
/// no bound key is usable the most recently issued one is still returned so
/// callers can report why access is gone.
pub fn select_owner_key<I>(keys: I, owner: &Identity, now: Timestamp) -> Option<AccessKey>
where
    I: IntoIterator<Item = AccessKey>,
{
    keys.into_iter()
        .filter(|key| key.is_owned_by(owner))
        .max_by(|a, b| {
            a.is_usable(now)
                .cmp(&b.is_usable(now))
                .then_with(|| a.issued_at.cmp(&b.issued_at))
                .then_with(|| a.id.cmp(&b.id))
        })
}

// ============================================================================
// SECTION: Tests
// ============================================================================

// crates/toolgate-core/src/interfaces/mod.rs
// ============================================================================
// Module: Toolgate Interfaces
// Description: Backend-agnostic storage interfaces for keys and usage.
// Purpose: Define the contract surfaces used by the Toolgate runtime.
// Dependencies: crate::core, thiserror
// ============================================================================

//! ## Overview
//! Interfaces define how Toolgate reaches durable state without embedding
//! backend details. Implementations must be safe for concurrent use from many
//! dispatching identities at once and must fail closed: storage faults are
//! reported, never mapped to an allow decision.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::core::AccessKey;
use crate::core::Identity;
use crate::core::KeyId;
use crate::core::Timestamp;

// ============================================================================
// SECTION: Key Store
// ============================================================================

/// Key store errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A record with the same key id already exists.
    #[error("key id already exists")]
    DuplicateId,
    /// No record exists for the key id.
    #[error("key not found")]
    NotFound,
    /// The stored revision moved since the caller read the record.
    #[error("key record changed concurrently")]
    Conflict,
    /// Store I/O error.
    #[error("key store io error: {0}")]
    Io(String),
    /// Store backend error.
    #[error("key store error: {0}")]
    Store(String),
    /// Stored data failed integrity checks.
    #[error("key store corruption: {0}")]
    Corrupt(String),
    /// Store schema version mismatch.
    #[error("key store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid store input or configuration.
    #[error("key store invalid data: {0}")]
    Invalid(String),
}

impl StoreError {
    /// Returns a stable label for audit output.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::DuplicateId => "duplicate_id",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::Io(_) => "store_io",
            Self::Store(_) => "store",
            Self::Corrupt(_) => "store_corrupt",
            Self::VersionMismatch(_) => "store_version_mismatch",
            Self::Invalid(_) => "store_invalid",
        }
    }
}

/// Durable access-key record store.
pub trait KeyStore {
    /// Inserts a new key record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuplicateId`] when the id is already present.
    fn insert(&self, key: &AccessKey) -> Result<(), StoreError>;

    /// Loads a key record by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the backend cannot be read.
    fn find(&self, id: &KeyId) -> Result<Option<AccessKey>, StoreError>;

    /// Loads the key representing `owner` at `now`, following
    /// [`crate::core::select_owner_key`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the backend cannot be read.
    fn find_by_owner(
        &self,
        owner: &Identity,
        now: Timestamp,
    ) -> Result<Option<AccessKey>, StoreError>;

    /// Replaces the stored record if its revision still equals
    /// `key.revision`, returning the stored record at its new revision.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when absent and
    /// [`StoreError::Conflict`] when the revision moved.
    fn update(&self, key: &AccessKey) -> Result<AccessKey, StoreError>;

    /// Lists every key record ordered by issue time.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the backend cannot be read.
    fn list(&self) -> Result<Vec<AccessKey>, StoreError>;

    /// Checks store readiness for serving requests.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store is not ready.
    fn readiness(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

// ============================================================================
// SECTION: Usage Meter
// ============================================================================

/// Usage meter errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UsageError {
    /// Usage storage failed.
    #[error("usage meter storage error: {0}")]
    Storage(String),
}

/// Durable monotonic invocation counter.
///
/// # Invariants
/// - The total never decreases and is never reset by normal operation.
pub trait UsageMeter {
    /// Increments the total by one and returns the new total.
    ///
    /// # Errors
    ///
    /// Returns [`UsageError`] when the counter cannot be persisted.
    fn increment(&self) -> Result<u64, UsageError>;

    /// Returns the current total.
    ///
    /// # Errors
    ///
    /// Returns [`UsageError`] when the counter cannot be read.
    fn total(&self) -> Result<u64, UsageError>;
}

// crates/toolgate-store-sqlite/src/lib.rs
// ============================================================================
// Module: Toolgate SQLite Store Library
// Description: Public API surface for the SQLite key store and usage meter.
// Purpose: Expose the durable storage backend for Toolgate.
// Dependencies: crate::store
// ============================================================================

//! ## Overview
//! Durable [`toolgate_core::KeyStore`] and [`toolgate_core::UsageMeter`]
//! implementations backed by a single `SQLite` database file.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::SCHEMA_VERSION;
pub use store::SqliteStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;

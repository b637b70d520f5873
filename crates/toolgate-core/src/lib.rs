// crates/toolgate-core/src/lib.rs
// ============================================================================
// Module: Toolgate Core Library
// Description: Public API surface for the Toolgate access-key core.
// Purpose: Expose key types, storage interfaces, and lifecycle/authz runtime.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Toolgate core owns the access-key lifecycle: key generation, identity
//! binding, validity accounting, revocation, and the authorization gate that
//! decides whether an identity may run a gated command. Storage is reached
//! only through the [`KeyStore`] and [`UsageMeter`] interfaces so durable
//! backends live in separate crates.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use core::*;

pub use interfaces::KeyStore;
pub use interfaces::StoreError;
pub use interfaces::UsageError;
pub use interfaces::UsageMeter;
pub use runtime::AuthorizationGate;
pub use runtime::AuthzError;
pub use runtime::DenyReason;
pub use runtime::GenerateError;
pub use runtime::InMemoryKeyStore;
pub use runtime::InMemoryUsageMeter;
pub use runtime::DEFAULT_VALIDITY;
pub use runtime::KeyIdSource;
pub use runtime::KeyLifecycleManager;
pub use runtime::KeyValidity;
pub use runtime::LifecycleConfig;
pub use runtime::LifecycleError;
pub use runtime::LookupError;
pub use runtime::RegisterError;
pub use runtime::RemainingValidity;
pub use runtime::RevokeError;
pub use runtime::SharedKeyStore;
pub use runtime::SharedUsageMeter;

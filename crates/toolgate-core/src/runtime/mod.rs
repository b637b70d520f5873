// crates/toolgate-core/src/runtime/mod.rs
// ============================================================================
// Module: Toolgate Runtime
// Description: Key lifecycle manager, authorization gate, and in-memory backends.
// Purpose: Group the stateful runtime components of the core.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! The runtime layer turns the storage interfaces into lifecycle behavior:
//! [`KeyLifecycleManager`] owns key state transitions and
//! [`AuthorizationGate`] turns them into allow/deny decisions.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod authz;
pub mod lifecycle;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use authz::AuthorizationGate;
pub use authz::AuthzError;
pub use authz::DenyReason;
pub use lifecycle::DEFAULT_MAX_GENERATION_ATTEMPTS;
pub use lifecycle::DEFAULT_MAX_UPDATE_ATTEMPTS;
pub use lifecycle::DEFAULT_VALIDITY;
pub use lifecycle::GenerateError;
pub use lifecycle::KeyIdSource;
pub use lifecycle::KeyLifecycleManager;
pub use lifecycle::KeyValidity;
pub use lifecycle::LifecycleConfig;
pub use lifecycle::LifecycleError;
pub use lifecycle::LookupError;
pub use lifecycle::RegisterError;
pub use lifecycle::RemainingValidity;
pub use lifecycle::RevokeError;
pub use store::InMemoryKeyStore;
pub use store::InMemoryUsageMeter;
pub use store::SharedKeyStore;
pub use store::SharedUsageMeter;

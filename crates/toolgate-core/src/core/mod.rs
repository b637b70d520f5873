// crates/toolgate-core/src/core/mod.rs
// ============================================================================
// Module: Toolgate Core Types
// Description: Canonical access-key, command, and time structures.
// Purpose: Provide stable, serializable types shared by every Toolgate crate.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Toolgate core types define access keys, requester identities, the fixed
//! command catalog, the opaque tool payload/artifact envelopes, and the
//! clock abstraction every lifecycle decision is made against.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod artifact;
pub mod command;
pub mod identifiers;
pub mod key;
pub mod time;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use artifact::Artifact;
pub use artifact::FileRef;
pub use artifact::Payload;
pub use artifact::ToolError;
pub use command::CommandName;
pub use identifiers::Identity;
pub use identifiers::KeyId;
pub use key::AccessKey;
pub use key::select_owner_key;
pub use time::Clock;
pub use time::ManualClock;
pub use time::SystemClock;
pub use time::Timestamp;

// crates/toolgate-cli/src/render.rs
// ============================================================================
// Module: Key Rendering
// Description: Human-readable rendering of key records for the CLI.
// Purpose: Format timestamps and key states for operator output.
// Dependencies: time, toolgate-core
// ============================================================================

//! ## Overview
//! Timestamps render as RFC 3339 in UTC; keys render as one catalog line with
//! their derived status.

// ============================================================================
// SECTION: Imports
// ============================================================================

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use toolgate_core::AccessKey;
use toolgate_core::Timestamp;

use crate::t;

// ============================================================================
// SECTION: Status
// ============================================================================

/// Derived key state at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStatus {
    /// Bound, unrevoked, and unexpired.
    Active,
    /// Issued but not yet bound.
    Unbound,
    /// Past its validity window.
    Expired,
    /// Revoked by an administrator.
    Revoked,
}

impl KeyStatus {
    /// Classifies `key` at `now`. Revocation wins over expiry.
    #[must_use]
    pub fn of(key: &AccessKey, now: Timestamp) -> Self {
        if key.revoked {
            Self::Revoked
        } else if key.is_expired(now) {
            Self::Expired
        } else if key.is_bound() {
            Self::Active
        } else {
            Self::Unbound
        }
    }

    /// Returns the status label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Unbound => "unbound",
            Self::Expired => "expired",
            Self::Revoked => "revoked",
        }
    }
}

// ============================================================================
// SECTION: Formatting
// ============================================================================

/// Formats a timestamp as RFC 3339, falling back to raw milliseconds.
#[must_use]
pub fn format_timestamp(timestamp: Timestamp) -> String {
    let nanos = i128::from(timestamp.as_unix_millis()) * 1_000_000;
    OffsetDateTime::from_unix_timestamp_nanos(nanos)
        .ok()
        .and_then(|datetime| datetime.format(&Rfc3339).ok())
        .unwrap_or_else(|| format!("{}ms", timestamp.as_unix_millis()))
}

/// Formats an optional expiry.
#[must_use]
pub fn format_valid_until(valid_until: Option<Timestamp>) -> String {
    valid_until.map_or_else(|| t!("key.validity.unbounded"), format_timestamp)
}

/// Renders one key record as a catalog line.
#[must_use]
pub fn key_line(key: &AccessKey, now: Timestamp) -> String {
    let owner = key.owner.as_ref().map_or_else(|| t!("key.owner.none"), ToString::to_string);
    t!(
        "key.entry",
        key_id = key.id,
        owner = owner,
        issued_at = format_timestamp(key.issued_at),
        valid_until = format_valid_until(key.valid_until),
        status = KeyStatus::of(key, now).as_str()
    )
}

// ============================================================================
// SECTION: Tests
// ============================================================================

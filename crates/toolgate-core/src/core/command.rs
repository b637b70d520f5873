// crates/toolgate-core/src/core/command.rs
// ============================================================================
// Module: Command Catalog
// Description: The fixed set of inbound command names.
// Purpose: Classify commands as free or gated with stable wire labels.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Toolgate accepts a closed command vocabulary. Key-management and greeting
//! commands are free; every tool command requires a usable access key.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Command Names
// ============================================================================

/// Inbound command identifier.
///
/// # Invariants
/// - Variants and their labels are stable; transports and config refer to them
///   by [`CommandName::as_str`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandName {
    /// Welcome message.
    Start,
    /// Help menu.
    Help,
    /// Issue a new access key.
    GenerateKey,
    /// Bind an access key to the caller.
    SetKey,
    /// Report the caller's remaining key validity.
    TimeLeft,
    /// Dump binaries.
    Dump,
    /// Decompile binaries to pseudocode.
    Pseudocode,
    /// Reverse engineer an APK.
    DecompileApk,
    /// Patch a native library.
    ModLib,
    /// Rewrite CRC32 values.
    Crc32Changer,
    /// Extract AES keys.
    AesKeys,
    /// Generate combo lists.
    GenCombo,
    /// Fetch course listings.
    Courses,
}

impl CommandName {
    /// Every command in catalog order.
    pub const ALL: [Self; 13] = [
        Self::Start,
        Self::Help,
        Self::GenerateKey,
        Self::SetKey,
        Self::TimeLeft,
        Self::Dump,
        Self::Pseudocode,
        Self::DecompileApk,
        Self::ModLib,
        Self::Crc32Changer,
        Self::AesKeys,
        Self::GenCombo,
        Self::Courses,
    ];

    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Help => "help",
            Self::GenerateKey => "generate_key",
            Self::SetKey => "set_key",
            Self::TimeLeft => "time_left",
            Self::Dump => "dump",
            Self::Pseudocode => "pseudocode",
            Self::DecompileApk => "decompile_apk",
            Self::ModLib => "mod_lib",
            Self::Crc32Changer => "crc32_changer",
            Self::AesKeys => "aes_keys",
            Self::GenCombo => "gen_combo",
            Self::Courses => "courses",
        }
    }

    /// Parses a wire label. A single leading `/` is accepted.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        let label = label.strip_prefix('/').unwrap_or(label);
        Self::ALL.into_iter().find(|command| command.as_str() == label)
    }

    /// Returns true for commands that skip authorization.
    #[must_use]
    pub const fn is_free(self) -> bool {
        matches!(self, Self::Start | Self::Help | Self::GenerateKey | Self::SetKey | Self::TimeLeft)
    }

    /// Returns true for gated tool commands.
    #[must_use]
    pub const fn is_gated(self) -> bool {
        !self.is_free()
    }

    /// Returns all gated tool commands in catalog order.
    pub fn gated() -> impl Iterator<Item = Self> {
        Self::ALL.into_iter().filter(|command| command.is_gated())
    }
}

impl fmt::Display for CommandName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

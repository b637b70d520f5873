// crates/toolgate-core/src/core/time.rs
// ============================================================================
// Module: Toolgate Time Model
// Description: Timestamps and the process-wide clock abstraction.
// Purpose: Make every expiry decision against one injectable time source.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! All key lifecycle comparisons read time from a single [`Clock`] shared by
//! the process. Production hosts use [`SystemClock`]; tests drive
//! [`ManualClock`] to move time forward deterministically. Clock skew between
//! generation and check is not compensated.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Time Values
// ============================================================================

/// Wall-clock instant in unix epoch milliseconds.
///
/// # Invariants
/// - Arithmetic saturates instead of wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp from unix epoch milliseconds.
    #[must_use]
    pub const fn from_unix_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as unix epoch milliseconds.
    #[must_use]
    pub const fn as_unix_millis(self) -> i64 {
        self.0
    }

    /// Returns the timestamp advanced by `duration`, saturating at the maximum.
    #[must_use]
    pub fn saturating_add(self, duration: Duration) -> Self {
        let millis = i64::try_from(duration.as_millis()).unwrap_or(i64::MAX);
        Self(self.0.saturating_add(millis))
    }

    /// Returns the span from `self` until `later`, or `None` when `later` is
    /// not strictly after `self`.
    #[must_use]
    pub fn until(self, later: Self) -> Option<Duration> {
        let delta = later.0.checked_sub(self.0)?;
        if delta <= 0 {
            return None;
        }
        u64::try_from(delta).ok().map(Duration::from_millis)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// SECTION: Clocks
// ============================================================================

/// Process-wide time source for lifecycle decisions.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> Timestamp;
}

/// Clock backed by the operating system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let elapsed = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        Timestamp(i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
    }
}

/// Manually driven clock for tests and replay.
///
/// # Invariants
/// - Time only changes through [`ManualClock::set`] and [`ManualClock::advance`].
#[derive(Debug, Default)]
pub struct ManualClock {
    /// Current instant in unix milliseconds.
    millis: AtomicI64,
}

impl ManualClock {
    /// Creates a manual clock frozen at `start`.
    #[must_use]
    pub const fn new(start: Timestamp) -> Self {
        Self {
            millis: AtomicI64::new(start.0),
        }
    }

    /// Moves the clock to `instant`.
    pub fn set(&self, instant: Timestamp) {
        self.millis.store(instant.0, Ordering::SeqCst);
    }

    /// Moves the clock forward by `duration`.
    pub fn advance(&self, duration: Duration) {
        let delta = i64::try_from(duration.as_millis()).unwrap_or(i64::MAX);
        let mut current = self.millis.load(Ordering::SeqCst);
        while let Err(actual) = self.millis.compare_exchange_weak(
            current,
            current.saturating_add(delta),
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            current = actual;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.millis.load(Ordering::SeqCst))
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

// crates/toolgate-core/src/runtime/store.rs
// ============================================================================
// Module: Toolgate In-Memory Stores
// Description: In-memory key store and usage meter plus shared wrappers.
// Purpose: Provide deterministic backends for tests and ephemeral runs.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! This module provides in-memory implementations of [`KeyStore`] and
//! [`UsageMeter`] for tests and `store.type = "memory"` deployments, plus
//! clonable `Arc` wrappers so one backend instance can be shared by every
//! component built at startup. In-memory state does not survive restart.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use crate::core::AccessKey;
use crate::core::Identity;
use crate::core::KeyId;
use crate::core::Timestamp;
use crate::core::select_owner_key;
use crate::interfaces::KeyStore;
use crate::interfaces::StoreError;
use crate::interfaces::UsageError;
use crate::interfaces::UsageMeter;

// ============================================================================
// SECTION: In-Memory Key Store
// ============================================================================

/// In-memory key store for tests and ephemeral runs.
///
/// # Invariants
/// - All reads and writes go through one mutex, so updates are linearized.
#[derive(Debug, Default, Clone)]
pub struct InMemoryKeyStore {
    /// Key records keyed by id.
    keys: Arc<Mutex<BTreeMap<KeyId, AccessKey>>>,
}

impl InMemoryKeyStore {
    /// Creates an empty in-memory key store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the record map.
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<KeyId, AccessKey>>, StoreError> {
        self.keys.lock().map_err(|_| StoreError::Store("key store mutex poisoned".to_string()))
    }
}

impl KeyStore for InMemoryKeyStore {
    fn insert(&self, key: &AccessKey) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        if guard.contains_key(&key.id) {
            return Err(StoreError::DuplicateId);
        }
        guard.insert(key.id.clone(), key.clone());
        drop(guard);
        Ok(())
    }

    fn find(&self, id: &KeyId) -> Result<Option<AccessKey>, StoreError> {
        Ok(self.lock()?.get(id).cloned())
    }

    fn find_by_owner(
        &self,
        owner: &Identity,
        now: Timestamp,
    ) -> Result<Option<AccessKey>, StoreError> {
        let guard = self.lock()?;
        Ok(select_owner_key(guard.values().cloned(), owner, now))
    }

    fn update(&self, key: &AccessKey) -> Result<AccessKey, StoreError> {
        let mut guard = self.lock()?;
        let Some(stored) = guard.get_mut(&key.id) else {
            return Err(StoreError::NotFound);
        };
        if stored.revision != key.revision {
            return Err(StoreError::Conflict);
        }
        let mut next = key.clone();
        next.revision = key.revision.saturating_add(1);
        *stored = next.clone();
        drop(guard);
        Ok(next)
    }

    fn list(&self) -> Result<Vec<AccessKey>, StoreError> {
        let mut keys: Vec<AccessKey> = self.lock()?.values().cloned().collect();
        keys.sort_by(|a, b| a.issued_at.cmp(&b.issued_at).then_with(|| a.id.cmp(&b.id)));
        Ok(keys)
    }
}

// ============================================================================
// SECTION: In-Memory Usage Meter
// ============================================================================

/// In-memory usage counter.
#[derive(Debug, Default, Clone)]
pub struct InMemoryUsageMeter {
    /// Running total.
    total: Arc<AtomicU64>,
}

impl InMemoryUsageMeter {
    /// Creates a counter starting at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl UsageMeter for InMemoryUsageMeter {
    fn increment(&self) -> Result<u64, UsageError> {
        Ok(self.total.fetch_add(1, Ordering::SeqCst).saturating_add(1))
    }

    fn total(&self) -> Result<u64, UsageError> {
        Ok(self.total.load(Ordering::SeqCst))
    }
}

// ============================================================================
// SECTION: Shared Wrappers
// ============================================================================

/// Shared key store wrapper for trait objects.
#[derive(Clone)]
pub struct SharedKeyStore {
    /// Inner store implementation.
    inner: Arc<dyn KeyStore + Send + Sync>,
}

impl SharedKeyStore {
    /// Wraps a key store in a shared, clonable wrapper.
    #[must_use]
    pub fn from_store(store: impl KeyStore + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(store),
        }
    }

    /// Wraps an existing shared store.
    #[must_use]
    pub const fn new(store: Arc<dyn KeyStore + Send + Sync>) -> Self {
        Self {
            inner: store,
        }
    }
}

impl KeyStore for SharedKeyStore {
    fn insert(&self, key: &AccessKey) -> Result<(), StoreError> {
        self.inner.insert(key)
    }

    fn find(&self, id: &KeyId) -> Result<Option<AccessKey>, StoreError> {
        self.inner.find(id)
    }

    fn find_by_owner(
        &self,
        owner: &Identity,
        now: Timestamp,
    ) -> Result<Option<AccessKey>, StoreError> {
        self.inner.find_by_owner(owner, now)
    }

    fn update(&self, key: &AccessKey) -> Result<AccessKey, StoreError> {
        self.inner.update(key)
    }

    fn list(&self) -> Result<Vec<AccessKey>, StoreError> {
        self.inner.list()
    }

    fn readiness(&self) -> Result<(), StoreError> {
        self.inner.readiness()
    }
}

/// Shared usage meter wrapper for trait objects.
#[derive(Clone)]
pub struct SharedUsageMeter {
    /// Inner meter implementation.
    inner: Arc<dyn UsageMeter + Send + Sync>,
}

impl SharedUsageMeter {
    /// Wraps a usage meter in a shared, clonable wrapper.
    #[must_use]
    pub fn from_meter(meter: impl UsageMeter + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(meter),
        }
    }

    /// Wraps an existing shared meter.
    #[must_use]
    pub const fn new(meter: Arc<dyn UsageMeter + Send + Sync>) -> Self {
        Self {
            inner: meter,
        }
    }
}

impl UsageMeter for SharedUsageMeter {
    fn increment(&self) -> Result<u64, UsageError> {
        self.inner.increment()
    }

    fn total(&self) -> Result<u64, UsageError> {
        self.inner.total()
    }
}

// crates/toolgate-store-sqlite/tests/sqlite_store_unit.rs
// ============================================================================
// Module: SQLite Store Unit Tests
// Description: Persistence and integrity tests for the SQLite key store.
// Purpose: Validate path safety, schema versioning, compare-and-swap updates,
//          row validation, and usage counter durability.
// ============================================================================

//! ## Overview
//! Unit-level tests for `SQLite` store invariants:
//! - Keys and the usage total survive reopening the database
//! - Duplicate ids are rejected
//! - Updates are revision-checked
//! - Unknown schema versions and corrupt rows fail closed
//! - Directory paths are rejected

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::path::Path;
use std::sync::Arc;
use std::thread;

use rusqlite::Connection;
use rusqlite::params;
use tempfile::TempDir;
use toolgate_core::AccessKey;
use toolgate_core::Identity;
use toolgate_core::KeyId;
use toolgate_core::KeyLifecycleManager;
use toolgate_core::KeyStore;
use toolgate_core::LifecycleConfig;
use toolgate_core::ManualClock;
use toolgate_core::RegisterError;
use toolgate_core::StoreError;
use toolgate_core::Timestamp;
use toolgate_core::UsageMeter;
use toolgate_store_sqlite::SqliteStore;
use toolgate_store_sqlite::SqliteStoreConfig;
use toolgate_store_sqlite::SqliteStoreError;
use toolgate_store_sqlite::SqliteStoreMode;
use toolgate_store_sqlite::SqliteSyncMode;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn open(path: &Path) -> SqliteStore {
    SqliteStore::new(SqliteStoreConfig::for_path(path)).unwrap()
}

fn sample_key(id: &str, issued: i64) -> AccessKey {
    AccessKey::new(
        KeyId::new(id),
        Timestamp::from_unix_millis(issued),
        Some(Timestamp::from_unix_millis(issued + 1_000)),
    )
}

// ============================================================================
// SECTION: Persistence
// ============================================================================

#[test]
fn keys_and_usage_survive_reopen() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("nested").join("toolgate.db");
    {
        let store = open(&path);
        let mut key = sample_key("key-a", 10);
        store.insert(&key).unwrap();
        key.owner = Some(Identity::new("user-1"));
        store.update(&key).unwrap();
        store.increment().unwrap();
        store.increment().unwrap();
    }
    let store = open(&path);
    let key = store.find(&KeyId::new("key-a")).unwrap().unwrap();
    assert_eq!(key.owner, Some(Identity::new("user-1")));
    assert_eq!(key.revision, 1);
    assert_eq!(store.total().unwrap(), 2);
    assert_eq!(store.increment().unwrap(), 3);
}

#[test]
fn delete_journal_and_normal_sync_are_accepted() {
    let temp = TempDir::new().unwrap();
    let config = SqliteStoreConfig {
        journal_mode: SqliteStoreMode::Delete,
        sync_mode: SqliteSyncMode::Normal,
        ..SqliteStoreConfig::for_path(temp.path().join("store.db"))
    };
    let store = SqliteStore::new(config).unwrap();
    store.readiness().unwrap();
    assert_eq!(store.total().unwrap(), 0);
}

#[test]
fn duplicate_ids_are_rejected() {
    let temp = TempDir::new().unwrap();
    let store = open(&temp.path().join("store.db"));
    store.insert(&sample_key("dup", 1)).unwrap();
    assert_eq!(store.insert(&sample_key("dup", 2)).unwrap_err(), StoreError::DuplicateId);
}

#[test]
fn list_is_ordered_by_issue_time() {
    let temp = TempDir::new().unwrap();
    let store = open(&temp.path().join("store.db"));
    store.insert(&sample_key("late", 30)).unwrap();
    store.insert(&sample_key("early", 10)).unwrap();
    store.insert(&sample_key("middle", 20)).unwrap();
    let ids: Vec<String> =
        store.list().unwrap().into_iter().map(|key| key.id.as_str().to_string()).collect();
    assert_eq!(ids, vec!["early", "middle", "late"]);
}

#[test]
fn find_by_owner_prefers_latest_usable_key() {
    let temp = TempDir::new().unwrap();
    let store = open(&temp.path().join("store.db"));
    let owner = Identity::new("user-1");
    for (id, issued) in [("first", 0), ("second", 500)] {
        let mut key = sample_key(id, issued);
        store.insert(&key).unwrap();
        key.owner = Some(owner.clone());
        store.update(&key).unwrap();
    }
    let at_600 = store.find_by_owner(&owner, Timestamp::from_unix_millis(600)).unwrap().unwrap();
    assert_eq!(at_600.id, KeyId::new("second"));
    let at_1_200 =
        store.find_by_owner(&owner, Timestamp::from_unix_millis(1_200)).unwrap().unwrap();
    assert_eq!(at_1_200.id, KeyId::new("second"));
    assert!(store.find_by_owner(&Identity::new("nobody"), Timestamp::from_unix_millis(0)).unwrap().is_none());
}

// ============================================================================
// SECTION: Compare-And-Swap
// ============================================================================

#[test]
fn stale_revision_conflicts() {
    let temp = TempDir::new().unwrap();
    let store = open(&temp.path().join("store.db"));
    let key = sample_key("cas", 1);
    store.insert(&key).unwrap();

    let mut first = key.clone();
    first.owner = Some(Identity::new("a"));
    assert_eq!(store.update(&first).unwrap().revision, 1);

    let mut stale = key;
    stale.revoked = true;
    assert_eq!(store.update(&stale).unwrap_err(), StoreError::Conflict);
    assert_eq!(store.update(&sample_key("missing", 1)).unwrap_err(), StoreError::NotFound);
}

#[test]
fn concurrent_registration_binds_one_owner() {
    let temp = TempDir::new().unwrap();
    let store = open(&temp.path().join("store.db"));
    let clock = Arc::new(ManualClock::new(Timestamp::from_unix_millis(0)));
    let manager =
        Arc::new(KeyLifecycleManager::new(store, clock, LifecycleConfig::default()).unwrap());
    let key = manager.generate_key().unwrap();

    let handles: Vec<_> = (0 .. 6)
        .map(|index| {
            let manager = Arc::clone(&manager);
            let id = key.id.clone();
            thread::spawn(move || manager.register_key(&id, &Identity::new(format!("user-{index}"))))
        })
        .collect();
    let outcomes: Vec<_> = handles.into_iter().map(|handle| handle.join().unwrap()).collect();
    assert_eq!(outcomes.iter().filter(|outcome| outcome.is_ok()).count(), 1);
    assert!(
        outcomes
            .iter()
            .filter_map(|outcome| outcome.as_ref().err())
            .all(|err| *err == RegisterError::AlreadyBound)
    );
}

// ============================================================================
// SECTION: Integrity
// ============================================================================

#[test]
fn directory_path_is_rejected() {
    let temp = TempDir::new().unwrap();
    let err = SqliteStore::new(SqliteStoreConfig::for_path(temp.path())).err().unwrap();
    assert!(matches!(err, SqliteStoreError::Invalid(_)));
}

#[test]
fn empty_and_overlong_paths_are_rejected() {
    let empty = SqliteStore::new(SqliteStoreConfig::for_path("")).err().unwrap();
    assert!(matches!(empty, SqliteStoreError::Invalid(_)));
    let temp = TempDir::new().unwrap();
    let overlong = temp.path().join("a".repeat(300));
    let err = SqliteStore::new(SqliteStoreConfig::for_path(overlong)).err().unwrap();
    assert!(matches!(err, SqliteStoreError::Invalid(_)));
}

#[test]
fn unknown_schema_version_is_rejected() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("store.db");
    drop(open(&path));
    let connection = Connection::open(&path).unwrap();
    connection.execute("UPDATE store_meta SET version = ?1", params![99_i64]).unwrap();
    drop(connection);
    let err = SqliteStore::new(SqliteStoreConfig::for_path(&path)).err().unwrap();
    assert!(matches!(err, SqliteStoreError::VersionMismatch(_)));
}

#[test]
fn corrupt_rows_fail_closed() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("store.db");
    let store = open(&path);
    store.insert(&sample_key("bad-flag", 1)).unwrap();
    let connection = Connection::open(&path).unwrap();
    connection
        .execute("UPDATE access_keys SET revoked = 7 WHERE key_id = ?1", params!["bad-flag"])
        .unwrap();
    drop(connection);
    let err = store.find(&KeyId::new("bad-flag")).unwrap_err();
    assert!(matches!(err, StoreError::Corrupt(_)));
    assert!(matches!(store.list().unwrap_err(), StoreError::Corrupt(_)));
}

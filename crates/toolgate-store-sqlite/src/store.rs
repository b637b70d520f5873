// crates/toolgate-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Key Store
// Description: Durable KeyStore and UsageMeter backed by SQLite.
// Purpose: Persist access keys and the usage counter across restarts.
// Dependencies: toolgate-core, rusqlite, serde, thiserror
// ============================================================================

//! ## Overview
//! This module implements [`KeyStore`] and [`UsageMeter`] on one `SQLite`
//! database. Key updates are compare-and-swap on the record revision so
//! concurrent registration and revocation are linearized by the database.
//! Rows are validated on load and fail closed on out-of-range values.
//! Security posture: key ids are bearer credentials and are never included in
//! error messages.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;

use rusqlite::Connection;
use rusqlite::ErrorCode;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::Row;
use rusqlite::params;
use serde::Deserialize;
use thiserror::Error;
use toolgate_core::AccessKey;
use toolgate_core::Identity;
use toolgate_core::KeyId;
use toolgate_core::KeyStore;
use toolgate_core::StoreError;
use toolgate_core::Timestamp;
use toolgate_core::UsageError;
use toolgate_core::UsageMeter;
use toolgate_core::select_owner_key;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
pub const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Column list shared by key queries.
const KEY_COLUMNS: &str = "key_id, owner, issued_at_ms, valid_until_ms, revoked, revision";

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode.
    #[default]
    Wal,
    /// Delete journal mode.
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `synchronous` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode.
    #[default]
    Full,
    /// Normal synchronous mode.
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` store.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `busy_timeout_ms` is interpreted as milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl SqliteStoreConfig {
    /// Creates a config for `path` with default tuning.
    #[must_use]
    pub fn for_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }

    /// Validates the store path.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Invalid`] when the path is unusable.
    pub fn validate(&self) -> Result<(), SqliteStoreError> {
        validate_store_path(&self.path)
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
///
/// # Invariants
/// - Error messages never embed key ids.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Stored row failed validation.
    #[error("sqlite store corruption: {0}")]
    Corrupt(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid store input or configuration.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Db(message) => Self::Store(message),
            SqliteStoreError::Corrupt(message) => Self::Corrupt(message),
            SqliteStoreError::VersionMismatch(message) => Self::VersionMismatch(message),
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
        }
    }
}

impl From<SqliteStoreError> for UsageError {
    fn from(error: SqliteStoreError) -> Self {
        Self::Storage(error.to_string())
    }
}

/// Maps a `rusqlite` error into a store error.
fn db_error(err: &rusqlite::Error) -> SqliteStoreError {
    SqliteStoreError::Db(err.to_string())
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed key store and usage meter.
///
/// # Invariants
/// - Connection access is serialized through a mutex.
/// - `usage_counter` holds exactly one row.
#[derive(Clone)]
pub struct SqliteStore {
    /// Store configuration.
    config: SqliteStoreConfig,
    /// Shared connection guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Opens an `SQLite`-backed store, creating the schema on first use.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// its schema version is not supported.
    pub fn new(config: SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        validate_store_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        let mut connection = open_connection(&config)?;
        initialize_schema(&mut connection)?;
        Ok(Self {
            config,
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Returns the database path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    /// Locks the shared connection.
    fn lock(&self) -> Result<MutexGuard<'_, Connection>, SqliteStoreError> {
        self.connection.lock().map_err(|_| SqliteStoreError::Io("sqlite mutex poisoned".to_string()))
    }

    /// Inserts a new key row.
    fn insert_key(&self, key: &AccessKey) -> Result<(), StoreError> {
        let guard = self.lock()?;
        let result = guard.execute(
            "INSERT INTO access_keys (key_id, owner, issued_at_ms, valid_until_ms, revoked, \
             revision) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                key.id.as_str(),
                key.owner.as_ref().map(Identity::as_str),
                key.issued_at.as_unix_millis(),
                key.valid_until.map(Timestamp::as_unix_millis),
                key.revoked,
                revision_to_sql(key.revision)?,
            ],
        );
        drop(guard);
        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(failure, _))
                if failure.code == ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::DuplicateId)
            }
            Err(err) => Err(db_error(&err).into()),
        }
    }

    /// Loads a key row by id.
    fn load_key(&self, id: &KeyId) -> Result<Option<AccessKey>, SqliteStoreError> {
        let guard = self.lock()?;
        let row = guard
            .query_row(
                &format!("SELECT {KEY_COLUMNS} FROM access_keys WHERE key_id = ?1"),
                params![id.as_str()],
                read_key_row,
            )
            .optional()
            .map_err(|err| db_error(&err))?;
        drop(guard);
        row.map(KeyRow::into_key).transpose()
    }

    /// Loads every key row matching the optional owner filter.
    fn load_keys(&self, owner: Option<&Identity>) -> Result<Vec<AccessKey>, SqliteStoreError> {
        let guard = self.lock()?;
        let rows = match owner {
            Some(owner) => {
                let mut stmt = guard
                    .prepare(&format!("SELECT {KEY_COLUMNS} FROM access_keys WHERE owner = ?1"))
                    .map_err(|err| db_error(&err))?;
                stmt.query_map(params![owner.as_str()], read_key_row)
                    .map_err(|err| db_error(&err))?
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|err| db_error(&err))?
            }
            None => {
                let mut stmt = guard
                    .prepare(&format!(
                        "SELECT {KEY_COLUMNS} FROM access_keys ORDER BY issued_at_ms, key_id"
                    ))
                    .map_err(|err| db_error(&err))?;
                stmt.query_map(params![], read_key_row)
                    .map_err(|err| db_error(&err))?
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|err| db_error(&err))?
            }
        };
        drop(guard);
        rows.into_iter().map(KeyRow::into_key).collect()
    }

    /// Applies a revision-checked update inside a transaction.
    fn update_key(&self, key: &AccessKey) -> Result<AccessKey, StoreError> {
        let expected = revision_to_sql(key.revision)?;
        let next_revision = key.revision.checked_add(1).ok_or_else(|| {
            StoreError::Invalid("key revision overflow".to_string())
        })?;
        let mut guard = self.lock()?;
        let tx = guard.transaction().map_err(|err| StoreError::from(db_error(&err)))?;
        let changed = tx
            .execute(
                "UPDATE access_keys SET owner = ?1, issued_at_ms = ?2, valid_until_ms = ?3, \
                 revoked = ?4, revision = revision + 1 WHERE key_id = ?5 AND revision = ?6",
                params![
                    key.owner.as_ref().map(Identity::as_str),
                    key.issued_at.as_unix_millis(),
                    key.valid_until.map(Timestamp::as_unix_millis),
                    key.revoked,
                    key.id.as_str(),
                    expected,
                ],
            )
            .map_err(|err| StoreError::from(db_error(&err)))?;
        if changed == 0 {
            let exists: Option<i64> = tx
                .query_row(
                    "SELECT 1 FROM access_keys WHERE key_id = ?1",
                    params![key.id.as_str()],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|err| StoreError::from(db_error(&err)))?;
            drop(tx);
            drop(guard);
            return Err(if exists.is_some() { StoreError::Conflict } else { StoreError::NotFound });
        }
        tx.commit().map_err(|err| StoreError::from(db_error(&err)))?;
        drop(guard);
        let mut stored = key.clone();
        stored.revision = next_revision;
        Ok(stored)
    }
}

impl KeyStore for SqliteStore {
    fn insert(&self, key: &AccessKey) -> Result<(), StoreError> {
        self.insert_key(key)
    }

    fn find(&self, id: &KeyId) -> Result<Option<AccessKey>, StoreError> {
        Ok(self.load_key(id)?)
    }

    fn find_by_owner(
        &self,
        owner: &Identity,
        now: Timestamp,
    ) -> Result<Option<AccessKey>, StoreError> {
        let keys = self.load_keys(Some(owner))?;
        Ok(select_owner_key(keys, owner, now))
    }

    fn update(&self, key: &AccessKey) -> Result<AccessKey, StoreError> {
        self.update_key(key)
    }

    fn list(&self) -> Result<Vec<AccessKey>, StoreError> {
        Ok(self.load_keys(None)?)
    }

    fn readiness(&self) -> Result<(), StoreError> {
        let guard = self.lock()?;
        guard
            .query_row("SELECT 1", params![], |row| row.get::<_, i64>(0))
            .map_err(|err| StoreError::from(db_error(&err)))?;
        drop(guard);
        Ok(())
    }
}

impl UsageMeter for SqliteStore {
    fn increment(&self) -> Result<u64, UsageError> {
        let guard = self.lock()?;
        let total: i64 = guard
            .query_row(
                "UPDATE usage_counter SET total = total + 1 WHERE id = 1 RETURNING total",
                params![],
                |row| row.get(0),
            )
            .map_err(|err| UsageError::from(db_error(&err)))?;
        drop(guard);
        counter_from_sql(total).map_err(UsageError::from)
    }

    fn total(&self) -> Result<u64, UsageError> {
        let guard = self.lock()?;
        let total: i64 = guard
            .query_row("SELECT total FROM usage_counter WHERE id = 1", params![], |row| row.get(0))
            .map_err(|err| UsageError::from(db_error(&err)))?;
        drop(guard);
        counter_from_sql(total).map_err(UsageError::from)
    }
}

// ============================================================================
// SECTION: Row Mapping
// ============================================================================

/// Raw `access_keys` row before validation.
struct KeyRow {
    /// Key id column.
    key_id: String,
    /// Owner column.
    owner: Option<String>,
    /// Issue time column.
    issued_at_ms: i64,
    /// Expiry column.
    valid_until_ms: Option<i64>,
    /// Revocation flag column.
    revoked: i64,
    /// Revision column.
    revision: i64,
}

impl KeyRow {
    /// Validates the row and converts it into an [`AccessKey`].
    fn into_key(self) -> Result<AccessKey, SqliteStoreError> {
        let revoked = match self.revoked {
            0 => false,
            1 => true,
            other => {
                return Err(SqliteStoreError::Corrupt(format!("invalid revoked flag: {other}")));
            }
        };
        let revision = u64::try_from(self.revision)
            .map_err(|_| SqliteStoreError::Corrupt("negative key revision".to_string()))?;
        if self.key_id.is_empty() {
            return Err(SqliteStoreError::Corrupt("empty key id".to_string()));
        }
        let mut key = AccessKey::new(
            KeyId::new(self.key_id),
            Timestamp::from_unix_millis(self.issued_at_ms),
            self.valid_until_ms.map(Timestamp::from_unix_millis),
        );
        key.owner = self.owner.map(Identity::new);
        key.revoked = revoked;
        key.revision = revision;
        Ok(key)
    }
}

/// Reads a raw key row.
fn read_key_row(row: &Row<'_>) -> rusqlite::Result<KeyRow> {
    Ok(KeyRow {
        key_id: row.get(0)?,
        owner: row.get(1)?,
        issued_at_ms: row.get(2)?,
        valid_until_ms: row.get(3)?,
        revoked: row.get(4)?,
        revision: row.get(5)?,
    })
}

/// Converts a revision into its column value.
fn revision_to_sql(revision: u64) -> Result<i64, SqliteStoreError> {
    i64::try_from(revision).map_err(|_| SqliteStoreError::Invalid("key revision too large".to_string()))
}

/// Converts the stored counter into a total.
fn counter_from_sql(total: i64) -> Result<u64, SqliteStoreError> {
    u64::try_from(total).map_err(|_| SqliteStoreError::Corrupt("negative usage total".to_string()))
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path missing parent directory".to_string()));
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    if path.as_os_str().is_empty() {
        return Err(SqliteStoreError::Invalid("store path must not be empty".to_string()));
    }
    if path.as_os_str().len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    if path.components().any(|component| component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH)
    {
        return Err(SqliteStoreError::Invalid(
            "store path contains an overlong component".to_string(),
        ));
    }
    if path.is_dir() {
        return Err(SqliteStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Opens an `SQLite` connection and applies pragmas.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection =
        Connection::open_with_flags(&config.path, flags).map_err(|err| db_error(&err))?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(|err| db_error(&err))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(|err| db_error(&err))?;
    connection
        .busy_timeout(Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| db_error(&err))?;
    Ok(connection)
}

/// Initializes the schema or validates the existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction().map_err(|err| db_error(&err))?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(|err| db_error(&err))?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(|err| db_error(&err))?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(|err| db_error(&err))?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS access_keys (
                    key_id TEXT PRIMARY KEY NOT NULL,
                    owner TEXT,
                    issued_at_ms INTEGER NOT NULL,
                    valid_until_ms INTEGER,
                    revoked INTEGER NOT NULL DEFAULT 0,
                    revision INTEGER NOT NULL DEFAULT 0
                );
                CREATE INDEX IF NOT EXISTS idx_access_keys_owner ON access_keys (owner);
                CREATE TABLE IF NOT EXISTS usage_counter (
                    id INTEGER PRIMARY KEY CHECK (id = 1),
                    total INTEGER NOT NULL
                );
                INSERT OR IGNORE INTO usage_counter (id, total) VALUES (1, 0);",
            )
            .map_err(|err| db_error(&err))?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "unsupported schema version: {value}"
            )));
        }
    }
    tx.commit().map_err(|err| db_error(&err))?;
    Ok(())
}

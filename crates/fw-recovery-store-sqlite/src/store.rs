// crates/fw-recovery-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Device Store
// Description: Durable retry, snapshot, group, and registry tables in SQLite.
// Purpose: Persist per-device state with deterministic serialization.
// Dependencies: fw-recovery-core, rusqlite, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! This module implements every persisted collaborator trait on one `SQLite`
//! database. Records are written as canonical JSON alongside a content hash;
//! loads verify the hash and the key/payload device id and fail closed on any
//! mismatch. Read-modify-write operations (the retry increment, the quarantine
//! settle, the strictly-newer snapshot write, and the attribute merge) run
//! inside `BEGIN IMMEDIATE` transactions, which take the database write lock
//! up front and make them atomic across processes sharing the file.

// ============================================================================//
// SECTION: Imports
// ============================================================================//

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use fw_recovery_core::AttributeBag;
use fw_recovery_core::AttributeSnapshot;
use fw_recovery_core::AttributeStore;
use fw_recovery_core::DeviceGroupManager;
use fw_recovery_core::DeviceId;
use fw_recovery_core::DeviceRegistry;
use fw_recovery_core::DeviceStatus;
use fw_recovery_core::GroupError;
use fw_recovery_core::GroupName;
use fw_recovery_core::RegistryError;
use fw_recovery_core::RetryRecord;
use fw_recovery_core::RetryStore;
use fw_recovery_core::SettleWrite;
use fw_recovery_core::SnapshotWrite;
use fw_recovery_core::StoreError;
use fw_recovery_core::Timestamp;
use fw_recovery_core::hashing::DEFAULT_HASH_ALGORITHM;
use fw_recovery_core::hashing::HashAlgorithm;
use fw_recovery_core::hashing::canonical_json_bytes;
use fw_recovery_core::hashing::hash_bytes;
use rusqlite::Connection;
use rusqlite::ErrorCode;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::TransactionBehavior;
use rusqlite::params;
use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

// ============================================================================//
// SECTION: Constants
// ============================================================================//

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum serialized record size accepted by the store.
pub const MAX_RECORD_BYTES: usize = 1024 * 1024;

/// Loads one retry record row.
const SELECT_RETRY_SQL: &str = "SELECT record_json, record_hash, hash_algorithm FROM \
                                retry_records WHERE device_id = ?1";
/// Upserts one retry record row.
const UPSERT_RETRY_SQL: &str = "INSERT INTO retry_records (device_id, status, record_json, \
                                record_hash, hash_algorithm, saved_at) VALUES (?1, ?2, ?3, ?4, \
                                ?5, ?6) ON CONFLICT(device_id) DO UPDATE SET status = \
                                excluded.status, record_json = excluded.record_json, \
                                record_hash = excluded.record_hash, hash_algorithm = \
                                excluded.hash_algorithm, saved_at = excluded.saved_at";
/// Loads one attribute snapshot row.
const SELECT_SNAPSHOT_SQL: &str = "SELECT snapshot_json, snapshot_hash, hash_algorithm FROM \
                                   attribute_snapshots WHERE device_id = ?1";
/// Upserts one attribute snapshot row.
const UPSERT_SNAPSHOT_SQL: &str = "INSERT INTO attribute_snapshots (device_id, snapshot_json, \
                                   snapshot_hash, hash_algorithm, saved_at) VALUES (?1, ?2, ?3, \
                                   ?4, ?5) ON CONFLICT(device_id) DO UPDATE SET snapshot_json = \
                                   excluded.snapshot_json, snapshot_hash = \
                                   excluded.snapshot_hash, hash_algorithm = \
                                   excluded.hash_algorithm, saved_at = excluded.saved_at";
/// Loads one live attribute row.
const SELECT_ATTRIBUTES_SQL: &str = "SELECT attributes_json, attributes_hash, hash_algorithm \
                                     FROM device_attributes WHERE device_id = ?1";
/// Upserts one live attribute row.
const UPSERT_ATTRIBUTES_SQL: &str = "INSERT INTO device_attributes (device_id, \
                                     attributes_json, attributes_hash, hash_algorithm, saved_at) \
                                     VALUES (?1, ?2, ?3, ?4, ?5) ON CONFLICT(device_id) DO \
                                     UPDATE SET attributes_json = excluded.attributes_json, \
                                     attributes_hash = excluded.attributes_hash, hash_algorithm \
                                     = excluded.hash_algorithm, saved_at = excluded.saved_at";

// ============================================================================//
// SECTION: Config
// ============================================================================//

/// `SQLite` journal mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
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
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
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

/// Configuration for the `SQLite` device store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
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
    /// Builds a config with default pragmas for `path`.
    #[must_use]
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================//
// SECTION: Errors
// ============================================================================//

/// `SQLite` store errors.
#[derive(Debug, Error)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// Database is locked by another writer.
    #[error("sqlite store busy: {0}")]
    Busy(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Store corruption or hash mismatch.
    #[error("sqlite store corruption: {0}")]
    Corrupt(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid store data.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
    /// Store payload exceeded configured size limits.
    #[error("sqlite store payload too large: {actual_bytes} bytes (max {max_bytes})")]
    TooLarge {
        /// Maximum allowed bytes.
        max_bytes: usize,
        /// Actual payload size in bytes.
        actual_bytes: usize,
    },
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Unavailable(message),
            SqliteStoreError::Busy(message) => Self::Throttled(message),
            SqliteStoreError::Db(message) => Self::Store(message),
            SqliteStoreError::Corrupt(message) => Self::Corrupt(message),
            SqliteStoreError::VersionMismatch(message) => Self::VersionMismatch(message),
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
            SqliteStoreError::TooLarge {
                max_bytes,
                actual_bytes,
            } => Self::Invalid(format!(
                "record exceeds size limit: {actual_bytes} bytes (max {max_bytes})"
            )),
        }
    }
}

impl From<SqliteStoreError> for GroupError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Unavailable(message),
            SqliteStoreError::Busy(message) => Self::Throttled(message),
            other => Self::Rejected(other.to_string()),
        }
    }
}

impl From<SqliteStoreError> for RegistryError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) | SqliteStoreError::Busy(message) => {
                Self::Unavailable(message)
            }
            other => Self::Rejected(other.to_string()),
        }
    }
}

// ============================================================================//
// SECTION: Store
// ============================================================================//

/// `SQLite`-backed device store with WAL support.
#[derive(Clone)]
pub struct SqliteDeviceStore {
    /// Shared `SQLite` connection guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteDeviceStore {
    /// Opens an `SQLite`-backed device store.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// initialized.
    pub fn new(config: &SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        validate_store_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        let mut connection = open_connection(config)?;
        initialize_schema(&mut connection)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Returns the members of a group ordered by device id.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the query fails.
    pub fn group_members(&self, group: &GroupName) -> Result<Vec<DeviceId>, SqliteStoreError> {
        let guard = self.lock()?;
        let mut statement = guard
            .prepare(
                "SELECT device_id FROM device_groups WHERE group_name = ?1 ORDER BY device_id",
            )
            .map_err(db_error)?;
        let rows = statement
            .query_map(params![group.as_str()], |row| row.get::<_, String>(0))
            .map_err(db_error)?;
        let mut members = Vec::new();
        for row in rows {
            members.push(DeviceId::new(row.map_err(db_error)?));
        }
        Ok(members)
    }

    /// Acquires the connection.
    fn lock(&self) -> Result<MutexGuard<'_, Connection>, SqliteStoreError> {
        self.connection.lock().map_err(|_| SqliteStoreError::Db("mutex poisoned".to_string()))
    }

    // ------------------------------------------------------------------------
    // Retry records
    // ------------------------------------------------------------------------

    /// Loads a retry record.
    fn load_retry(&self, device_id: &DeviceId) -> Result<Option<RetryRecord>, SqliteStoreError> {
        let guard = self.lock()?;
        let row = select_row(&guard, SELECT_RETRY_SQL, device_id)?;
        drop(guard);
        row.map(|row| decode_retry(device_id, &row)).transpose()
    }

    /// Replaces a retry record.
    fn save_retry(&self, record: &RetryRecord) -> Result<(), SqliteStoreError> {
        let encoded = encode(record)?;
        let guard = self.lock()?;
        write_retry(&guard, record, &encoded)?;
        drop(guard);
        Ok(())
    }

    /// Applies one increment inside an immediate transaction.
    fn increment(
        &self,
        device_id: &DeviceId,
        at: Timestamp,
    ) -> Result<RetryRecord, SqliteStoreError> {
        let mut guard = self.lock()?;
        let tx = guard.transaction_with_behavior(TransactionBehavior::Immediate).map_err(db_error)?;
        let existing = select_row(&tx, SELECT_RETRY_SQL, device_id)?
            .map(|row| decode_retry(device_id, &row))
            .transpose()?;
        let next = RetryRecord::incremented(existing.as_ref(), device_id, at);
        if existing.as_ref() != Some(&next) {
            let encoded = encode(&next)?;
            write_retry(&tx, &next, &encoded)?;
        }
        tx.commit().map_err(db_error)?;
        drop(guard);
        Ok(next)
    }

    /// Settles a matching quarantine marker inside an immediate transaction.
    fn settle(
        &self,
        device_id: &DeviceId,
        quarantined_at: Timestamp,
    ) -> Result<SettleWrite, SqliteStoreError> {
        let mut guard = self.lock()?;
        let tx = guard.transaction_with_behavior(TransactionBehavior::Immediate).map_err(db_error)?;
        let existing = select_row(&tx, SELECT_RETRY_SQL, device_id)?
            .map(|row| decode_retry(device_id, &row))
            .transpose()?;
        let Some(settled) =
            existing.as_ref().and_then(|record| record.settle_if_committed_at(quarantined_at))
        else {
            return Ok(SettleWrite::Superseded(existing));
        };
        if existing.as_ref() != Some(&settled) {
            let encoded = encode(&settled)?;
            write_retry(&tx, &settled, &encoded)?;
        }
        tx.commit().map_err(db_error)?;
        drop(guard);
        Ok(SettleWrite::Settled(settled))
    }

    /// Lists retry records ordered by device id.
    fn list_retries(
        &self,
        status: Option<DeviceStatus>,
    ) -> Result<Vec<RetryRecord>, SqliteStoreError> {
        let guard = self.lock()?;
        let (sql, filter) = match status {
            Some(status) => (
                "SELECT device_id, record_json, record_hash, hash_algorithm FROM retry_records \
                 WHERE status = ?1 ORDER BY device_id",
                Some(status.as_str()),
            ),
            None => (
                "SELECT device_id, record_json, record_hash, hash_algorithm FROM retry_records \
                 ORDER BY device_id",
                None,
            ),
        };
        let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<(String, StoredRow)> {
            Ok((
                row.get(0)?,
                StoredRow {
                    bytes: row.get(1)?,
                    hash: row.get(2)?,
                    algorithm: row.get(3)?,
                },
            ))
        };
        let mut statement = guard.prepare(sql).map_err(db_error)?;
        let mapped = match filter {
            Some(status) => statement.query_map(params![status], map_row),
            None => statement.query_map(params![], map_row),
        }
        .map_err(db_error)?;
        let mut rows = Vec::new();
        for row in mapped {
            rows.push(row.map_err(db_error)?);
        }
        drop(statement);
        drop(guard);
        rows.iter()
            .map(|(device_id, row)| decode_retry(&DeviceId::new(device_id.as_str()), row))
            .collect()
    }

    // ------------------------------------------------------------------------
    // Attribute snapshots
    // ------------------------------------------------------------------------

    /// Loads an attribute snapshot.
    fn load_snapshot(
        &self,
        device_id: &DeviceId,
    ) -> Result<Option<AttributeSnapshot>, SqliteStoreError> {
        let guard = self.lock()?;
        let row = select_row(&guard, SELECT_SNAPSHOT_SQL, device_id)?;
        drop(guard);
        row.map(|row| decode_snapshot(device_id, &row)).transpose()
    }

    /// Writes a snapshot, optionally only when strictly newer.
    fn save_snapshot(
        &self,
        snapshot: &AttributeSnapshot,
        only_if_newer: bool,
    ) -> Result<SnapshotWrite, SqliteStoreError> {
        let encoded = encode(snapshot)?;
        let mut guard = self.lock()?;
        let tx = guard.transaction_with_behavior(TransactionBehavior::Immediate).map_err(db_error)?;
        if only_if_newer {
            let existing = select_row(&tx, SELECT_SNAPSHOT_SQL, &snapshot.device_id)?
                .map(|row| decode_snapshot(&snapshot.device_id, &row))
                .transpose()?;
            if let Some(existing) = existing
                && !snapshot.supersedes(&existing)
            {
                return Ok(SnapshotWrite::Superseded);
            }
        }
        tx.execute(
            UPSERT_SNAPSHOT_SQL,
            params![
                snapshot.device_id.as_str(),
                encoded.bytes,
                encoded.hash,
                encoded.algorithm,
                unix_millis()
            ],
        )
        .map_err(db_error)?;
        tx.commit().map_err(db_error)?;
        drop(guard);
        Ok(SnapshotWrite::Stored)
    }

    // ------------------------------------------------------------------------
    // Groups and live attributes
    // ------------------------------------------------------------------------

    /// Inserts a group membership row.
    fn insert_membership(
        &self,
        device_id: &DeviceId,
        group: &GroupName,
    ) -> Result<(), SqliteStoreError> {
        let guard = self.lock()?;
        guard
            .execute(
                "INSERT OR IGNORE INTO device_groups (group_name, device_id, added_at) VALUES \
                 (?1, ?2, ?3)",
                params![group.as_str(), device_id.as_str(), unix_millis()],
            )
            .map_err(db_error)?;
        drop(guard);
        Ok(())
    }

    /// Deletes a group membership row.
    fn delete_membership(
        &self,
        device_id: &DeviceId,
        group: &GroupName,
    ) -> Result<(), SqliteStoreError> {
        let guard = self.lock()?;
        guard
            .execute(
                "DELETE FROM device_groups WHERE group_name = ?1 AND device_id = ?2",
                params![group.as_str(), device_id.as_str()],
            )
            .map_err(db_error)?;
        drop(guard);
        Ok(())
    }

    /// Loads live attributes.
    fn load_attributes(
        &self,
        device_id: &DeviceId,
    ) -> Result<Option<AttributeBag>, SqliteStoreError> {
        let guard = self.lock()?;
        let row = select_row(&guard, SELECT_ATTRIBUTES_SQL, device_id)?;
        drop(guard);
        row.map(|row| decode::<AttributeBag>(device_id, &row)).transpose()
    }

    /// Replaces live attributes.
    fn save_attributes(
        &self,
        device_id: &DeviceId,
        attributes: &AttributeBag,
    ) -> Result<(), SqliteStoreError> {
        let encoded = encode(attributes)?;
        let guard = self.lock()?;
        guard
            .execute(
                UPSERT_ATTRIBUTES_SQL,
                params![
                    device_id.as_str(),
                    encoded.bytes,
                    encoded.hash,
                    encoded.algorithm,
                    unix_millis()
                ],
            )
            .map_err(db_error)?;
        drop(guard);
        Ok(())
    }

    /// Merges keys into live attributes inside an immediate transaction.
    fn merge_live_attributes(
        &self,
        device_id: &DeviceId,
        attributes: &AttributeBag,
    ) -> Result<(), SqliteStoreError> {
        let mut guard = self.lock()?;
        let tx = guard.transaction_with_behavior(TransactionBehavior::Immediate).map_err(db_error)?;
        let mut merged = select_row(&tx, SELECT_ATTRIBUTES_SQL, device_id)?
            .map(|row| decode::<AttributeBag>(device_id, &row))
            .transpose()?
            .unwrap_or_default();
        merged.extend(attributes.iter().map(|(key, value)| (key.clone(), value.clone())));
        let encoded = encode(&merged)?;
        tx.execute(
            UPSERT_ATTRIBUTES_SQL,
            params![
                device_id.as_str(),
                encoded.bytes,
                encoded.hash,
                encoded.algorithm,
                unix_millis()
            ],
        )
        .map_err(db_error)?;
        tx.commit().map_err(db_error)?;
        drop(guard);
        Ok(())
    }
}

// ============================================================================//
// SECTION: Trait Implementations
// ============================================================================//

impl RetryStore for SqliteDeviceStore {
    fn get(&self, device_id: &DeviceId) -> Result<Option<RetryRecord>, StoreError> {
        self.load_retry(device_id).map_err(StoreError::from)
    }

    fn put(&self, record: &RetryRecord) -> Result<(), StoreError> {
        self.save_retry(record).map_err(StoreError::from)
    }

    fn increment_retry_count(
        &self,
        device_id: &DeviceId,
        at: Timestamp,
    ) -> Result<RetryRecord, StoreError> {
        self.increment(device_id, at).map_err(StoreError::from)
    }

    fn settle_quarantine(
        &self,
        device_id: &DeviceId,
        quarantined_at: Timestamp,
    ) -> Result<SettleWrite, StoreError> {
        self.settle(device_id, quarantined_at).map_err(StoreError::from)
    }

    fn list(&self, status: Option<DeviceStatus>) -> Result<Vec<RetryRecord>, StoreError> {
        self.list_retries(status).map_err(StoreError::from)
    }
}

impl AttributeStore for SqliteDeviceStore {
    fn get(&self, device_id: &DeviceId) -> Result<Option<AttributeSnapshot>, StoreError> {
        self.load_snapshot(device_id).map_err(StoreError::from)
    }

    fn put(&self, snapshot: &AttributeSnapshot) -> Result<(), StoreError> {
        self.save_snapshot(snapshot, false).map(|_| ()).map_err(StoreError::from)
    }

    fn put_if_newer(&self, snapshot: &AttributeSnapshot) -> Result<SnapshotWrite, StoreError> {
        self.save_snapshot(snapshot, true).map_err(StoreError::from)
    }
}

impl DeviceGroupManager for SqliteDeviceStore {
    fn add_to_group(&self, device_id: &DeviceId, group: &GroupName) -> Result<(), GroupError> {
        self.insert_membership(device_id, group).map_err(GroupError::from)
    }

    fn remove_from_group(
        &self,
        device_id: &DeviceId,
        group: &GroupName,
    ) -> Result<(), GroupError> {
        self.delete_membership(device_id, group).map_err(GroupError::from)
    }
}

impl DeviceRegistry for SqliteDeviceStore {
    fn current_attributes(
        &self,
        device_id: &DeviceId,
    ) -> Result<Option<AttributeBag>, RegistryError> {
        self.load_attributes(device_id).map_err(RegistryError::from)
    }

    fn replace_attributes(
        &self,
        device_id: &DeviceId,
        attributes: &AttributeBag,
    ) -> Result<(), RegistryError> {
        self.save_attributes(device_id, attributes).map_err(RegistryError::from)
    }

    fn merge_attributes(
        &self,
        device_id: &DeviceId,
        attributes: &AttributeBag,
    ) -> Result<(), RegistryError> {
        self.merge_live_attributes(device_id, attributes).map_err(RegistryError::from)
    }
}

// ============================================================================//
// SECTION: Encoding
// ============================================================================//

/// Canonical payload ready to be written.
struct EncodedRecord {
    /// Canonical JSON bytes.
    bytes: Vec<u8>,
    /// Hex digest of `bytes`.
    hash: String,
    /// Hash algorithm label.
    algorithm: &'static str,
}

/// Payload columns read back from a table.
struct StoredRow {
    /// Stored JSON bytes.
    bytes: Vec<u8>,
    /// Stored digest.
    hash: String,
    /// Stored hash algorithm label.
    algorithm: String,
}

/// Serializes a value canonically and hashes it.
fn encode<T: Serialize>(value: &T) -> Result<EncodedRecord, SqliteStoreError> {
    let bytes =
        canonical_json_bytes(value).map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
    if bytes.len() > MAX_RECORD_BYTES {
        return Err(SqliteStoreError::TooLarge {
            max_bytes: MAX_RECORD_BYTES,
            actual_bytes: bytes.len(),
        });
    }
    let digest = hash_bytes(DEFAULT_HASH_ALGORITHM, &bytes);
    Ok(EncodedRecord {
        bytes,
        hash: digest.value,
        algorithm: hash_algorithm_label(digest.algorithm),
    })
}

/// Verifies and deserializes a stored payload.
fn decode<T: DeserializeOwned>(
    device_id: &DeviceId,
    row: &StoredRow,
) -> Result<T, SqliteStoreError> {
    if row.bytes.len() > MAX_RECORD_BYTES {
        return Err(SqliteStoreError::TooLarge {
            max_bytes: MAX_RECORD_BYTES,
            actual_bytes: row.bytes.len(),
        });
    }
    let algorithm = parse_hash_algorithm(&row.algorithm)?;
    let expected = hash_bytes(algorithm, &row.bytes);
    if expected.value != row.hash {
        return Err(SqliteStoreError::Corrupt(format!("hash mismatch for device {device_id}")));
    }
    serde_json::from_slice(&row.bytes).map_err(|err| SqliteStoreError::Invalid(err.to_string()))
}

/// Decodes a retry record and checks it belongs to `device_id`.
fn decode_retry(device_id: &DeviceId, row: &StoredRow) -> Result<RetryRecord, SqliteStoreError> {
    let record: RetryRecord = decode(device_id, row)?;
    if record.device_id != *device_id {
        return Err(SqliteStoreError::Invalid(
            "device_id mismatch between key and retry record".to_string(),
        ));
    }
    Ok(record)
}

/// Decodes a snapshot and checks it belongs to `device_id`.
fn decode_snapshot(
    device_id: &DeviceId,
    row: &StoredRow,
) -> Result<AttributeSnapshot, SqliteStoreError> {
    let snapshot: AttributeSnapshot = decode(device_id, row)?;
    if snapshot.device_id != *device_id {
        return Err(SqliteStoreError::Invalid(
            "device_id mismatch between key and snapshot".to_string(),
        ));
    }
    Ok(snapshot)
}

// ============================================================================//
// SECTION: Helpers
// ============================================================================//

/// Reads the payload columns of one keyed row.
fn select_row(
    connection: &Connection,
    sql: &str,
    device_id: &DeviceId,
) -> Result<Option<StoredRow>, SqliteStoreError> {
    connection
        .query_row(sql, params![device_id.as_str()], |row| {
            Ok(StoredRow {
                bytes: row.get(0)?,
                hash: row.get(1)?,
                algorithm: row.get(2)?,
            })
        })
        .optional()
        .map_err(db_error)
}

/// Upserts a retry record row.
fn write_retry(
    connection: &Connection,
    record: &RetryRecord,
    encoded: &EncodedRecord,
) -> Result<(), SqliteStoreError> {
    connection
        .execute(
            UPSERT_RETRY_SQL,
            params![
                record.device_id.as_str(),
                record.status.as_str(),
                encoded.bytes,
                encoded.hash,
                encoded.algorithm,
                unix_millis()
            ],
        )
        .map_err(db_error)?;
    Ok(())
}

/// Classifies a `rusqlite` error; lock contention is reported as busy.
fn db_error(err: rusqlite::Error) -> SqliteStoreError {
    match err.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => {
            SqliteStoreError::Busy(err.to_string())
        }
        Some(ErrorCode::CannotOpen | ErrorCode::SystemIoFailure | ErrorCode::DiskFull) => {
            SqliteStoreError::Io(err.to_string())
        }
        _ => SqliteStoreError::Db(err.to_string()),
    }
}

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
    let path_string = path.display().to_string();
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SqliteStoreError::Invalid(
                "store path contains an overlong component".to_string(),
            ));
        }
    }
    if path.exists() && path.is_dir() {
        return Err(SqliteStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Opens an `SQLite` connection with secure defaults.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags).map_err(db_error)?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Applies `SQLite` pragmas required for durability.
fn apply_pragmas(
    connection: &Connection,
    config: &SqliteStoreConfig,
) -> Result<(), SqliteStoreError> {
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(db_error)?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(db_error)?;
    connection
        .busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))
        .map_err(db_error)?;
    Ok(())
}

/// Initializes the `SQLite` schema or validates existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction().map_err(db_error)?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(db_error)?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(db_error)?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(db_error)?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS retry_records (
                    device_id TEXT PRIMARY KEY,
                    status TEXT NOT NULL,
                    record_json BLOB NOT NULL,
                    record_hash TEXT NOT NULL,
                    hash_algorithm TEXT NOT NULL,
                    saved_at INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_retry_records_status
                    ON retry_records (status);
                CREATE TABLE IF NOT EXISTS attribute_snapshots (
                    device_id TEXT PRIMARY KEY,
                    snapshot_json BLOB NOT NULL,
                    snapshot_hash TEXT NOT NULL,
                    hash_algorithm TEXT NOT NULL,
                    saved_at INTEGER NOT NULL
                );
                CREATE TABLE IF NOT EXISTS device_groups (
                    group_name TEXT NOT NULL,
                    device_id TEXT NOT NULL,
                    added_at INTEGER NOT NULL,
                    PRIMARY KEY (group_name, device_id)
                );
                CREATE TABLE IF NOT EXISTS device_attributes (
                    device_id TEXT PRIMARY KEY,
                    attributes_json BLOB NOT NULL,
                    attributes_hash TEXT NOT NULL,
                    hash_algorithm TEXT NOT NULL,
                    saved_at INTEGER NOT NULL
                );",
            )
            .map_err(db_error)?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "unsupported schema version: {value}"
            )));
        }
    }
    tx.commit().map_err(db_error)?;
    Ok(())
}

/// Returns the current unix epoch in milliseconds.
fn unix_millis() -> i64 {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}

/// Returns the canonical hash algorithm label.
const fn hash_algorithm_label(algorithm: HashAlgorithm) -> &'static str {
    match algorithm {
        HashAlgorithm::Sha256 => "sha256",
    }
}

/// Parses a hash algorithm label.
fn parse_hash_algorithm(label: &str) -> Result<HashAlgorithm, SqliteStoreError> {
    match label {
        "sha256" => Ok(HashAlgorithm::Sha256),
        other => Err(SqliteStoreError::Invalid(format!("unsupported hash algorithm: {other}"))),
    }
}

// crates/fw-recovery-core/src/interfaces/mod.rs
// ============================================================================
// Module: Firmware Recovery Interfaces
// Description: Backend-agnostic collaborator contracts for the workflow.
// Purpose: Define the store, group, registry, and notification surfaces.
// Dependencies: crate::core, thiserror
// ============================================================================

//! ## Overview
//! The workflow reaches every external system through these traits. Calls are
//! synchronous; the runtime moves each call onto a blocking thread and bounds
//! it with a timeout. Implementations must be safe to call concurrently for
//! different devices and must classify failures through [`TransientError`] so
//! the runtime knows which ones to back off and retry.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::error::Error;

use thiserror::Error;

use crate::core::device::AttributeBag;
use crate::core::device::AttributeSnapshot;
use crate::core::device::DeviceStatus;
use crate::core::device::RetryRecord;
use crate::core::identifiers::DeviceId;
use crate::core::identifiers::GroupName;
use crate::core::notification::PublishReceipt;
use crate::core::notification::QuarantineNotice;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Error Classification
// ============================================================================

/// Error that can tell the runtime whether retrying may help.
pub trait TransientError: Error + Send + Sync + 'static {
    /// Returns true when the failure is expected to clear on retry.
    fn is_transient(&self) -> bool;
}

// ============================================================================
// SECTION: Device Stores
// ============================================================================

/// Errors raised by the retry and attribute stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Store cannot be reached.
    #[error("device store unavailable: {0}")]
    Unavailable(String),
    /// Store call did not finish in time.
    #[error("device store timeout: {0}")]
    Timeout(String),
    /// Store is shedding load or the backing file is locked.
    #[error("device store throttled: {0}")]
    Throttled(String),
    /// Store data is corrupted or fails integrity checks.
    #[error("device store corruption: {0}")]
    Corrupt(String),
    /// Store data version is incompatible.
    #[error("device store version mismatch: {0}")]
    VersionMismatch(String),
    /// Store data or request is invalid.
    #[error("device store invalid data: {0}")]
    Invalid(String),
    /// Store reported an error.
    #[error("device store error: {0}")]
    Store(String),
}

impl TransientError for StoreError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout(_) | Self::Throttled(_))
    }
}

/// Retry-count records keyed by device id.
pub trait RetryStore: Send + Sync {
    /// Loads the retry record for a device.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn get(&self, device_id: &DeviceId) -> Result<Option<RetryRecord>, StoreError>;

    /// Replaces the retry record for `record.device_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when saving fails.
    fn put(&self, record: &RetryRecord) -> Result<(), StoreError>;

    /// Atomically increments the retry count and returns the stored record.
    ///
    /// Follows [`RetryRecord::incremented`]: absent and ACTIVE records become
    /// `{1, RETRYING}`, RETRYING records count up, QUARANTINED records are
    /// returned unchanged. `at` fences the write: a RETRYING record already
    /// stamped with `at` is returned without counting again, so a call that
    /// is re-issued after a timeout cannot count one failure twice.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the update fails.
    fn increment_retry_count(
        &self,
        device_id: &DeviceId,
        at: Timestamp,
    ) -> Result<RetryRecord, StoreError>;

    /// Atomically settles the quarantine committed at `quarantined_at`.
    ///
    /// Follows [`RetryRecord::settle_if_committed_at`]. When the stored record
    /// no longer carries that marker (released, or quarantined again since),
    /// nothing is written and the stored record is returned as superseded.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the update fails.
    fn settle_quarantine(
        &self,
        device_id: &DeviceId,
        quarantined_at: Timestamp,
    ) -> Result<SettleWrite, StoreError>;

    /// Lists records ordered by device id, optionally filtered by status.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the scan fails.
    fn list(&self, status: Option<DeviceStatus>) -> Result<Vec<RetryRecord>, StoreError>;
}

/// Result of a conditional quarantine settle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettleWrite {
    /// The marker was settled; carries the stored record.
    Settled(RetryRecord),
    /// The stored record no longer matches; carries it unchanged.
    Superseded(Option<RetryRecord>),
}

/// Result of a conditional snapshot write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotWrite {
    /// The snapshot was stored.
    Stored,
    /// An equal or newer snapshot already exists; nothing was written.
    Superseded,
}

/// Attribute-backup records keyed by device id.
pub trait AttributeStore: Send + Sync {
    /// Loads the snapshot for a device.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn get(&self, device_id: &DeviceId) -> Result<Option<AttributeSnapshot>, StoreError>;

    /// Replaces the snapshot unconditionally.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when saving fails.
    fn put(&self, snapshot: &AttributeSnapshot) -> Result<(), StoreError>;

    /// Stores the snapshot only when no snapshot exists or the stored one is
    /// strictly older.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn put_if_newer(&self, snapshot: &AttributeSnapshot) -> Result<SnapshotWrite, StoreError>;
}

// ============================================================================
// SECTION: Device Groups
// ============================================================================

/// Group membership errors.
#[derive(Debug, Error)]
pub enum GroupError {
    /// Group service cannot be reached.
    #[error("device group service unavailable: {0}")]
    Unavailable(String),
    /// Group service is throttling requests.
    #[error("device group service throttled: {0}")]
    Throttled(String),
    /// Group does not exist.
    #[error("device group not found: {0}")]
    NotFound(String),
    /// Group service rejected the request.
    #[error("device group request rejected: {0}")]
    Rejected(String),
}

impl TransientError for GroupError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Throttled(_))
    }
}

/// Named-group membership manager.
pub trait DeviceGroupManager: Send + Sync {
    /// Adds a device to a group. Adding an existing member succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`GroupError`] when the change fails.
    fn add_to_group(&self, device_id: &DeviceId, group: &GroupName) -> Result<(), GroupError>;

    /// Removes a device from a group. Removing a non-member succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`GroupError`] when the change fails.
    fn remove_from_group(&self, device_id: &DeviceId, group: &GroupName)
    -> Result<(), GroupError>;
}

// ============================================================================
// SECTION: Notifier
// ============================================================================

/// Notification delivery errors.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// Channel cannot be reached.
    #[error("notification channel unavailable: {0}")]
    Unavailable(String),
    /// Notice could not be encoded.
    #[error("notification encoding failed: {0}")]
    Encoding(String),
    /// Channel rejected the notice.
    #[error("notification rejected: {0}")]
    Rejected(String),
}

impl TransientError for NotifyError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// At-least-once notification channel with content deduplication.
pub trait Notifier: Send + Sync {
    /// Publishes a quarantine notice.
    ///
    /// Publishing the same notice twice inside the dedup window yields one
    /// delivery; the second receipt reports `duplicate = true`.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError`] when delivery fails.
    fn publish(&self, notice: &QuarantineNotice) -> Result<PublishReceipt, NotifyError>;
}

// ============================================================================
// SECTION: Device Registry
// ============================================================================

/// Live device registry errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Registry cannot be reached.
    #[error("device registry unavailable: {0}")]
    Unavailable(String),
    /// Device is not registered.
    #[error("device not registered: {0}")]
    NotFound(String),
    /// Registry rejected the request.
    #[error("device registry request rejected: {0}")]
    Rejected(String),
}

impl TransientError for RegistryError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Live attribute record of each device.
pub trait DeviceRegistry: Send + Sync {
    /// Reads the live attributes of a device.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] when the read fails.
    fn current_attributes(&self, device_id: &DeviceId)
    -> Result<Option<AttributeBag>, RegistryError>;

    /// Replaces the live attributes of a device (no merge).
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] when the write fails.
    fn replace_attributes(
        &self,
        device_id: &DeviceId,
        attributes: &AttributeBag,
    ) -> Result<(), RegistryError>;

    /// Merges `attributes` into the live attributes of a device.
    ///
    /// Keys present in `attributes` overwrite existing values; other keys are
    /// kept. A device with no live record gets `attributes` as its record.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] when the write fails.
    fn merge_attributes(
        &self,
        device_id: &DeviceId,
        attributes: &AttributeBag,
    ) -> Result<(), RegistryError>;
}

// crates/fw-recovery-core/src/core/notification.rs
// ============================================================================
// Module: Firmware Recovery Quarantine Notification
// Description: Quarantine notice payload and publish receipts.
// Purpose: Provide a content-addressed notice for deduplicated delivery.
// Dependencies: crate::core::hashing, serde
// ============================================================================

//! ## Overview
//! A [`QuarantineNotice`] is derived entirely from the committed quarantine
//! marker, so every re-publish of the same quarantine is byte-identical and
//! hashes to the same dedup id.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::device::RetryRecord;
use crate::core::hashing::DEFAULT_HASH_ALGORITHM;
use crate::core::hashing::HashDigest;
use crate::core::hashing::HashError;
use crate::core::hashing::hash_canonical_json;
use crate::core::identifiers::DeviceId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Defaults
// ============================================================================

/// Default notification subject line.
pub const DEFAULT_NOTIFICATION_SUBJECT: &str = "Firmware Update Failure Alert";
/// Default message group for ordered delivery channels.
pub const DEFAULT_MESSAGE_GROUP: &str = "FirmwareUpdateFailure";

// ============================================================================
// SECTION: Notice
// ============================================================================

/// Reason carried by a quarantine notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuarantineReason {
    /// The device exhausted its retry budget.
    #[serde(rename = "retry-budget-exceeded")]
    RetryBudgetExceeded,
}

/// Notification published when a device is quarantined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuarantineNotice {
    /// Quarantined device.
    pub device_id: DeviceId,
    /// Quarantine reason.
    pub reason: QuarantineReason,
    /// Retry count observed when the budget was exceeded.
    pub retry_count_at_quarantine: u32,
    /// Lifetime quarantine count including this one.
    pub quarantine_count: u32,
    /// Quarantine timestamp.
    pub timestamp: Timestamp,
}

impl QuarantineNotice {
    /// Builds the notice for a committed quarantine record.
    ///
    /// Returns `None` when the record carries no quarantine marker.
    #[must_use]
    pub fn from_record(record: &RetryRecord) -> Option<Self> {
        let marker = record.quarantine?;
        Some(Self {
            device_id: record.device_id.clone(),
            reason: QuarantineReason::RetryBudgetExceeded,
            retry_count_at_quarantine: marker.retry_count_at_quarantine,
            quarantine_count: record.quarantine_count,
            timestamp: marker.quarantined_at,
        })
    }

    /// Content hash used as the delivery dedup id.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] when canonicalization fails.
    pub fn dedup_id(&self) -> Result<HashDigest, HashError> {
        hash_canonical_json(DEFAULT_HASH_ALGORITHM, self)
    }

    /// Human-readable message body.
    #[must_use]
    pub fn body_text(&self) -> String {
        format!(
            "Device {} exceeded its retry budget. Manual intervention required.",
            self.device_id
        )
    }
}

// ============================================================================
// SECTION: Receipts
// ============================================================================

/// Delivery receipt returned by a notifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishReceipt {
    /// Channel-assigned message identifier.
    pub message_id: String,
    /// Content dedup id (hex digest).
    pub dedup_id: String,
    /// True when the notifier suppressed this publish as a duplicate.
    pub duplicate: bool,
}

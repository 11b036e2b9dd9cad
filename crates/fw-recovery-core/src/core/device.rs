// crates/fw-recovery-core/src/core/device.rs
// ============================================================================
// Module: Firmware Recovery Device Records
// Description: Retry records, attribute snapshots, and the combined device view.
// Purpose: Define persisted per-device state and its episode transitions.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Device state spans two independent key-value collections: the retry record
//! (counter plus status) and the attribute snapshot (last known-good
//! configuration). The transition helpers on [`RetryRecord`] are the single
//! source of the counter rules so every backend applies them identically.
//!
//! Security posture: attribute bags are opaque device-reported data and are
//! never interpreted by the workflow.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::identifiers::DeviceId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Device Status
// ============================================================================

/// Lifecycle status stored in a retry record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    /// No open failure episode.
    Active,
    /// A failure episode is open and updates are being retried.
    Retrying,
    /// Retry budget exhausted; the device awaits manual intervention.
    Quarantined,
}

impl DeviceStatus {
    /// Returns the stable string label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Retrying => "retrying",
            Self::Quarantined => "quarantined",
        }
    }

    /// Parses a status label (case-insensitive).
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "active" => Some(Self::Active),
            "retrying" => Some(Self::Retrying),
            "quarantined" => Some(Self::Quarantined),
            _ => None,
        }
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Retry Records
// ============================================================================

/// Quarantine bookkeeping written together with the QUARANTINED status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuarantineMarker {
    /// Retry count observed when the budget was exceeded.
    pub retry_count_at_quarantine: u32,
    /// Timestamp of the event that triggered quarantine.
    pub quarantined_at: Timestamp,
    /// True once group changes and the notification have both completed.
    pub settled: bool,
}

/// Retry counter and status for one device.
///
/// # Invariants
/// - `retry_count` is 0 whenever `status` is [`DeviceStatus::Quarantined`].
/// - `quarantine` is present exactly when `status` is quarantined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryRecord {
    /// Device identifier.
    pub device_id: DeviceId,
    /// Failed attempts in the current episode.
    pub retry_count: u32,
    /// Lifecycle status.
    pub status: DeviceStatus,
    /// Number of times this device has been quarantined.
    #[serde(default)]
    pub quarantine_count: u32,
    /// Quarantine marker when quarantined.
    #[serde(default)]
    pub quarantine: Option<QuarantineMarker>,
    /// Timestamp of the event that produced this record.
    pub updated_at: Timestamp,
}

impl RetryRecord {
    /// Builds the record equivalent to an absent entry.
    #[must_use]
    pub const fn active(device_id: DeviceId, at: Timestamp) -> Self {
        Self {
            device_id,
            retry_count: 0,
            status: DeviceStatus::Active,
            quarantine_count: 0,
            quarantine: None,
            updated_at: at,
        }
    }

    /// Applies one atomic retry increment to `existing`.
    ///
    /// Absent or ACTIVE records open a new episode at count 1, RETRYING
    /// records count up, and QUARANTINED records are returned unchanged.
    /// A RETRYING record already stamped with `at` is also returned
    /// unchanged, so a redelivered or re-issued increment for the same
    /// failure event counts once.
    #[must_use]
    pub fn incremented(existing: Option<&Self>, device_id: &DeviceId, at: Timestamp) -> Self {
        match existing {
            None => Self {
                retry_count: 1,
                status: DeviceStatus::Retrying,
                ..Self::active(device_id.clone(), at)
            },
            Some(record) => match record.status {
                DeviceStatus::Quarantined => record.clone(),
                DeviceStatus::Active => Self {
                    retry_count: 1,
                    status: DeviceStatus::Retrying,
                    quarantine: None,
                    updated_at: at,
                    ..record.clone()
                },
                DeviceStatus::Retrying if record.updated_at == at => record.clone(),
                DeviceStatus::Retrying => Self {
                    retry_count: record.retry_count.saturating_add(1),
                    updated_at: at,
                    ..record.clone()
                },
            },
        }
    }

    /// Returns the committed quarantine record derived from this one.
    #[must_use]
    pub fn quarantined(&self, at: Timestamp) -> Self {
        Self {
            device_id: self.device_id.clone(),
            retry_count: 0,
            status: DeviceStatus::Quarantined,
            quarantine_count: self.quarantine_count.saturating_add(1),
            quarantine: Some(QuarantineMarker {
                retry_count_at_quarantine: self.retry_count,
                quarantined_at: at,
                settled: false,
            }),
            updated_at: at,
        }
    }

    /// Returns a copy with the quarantine marker settled.
    #[must_use]
    pub fn settled(&self) -> Self {
        let mut record = self.clone();
        if let Some(marker) = record.quarantine.as_mut() {
            marker.settled = true;
        }
        record
    }

    /// Returns the settled record when this one is the quarantine committed
    /// at `quarantined_at`.
    ///
    /// Returns `None` when the record was released or re-quarantined since,
    /// leaving the caller nothing to settle.
    #[must_use]
    pub fn settle_if_committed_at(&self, quarantined_at: Timestamp) -> Option<Self> {
        if self.status != DeviceStatus::Quarantined {
            return None;
        }
        match self.quarantine {
            Some(marker) if marker.quarantined_at == quarantined_at => Some(self.settled()),
            _ => None,
        }
    }

    /// Returns the record that closes an episode (`{0, ACTIVE}`).
    #[must_use]
    pub fn reset(&self, at: Timestamp) -> Self {
        Self {
            retry_count: 0,
            status: DeviceStatus::Active,
            quarantine: None,
            updated_at: at,
            ..self.clone()
        }
    }

    /// Returns true when quarantine group changes or notification are pending.
    #[must_use]
    pub fn has_pending_quarantine(&self) -> bool {
        self.status == DeviceStatus::Quarantined
            && self.quarantine.is_some_and(|marker| !marker.settled)
    }
}

// ============================================================================
// SECTION: Attribute Snapshots
// ============================================================================

/// Opaque device attribute bag.
pub type AttributeBag = BTreeMap<String, Value>;

/// Last known-good attribute capture for a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeSnapshot {
    /// Device identifier.
    pub device_id: DeviceId,
    /// Captured attributes.
    pub attributes: AttributeBag,
    /// Capture timestamp; only strictly newer captures replace this one.
    pub captured_at: Timestamp,
}

impl AttributeSnapshot {
    /// Returns true when `self` may replace `existing`.
    #[must_use]
    pub fn supersedes(&self, existing: &Self) -> bool {
        self.captured_at.is_after(&existing.captured_at)
    }
}

// ============================================================================
// SECTION: Combined View
// ============================================================================

/// Conceptual union of both stores for one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Device identifier.
    pub device_id: DeviceId,
    /// Retry record, absent for devices with no recorded failure.
    pub retry: Option<RetryRecord>,
    /// Attribute snapshot, if one was captured.
    pub snapshot: Option<AttributeSnapshot>,
}

impl DeviceRecord {
    /// Effective retry count (absent record reads as 0).
    #[must_use]
    pub fn retry_count(&self) -> u32 {
        self.retry.as_ref().map_or(0, |record| record.retry_count)
    }

    /// Effective status (absent record reads as ACTIVE).
    #[must_use]
    pub fn status(&self) -> DeviceStatus {
        self.retry.as_ref().map_or(DeviceStatus::Active, |record| record.status)
    }
}

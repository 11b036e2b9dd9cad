// crates/fw-recovery-core/src/core/event.rs
// ============================================================================
// Module: Firmware Recovery Trigger Events
// Description: Payloads that start a workflow execution.
// Purpose: Define the failure and recovery signals emitted by the event source.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! One [`FailureEvent`] arrives per observed failed update. The event
//! timestamp is the only clock the workflow uses for persisted state.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::device::AttributeBag;
use crate::core::identifiers::DeviceId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Events
// ============================================================================

/// "Device update failed" signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureEvent {
    /// Device whose update failed.
    pub device_id: DeviceId,
    /// Attributes observed at failure time, when the source reports them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<AttributeBag>,
    /// Time the failure was observed.
    pub event_timestamp: Timestamp,
}

impl FailureEvent {
    /// Creates a failure event without observed attributes.
    #[must_use]
    pub const fn new(device_id: DeviceId, event_timestamp: Timestamp) -> Self {
        Self {
            device_id,
            attributes: None,
            event_timestamp,
        }
    }

    /// Attaches observed attributes.
    #[must_use]
    pub fn with_attributes(mut self, attributes: AttributeBag) -> Self {
        self.attributes = Some(attributes);
        self
    }
}

/// "Device update succeeded" signal that closes a retry episode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryEvent {
    /// Device that recovered.
    pub device_id: DeviceId,
    /// Time the recovery was observed.
    pub event_timestamp: Timestamp,
}

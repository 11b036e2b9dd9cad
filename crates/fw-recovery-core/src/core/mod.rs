// crates/fw-recovery-core/src/core/mod.rs
// ============================================================================
// Module: Firmware Recovery Core Types
// Description: Canonical device, event, and notification structures.
// Purpose: Provide stable, serializable types shared by every backend.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Core types define the persisted device records, the trigger payloads, and
//! the quarantine notification. These types are the canonical source of truth
//! for the stores, the broker, and the CLI.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod device;
pub mod event;
pub mod hashing;
pub mod identifiers;
pub mod notification;
pub mod time;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use device::AttributeBag;
pub use device::AttributeSnapshot;
pub use device::DeviceRecord;
pub use device::DeviceStatus;
pub use device::QuarantineMarker;
pub use device::RetryRecord;
pub use event::FailureEvent;
pub use event::RecoveryEvent;
pub use hashing::DEFAULT_HASH_ALGORITHM;
pub use hashing::HashAlgorithm;
pub use hashing::HashDigest;
pub use hashing::HashError;
pub use identifiers::DeviceId;
pub use identifiers::GroupName;
pub use identifiers::MAX_DEVICE_ID_LENGTH;
pub use identifiers::MAX_GROUP_NAME_LENGTH;
pub use notification::DEFAULT_MESSAGE_GROUP;
pub use notification::DEFAULT_NOTIFICATION_SUBJECT;
pub use notification::PublishReceipt;
pub use notification::QuarantineNotice;
pub use notification::QuarantineReason;
pub use time::Timestamp;

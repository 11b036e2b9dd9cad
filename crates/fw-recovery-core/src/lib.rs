// crates/fw-recovery-core/src/lib.rs
// ============================================================================
// Module: Firmware Recovery Core Library
// Description: Public API surface for the firmware recovery core.
// Purpose: Expose device types, collaborator interfaces, and the workflow engine.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! The firmware recovery core drives one device at a time through the
//! retry / rollback / quarantine lifecycle after a failed firmware update.
//! Stores, group membership, the live device registry, and notification
//! delivery are reached only through the traits in [`interfaces`], so hosts
//! choose their own backends.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use crate::core::*;

pub use interfaces::AttributeStore;
pub use interfaces::DeviceGroupManager;
pub use interfaces::DeviceRegistry;
pub use interfaces::GroupError;
pub use interfaces::Notifier;
pub use interfaces::NotifyError;
pub use interfaces::RegistryError;
pub use interfaces::RetryStore;
pub use interfaces::SettleWrite;
pub use interfaces::SnapshotWrite;
pub use interfaces::StoreError;
pub use interfaces::TransientError;
pub use runtime::AuditSink;
pub use runtime::BackoffPolicy;
pub use runtime::FileAuditSink;
pub use runtime::FirmwareUpdateWorkflow;
pub use runtime::InMemoryAttributeStore;
pub use runtime::InMemoryDeviceGroups;
pub use runtime::InMemoryDeviceRegistry;
pub use runtime::InMemoryRetryStore;
pub use runtime::MemoryAuditSink;
pub use runtime::NoopAuditSink;
pub use runtime::RecoveryOutcome;
pub use runtime::ReleaseOutcome;
pub use runtime::RetryPolicy;
pub use runtime::StderrAuditSink;
pub use runtime::WorkflowAuditEvent;
pub use runtime::WorkflowCollaborators;
pub use runtime::WorkflowConfig;
pub use runtime::WorkflowError;
pub use runtime::WorkflowOutcome;
pub use runtime::WorkflowReport;
pub use runtime::WorkflowStep;

// crates/fw-recovery-core/src/runtime/mod.rs
// ============================================================================
// Module: Firmware Recovery Runtime
// Description: Workflow engine, I/O retry, audit sinks, and reference stores.
// Purpose: Execute the retry / rollback / quarantine lifecycle.
// Dependencies: crate::{core, interfaces}, tokio
// ============================================================================

//! ## Overview
//! The runtime hosts [`FirmwareUpdateWorkflow`] and everything it needs to run
//! against the collaborator traits: policies, the bounded retry helper, audit
//! sinks, and in-memory collaborators for tests and local use.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod audit;
pub mod engine;
pub mod policy;
mod retry;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::AuditSink;
pub use audit::EVENT_INCONSISTENT_STATE;
pub use audit::EVENT_IO_RETRY;
pub use audit::EVENT_WORKFLOW_COMPLETED;
pub use audit::EVENT_WORKFLOW_FAILED;
pub use audit::EVENT_WORKFLOW_STEP;
pub use audit::FileAuditSink;
pub use audit::MemoryAuditSink;
pub use audit::NoopAuditSink;
pub use audit::StderrAuditSink;
pub use audit::WorkflowAuditEvent;
pub use engine::FIRMWARE_STATUS_ATTRIBUTE;
pub use engine::FIRMWARE_STATUS_QUARANTINED;
pub use engine::FIRMWARE_STATUS_RELEASED;
pub use engine::FirmwareUpdateWorkflow;
pub use engine::RecoveryOutcome;
pub use engine::ReleaseOutcome;
pub use engine::WorkflowCollaborators;
pub use engine::WorkflowError;
pub use engine::WorkflowOutcome;
pub use engine::WorkflowReport;
pub use engine::WorkflowStep;
pub use policy::BackoffPolicy;
pub use policy::RetryPolicy;
pub use policy::WorkflowConfig;
pub use store::InMemoryAttributeStore;
pub use store::InMemoryDeviceGroups;
pub use store::InMemoryDeviceRegistry;
pub use store::InMemoryRetryStore;

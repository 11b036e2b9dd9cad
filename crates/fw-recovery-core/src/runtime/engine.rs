// crates/fw-recovery-core/src/runtime/engine.rs
// ============================================================================
// Module: Firmware Update Workflow Engine
// Description: Retry, rollback, and quarantine state machine per device.
// Purpose: Drive one device from a failure event to a terminal outcome.
// Dependencies: crate::{core, interfaces, runtime}, thiserror, tokio
// ============================================================================

//! ## Overview
//! [`FirmwareUpdateWorkflow`] is the single execution path for failure and
//! recovery signals. An explicit scheduler loop runs one step at a time; each
//! step performs its I/O through the bounded retry helper and returns either
//! the next state or a terminal outcome. A failed step aborts the execution
//! without advancing state, and the next event re-enters at CheckExistence.
//!
//! Quarantine is split into commit, groups, notify, and settle. The commit
//! writes the QUARANTINED record with an unsettled marker before any group or
//! notification call, so a later execution can resume the remaining steps
//! from stored state alone. The settle only applies to the quarantine it was
//! started for; a release that lands first wins, and the late execution
//! withdraws the group membership it added.
//!
//! Quarantine and release tag the live device record with
//! [`FIRMWARE_STATUS_ATTRIBUTE`] through a merge write, so fleet tooling that
//! reads the registry sees the same status as the retry store.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::device::AttributeBag;
use crate::core::device::AttributeSnapshot;
use crate::core::device::DeviceRecord;
use crate::core::device::DeviceStatus;
use crate::core::device::RetryRecord;
use crate::core::event::FailureEvent;
use crate::core::event::RecoveryEvent;
use crate::core::identifiers::DeviceId;
use crate::core::identifiers::MAX_DEVICE_ID_LENGTH;
use crate::core::notification::PublishReceipt;
use crate::core::notification::QuarantineNotice;
use crate::core::time::Timestamp;
use crate::interfaces::AttributeStore;
use crate::interfaces::DeviceGroupManager;
use crate::interfaces::DeviceRegistry;
use crate::interfaces::Notifier;
use crate::interfaces::RetryStore;
use crate::interfaces::SettleWrite;
use crate::interfaces::SnapshotWrite;
use crate::interfaces::TransientError;
use crate::runtime::audit::AuditSink;
use crate::runtime::audit::EVENT_INCONSISTENT_STATE;
use crate::runtime::audit::EVENT_WORKFLOW_COMPLETED;
use crate::runtime::audit::EVENT_WORKFLOW_FAILED;
use crate::runtime::audit::EVENT_WORKFLOW_STEP;
use crate::runtime::audit::WorkflowAuditEvent;
use crate::runtime::policy::WorkflowConfig;
use crate::runtime::retry::IoContext;
use crate::runtime::retry::StepFailure;
use crate::runtime::retry::call_with_retry;

// ============================================================================
// SECTION: Live Attribute Tags
// ============================================================================

/// Live attribute key written on quarantine and release.
pub const FIRMWARE_STATUS_ATTRIBUTE: &str = "firmwareStatus";
/// Tag value while a device is quarantined.
pub const FIRMWARE_STATUS_QUARANTINED: &str = "failedToUpdate";
/// Tag value after an operator release.
pub const FIRMWARE_STATUS_RELEASED: &str = "released";

/// Builds the single-key bag merged into the live record.
fn firmware_status_tag(value: &str) -> AttributeBag {
    let mut tag = AttributeBag::new();
    tag.insert(FIRMWARE_STATUS_ATTRIBUTE.to_string(), Value::String(value.to_string()));
    tag
}

// ============================================================================
// SECTION: Steps and Outcomes
// ============================================================================

/// Workflow step labels used in reports, errors, and audit events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStep {
    /// Read the retry record and route.
    CheckExistence,
    /// Capture the snapshot and open an episode.
    FirstFailure,
    /// Atomically count another failure.
    IncrementRetry,
    /// Write the snapshot back to the live device record.
    RestoreAndRetry,
    /// Commit `{0, QUARANTINED}` with an unsettled marker.
    QuarantineCommit,
    /// Join the quarantine group, leave operational groups, tag the device.
    QuarantineGroups,
    /// Publish the quarantine notice.
    QuarantineNotify,
    /// Mark the quarantine marker settled.
    QuarantineSettle,
    /// Close an episode after a successful update.
    RecordRecovery,
    /// Operator reset of a device.
    Release,
    /// Read-only inspection.
    Inspect,
}

impl WorkflowStep {
    /// Returns the stable snake_case label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CheckExistence => "check_existence",
            Self::FirstFailure => "first_failure",
            Self::IncrementRetry => "increment_retry",
            Self::RestoreAndRetry => "restore_and_retry",
            Self::QuarantineCommit => "quarantine_commit",
            Self::QuarantineGroups => "quarantine_groups",
            Self::QuarantineNotify => "quarantine_notify",
            Self::QuarantineSettle => "quarantine_settle",
            Self::RecordRecovery => "record_recovery",
            Self::Release => "release",
            Self::Inspect => "inspect",
        }
    }
}

impl fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal outcome of a failure execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WorkflowOutcome {
    /// A new episode was opened; await the next attempt.
    RetryScheduled {
        /// Stored retry count.
        retry_count: u32,
    },
    /// The snapshot was written back to the device.
    RollbackCompleted {
        /// Stored retry count.
        retry_count: u32,
        /// False when no snapshot existed to restore.
        restored: bool,
    },
    /// Quarantine committed, groups updated, and the notice published.
    QuarantineCompleted {
        /// Retry count observed when the budget was exceeded.
        retry_count_at_quarantine: u32,
        /// Lifetime quarantine count.
        quarantine_count: u32,
        /// Notifier receipt.
        notification: PublishReceipt,
    },
    /// The device was already quarantined; nothing changed.
    AlreadyQuarantined,
    /// The notice went out, but the device was released before the
    /// quarantine settled; the release was kept.
    QuarantineSuperseded {
        /// Notifier receipt.
        notification: PublishReceipt,
    },
}

impl WorkflowOutcome {
    /// Returns the outcome label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::RetryScheduled {
                ..
            } => "retry_scheduled",
            Self::RollbackCompleted {
                ..
            } => "rollback_completed",
            Self::QuarantineCompleted {
                ..
            } => "quarantine_completed",
            Self::AlreadyQuarantined => "already_quarantined",
            Self::QuarantineSuperseded {
                ..
            } => "quarantine_superseded",
        }
    }
}

/// Report returned by a completed failure execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkflowReport {
    /// Device processed.
    pub device_id: DeviceId,
    /// Terminal outcome.
    pub outcome: WorkflowOutcome,
    /// Steps completed, in order.
    pub steps: Vec<WorkflowStep>,
    /// Retry record as last written or read.
    pub record: Option<RetryRecord>,
}

/// Result of a recovery signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RecoveryOutcome {
    /// A RETRYING episode was closed.
    Reset {
        /// Retry count before the reset.
        previous_retry_count: u32,
    },
    /// No open episode; nothing changed.
    NoActiveEpisode,
    /// Quarantined devices are only released by an operator.
    Quarantined,
}

/// Result of an operator release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReleaseOutcome {
    /// Device released.
    pub device_id: DeviceId,
    /// Status before the release (ACTIVE when no record existed).
    pub previous_status: DeviceStatus,
    /// Record written by the release.
    pub record: RetryRecord,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Workflow execution errors.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Workflow configuration is unusable.
    #[error("invalid workflow config: {0}")]
    InvalidConfig(String),
    /// Trigger payload rejected before any I/O.
    #[error("invalid event: {0}")]
    InvalidEvent(String),
    /// Transient failures outlasted the retry budget; state was not advanced.
    #[error("step {step} failed after {attempts} attempts: {message}")]
    StepFailed {
        /// Step that failed.
        step: WorkflowStep,
        /// Attempts made.
        attempts: u32,
        /// Last failure message.
        message: String,
    },
    /// Non-transient failure; state was not advanced.
    #[error("step {step} failed: {message}")]
    Fatal {
        /// Step that failed.
        step: WorkflowStep,
        /// Failure message.
        message: String,
    },
}

impl WorkflowError {
    /// Maps a step failure onto the public error.
    fn from_step(step: WorkflowStep, failure: StepFailure) -> Self {
        match failure {
            StepFailure::Retryable {
                attempts,
                message,
            } => Self::StepFailed {
                step,
                attempts,
                message,
            },
            StepFailure::Fatal {
                message,
            } => Self::Fatal {
                step,
                message,
            },
        }
    }
}

// ============================================================================
// SECTION: State Machine
// ============================================================================

/// Scheduler state; each variant is one step still to run.
enum WorkflowState {
    /// Route on the stored record.
    CheckExistence,
    /// Open a new episode.
    FirstFailure,
    /// Count another failure.
    IncrementRetry,
    /// Roll attributes back.
    RestoreAndRetry {
        /// Record returned by the increment.
        record: RetryRecord,
    },
    /// Commit the quarantine record.
    QuarantineCommit {
        /// Record that exceeded the threshold.
        record: RetryRecord,
    },
    /// Update group membership.
    QuarantineGroups {
        /// Committed quarantine record.
        record: RetryRecord,
    },
    /// Publish the notice.
    QuarantineNotify {
        /// Committed quarantine record.
        record: RetryRecord,
    },
    /// Settle the marker.
    QuarantineSettle {
        /// Committed quarantine record.
        record: RetryRecord,
        /// Notifier receipt.
        receipt: PublishReceipt,
    },
}

impl WorkflowState {
    /// Step label for this state.
    const fn step(&self) -> WorkflowStep {
        match self {
            Self::CheckExistence => WorkflowStep::CheckExistence,
            Self::FirstFailure => WorkflowStep::FirstFailure,
            Self::IncrementRetry => WorkflowStep::IncrementRetry,
            Self::RestoreAndRetry {
                ..
            } => WorkflowStep::RestoreAndRetry,
            Self::QuarantineCommit {
                ..
            } => WorkflowStep::QuarantineCommit,
            Self::QuarantineGroups {
                ..
            } => WorkflowStep::QuarantineGroups,
            Self::QuarantineNotify {
                ..
            } => WorkflowStep::QuarantineNotify,
            Self::QuarantineSettle {
                ..
            } => WorkflowStep::QuarantineSettle,
        }
    }
}

/// Successful result of one step.
enum StepOutcome {
    /// Continue with the next state.
    Advance(WorkflowState),
    /// Stop with a terminal outcome.
    Complete {
        /// Terminal outcome.
        outcome: WorkflowOutcome,
        /// Retry record as last written or read.
        record: Option<RetryRecord>,
    },
}

// ============================================================================
// SECTION: Workflow
// ============================================================================

/// External collaborators used by the workflow.
#[derive(Clone)]
pub struct WorkflowCollaborators {
    /// Retry-count records.
    pub retry_store: Arc<dyn RetryStore>,
    /// Attribute-backup records.
    pub attribute_store: Arc<dyn AttributeStore>,
    /// Group membership manager.
    pub groups: Arc<dyn DeviceGroupManager>,
    /// Notification channel.
    pub notifier: Arc<dyn Notifier>,
    /// Live device registry.
    pub registry: Arc<dyn DeviceRegistry>,
    /// Audit sink.
    pub audit: Arc<dyn AuditSink>,
}

/// Retry / rollback / quarantine orchestrator.
///
/// # Invariants
/// - Holds no per-device in-memory state; executions for different devices
///   are independent and may run concurrently.
/// - No lock is held across a collaborator call.
#[derive(Clone)]
pub struct FirmwareUpdateWorkflow {
    /// Retry-count records.
    retry_store: Arc<dyn RetryStore>,
    /// Attribute-backup records.
    attribute_store: Arc<dyn AttributeStore>,
    /// Group membership manager.
    groups: Arc<dyn DeviceGroupManager>,
    /// Notification channel.
    notifier: Arc<dyn Notifier>,
    /// Live device registry.
    registry: Arc<dyn DeviceRegistry>,
    /// Audit sink.
    audit: Arc<dyn AuditSink>,
    /// Validated configuration.
    config: WorkflowConfig,
}

impl FirmwareUpdateWorkflow {
    /// Creates a workflow after validating the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::InvalidConfig`] when validation fails.
    pub fn new(
        collaborators: WorkflowCollaborators,
        config: WorkflowConfig,
    ) -> Result<Self, WorkflowError> {
        config.validate().map_err(WorkflowError::InvalidConfig)?;
        Ok(Self {
            retry_store: collaborators.retry_store,
            attribute_store: collaborators.attribute_store,
            groups: collaborators.groups,
            notifier: collaborators.notifier,
            registry: collaborators.registry,
            audit: collaborators.audit,
            config,
        })
    }

    /// Returns the active configuration.
    #[must_use]
    pub const fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Runs the workflow for one "device update failed" signal.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError`] when the event is invalid or a step fails.
    pub async fn handle_failure(
        &self,
        event: &FailureEvent,
    ) -> Result<WorkflowReport, WorkflowError> {
        validate_device_id(&event.device_id)?;
        let device_id = &event.device_id;
        let mut steps = Vec::new();
        let mut state = WorkflowState::CheckExistence;
        loop {
            let step = state.step();
            match self.run_step(state, event).await {
                Ok(StepOutcome::Advance(next)) => {
                    self.record_step(device_id, step);
                    steps.push(step);
                    state = next;
                }
                Ok(StepOutcome::Complete {
                    outcome,
                    record,
                }) => {
                    self.record_step(device_id, step);
                    steps.push(step);
                    self.audit.record(
                        &WorkflowAuditEvent::new(EVENT_WORKFLOW_COMPLETED, device_id)
                            .with_step(step)
                            .with_outcome(outcome.label()),
                    );
                    return Ok(WorkflowReport {
                        device_id: device_id.clone(),
                        outcome,
                        steps,
                        record,
                    });
                }
                Err(failure) => return Err(self.fail(device_id, step, failure)),
            }
        }
    }

    /// Applies a recovery signal: RETRYING becomes `{0, ACTIVE}`.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError`] when the event is invalid or store I/O fails.
    pub async fn handle_recovery(
        &self,
        event: &RecoveryEvent,
    ) -> Result<RecoveryOutcome, WorkflowError> {
        validate_device_id(&event.device_id)?;
        let step = WorkflowStep::RecordRecovery;
        match self.record_recovery(event).await {
            Ok(outcome) => {
                let label = match outcome {
                    RecoveryOutcome::Reset {
                        ..
                    } => "reset",
                    RecoveryOutcome::NoActiveEpisode => "no_active_episode",
                    RecoveryOutcome::Quarantined => "quarantined",
                };
                self.audit.record(
                    &WorkflowAuditEvent::new(EVENT_WORKFLOW_COMPLETED, &event.device_id)
                        .with_step(step)
                        .with_outcome(label),
                );
                Ok(outcome)
            }
            Err(failure) => Err(self.fail(&event.device_id, step, failure)),
        }
    }

    /// Operator reset: writes `{0, ACTIVE}` and leaves the quarantine group.
    ///
    /// A device that was quarantined is also re-tagged as released.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError`] when the device id is invalid or I/O fails.
    pub async fn release_device(
        &self,
        device_id: &DeviceId,
        at: Timestamp,
    ) -> Result<ReleaseOutcome, WorkflowError> {
        validate_device_id(device_id)?;
        let step = WorkflowStep::Release;
        match self.release(device_id, at).await {
            Ok(outcome) => {
                self.audit.record(
                    &WorkflowAuditEvent::new(EVENT_WORKFLOW_COMPLETED, device_id)
                        .with_step(step)
                        .with_outcome("released")
                        .with_message(format!("previous status {}", outcome.previous_status)),
                );
                Ok(outcome)
            }
            Err(failure) => Err(self.fail(device_id, step, failure)),
        }
    }

    /// Reads the combined record of one device.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError`] when the device id is invalid or I/O fails.
    pub async fn inspect(&self, device_id: &DeviceId) -> Result<DeviceRecord, WorkflowError> {
        validate_device_id(device_id)?;
        let step = WorkflowStep::Inspect;
        let store = Arc::clone(&self.retry_store);
        let id = device_id.clone();
        let retry = self
            .io(device_id, step, move || store.get(&id))
            .await
            .map_err(|failure| WorkflowError::from_step(step, failure))?;
        let attributes = Arc::clone(&self.attribute_store);
        let id = device_id.clone();
        let snapshot = self
            .io(device_id, step, move || attributes.get(&id))
            .await
            .map_err(|failure| WorkflowError::from_step(step, failure))?;
        Ok(DeviceRecord {
            device_id: device_id.clone(),
            retry,
            snapshot,
        })
    }

    /// Lists retry records, optionally filtered by status.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError`] when the store scan fails.
    pub async fn list_devices(
        &self,
        status: Option<DeviceStatus>,
    ) -> Result<Vec<RetryRecord>, WorkflowError> {
        let step = WorkflowStep::Inspect;
        let store = Arc::clone(&self.retry_store);
        let scope = DeviceId::new("*");
        self.io(&scope, step, move || store.list(status))
            .await
            .map_err(|failure| WorkflowError::from_step(step, failure))
    }

    // ------------------------------------------------------------------------
    // Recovery and release
    // ------------------------------------------------------------------------

    /// Closes a RETRYING episode.
    async fn record_recovery(
        &self,
        event: &RecoveryEvent,
    ) -> Result<RecoveryOutcome, StepFailure> {
        let step = WorkflowStep::RecordRecovery;
        let device_id = &event.device_id;
        let store = Arc::clone(&self.retry_store);
        let id = device_id.clone();
        let existing = self.io(device_id, step, move || store.get(&id)).await?;
        match existing {
            Some(record) if record.status == DeviceStatus::Retrying => {
                let reset = record.reset(event.event_timestamp);
                let store = Arc::clone(&self.retry_store);
                self.io(device_id, step, move || store.put(&reset)).await?;
                Ok(RecoveryOutcome::Reset {
                    previous_retry_count: record.retry_count,
                })
            }
            Some(record) if record.status == DeviceStatus::Quarantined => {
                Ok(RecoveryOutcome::Quarantined)
            }
            _ => Ok(RecoveryOutcome::NoActiveEpisode),
        }
    }

    /// Resets the record and removes quarantine group membership.
    async fn release(
        &self,
        device_id: &DeviceId,
        at: Timestamp,
    ) -> Result<ReleaseOutcome, StepFailure> {
        let step = WorkflowStep::Release;
        let store = Arc::clone(&self.retry_store);
        let id = device_id.clone();
        let existing = self.io(device_id, step, move || store.get(&id)).await?;
        let previous_status = existing.as_ref().map_or(DeviceStatus::Active, |r| r.status);
        let record =
            existing.unwrap_or_else(|| RetryRecord::active(device_id.clone(), at)).reset(at);
        let store = Arc::clone(&self.retry_store);
        let written = record.clone();
        self.io(device_id, step, move || store.put(&written)).await?;
        self.leave_quarantine(device_id, step, previous_status == DeviceStatus::Quarantined)
            .await?;
        Ok(ReleaseOutcome {
            device_id: device_id.clone(),
            previous_status,
            record,
        })
    }

    // ------------------------------------------------------------------------
    // Step dispatch
    // ------------------------------------------------------------------------

    /// Runs one step.
    async fn run_step(
        &self,
        state: WorkflowState,
        event: &FailureEvent,
    ) -> Result<StepOutcome, StepFailure> {
        match state {
            WorkflowState::CheckExistence => self.check_existence(&event.device_id).await,
            WorkflowState::FirstFailure => self.first_failure(event).await,
            WorkflowState::IncrementRetry => self.increment_retry(event).await,
            WorkflowState::RestoreAndRetry {
                record,
            } => self.restore_and_retry(record).await,
            WorkflowState::QuarantineCommit {
                record,
            } => self.quarantine_commit(&record, event.event_timestamp).await,
            WorkflowState::QuarantineGroups {
                record,
            } => self.quarantine_groups(record).await,
            WorkflowState::QuarantineNotify {
                record,
            } => self.quarantine_notify(record).await,
            WorkflowState::QuarantineSettle {
                record,
                receipt,
            } => self.quarantine_settle(&record, receipt).await,
        }
    }

    /// Routes on the stored retry record.
    async fn check_existence(&self, device_id: &DeviceId) -> Result<StepOutcome, StepFailure> {
        let store = Arc::clone(&self.retry_store);
        let id = device_id.clone();
        let existing =
            self.io(device_id, WorkflowStep::CheckExistence, move || store.get(&id)).await?;
        Ok(match existing {
            None => StepOutcome::Advance(WorkflowState::FirstFailure),
            Some(record) => match record.status {
                DeviceStatus::Active => StepOutcome::Advance(WorkflowState::FirstFailure),
                DeviceStatus::Retrying => StepOutcome::Advance(WorkflowState::IncrementRetry),
                DeviceStatus::Quarantined => self.quarantined_route(record),
            },
        })
    }

    /// Captures the snapshot and opens the episode.
    async fn first_failure(&self, event: &FailureEvent) -> Result<StepOutcome, StepFailure> {
        let step = WorkflowStep::FirstFailure;
        let device_id = &event.device_id;
        let attributes = if let Some(observed) = &event.attributes {
            Some(observed.clone())
        } else {
            let registry = Arc::clone(&self.registry);
            let id = device_id.clone();
            self.io(device_id, step, move || registry.current_attributes(&id)).await?
        };
        if let Some(attributes) = attributes {
            let snapshot = AttributeSnapshot {
                device_id: device_id.clone(),
                attributes,
                captured_at: event.event_timestamp,
            };
            let store = Arc::clone(&self.attribute_store);
            let write = self.io(device_id, step, move || store.put_if_newer(&snapshot)).await?;
            if write == SnapshotWrite::Superseded {
                self.audit.record(
                    &WorkflowAuditEvent::new(EVENT_WORKFLOW_STEP, device_id)
                        .with_step(step)
                        .with_message("kept existing snapshot; capture is not strictly newer"),
                );
            }
        } else {
            let store = Arc::clone(&self.attribute_store);
            let id = device_id.clone();
            let existing = self.io(device_id, step, move || store.get(&id)).await?;
            if existing.is_none() {
                self.report_inconsistent(
                    device_id,
                    step,
                    "no observed or live attributes; episode opened without a snapshot",
                );
            }
        }
        let store = Arc::clone(&self.retry_store);
        let id = device_id.clone();
        let at = event.event_timestamp;
        let record =
            self.io(device_id, step, move || store.increment_retry_count(&id, at)).await?;
        Ok(self.route_after_increment(record))
    }

    /// Counts another failure in an open episode.
    async fn increment_retry(&self, event: &FailureEvent) -> Result<StepOutcome, StepFailure> {
        let store = Arc::clone(&self.retry_store);
        let id = event.device_id.clone();
        let at = event.event_timestamp;
        let record = self
            .io(&event.device_id, WorkflowStep::IncrementRetry, move || {
                store.increment_retry_count(&id, at)
            })
            .await?;
        Ok(self.route_after_increment(record))
    }

    /// Writes the snapshot back to the live device record.
    async fn restore_and_retry(&self, record: RetryRecord) -> Result<StepOutcome, StepFailure> {
        let step = WorkflowStep::RestoreAndRetry;
        let device_id = &record.device_id;
        let store = Arc::clone(&self.attribute_store);
        let id = device_id.clone();
        let snapshot = self.io(device_id, step, move || store.get(&id)).await?;
        let restored = if let Some(snapshot) = snapshot {
            let registry = Arc::clone(&self.registry);
            self.io(device_id, step, move || {
                registry.replace_attributes(&snapshot.device_id, &snapshot.attributes)
            })
            .await?;
            true
        } else {
            self.report_inconsistent(device_id, step, "no attribute snapshot to restore");
            false
        };
        Ok(StepOutcome::Complete {
            outcome: WorkflowOutcome::RollbackCompleted {
                retry_count: record.retry_count,
                restored,
            },
            record: Some(record),
        })
    }

    /// Commits the quarantine record before any group or notification call.
    async fn quarantine_commit(
        &self,
        record: &RetryRecord,
        at: Timestamp,
    ) -> Result<StepOutcome, StepFailure> {
        let committed = record.quarantined(at);
        let store = Arc::clone(&self.retry_store);
        let written = committed.clone();
        self.io(&record.device_id, WorkflowStep::QuarantineCommit, move || store.put(&written))
            .await?;
        Ok(StepOutcome::Advance(WorkflowState::QuarantineGroups {
            record: committed,
        }))
    }

    /// Moves the device into the quarantine group and out of operational ones.
    async fn quarantine_groups(&self, record: RetryRecord) -> Result<StepOutcome, StepFailure> {
        let step = WorkflowStep::QuarantineGroups;
        let device_id = &record.device_id;
        let groups = Arc::clone(&self.groups);
        let id = device_id.clone();
        let quarantine = self.config.quarantine_group.clone();
        self.io(device_id, step, move || groups.add_to_group(&id, &quarantine)).await?;
        for group in &self.config.operational_groups {
            let groups = Arc::clone(&self.groups);
            let id = device_id.clone();
            let group = group.clone();
            self.io(device_id, step, move || groups.remove_from_group(&id, &group)).await?;
        }
        let registry = Arc::clone(&self.registry);
        let id = device_id.clone();
        let tag = firmware_status_tag(FIRMWARE_STATUS_QUARANTINED);
        self.io(device_id, step, move || registry.merge_attributes(&id, &tag)).await?;
        Ok(StepOutcome::Advance(WorkflowState::QuarantineNotify {
            record,
        }))
    }

    /// Publishes the notice derived from the committed marker.
    async fn quarantine_notify(&self, record: RetryRecord) -> Result<StepOutcome, StepFailure> {
        let Some(notice) = QuarantineNotice::from_record(&record) else {
            return Err(StepFailure::Fatal {
                message: "quarantined record has no quarantine marker".to_string(),
            });
        };
        let notifier = Arc::clone(&self.notifier);
        let receipt = self
            .io(&record.device_id, WorkflowStep::QuarantineNotify, move || {
                notifier.publish(&notice)
            })
            .await?;
        Ok(StepOutcome::Advance(WorkflowState::QuarantineSettle {
            record,
            receipt,
        }))
    }

    /// Marks the quarantine settled if it is still the stored one.
    async fn quarantine_settle(
        &self,
        record: &RetryRecord,
        receipt: PublishReceipt,
    ) -> Result<StepOutcome, StepFailure> {
        let step = WorkflowStep::QuarantineSettle;
        let device_id = &record.device_id;
        let Some(marker) = record.quarantine else {
            return Err(StepFailure::Fatal {
                message: "quarantined record has no quarantine marker".to_string(),
            });
        };
        let store = Arc::clone(&self.retry_store);
        let id = device_id.clone();
        let quarantined_at = marker.quarantined_at;
        let write =
            self.io(device_id, step, move || store.settle_quarantine(&id, quarantined_at)).await?;
        match write {
            SettleWrite::Settled(settled) => Ok(StepOutcome::Complete {
                outcome: WorkflowOutcome::QuarantineCompleted {
                    retry_count_at_quarantine: marker.retry_count_at_quarantine,
                    quarantine_count: settled.quarantine_count,
                    notification: receipt,
                },
                record: Some(settled),
            }),
            SettleWrite::Superseded(current) => {
                let requarantined =
                    current.as_ref().is_some_and(|r| r.status == DeviceStatus::Quarantined);
                if !requarantined {
                    self.leave_quarantine(device_id, step, true).await?;
                }
                self.report_inconsistent(
                    device_id,
                    step,
                    "quarantine superseded before settle; stored record left unchanged",
                );
                Ok(StepOutcome::Complete {
                    outcome: WorkflowOutcome::QuarantineSuperseded {
                        notification: receipt,
                    },
                    record: current,
                })
            }
        }
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    /// Threshold decision shared by FirstFailure and IncrementRetry.
    ///
    /// A count of 1 opens an episode and always schedules a retry; the
    /// threshold applies from the second failure on.
    fn route_after_increment(&self, record: RetryRecord) -> StepOutcome {
        if record.status == DeviceStatus::Quarantined {
            return self.quarantined_route(record);
        }
        if record.retry_count <= 1 {
            return StepOutcome::Complete {
                outcome: WorkflowOutcome::RetryScheduled {
                    retry_count: record.retry_count,
                },
                record: Some(record),
            };
        }
        if record.retry_count >= self.config.retry.retry_threshold {
            StepOutcome::Advance(WorkflowState::QuarantineCommit {
                record,
            })
        } else {
            StepOutcome::Advance(WorkflowState::RestoreAndRetry {
                record,
            })
        }
    }

    /// Leaves the quarantine group and optionally re-tags the device released.
    async fn leave_quarantine(
        &self,
        device_id: &DeviceId,
        step: WorkflowStep,
        retag: bool,
    ) -> Result<(), StepFailure> {
        let groups = Arc::clone(&self.groups);
        let id = device_id.clone();
        let group = self.config.quarantine_group.clone();
        self.io(device_id, step, move || groups.remove_from_group(&id, &group)).await?;
        if retag {
            let registry = Arc::clone(&self.registry);
            let id = device_id.clone();
            let tag = firmware_status_tag(FIRMWARE_STATUS_RELEASED);
            self.io(device_id, step, move || registry.merge_attributes(&id, &tag)).await?;
        }
        Ok(())
    }

    /// Resumes an unsettled quarantine or terminates on a settled one.
    fn quarantined_route(&self, record: RetryRecord) -> StepOutcome {
        if record.has_pending_quarantine() {
            return StepOutcome::Advance(WorkflowState::QuarantineGroups {
                record,
            });
        }
        if record.quarantine.is_none() {
            self.report_inconsistent(
                &record.device_id,
                WorkflowStep::CheckExistence,
                "quarantined record carries no quarantine marker",
            );
        }
        StepOutcome::Complete {
            outcome: WorkflowOutcome::AlreadyQuarantined,
            record: Some(record),
        }
    }

    /// Runs one collaborator call with timeout and backoff.
    async fn io<T, E, F>(
        &self,
        device_id: &DeviceId,
        step: WorkflowStep,
        call: F,
    ) -> Result<T, StepFailure>
    where
        T: Send + 'static,
        E: TransientError,
        F: Fn() -> Result<T, E> + Send + Sync + 'static,
    {
        let ctx = IoContext {
            policy: &self.config.backoff,
            audit: self.audit.as_ref(),
            device_id,
            step,
        };
        call_with_retry(&ctx, call).await
    }

    /// Emits a `workflow_step` event.
    fn record_step(&self, device_id: &DeviceId, step: WorkflowStep) {
        self.audit.record(&WorkflowAuditEvent::new(EVENT_WORKFLOW_STEP, device_id).with_step(step));
    }

    /// Emits an `inconsistent_state` event.
    fn report_inconsistent(&self, device_id: &DeviceId, step: WorkflowStep, message: &str) {
        self.audit.record(
            &WorkflowAuditEvent::new(EVENT_INCONSISTENT_STATE, device_id)
                .with_step(step)
                .with_message(message),
        );
    }

    /// Emits `workflow_failed` and converts the failure.
    fn fail(
        &self,
        device_id: &DeviceId,
        step: WorkflowStep,
        failure: StepFailure,
    ) -> WorkflowError {
        let error = WorkflowError::from_step(step, failure);
        self.audit.record(
            &WorkflowAuditEvent::new(EVENT_WORKFLOW_FAILED, device_id)
                .with_step(step)
                .with_message(error.to_string()),
        );
        error
    }
}

// ============================================================================
// SECTION: Validation
// ============================================================================

/// Rejects empty or overlong device ids before any I/O.
fn validate_device_id(device_id: &DeviceId) -> Result<(), WorkflowError> {
    if device_id.as_str().trim().is_empty() {
        return Err(WorkflowError::InvalidEvent("device id must be non-empty".to_string()));
    }
    if device_id.as_str().len() > MAX_DEVICE_ID_LENGTH {
        return Err(WorkflowError::InvalidEvent(format!(
            "device id exceeds {MAX_DEVICE_ID_LENGTH} bytes"
        )));
    }
    Ok(())
}

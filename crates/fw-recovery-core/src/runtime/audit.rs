// crates/fw-recovery-core/src/runtime/audit.rs
// ============================================================================
// Module: Workflow Audit Logging
// Description: Structured JSON-line audit events for workflow executions.
// Purpose: Surface step progress, retries, and inconsistent state to operators.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Every step transition, retried I/O call, terminal outcome, and detected
//! inconsistency is emitted as one [`WorkflowAuditEvent`]. Sinks serialize
//! events as JSON lines; deployments route stderr or the file to their own
//! log pipeline.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Serialize;

use crate::core::identifiers::DeviceId;
use crate::runtime::engine::WorkflowStep;

// ============================================================================
// SECTION: Event Kinds
// ============================================================================

/// Step completed and the workflow advanced.
pub const EVENT_WORKFLOW_STEP: &str = "workflow_step";
/// Transient I/O failure that will be retried after backoff.
pub const EVENT_IO_RETRY: &str = "io_retry";
/// Workflow reached a terminal outcome.
pub const EVENT_WORKFLOW_COMPLETED: &str = "workflow_completed";
/// Workflow aborted without advancing state.
pub const EVENT_WORKFLOW_FAILED: &str = "workflow_failed";
/// Stored state disagrees with workflow expectations; not auto-repaired.
pub const EVENT_INCONSISTENT_STATE: &str = "inconsistent_state";

// ============================================================================
// SECTION: Types
// ============================================================================

/// Workflow audit event payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkflowAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Device the execution is working on.
    pub device_id: String,
    /// Step label when the event concerns one step.
    pub step: Option<&'static str>,
    /// Attempt number for retried I/O.
    pub attempt: Option<u32>,
    /// Outcome label for completion events.
    pub outcome: Option<String>,
    /// Free-form detail.
    pub message: Option<String>,
}

impl WorkflowAuditEvent {
    /// Creates an event stamped with the current wall-clock time.
    #[must_use]
    pub fn new(event: &'static str, device_id: &DeviceId) -> Self {
        let timestamp_ms =
            SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
        Self {
            event,
            timestamp_ms,
            device_id: device_id.to_string(),
            step: None,
            attempt: None,
            outcome: None,
            message: None,
        }
    }

    /// Attaches the step label.
    #[must_use]
    pub const fn with_step(mut self, step: WorkflowStep) -> Self {
        self.step = Some(step.as_str());
        self
    }

    /// Attaches the attempt number.
    #[must_use]
    pub const fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = Some(attempt);
        self
    }

    /// Attaches an outcome label.
    #[must_use]
    pub fn with_outcome(mut self, outcome: impl Into<String>) -> Self {
        self.outcome = Some(outcome.into());
        self
    }

    /// Attaches a detail message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Audit sink for workflow events.
pub trait AuditSink: Send + Sync {
    /// Record an audit event.
    fn record(&self, event: &WorkflowAuditEvent);
}

/// Audit sink that logs JSON lines to stderr.
pub struct StderrAuditSink;

impl AuditSink for StderrAuditSink {
    fn record(&self, event: &WorkflowAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{payload}");
        }
    }
}

/// Audit sink that appends JSON lines to a file.
pub struct FileAuditSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileAuditSink {
    /// Opens the audit log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl AuditSink for FileAuditSink {
    fn record(&self, event: &WorkflowAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

/// No-op audit sink.
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record(&self, _event: &WorkflowAuditEvent) {}
}

/// Audit sink that keeps events in memory for inspection.
#[derive(Default)]
pub struct MemoryAuditSink {
    /// Captured events in emission order.
    events: Mutex<Vec<WorkflowAuditEvent>>,
}

impl MemoryAuditSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every captured event.
    #[must_use]
    pub fn events(&self) -> Vec<WorkflowAuditEvent> {
        self.events.lock().map(|guard| guard.clone()).unwrap_or_default()
    }

    /// Returns captured events of one kind.
    #[must_use]
    pub fn events_of(&self, kind: &str) -> Vec<WorkflowAuditEvent> {
        self.events().into_iter().filter(|event| event.event == kind).collect()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: &WorkflowAuditEvent) {
        if let Ok(mut guard) = self.events.lock() {
            guard.push(event.clone());
        }
    }
}

// crates/fw-recovery-core/src/runtime/retry.rs
// ============================================================================
// Module: Bounded I/O Retry
// Description: Timeout and exponential backoff around collaborator calls.
// Purpose: Turn transient collaborator failures into bounded retries.
// Dependencies: tokio, crate::interfaces
// ============================================================================

//! ## Overview
//! Each collaborator call runs on a blocking thread under a per-call timeout.
//! Timeouts and transient errors are retried with exponential backoff until
//! the attempt budget is spent. A timed-out call is detached, not aborted, so
//! a write that already started is allowed to finish. The retry may then run
//! alongside or after it, so every call passed here must be safe to repeat:
//! plain puts and group changes are idempotent, the retry increment is fenced
//! by the event timestamp, and notifier dedup reserves the notice before
//! delivering.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use crate::core::identifiers::DeviceId;
use crate::interfaces::TransientError;
use crate::runtime::audit::AuditSink;
use crate::runtime::audit::EVENT_IO_RETRY;
use crate::runtime::audit::WorkflowAuditEvent;
use crate::runtime::engine::WorkflowStep;
use crate::runtime::policy::BackoffPolicy;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Why a step could not complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StepFailure {
    /// Transient failures persisted past the attempt budget.
    Retryable {
        /// Attempts made.
        attempts: u32,
        /// Last failure message.
        message: String,
    },
    /// Non-transient failure; retrying cannot help.
    Fatal {
        /// Failure message.
        message: String,
    },
}

/// Per-call context shared by every I/O call of one execution.
pub(crate) struct IoContext<'a> {
    /// Backoff and timeout settings.
    pub(crate) policy: &'a BackoffPolicy,
    /// Sink for `io_retry` events.
    pub(crate) audit: &'a dyn AuditSink,
    /// Device under processing.
    pub(crate) device_id: &'a DeviceId,
    /// Step issuing the call.
    pub(crate) step: WorkflowStep,
}

// ============================================================================
// SECTION: Retry Loop
// ============================================================================

/// Runs `call` with timeout and backoff.
pub(crate) async fn call_with_retry<T, E, F>(ctx: &IoContext<'_>, call: F) -> Result<T, StepFailure>
where
    T: Send + 'static,
    E: TransientError,
    F: Fn() -> Result<T, E> + Send + Sync + 'static,
{
    let call = Arc::new(call);
    let mut attempt: u32 = 0;
    loop {
        attempt = attempt.saturating_add(1);
        let task = Arc::clone(&call);
        let handle = tokio::task::spawn_blocking(move || task());
        let message = match tokio::time::timeout(ctx.policy.step_timeout, handle).await {
            Ok(Ok(Ok(value))) => return Ok(value),
            Ok(Ok(Err(err))) if err.is_transient() => err.to_string(),
            Ok(Ok(Err(err))) => {
                return Err(StepFailure::Fatal {
                    message: err.to_string(),
                });
            }
            Ok(Err(err)) => {
                return Err(StepFailure::Fatal {
                    message: format!("io task failed: {err}"),
                });
            }
            Err(_) => format!("io call exceeded {} ms", ctx.policy.step_timeout.as_millis()),
        };
        if attempt >= ctx.policy.max_attempts {
            return Err(StepFailure::Retryable {
                attempts: attempt,
                message,
            });
        }
        ctx.audit.record(
            &WorkflowAuditEvent::new(EVENT_IO_RETRY, ctx.device_id)
                .with_step(ctx.step)
                .with_attempt(attempt)
                .with_message(message),
        );
        tokio::time::sleep(ctx.policy.delay_for(attempt)).await;
    }
}

// crates/fw-recovery-broker/tests/sinks/callback_tests.rs
// ============================================================================
// Module: CallbackNotifier Unit Tests
// Description: Tests for the callback-based notifier.
// Purpose: Validate handler invocation and error propagation.
// Dependencies: fw-recovery-broker, fw-recovery-core
// ============================================================================

//! ## Overview
//! Exercises [`fw_recovery_broker::CallbackNotifier`] delivery semantics.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::sync::Arc;
use std::sync::Mutex;

use fw_recovery_broker::CallbackNotifier;
use fw_recovery_broker::NotificationMessage;
use fw_recovery_core::Notifier;
use fw_recovery_core::NotifyError;

use super::common::sample_notice;

/// Tests callback notifier passes the rendered message to the handler.
#[test]
fn callback_notifier_invokes_handler() {
    let seen: Arc<Mutex<Vec<NotificationMessage>>> = Arc::new(Mutex::new(Vec::new()));
    let captured = Arc::clone(&seen);
    let notifier = CallbackNotifier::new(move |message| {
        captured.lock().unwrap().push(message.clone());
        Ok(())
    });

    let receipt = notifier.publish(&sample_notice("dev-1")).unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].notice.device_id.as_str(), "dev-1");
    assert_eq!(receipt.dedup_id, seen[0].dedup_id);
    assert_eq!(receipt.message_id, "callback-1");
}

/// Tests handler errors propagate without a receipt.
#[test]
fn callback_notifier_propagates_handler_errors() {
    let notifier = CallbackNotifier::new(|_| Err(NotifyError::Rejected("no route".to_string())));

    let err = notifier.publish(&sample_notice("dev-1")).unwrap_err();

    assert!(matches!(err, NotifyError::Rejected(message) if message == "no route"));
}

/// Tests clones share one message id sequence.
#[test]
fn callback_notifier_clones_share_sequence() {
    let notifier = CallbackNotifier::new(|_| Ok(()));
    let clone = notifier.clone();

    let first = notifier.publish(&sample_notice("dev-1")).unwrap();
    let second = clone.publish(&sample_notice("dev-2")).unwrap();

    assert_eq!(first.message_id, "callback-1");
    assert_eq!(second.message_id, "callback-2");
}

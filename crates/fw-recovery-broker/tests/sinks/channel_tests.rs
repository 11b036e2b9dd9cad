// crates/fw-recovery-broker/tests/sinks/channel_tests.rs
// ============================================================================
// Module: ChannelNotifier Unit Tests
// Description: Tests for the channel-based notifier.
// Purpose: Validate message delivery and channel failure classification.
// Dependencies: fw-recovery-broker, fw-recovery-core, tokio
// ============================================================================

//! ## Overview
//! Exercises [`fw_recovery_broker::ChannelNotifier`] message delivery behavior.

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

use fw_recovery_broker::ChannelNotifier;
use fw_recovery_broker::NotificationMessage;
use fw_recovery_broker::NotificationTemplate;
use fw_recovery_core::Notifier;
use fw_recovery_core::NotifyError;
use fw_recovery_core::TransientError;

use super::common::sample_notice;

/// Tests channel notifier enqueues the rendered message.
#[tokio::test]
async fn channel_notifier_enqueues_rendered_message() {
    let (tx, mut rx) = tokio::sync::mpsc::channel::<NotificationMessage>(4);
    let notifier = ChannelNotifier::new(tx);
    let notice = sample_notice("dev-1");

    let receipt = notifier.publish(&notice).expect("publish");

    let message = rx.recv().await.expect("message");
    assert_eq!(message, NotificationTemplate::default().render(&notice).unwrap());
    assert_eq!(receipt.message_id, "channel-1");
    assert_eq!(receipt.dedup_id, message.dedup_id);
}

/// Tests a full channel is a transient failure.
#[test]
fn channel_notifier_full_channel_is_transient() {
    let (tx, _rx) = tokio::sync::mpsc::channel::<NotificationMessage>(1);
    let notifier = ChannelNotifier::new(tx);

    notifier.publish(&sample_notice("dev-1")).unwrap();
    let err = notifier.publish(&sample_notice("dev-2")).unwrap_err();

    assert!(matches!(err, NotifyError::Unavailable(_)));
    assert!(err.is_transient());
}

/// Tests a closed channel is a permanent failure.
#[test]
fn channel_notifier_closed_channel_is_permanent() {
    let (tx, rx) = tokio::sync::mpsc::channel::<NotificationMessage>(1);
    drop(rx);
    let notifier = ChannelNotifier::new(tx);

    let err = notifier.publish(&sample_notice("dev-1")).unwrap_err();

    assert!(matches!(err, NotifyError::Rejected(_)));
    assert!(!err.is_transient());
}

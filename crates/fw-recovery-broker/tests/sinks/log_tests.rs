// crates/fw-recovery-broker/tests/sinks/log_tests.rs
// ============================================================================
// Module: LogNotifier Unit Tests
// Description: Tests for the JSON-line notifier.
// Purpose: Validate record contents, message ids, and write failures.
// Dependencies: fw-recovery-broker, serde_json, tempfile
// ============================================================================

//! ## Overview
//! Exercises [`fw_recovery_broker::LogNotifier`] output and error handling.

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

use std::fs::File;

use fw_recovery_broker::LogNotifier;
use fw_recovery_broker::NotificationTemplate;
use fw_recovery_core::DEFAULT_MESSAGE_GROUP;
use fw_recovery_core::DEFAULT_NOTIFICATION_SUBJECT;
use fw_recovery_core::Notifier;
use fw_recovery_core::NotifyError;
use fw_recovery_core::TransientError;
use serde_json::Value;

use super::common::FailingWriter;
use super::common::SharedBuffer;
use super::common::sample_notice;

fn lines(buffer: &SharedBuffer) -> Vec<Value> {
    buffer
        .to_string_lossy()
        .lines()
        .map(|line| serde_json::from_str(line).expect("json line"))
        .collect()
}

// ============================================================================
// SECTION: Record Contents
// ============================================================================

/// Tests log notifier writes one json record per publish.
#[test]
fn log_notifier_writes_rendered_record() {
    let buffer = SharedBuffer::new();
    let notifier = LogNotifier::new(buffer.clone());
    let notice = sample_notice("dev-1");

    let receipt = notifier.publish(&notice).expect("publish");

    let records = lines(&buffer);
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record["message_id"], receipt.message_id.as_str());
    assert_eq!(record["dispatcher"], "log");
    assert_eq!(record["subject"], DEFAULT_NOTIFICATION_SUBJECT);
    assert_eq!(record["message_group"], DEFAULT_MESSAGE_GROUP);
    assert_eq!(record["dedup_id"], notice.dedup_id().unwrap().value.as_str());
    assert_eq!(
        record["body"],
        "Device dev-1 exceeded its retry budget. Manual intervention required."
    );
    assert_eq!(record["notice"]["deviceId"], "dev-1");
    assert_eq!(record["notice"]["reason"], "retry-budget-exceeded");
    assert_eq!(record["notice"]["retryCountAtQuarantine"], 3);
    assert_eq!(receipt.dedup_id, notice.dedup_id().unwrap().value);
    assert!(!receipt.duplicate);
}

/// Tests log notifier issues sequential message ids.
#[test]
fn log_notifier_issues_sequential_ids() {
    let buffer = SharedBuffer::new();
    let notifier = LogNotifier::new(buffer.clone()).with_dispatcher("alerts");

    let first = notifier.publish(&sample_notice("dev-1")).unwrap();
    let second = notifier.publish(&sample_notice("dev-2")).unwrap();

    assert_eq!(first.message_id, "alerts-1");
    assert_eq!(second.message_id, "alerts-2");
    assert_eq!(lines(&buffer).len(), 2);
}

/// Tests log notifier applies a custom template.
#[test]
fn log_notifier_uses_custom_template() {
    let buffer = SharedBuffer::new();
    let template = NotificationTemplate {
        subject: "Fleet alert".to_string(),
        message_group: "fleet-eu".to_string(),
    };
    let notifier = LogNotifier::with_template(buffer.clone(), template);

    notifier.publish(&sample_notice("dev-1")).unwrap();

    let record = &lines(&buffer)[0];
    assert_eq!(record["subject"], "Fleet alert");
    assert_eq!(record["message_group"], "fleet-eu");
}

/// Tests log notifier appends to a file.
#[test]
fn log_notifier_writes_to_file() {
    let temp = tempfile::TempDir::new().unwrap();
    let path = temp.path().join("notifications.jsonl");
    let notifier = LogNotifier::new(File::create(&path).unwrap());

    notifier.publish(&sample_notice("dev-9")).unwrap();

    let contents = std::fs::read_to_string(&path).unwrap();
    assert_eq!(contents.lines().count(), 1);
    assert!(contents.contains("\"deviceId\":\"dev-9\""));
}

// ============================================================================
// SECTION: Failure Handling
// ============================================================================

/// Tests log notifier reports write failures as transient.
#[test]
fn log_notifier_write_failure_is_transient() {
    let notifier = LogNotifier::new(FailingWriter);

    let err = notifier.publish(&sample_notice("dev-1")).unwrap_err();

    assert!(matches!(err, NotifyError::Unavailable(_)));
    assert!(err.is_transient());
}

// crates/fw-recovery-broker/tests/dedup.rs
// ============================================================================
// Module: DedupNotifier Tests
// Description: Tests for the content-hash dedup wrapper.
// Purpose: Validate one delivery per notice inside the window.
// Dependencies: fw-recovery-broker, fw-recovery-core
// ============================================================================

//! ## Overview
//! Checks that identical notices are delivered once per window, distinct
//! notices are always delivered, failures are not remembered, expired
//! entries allow redelivery, and a publish racing an in-flight delivery is
//! refused transiently instead of delivering twice.

#![allow(dead_code, reason = "Common module may have unused helpers.")]
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

mod common;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use common::CountingNotifier;
use common::SlowNotifier;
use common::sample_notice;
use common::sample_notice_with;
use fw_recovery_broker::DEFAULT_DEDUP_WINDOW;
use fw_recovery_broker::DedupNotifier;
use fw_recovery_core::Notifier;
use fw_recovery_core::NotifyError;
use fw_recovery_core::TransientError;

#[test]
fn identical_notices_are_delivered_once() {
    let inner = CountingNotifier::default();
    let notifier = DedupNotifier::new(inner.clone());
    assert_eq!(notifier.window(), DEFAULT_DEDUP_WINDOW);

    let first = notifier.publish(&sample_notice("dev-1")).unwrap();
    let second = notifier.publish(&sample_notice("dev-1")).unwrap();

    assert_eq!(inner.delivered(), 1);
    assert!(!first.duplicate);
    assert!(second.duplicate);
    assert_eq!(second.message_id, first.message_id);
    assert_eq!(second.dedup_id, first.dedup_id);
}

#[test]
fn distinct_notices_are_each_delivered() {
    let inner = CountingNotifier::default();
    let notifier = DedupNotifier::new(inner.clone());

    notifier.publish(&sample_notice("dev-1")).unwrap();
    notifier.publish(&sample_notice("dev-2")).unwrap();
    // A later quarantine of the same device is a different notice.
    notifier.publish(&sample_notice_with("dev-1", 2, 1_700_000_500_000)).unwrap();

    assert_eq!(inner.delivered(), 3);
}

#[test]
fn failed_deliveries_are_not_remembered() {
    let inner = CountingNotifier::default();
    let notifier = DedupNotifier::new(inner.clone());

    inner.set_down(true);
    assert!(notifier.publish(&sample_notice("dev-1")).is_err());
    inner.set_down(false);
    let receipt = notifier.publish(&sample_notice("dev-1")).unwrap();

    assert!(!receipt.duplicate);
    assert_eq!(inner.delivered(), 1);
}

#[test]
fn expired_entries_allow_redelivery() {
    let inner = CountingNotifier::default();
    let notifier = DedupNotifier::with_window(inner.clone(), Duration::from_millis(20));

    notifier.publish(&sample_notice("dev-1")).unwrap();
    std::thread::sleep(Duration::from_millis(50));
    let again = notifier.publish(&sample_notice("dev-1")).unwrap();

    assert!(!again.duplicate);
    assert_eq!(inner.delivered(), 2);
}

#[test]
fn zero_window_disables_dedup() {
    let inner = CountingNotifier::default();
    let notifier = DedupNotifier::with_window(inner.clone(), Duration::ZERO);

    notifier.publish(&sample_notice("dev-1")).unwrap();
    notifier.publish(&sample_notice("dev-1")).unwrap();

    assert_eq!(inner.delivered(), 2);
    assert_eq!(notifier.inner().delivered(), 2);
}

#[test]
fn publish_during_inflight_delivery_is_refused_transiently() {
    let inner = SlowNotifier::new(Duration::from_millis(150));
    let notifier = Arc::new(DedupNotifier::new(inner.clone()));
    let background = {
        let notifier = Arc::clone(&notifier);
        thread::spawn(move || notifier.publish(&sample_notice("dev-1")))
    };
    thread::sleep(Duration::from_millis(40));

    let err = notifier.publish(&sample_notice("dev-1")).unwrap_err();
    assert!(matches!(err, NotifyError::Unavailable(_)));
    assert!(err.is_transient());

    let first = background.join().unwrap().unwrap();
    let retried = notifier.publish(&sample_notice("dev-1")).unwrap();
    assert!(!first.duplicate);
    assert!(retried.duplicate);
    assert_eq!(retried.message_id, first.message_id);
    assert_eq!(inner.delivered(), 1);
}

#[test]
fn concurrent_first_publishes_deliver_once() {
    let inner = SlowNotifier::new(Duration::from_millis(100));
    let notifier = Arc::new(DedupNotifier::new(inner.clone()));
    let handles: Vec<_> = (0 .. 4)
        .map(|_| {
            let notifier = Arc::clone(&notifier);
            thread::spawn(move || notifier.publish(&sample_notice("dev-1")))
        })
        .collect();
    let delivered = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .filter(|result| result.as_ref().is_ok_and(|receipt| !receipt.duplicate))
        .count();

    assert_eq!(delivered, 1);
    assert_eq!(inner.delivered(), 1);
}

#[test]
fn stale_reservation_expires_with_the_window() {
    let inner = SlowNotifier::new(Duration::from_millis(120));
    let notifier = Arc::new(DedupNotifier::with_window(inner.clone(), Duration::from_millis(20)));
    let background = {
        let notifier = Arc::clone(&notifier);
        thread::spawn(move || notifier.publish(&sample_notice("dev-1")))
    };
    thread::sleep(Duration::from_millis(50));

    let receipt = notifier.publish(&sample_notice("dev-1")).unwrap();
    assert!(!receipt.duplicate);
    background.join().unwrap().unwrap();
    assert_eq!(inner.delivered(), 2);
}

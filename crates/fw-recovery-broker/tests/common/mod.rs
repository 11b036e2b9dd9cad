// crates/fw-recovery-broker/tests/common/mod.rs
// ============================================================================
// Module: Common Test Utilities
// Description: Shared helpers for fw-recovery-broker tests.
// Purpose: Provide sample notices and writer doubles for notifier tests.
// Dependencies: fw-recovery-core
// ============================================================================

//! ## Overview
//! Provides sample quarantine notices plus shared and failing writers.

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

use std::io::Write;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use fw_recovery_core::DeviceId;
use fw_recovery_core::Notifier;
use fw_recovery_core::NotifyError;
use fw_recovery_core::PublishReceipt;
use fw_recovery_core::QuarantineNotice;
use fw_recovery_core::QuarantineReason;
use fw_recovery_core::Timestamp;

// ============================================================================
// SECTION: Notice Helpers
// ============================================================================

/// Creates a sample notice for the first quarantine of `device`.
pub fn sample_notice(device: &str) -> QuarantineNotice {
    sample_notice_with(device, 1, 1_700_000_000_000)
}

/// Creates a notice with explicit quarantine count and timestamp.
pub fn sample_notice_with(device: &str, quarantine_count: u32, at_ms: i64) -> QuarantineNotice {
    QuarantineNotice {
        device_id: DeviceId::new(device),
        reason: QuarantineReason::RetryBudgetExceeded,
        retry_count_at_quarantine: 3,
        quarantine_count,
        timestamp: Timestamp::UnixMillis(at_ms),
    }
}

// ============================================================================
// SECTION: Shared Buffer for Write Testing
// ============================================================================

/// A thread-safe buffer for testing Write implementations.
#[derive(Clone, Default)]
pub struct SharedBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    /// Creates a new empty shared buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the contents as a string.
    pub fn to_string_lossy(&self) -> String {
        let guard = self.inner.lock().expect("buffer lock");
        String::from_utf8_lossy(&guard).to_string()
    }

    /// Returns true if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().expect("buffer lock").is_empty()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.inner.lock().expect("buffer lock").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

// ============================================================================
// SECTION: Failing Writer for Error Testing
// ============================================================================

/// A writer that always fails, for testing error paths.
pub struct FailingWriter;

impl Write for FailingWriter {
    fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
        Err(std::io::Error::other("simulated write failure"))
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

// ============================================================================
// SECTION: Counting Notifier
// ============================================================================

/// Notifier that counts deliveries and can be switched off.
#[derive(Clone, Default)]
pub struct CountingNotifier {
    delivered: Arc<AtomicUsize>,
    down: Arc<Mutex<bool>>,
}

impl CountingNotifier {
    /// Returns the number of successful deliveries.
    pub fn delivered(&self) -> usize {
        self.delivered.load(Ordering::SeqCst)
    }

    /// Makes subsequent publishes fail (or succeed again).
    pub fn set_down(&self, down: bool) {
        *self.down.lock().expect("down lock") = down;
    }
}

impl Notifier for CountingNotifier {
    fn publish(&self, notice: &QuarantineNotice) -> Result<PublishReceipt, NotifyError> {
        if *self.down.lock().expect("down lock") {
            return Err(NotifyError::Unavailable("counting notifier down".to_string()));
        }
        let seq = self.delivered.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(PublishReceipt {
            message_id: format!("count-{seq}"),
            dedup_id: notice.dedup_id().expect("dedup id").value,
            duplicate: false,
        })
    }
}

// ============================================================================
// SECTION: Slow Notifier
// ============================================================================

/// Counting notifier that holds every publish for a fixed delay first.
#[derive(Clone)]
pub struct SlowNotifier {
    counting: CountingNotifier,
    delay: Duration,
}

impl SlowNotifier {
    /// Creates a notifier that sleeps `delay` before each delivery.
    pub fn new(delay: Duration) -> Self {
        Self {
            counting: CountingNotifier::default(),
            delay,
        }
    }

    /// Returns the number of successful deliveries.
    pub fn delivered(&self) -> usize {
        self.counting.delivered()
    }
}

impl Notifier for SlowNotifier {
    fn publish(&self, notice: &QuarantineNotice) -> Result<PublishReceipt, NotifyError> {
        thread::sleep(self.delay);
        self.counting.publish(notice)
    }
}

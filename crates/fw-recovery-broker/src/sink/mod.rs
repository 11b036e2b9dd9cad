// crates/fw-recovery-broker/src/sink/mod.rs
// ============================================================================
// Module: Firmware Recovery Notifier Sinks
// Description: Receipt helpers and reference notifier implementations.
// Purpose: Deliver rendered quarantine notices to concrete targets.
// Dependencies: fw-recovery-core, std
// ============================================================================

//! ## Overview
//! Sinks render a [`fw_recovery_core::QuarantineNotice`] with their
//! [`crate::NotificationTemplate`], deliver it, and return a
//! [`PublishReceipt`]. Delivery failures are reported as
//! [`fw_recovery_core::NotifyError`] and never yield a receipt.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use fw_recovery_core::PublishReceipt;

use crate::message::NotificationMessage;

// ============================================================================
// SECTION: Receipt Helpers
// ============================================================================

/// Builds sequential publish receipts.
#[derive(Debug)]
pub(crate) struct ReceiptFactory {
    /// Dispatcher name used as the message id prefix.
    dispatcher: String,
    /// Monotonic counter.
    counter: AtomicU64,
}

impl ReceiptFactory {
    /// Creates a receipt factory with the provided dispatcher name.
    pub(crate) fn new(dispatcher: impl Into<String>) -> Self {
        Self {
            dispatcher: dispatcher.into(),
            counter: AtomicU64::new(0),
        }
    }

    /// Returns the dispatcher name.
    pub(crate) fn dispatcher(&self) -> &str {
        &self.dispatcher
    }

    /// Returns the next receipt for a message.
    pub(crate) fn next(&self, message: &NotificationMessage) -> PublishReceipt {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        PublishReceipt {
            message_id: format!("{}-{}", self.dispatcher, seq),
            dedup_id: message.dedup_id.clone(),
            duplicate: false,
        }
    }
}

// ============================================================================
// SECTION: Implementations
// ============================================================================

pub mod callback;
pub mod channel;
pub mod log;

pub use callback::CallbackNotifier;
pub use channel::ChannelNotifier;
pub use log::LogNotifier;

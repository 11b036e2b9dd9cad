// crates/fw-recovery-broker/src/sink/channel.rs
// ============================================================================
// Module: Channel Notifier
// Description: Channel-based notifier for asynchronous consumers.
// Purpose: Send rendered notices through a Tokio mpsc channel.
// Dependencies: fw-recovery-core, tokio
// ============================================================================

//! ## Overview
//! [`ChannelNotifier`] delivers notices by sending rendered
//! [`NotificationMessage`] values into a `tokio::sync::mpsc` channel.
//! Invariants:
//! - Successful publishes enqueue exactly one message.
//! - A full channel is reported as a transient failure; a closed channel is
//!   permanent.

// ============================================================================
// SECTION: Imports
// ============================================================================

use fw_recovery_core::Notifier;
use fw_recovery_core::NotifyError;
use fw_recovery_core::PublishReceipt;
use fw_recovery_core::QuarantineNotice;
use tokio::sync::mpsc::Sender;
use tokio::sync::mpsc::error::TrySendError;

use crate::message::NotificationMessage;
use crate::message::NotificationTemplate;
use crate::sink::ReceiptFactory;

// ============================================================================
// SECTION: Channel Notifier
// ============================================================================

/// Channel-based notifier.
#[derive(Debug)]
pub struct ChannelNotifier {
    /// Sender used to enqueue messages.
    sender: Sender<NotificationMessage>,
    /// Rendering template.
    template: NotificationTemplate,
    /// Receipt factory for sequential message ids.
    receipts: ReceiptFactory,
}

impl ChannelNotifier {
    /// Creates a channel notifier with the default template.
    #[must_use]
    pub fn new(sender: Sender<NotificationMessage>) -> Self {
        Self::with_template(sender, NotificationTemplate::default())
    }

    /// Creates a channel notifier with a custom template.
    #[must_use]
    pub fn with_template(sender: Sender<NotificationMessage>, template: NotificationTemplate) -> Self {
        Self {
            sender,
            template,
            receipts: ReceiptFactory::new("channel"),
        }
    }
}

impl Notifier for ChannelNotifier {
    fn publish(&self, notice: &QuarantineNotice) -> Result<PublishReceipt, NotifyError> {
        let message = self.template.render(notice)?;
        let receipt = self.receipts.next(&message);
        self.sender.try_send(message).map_err(|err| match err {
            TrySendError::Full(_) => {
                NotifyError::Unavailable("notification channel full".to_string())
            }
            TrySendError::Closed(_) => {
                NotifyError::Rejected("notification channel closed".to_string())
            }
        })?;
        Ok(receipt)
    }
}

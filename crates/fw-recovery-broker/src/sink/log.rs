// crates/fw-recovery-broker/src/sink/log.rs
// ============================================================================
// Module: Log Notifier
// Description: JSON-line notifier for files and standard streams.
// Purpose: Record quarantine notices where no message bus is available.
// Dependencies: fw-recovery-core, serde_json, std
// ============================================================================

//! ## Overview
//! `LogNotifier` writes one JSON record per published notice and returns the
//! receipt once the line has been written and flushed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::sync::Mutex;

use fw_recovery_core::Notifier;
use fw_recovery_core::NotifyError;
use fw_recovery_core::PublishReceipt;
use fw_recovery_core::QuarantineNotice;
use serde_json::json;

use crate::message::NotificationTemplate;
use crate::sink::ReceiptFactory;

// ============================================================================
// SECTION: Log Notifier
// ============================================================================

/// JSON-line notifier.
pub struct LogNotifier<W: Write + Send> {
    /// Output writer for notification records.
    writer: Mutex<W>,
    /// Rendering template.
    template: NotificationTemplate,
    /// Receipt factory for sequential message ids.
    receipts: ReceiptFactory,
}

impl<W: Write + Send> LogNotifier<W> {
    /// Creates a log notifier with the default template and dispatcher name.
    pub fn new(writer: W) -> Self {
        Self::with_template(writer, NotificationTemplate::default())
    }

    /// Creates a log notifier with a custom template.
    pub fn with_template(writer: W, template: NotificationTemplate) -> Self {
        Self {
            writer: Mutex::new(writer),
            template,
            receipts: ReceiptFactory::new("log"),
        }
    }

    /// Overrides the dispatcher name used as the message id prefix.
    #[must_use]
    pub fn with_dispatcher(mut self, dispatcher: impl Into<String>) -> Self {
        self.receipts = ReceiptFactory::new(dispatcher);
        self
    }
}

impl<W: Write + Send> Notifier for LogNotifier<W> {
    fn publish(&self, notice: &QuarantineNotice) -> Result<PublishReceipt, NotifyError> {
        let message = self.template.render(notice)?;
        let receipt = self.receipts.next(&message);
        let record = json!({
            "message_id": receipt.message_id,
            "dispatcher": self.receipts.dispatcher(),
            "subject": message.subject,
            "message_group": message.message_group,
            "dedup_id": message.dedup_id,
            "body": message.body,
            "notice": message.notice,
        });
        let mut line =
            serde_json::to_vec(&record).map_err(|err| NotifyError::Encoding(err.to_string()))?;
        line.push(b'\n');
        let mut guard = self
            .writer
            .lock()
            .map_err(|_| NotifyError::Rejected("log writer mutex poisoned".to_string()))?;
        guard.write_all(&line).map_err(|err| NotifyError::Unavailable(err.to_string()))?;
        guard.flush().map_err(|err| NotifyError::Unavailable(err.to_string()))?;
        drop(guard);
        Ok(receipt)
    }
}

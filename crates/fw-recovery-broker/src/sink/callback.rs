// crates/fw-recovery-broker/src/sink/callback.rs
// ============================================================================
// Module: Callback Notifier
// Description: Callback-based notifier for embedders.
// Purpose: Invoke a user-provided function with rendered notices.
// Dependencies: fw-recovery-core, std
// ============================================================================

//! ## Overview
//! [`CallbackNotifier`] hands each rendered message to a user-supplied
//! function. The receipt is issued only when the handler returns `Ok`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use fw_recovery_core::Notifier;
use fw_recovery_core::NotifyError;
use fw_recovery_core::PublishReceipt;
use fw_recovery_core::QuarantineNotice;

use crate::message::NotificationMessage;
use crate::message::NotificationTemplate;
use crate::sink::ReceiptFactory;

// ============================================================================
// SECTION: Callback Notifier
// ============================================================================

/// Callback handler signature used by the notifier.
type CallbackHandler = dyn Fn(&NotificationMessage) -> Result<(), NotifyError> + Send + Sync;

/// Callback-based notifier.
#[derive(Clone)]
pub struct CallbackNotifier {
    /// Handler invoked with each rendered message.
    handler: Arc<CallbackHandler>,
    /// Rendering template.
    template: NotificationTemplate,
    /// Receipt factory shared between clones.
    receipts: Arc<ReceiptFactory>,
}

impl CallbackNotifier {
    /// Creates a callback notifier from a handler function.
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&NotificationMessage) -> Result<(), NotifyError> + Send + Sync + 'static,
    {
        Self {
            handler: Arc::new(handler),
            template: NotificationTemplate::default(),
            receipts: Arc::new(ReceiptFactory::new("callback")),
        }
    }

    /// Replaces the rendering template.
    #[must_use]
    pub fn with_template(mut self, template: NotificationTemplate) -> Self {
        self.template = template;
        self
    }
}

impl Notifier for CallbackNotifier {
    fn publish(&self, notice: &QuarantineNotice) -> Result<PublishReceipt, NotifyError> {
        let message = self.template.render(notice)?;
        (self.handler)(&message)?;
        Ok(self.receipts.next(&message))
    }
}

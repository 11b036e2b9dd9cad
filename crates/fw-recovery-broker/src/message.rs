// crates/fw-recovery-broker/src/message.rs
// ============================================================================
// Module: Notification Message
// Description: Rendered quarantine notification with subject and dedup id.
// Purpose: Give every notifier the same channel-ready message shape.
// Dependencies: fw-recovery-core, serde
// ============================================================================

//! ## Overview
//! A [`NotificationMessage`] is the channel-facing rendering of a
//! [`QuarantineNotice`]: subject line, text body, ordering group, and the
//! notice's content-hash dedup id. Rendering is a pure function of the notice
//! and the template, so re-publishing a committed quarantine yields the same
//! message.

// ============================================================================
// SECTION: Imports
// ============================================================================

use fw_recovery_core::DEFAULT_MESSAGE_GROUP;
use fw_recovery_core::DEFAULT_NOTIFICATION_SUBJECT;
use fw_recovery_core::NotifyError;
use fw_recovery_core::QuarantineNotice;
use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Template
// ============================================================================

/// Static parts of a rendered notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationTemplate {
    /// Subject line.
    pub subject: String,
    /// Ordering group for FIFO channels.
    pub message_group: String,
}

impl Default for NotificationTemplate {
    fn default() -> Self {
        Self {
            subject: DEFAULT_NOTIFICATION_SUBJECT.to_string(),
            message_group: DEFAULT_MESSAGE_GROUP.to_string(),
        }
    }
}

impl NotificationTemplate {
    /// Renders a notice into a message.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Encoding`] when the notice cannot be hashed.
    pub fn render(&self, notice: &QuarantineNotice) -> Result<NotificationMessage, NotifyError> {
        let dedup_id = notice.dedup_id().map_err(|err| NotifyError::Encoding(err.to_string()))?;
        Ok(NotificationMessage {
            subject: self.subject.clone(),
            body: notice.body_text(),
            message_group: self.message_group.clone(),
            dedup_id: dedup_id.value,
            notice: notice.clone(),
        })
    }
}

// ============================================================================
// SECTION: Message
// ============================================================================

/// Channel-ready quarantine notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationMessage {
    /// Subject line.
    pub subject: String,
    /// Human-readable body.
    pub body: String,
    /// Ordering group.
    pub message_group: String,
    /// Content-hash dedup id (hex).
    pub dedup_id: String,
    /// Structured notice.
    pub notice: QuarantineNotice,
}

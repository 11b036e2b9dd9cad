// crates/fw-recovery-broker/src/lib.rs
// ============================================================================
// Module: Firmware Recovery Broker Library
// Description: Reference notifiers for quarantine notices.
// Purpose: Render and deliver quarantine notices with content deduplication.
// Dependencies: fw-recovery-core, serde_json, tokio
// ============================================================================

//! ## Overview
//! Firmware Recovery Broker provides ready-made [`fw_recovery_core::Notifier`]
//! implementations plus the [`DedupNotifier`] wrapper that suppresses repeat
//! publishes of the same notice inside a time window.
//! Invariants:
//! - Every rendered message carries the notice's content-hash dedup id.
//! - Notifiers return receipts only on successful delivery.
//! - A duplicate publish inside the window is answered with the original
//!   receipt and `duplicate = true`, without reaching the inner notifier.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod dedup;
pub mod message;
pub mod sink;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use dedup::DEFAULT_DEDUP_WINDOW;
pub use dedup::DedupNotifier;
pub use message::NotificationMessage;
pub use message::NotificationTemplate;
pub use sink::CallbackNotifier;
pub use sink::ChannelNotifier;
pub use sink::LogNotifier;

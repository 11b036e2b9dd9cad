// crates/fw-recovery-broker/src/dedup.rs
// ============================================================================
// Module: Deduplicating Notifier
// Description: Content-hash dedup wrapper around any notifier.
// Purpose: Turn at-least-once publishing into one delivery per window.
// Dependencies: fw-recovery-core, std
// ============================================================================

//! ## Overview
//! [`DedupNotifier`] remembers the receipt of every notice it delivered,
//! keyed by the notice's content-hash dedup id. A repeat publish inside the
//! window returns the remembered receipt flagged `duplicate = true` and never
//! reaches the inner notifier. Entries older than the window are pruned on
//! each publish.
//!
//! The dedup id is reserved before the inner notifier runs. A publish that
//! arrives while the reservation is open (for example a retry issued after
//! the first call timed out) fails with a transient
//! [`NotifyError::Unavailable`] instead of delivering again; once the first
//! call lands, the next retry sees the delivered receipt. A failed delivery
//! releases its reservation, and a reservation older than the window is
//! pruned like any other entry so a hung inner call cannot block forever.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;
use std::time::Instant;

use fw_recovery_core::Notifier;
use fw_recovery_core::NotifyError;
use fw_recovery_core::PublishReceipt;
use fw_recovery_core::QuarantineNotice;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default dedup window (five minutes).
pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_secs(300);

// ============================================================================
// SECTION: Dedup Notifier
// ============================================================================

/// Dedup table entry for one notice.
#[derive(Debug, Clone)]
enum Entry {
    /// A publish is running against the inner notifier.
    InFlight {
        /// When the reservation was taken.
        since: Instant,
    },
    /// The notice was delivered.
    Delivered {
        /// When the delivery completed.
        at: Instant,
        /// Receipt of the first delivery.
        receipt: PublishReceipt,
    },
}

impl Entry {
    /// Instant the window is measured from.
    const fn started(&self) -> Instant {
        match self {
            Self::InFlight {
                since,
            } => *since,
            Self::Delivered {
                at,
                ..
            } => *at,
        }
    }
}

/// Notifier wrapper that suppresses repeats of the same notice.
pub struct DedupNotifier<N> {
    /// Wrapped notifier.
    inner: N,
    /// Dedup window.
    window: Duration,
    /// Reserved and delivered notices keyed by dedup id.
    entries: Mutex<HashMap<String, Entry>>,
}

impl<N: Notifier> DedupNotifier<N> {
    /// Wraps `inner` with the default window.
    pub fn new(inner: N) -> Self {
        Self::with_window(inner, DEFAULT_DEDUP_WINDOW)
    }

    /// Wraps `inner` with a custom window.
    pub fn with_window(inner: N, window: Duration) -> Self {
        Self {
            inner,
            window,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the dedup window.
    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }

    /// Returns the wrapped notifier.
    pub const fn inner(&self) -> &N {
        &self.inner
    }

    /// Locks the dedup table.
    fn table(&self) -> Result<MutexGuard<'_, HashMap<String, Entry>>, NotifyError> {
        self.entries
            .lock()
            .map_err(|_| NotifyError::Rejected("dedup table mutex poisoned".to_string()))
    }
}

impl<N: Notifier> Notifier for DedupNotifier<N> {
    fn publish(&self, notice: &QuarantineNotice) -> Result<PublishReceipt, NotifyError> {
        let dedup_id =
            notice.dedup_id().map_err(|err| NotifyError::Encoding(err.to_string()))?.value;
        if self.window.is_zero() {
            return self.inner.publish(notice);
        }
        let now = Instant::now();
        {
            let mut table = self.table()?;
            table.retain(|_, entry| now.duration_since(entry.started()) < self.window);
            match table.get(&dedup_id) {
                Some(Entry::Delivered {
                    receipt,
                    ..
                }) => {
                    return Ok(PublishReceipt {
                        duplicate: true,
                        ..receipt.clone()
                    });
                }
                Some(Entry::InFlight {
                    ..
                }) => {
                    return Err(NotifyError::Unavailable(format!(
                        "delivery of notice {dedup_id} still in flight"
                    )));
                }
                None => {
                    table.insert(dedup_id.clone(), Entry::InFlight {
                        since: now,
                    });
                }
            }
        }

        match self.inner.publish(notice) {
            Ok(receipt) => {
                self.table()?.insert(dedup_id, Entry::Delivered {
                    at: Instant::now(),
                    receipt: receipt.clone(),
                });
                Ok(receipt)
            }
            Err(err) => {
                if let Ok(mut table) = self.table()
                    && matches!(table.get(&dedup_id), Some(Entry::InFlight { .. }))
                {
                    table.remove(&dedup_id);
                }
                Err(err)
            }
        }
    }
}

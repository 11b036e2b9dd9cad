// crates/fw-recovery-core/src/core/time.rs
// ============================================================================
// Module: Firmware Recovery Time Model
// Description: Canonical timestamp representations for events and records.
// Purpose: Provide deterministic, replayable time values across device records.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! The workflow never reads wall-clock time for persisted state; every record
//! timestamp comes from the triggering event. Hosts supply timestamps when
//! they build events.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::cmp::Ordering;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Time Values
// ============================================================================

/// Canonical timestamp used in device records and notifications.
///
/// # Invariants
/// - Values are explicitly provided by callers; the core never reads wall-clock time.
/// - Timestamps of different kinds are not ordered relative to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Timestamp {
    /// Unix epoch milliseconds.
    UnixMillis(i64),
    /// Monotonic logical time value.
    Logical(u64),
}

impl Timestamp {
    /// Returns the timestamp as unix milliseconds when available.
    #[must_use]
    pub const fn as_unix_millis(&self) -> Option<i64> {
        match self {
            Self::UnixMillis(value) => Some(*value),
            Self::Logical(_) => None,
        }
    }

    /// Returns the timestamp as logical time when available.
    #[must_use]
    pub const fn as_logical(&self) -> Option<u64> {
        match self {
            Self::UnixMillis(_) => None,
            Self::Logical(value) => Some(*value),
        }
    }

    /// Orders two timestamps of the same kind; mixed kinds return `None`.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::UnixMillis(left), Self::UnixMillis(right)) => Some(left.cmp(right)),
            (Self::Logical(left), Self::Logical(right)) => Some(left.cmp(right)),
            _ => None,
        }
    }

    /// Returns true when `self` is strictly later than `other`.
    #[must_use]
    pub fn is_after(&self, other: &Self) -> bool {
        self.compare(other) == Some(Ordering::Greater)
    }
}

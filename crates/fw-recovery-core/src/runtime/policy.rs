// crates/fw-recovery-core/src/runtime/policy.rs
// ============================================================================
// Module: Workflow Policies
// Description: Retry threshold, I/O backoff, and group configuration.
// Purpose: Hold validated tuning knobs consumed by the workflow engine.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! Policies are plain data. [`WorkflowConfig::validate`] rejects values the
//! engine cannot honor; hosts usually build these from the TOML config crate.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use crate::core::identifiers::GroupName;
use crate::core::identifiers::MAX_GROUP_NAME_LENGTH;

// ============================================================================
// SECTION: Defaults
// ============================================================================

/// Default failures per episode before quarantine.
pub const DEFAULT_RETRY_THRESHOLD: u32 = 3;
/// Default attempts per I/O call (first try included).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Default delay before the first retry.
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(100);
/// Default backoff ceiling.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(2_000);
/// Default backoff multiplier.
pub const DEFAULT_MULTIPLIER: u32 = 2;
/// Default per-call timeout.
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_millis(5_000);
/// Default quarantine group name.
pub const DEFAULT_QUARANTINE_GROUP: &str = "FailedToUpdate";

// ============================================================================
// SECTION: Policies
// ============================================================================

/// Episode retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retry count at which a device is quarantined.
    pub retry_threshold: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry_threshold: DEFAULT_RETRY_THRESHOLD,
        }
    }
}

/// Bounded exponential backoff for transient I/O failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Attempts per call, first try included.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub initial_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Growth factor between consecutive delays.
    pub multiplier: u32,
    /// Timeout applied to each individual call.
    pub step_timeout: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay: DEFAULT_INITIAL_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            multiplier: DEFAULT_MULTIPLIER,
            step_timeout: DEFAULT_STEP_TIMEOUT,
        }
    }
}

impl BackoffPolicy {
    /// Returns the sleep after failed attempt number `attempt` (1-based).
    ///
    /// `initial_delay * multiplier^(attempt - 1)`, capped at `max_delay`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = self.multiplier.checked_pow(exponent).unwrap_or(u32::MAX);
        self.initial_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Policy with no delays, for tests and local tooling.
    #[must_use]
    pub const fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1,
            step_timeout: DEFAULT_STEP_TIMEOUT,
        }
    }
}

/// Full workflow configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowConfig {
    /// Episode retry budget.
    pub retry: RetryPolicy,
    /// I/O backoff.
    pub backoff: BackoffPolicy,
    /// Group quarantined devices are moved into.
    pub quarantine_group: GroupName,
    /// Groups a quarantined device is removed from.
    pub operational_groups: Vec<GroupName>,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            backoff: BackoffPolicy::default(),
            quarantine_group: GroupName::new(DEFAULT_QUARANTINE_GROUP),
            operational_groups: Vec::new(),
        }
    }
}

impl WorkflowConfig {
    /// Checks values the engine relies on.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid value.
    pub fn validate(&self) -> Result<(), String> {
        if self.retry.retry_threshold == 0 {
            return Err("retry_threshold must be at least 1".to_string());
        }
        if self.backoff.max_attempts == 0 {
            return Err("max_attempts must be at least 1".to_string());
        }
        if self.backoff.multiplier == 0 {
            return Err("multiplier must be at least 1".to_string());
        }
        if self.backoff.step_timeout.is_zero() {
            return Err("step_timeout must be greater than zero".to_string());
        }
        if self.backoff.max_delay < self.backoff.initial_delay {
            return Err("max_delay must be >= initial_delay".to_string());
        }
        validate_group_name(&self.quarantine_group)?;
        for group in &self.operational_groups {
            validate_group_name(group)?;
            if group == &self.quarantine_group {
                return Err(format!(
                    "operational group {group} duplicates the quarantine group"
                ));
            }
        }
        Ok(())
    }
}

/// Rejects empty or overlong group names.
fn validate_group_name(group: &GroupName) -> Result<(), String> {
    if group.as_str().trim().is_empty() {
        return Err("group name must be non-empty".to_string());
    }
    if group.as_str().len() > MAX_GROUP_NAME_LENGTH {
        return Err(format!("group name exceeds {MAX_GROUP_NAME_LENGTH} bytes: {group}"));
    }
    Ok(())
}

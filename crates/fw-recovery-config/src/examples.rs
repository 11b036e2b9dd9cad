// crates/fw-recovery-config/src/examples.rs
// ============================================================================
// Module: Config Examples
// Description: Canonical example configuration payload.
// Purpose: Deterministic example for docs and the CLI.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Canonical example for the firmware recovery configuration. The output is
//! deterministic and loads cleanly through [`crate::FwRecoveryConfig`].

/// Returns a canonical example `fw-recovery.toml` configuration.
#[must_use]
pub fn config_toml_example() -> String {
    String::from(
        r#"[policy]
retry_threshold = 3

[backoff]
max_attempts = 3
initial_delay_ms = 100
max_delay_ms = 2000
multiplier = 2
step_timeout_ms = 5000

[groups]
quarantine_group = "FailedToUpdate"
operational_groups = ["fleet-default"]

[notifier]
type = "log"
path = "notifications.jsonl"
dedup_window_ms = 300000
subject = "Firmware Update Failure Alert"
message_group = "FirmwareUpdateFailure"

[store]
type = "sqlite"
path = "fw-recovery.sqlite"
busy_timeout_ms = 5000
journal_mode = "wal"
sync_mode = "full"

[audit]
type = "stderr"
# type = "file"
# path = "audit.jsonl"
"#,
    )
}

//! Section validation tests for fw-recovery-config.
// crates/fw-recovery-config/tests/section_validation.rs
// =============================================================================
// Module: Config Section Validation Tests
// Description: Validate range and cross-field checks for every section.
// Purpose: Ensure invalid settings are rejected before the workflow starts.
// =============================================================================

use fw_recovery_config::ConfigError;
use fw_recovery_config::FwRecoveryConfig;

type TestResult = Result<(), String>;

fn assert_invalid(toml: &str, needle: &str) -> TestResult {
    match FwRecoveryConfig::from_toml_str(toml) {
        Err(ConfigError::Invalid(message)) => {
            if message.contains(needle) {
                Ok(())
            } else {
                Err(format!("error {message} did not contain {needle}"))
            }
        }
        Err(other) => Err(format!("unexpected error kind: {other}")),
        Ok(_) => Err(format!("expected invalid config for: {toml}")),
    }
}

fn assert_valid(toml: &str) -> Result<FwRecoveryConfig, String> {
    FwRecoveryConfig::from_toml_str(toml).map_err(|err| err.to_string())
}

// ============================================================================
// SECTION: Policy and Backoff
// ============================================================================

#[test]
fn policy_rejects_zero_threshold() -> TestResult {
    assert_invalid("[policy]\nretry_threshold = 0\n", "retry_threshold")
}

#[test]
fn policy_accepts_threshold_of_one() -> TestResult {
    let config = assert_valid("[policy]\nretry_threshold = 1\n")?;
    if config.workflow_config().retry.retry_threshold != 1 {
        return Err("threshold not applied".to_string());
    }
    Ok(())
}

#[test]
fn backoff_rejects_out_of_range_values() -> TestResult {
    assert_invalid("[backoff]\nmax_attempts = 0\n", "max_attempts")?;
    assert_invalid("[backoff]\nmax_attempts = 11\n", "max_attempts")?;
    assert_invalid("[backoff]\nmultiplier = 0\n", "multiplier")?;
    assert_invalid("[backoff]\nstep_timeout_ms = 5\n", "step_timeout_ms")?;
    assert_invalid("[backoff]\nstep_timeout_ms = 60001\n", "step_timeout_ms")?;
    assert_invalid("[backoff]\ninitial_delay_ms = 500\nmax_delay_ms = 100\n", "max_delay_ms")
}

#[test]
fn backoff_accepts_boundaries() -> TestResult {
    assert_valid(
        "[backoff]\nmax_attempts = 10\nmultiplier = 10\nstep_timeout_ms = 10\ninitial_delay_ms \
         = 0\nmax_delay_ms = 0\n",
    )?;
    Ok(())
}

// ============================================================================
// SECTION: Groups
// ============================================================================

#[test]
fn groups_reject_quarantine_group_in_operational_groups() -> TestResult {
    assert_invalid(
        "[groups]\nquarantine_group = \"q\"\noperational_groups = [\"a\", \"q\"]\n",
        "must not contain the quarantine group",
    )
}

#[test]
fn groups_reject_empty_and_overlong_names() -> TestResult {
    assert_invalid("[groups]\nquarantine_group = \"\"\n", "non-empty")?;
    let long = "g".repeat(129);
    assert_invalid(&format!("[groups]\noperational_groups = [\"{long}\"]\n"), "at most 128")
}

#[test]
fn groups_reject_duplicate_operational_groups() -> TestResult {
    assert_invalid("[groups]\noperational_groups = [\"a\", \"a\"]\n", "duplicate")
}

// ============================================================================
// SECTION: Notifier, Store, Audit
// ============================================================================

#[test]
fn notifier_log_requires_path() -> TestResult {
    assert_invalid("[notifier]\ntype = \"log\"\n", "log notifier requires path")
}

#[test]
fn notifier_stderr_rejects_path() -> TestResult {
    assert_invalid("[notifier]\ntype = \"stderr\"\npath = \"n.jsonl\"\n", "must not set path")
}

#[test]
fn notifier_rejects_blank_subject() -> TestResult {
    assert_invalid("[notifier]\nsubject = \"  \"\n", "notifier.subject")
}

#[test]
fn store_sqlite_requires_path() -> TestResult {
    assert_invalid("[store]\ntype = \"sqlite\"\n", "sqlite store requires path")
}

#[test]
fn store_memory_rejects_path() -> TestResult {
    assert_invalid("[store]\ntype = \"memory\"\npath = \"x.sqlite\"\n", "must not set path")
}

#[test]
fn store_sqlite_builds_store_config() -> TestResult {
    let config = assert_valid(
        "[store]\ntype = \"sqlite\"\npath = \"state/devices.sqlite\"\nbusy_timeout_ms = \
         250\njournal_mode = \"delete\"\n",
    )?;
    let sqlite = config.store.sqlite_config().ok_or("missing sqlite config")?;
    if sqlite.busy_timeout_ms != 250 || sqlite.path.to_string_lossy() != "state/devices.sqlite" {
        return Err("sqlite config mismatch".to_string());
    }
    Ok(())
}

#[test]
fn audit_file_requires_path_and_stderr_rejects_it() -> TestResult {
    assert_invalid("[audit]\ntype = \"file\"\n", "file audit sink requires path")?;
    assert_invalid("[audit]\ntype = \"none\"\npath = \"a.jsonl\"\n", "only valid for the file")?;
    assert_valid("[audit]\ntype = \"file\"\npath = \"audit.jsonl\"\n")?;
    Ok(())
}

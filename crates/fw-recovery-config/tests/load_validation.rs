//! Config load validation tests for fw-recovery-config.
// crates/fw-recovery-config/tests/load_validation.rs
// =============================================================================
// Module: Config Load Validation Tests
// Description: Validate config loading guards (path, size, encoding).
// Purpose: Ensure config input handling is strict and fail-closed.
// =============================================================================

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use fw_recovery_config::ConfigError;
use fw_recovery_config::FwRecoveryConfig;
use fw_recovery_config::NotifierType;
use fw_recovery_config::StoreType;
use fw_recovery_config::config_toml_example;
use tempfile::NamedTempFile;

type TestResult = Result<(), String>;

fn assert_invalid(result: Result<FwRecoveryConfig, ConfigError>, needle: &str) -> TestResult {
    match result {
        Err(error) => {
            let message = error.to_string();
            if message.contains(needle) {
                Ok(())
            } else {
                Err(format!("error {message} did not contain {needle}"))
            }
        }
        Ok(_) => Err("expected invalid config load".to_string()),
    }
}

fn write_config(contents: &[u8]) -> Result<NamedTempFile, String> {
    let mut file = NamedTempFile::new().map_err(|err| err.to_string())?;
    file.write_all(contents).map_err(|err| err.to_string())?;
    Ok(file)
}

#[test]
fn load_rejects_path_too_long() -> TestResult {
    let long_path = "a".repeat(5_000);
    let path = Path::new(&long_path);
    assert_invalid(FwRecoveryConfig::load(Some(path)), "config path exceeds max length")
}

#[test]
fn load_rejects_path_component_too_long() -> TestResult {
    let long_component = "a".repeat(300);
    let path = Path::new(&long_component);
    assert_invalid(FwRecoveryConfig::load(Some(path)), "config path component too long")
}

#[test]
fn load_rejects_missing_file() -> TestResult {
    let dir = tempfile::TempDir::new().map_err(|err| err.to_string())?;
    let path = dir.path().join("absent.toml");
    assert_invalid(FwRecoveryConfig::load(Some(&path)), "config io error")
}

#[test]
fn load_rejects_oversized_file() -> TestResult {
    let file = write_config(&vec![b'#'; 1_048_577])?;
    assert_invalid(FwRecoveryConfig::load(Some(file.path())), "config file exceeds size limit")
}

#[test]
fn load_rejects_non_utf8_file() -> TestResult {
    let file = write_config(&[0xFF, 0xFE, 0xFF])?;
    assert_invalid(FwRecoveryConfig::load(Some(file.path())), "config file must be utf-8")
}

#[test]
fn load_rejects_unknown_keys() -> TestResult {
    let file = write_config(b"[policy]\nretry_threshold = 3\nretry_limit = 4\n")?;
    assert_invalid(FwRecoveryConfig::load(Some(file.path())), "config parse error")
}

#[test]
fn load_accepts_empty_file_with_defaults() -> TestResult {
    let file = write_config(b"")?;
    let config = FwRecoveryConfig::load(Some(file.path())).map_err(|err| err.to_string())?;
    if config != FwRecoveryConfig::default() {
        return Err("empty config should equal defaults".to_string());
    }
    let workflow = config.workflow_config();
    if workflow.retry.retry_threshold != 3 || workflow.backoff.max_attempts != 3 {
        return Err("default workflow config mismatch".to_string());
    }
    if workflow.backoff.step_timeout != Duration::from_millis(5_000) {
        return Err("default step timeout mismatch".to_string());
    }
    Ok(())
}

#[test]
fn example_config_round_trips_through_loader() -> TestResult {
    let file = write_config(config_toml_example().as_bytes())?;
    let config = FwRecoveryConfig::load(Some(file.path())).map_err(|err| err.to_string())?;
    if config.notifier.notifier_type != NotifierType::Log {
        return Err("example should use the log notifier".to_string());
    }
    if config.store.store_type != StoreType::Sqlite || config.store.sqlite_config().is_none() {
        return Err("example should use the sqlite store".to_string());
    }
    let workflow = config.workflow_config();
    if workflow.quarantine_group.as_str() != "FailedToUpdate" {
        return Err("example quarantine group mismatch".to_string());
    }
    if workflow.operational_groups.len() != 1 {
        return Err("example operational groups mismatch".to_string());
    }
    if config.notifier.dedup_window() != Duration::from_secs(300) {
        return Err("example dedup window mismatch".to_string());
    }
    Ok(())
}

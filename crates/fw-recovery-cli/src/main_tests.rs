// crates/fw-recovery-cli/src/main_tests.rs
// ============================================================================
// Module: CLI Main Helpers Tests
// Description: Unit tests for input limits, argument parsing, and assembly.
// Purpose: Ensure bounded reads fail closed and config maps onto backends.
// Dependencies: fw-recovery-cli main helpers, tempfile
// ============================================================================

//! ## Overview
//! Validates `read_bytes_with_limit`, timestamp resolution, clap wiring, and
//! backend assembly from config sections.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::io::Cursor;
use std::path::PathBuf;

use clap::Parser;
use fw_recovery_config::AuditConfig;
use fw_recovery_config::AuditType;
use fw_recovery_config::FwRecoveryConfig;
use fw_recovery_config::NotifierConfig;
use fw_recovery_config::NotifierType;
use fw_recovery_config::StoreConfig;
use fw_recovery_config::StoreType;
use fw_recovery_core::DeviceId;
use fw_recovery_core::DeviceStatus;
use fw_recovery_core::QuarantineNotice;
use fw_recovery_core::QuarantineReason;
use fw_recovery_core::Timestamp;
use tempfile::TempDir;

use super::Cli;
use super::Commands;
use super::DeviceCommand;
use super::ReadLimitError;
use super::StatusArg;
use super::assembly::AssemblyError;
use super::assembly::build_audit_sink;
use super::assembly::build_device_stores;
use super::assembly::build_notifier;
use super::assembly::build_workflow;
use super::read_bytes_with_limit;
use super::read_to_limit;
use super::resolve_timestamp;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn temp_file(dir: &TempDir, name: &str) -> PathBuf {
    dir.path().join(name)
}

fn sample_notice() -> QuarantineNotice {
    QuarantineNotice {
        device_id: DeviceId::new("device-1"),
        reason: QuarantineReason::RetryBudgetExceeded,
        retry_count_at_quarantine: 3,
        quarantine_count: 1,
        timestamp: Timestamp::Logical(7),
    }
}

// ============================================================================
// SECTION: Bounded Reads
// ============================================================================

#[test]
fn read_bytes_with_limit_allows_small_file() {
    let dir = TempDir::new().expect("temp dir");
    let path = temp_file(&dir, "small.json");
    fs::write(&path, b"ok").expect("write small file");

    let bytes = read_bytes_with_limit(&path, 16).expect("read small file");
    assert_eq!(bytes, b"ok");
}

#[test]
fn read_bytes_with_limit_rejects_large_file() {
    let dir = TempDir::new().expect("temp dir");
    let path = temp_file(&dir, "large.json");
    let limit = 8_usize;
    fs::write(&path, vec![0_u8; limit + 1]).expect("write large file");

    let err = read_bytes_with_limit(&path, limit).expect_err("expected size limit failure");
    match err {
        ReadLimitError::TooLarge {
            size,
            limit: reported,
        } => {
            assert!(size > u64::try_from(limit).expect("limit fits"));
            assert_eq!(reported, limit);
        }
        ReadLimitError::Io(err) => panic!("unexpected IO error: {err}"),
    }
}

#[test]
fn read_bytes_with_limit_reports_missing_file_as_io() {
    let dir = TempDir::new().expect("temp dir");
    let err = read_bytes_with_limit(&temp_file(&dir, "missing.json"), 16)
        .expect_err("expected io failure");
    assert!(matches!(err, ReadLimitError::Io(_)));
}

#[test]
fn read_to_limit_rejects_streams_past_the_limit() {
    let exact = read_to_limit(Cursor::new(vec![1_u8; 4]), 4).expect("exact limit");
    assert_eq!(exact.len(), 4);

    let err = read_to_limit(Cursor::new(vec![1_u8; 5]), 4).expect_err("over limit");
    assert!(matches!(
        err,
        ReadLimitError::TooLarge {
            size: 5,
            limit: 4
        }
    ));
}

// ============================================================================
// SECTION: Timestamps and Arguments
// ============================================================================

#[test]
fn resolve_timestamp_honors_override() {
    let at = resolve_timestamp(Some(1_700_000_000_000)).expect("override");
    assert_eq!(at, Timestamp::UnixMillis(1_700_000_000_000));
}

#[test]
fn resolve_timestamp_rejects_negative_override() {
    let err = resolve_timestamp(Some(-1)).expect_err("negative");
    assert!(err.to_string().contains("non-negative"));
}

#[test]
fn resolve_timestamp_reads_system_clock() {
    let at = resolve_timestamp(None).expect("clock");
    assert!(at.as_unix_millis().is_some_and(|millis| millis > 0));
}

#[test]
fn status_filter_maps_onto_device_status() {
    assert_eq!(DeviceStatus::from(StatusArg::Active), DeviceStatus::Active);
    assert_eq!(DeviceStatus::from(StatusArg::Retrying), DeviceStatus::Retrying);
    assert_eq!(DeviceStatus::from(StatusArg::Quarantined), DeviceStatus::Quarantined);
}

#[test]
fn cli_parses_global_config_after_subcommand() {
    let cli = Cli::try_parse_from([
        "fw-recovery",
        "device",
        "list",
        "--status",
        "quarantined",
        "--config",
        "custom.toml",
    ])
    .expect("parse");
    assert_eq!(cli.config, Some(PathBuf::from("custom.toml")));
    match cli.command {
        Some(Commands::Device {
            command: DeviceCommand::List(list),
        }) => assert_eq!(list.status, Some(StatusArg::Quarantined)),
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn cli_rejects_unknown_status() {
    let result = Cli::try_parse_from(["fw-recovery", "device", "list", "--status", "broken"]);
    assert!(result.is_err());
}

// ============================================================================
// SECTION: Assembly
// ============================================================================

#[test]
fn memory_store_assembly_starts_empty() {
    let stores = build_device_stores(&StoreConfig::default()).expect("memory stores");
    let records = stores.retry_store.list(None).expect("list");
    assert!(records.is_empty());
}

#[test]
fn sqlite_store_assembly_shares_one_database() {
    let dir = TempDir::new().expect("temp dir");
    let config = StoreConfig {
        store_type: StoreType::Sqlite,
        path: Some(temp_file(&dir, "devices.sqlite")),
        ..StoreConfig::default()
    };
    let stores = build_device_stores(&config).expect("sqlite stores");
    let device = DeviceId::new("device-1");
    stores.retry_store.increment_retry_count(&device, Timestamp::Logical(1)).expect("increment");

    let reopened = build_device_stores(&config).expect("reopen");
    let record = reopened.retry_store.get(&device).expect("get").expect("record");
    assert_eq!(record.retry_count, 1);
}

#[test]
fn sqlite_store_assembly_without_path_is_incomplete() {
    let config = StoreConfig {
        store_type: StoreType::Sqlite,
        path: None,
        ..StoreConfig::default()
    };
    let err = build_device_stores(&config).err().expect("missing path");
    assert!(matches!(err, AssemblyError::Incomplete("store.path")));
}

#[test]
fn log_notifier_appends_and_deduplicates() {
    let dir = TempDir::new().expect("temp dir");
    let path = temp_file(&dir, "notifications.jsonl");
    let config = NotifierConfig {
        notifier_type: NotifierType::Log,
        path: Some(path.clone()),
        ..NotifierConfig::default()
    };
    let notifier = build_notifier(&config).expect("notifier");

    let first = notifier.publish(&sample_notice()).expect("first publish");
    let second = notifier.publish(&sample_notice()).expect("second publish");
    assert!(!first.duplicate);
    assert!(second.duplicate);
    assert_eq!(first.message_id, second.message_id);

    let content = fs::read_to_string(&path).expect("read log");
    assert_eq!(content.lines().count(), 1);
    assert!(content.contains("device-1"));
}

#[test]
fn file_audit_sink_requires_path() {
    let config = AuditConfig {
        audit_type: AuditType::File,
        path: None,
    };
    let err = build_audit_sink(&config).err().expect("missing path");
    assert!(matches!(err, AssemblyError::Incomplete("audit.path")));
}

#[test]
fn workflow_assembles_from_default_config() {
    let workflow = build_workflow(&FwRecoveryConfig::default()).expect("workflow");
    assert_eq!(workflow.config().retry.retry_threshold, 3);
}

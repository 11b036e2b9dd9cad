// crates/fw-recovery-cli/src/main.rs
// ============================================================================
// Module: Firmware Recovery CLI Entry Point
// Description: Command dispatcher for the firmware recovery workflow.
// Purpose: Trigger, inspect, and release devices from the command line.
// Dependencies: clap, fw-recovery-config, fw-recovery-core, serde, thiserror, tokio.
// ============================================================================

//! ## Overview
//! The `fw-recovery` CLI assembles the workflow from a TOML config and runs
//! one operation per invocation: a failure trigger, a recovery signal, or an
//! operator command against the device stores. Structured results are printed
//! as canonical JSON on stdout; failures go to stderr with exit code 1.
//! Event inputs are untrusted and read under a hard size limit.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub(crate) mod assembly;
#[cfg(test)]
mod main_tests;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::File;
use std::io::Read;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use clap::ArgAction;
use clap::Args;
use clap::CommandFactory;
use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use fw_recovery_config::FwRecoveryConfig;
use fw_recovery_config::config_toml_example;
use fw_recovery_core::DeviceId;
use fw_recovery_core::DeviceRecord;
use fw_recovery_core::DeviceStatus;
use fw_recovery_core::FailureEvent;
use fw_recovery_core::FirmwareUpdateWorkflow;
use fw_recovery_core::RecoveryEvent;
use fw_recovery_core::RecoveryOutcome;
use fw_recovery_core::RetryRecord;
use fw_recovery_core::Timestamp;
use serde::Serialize;
use thiserror::Error;

use crate::assembly::build_workflow;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum size of a failure event JSON input.
const MAX_EVENT_BYTES: usize = 256 * 1024;
/// Event path that selects standard input.
const STDIN_PATH: &str = "-";

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "fw-recovery", disable_help_subcommand = true, disable_version_flag = true)]
struct Cli {
    /// Print version information and exit.
    #[arg(long = "version", action = ArgAction::SetTrue, global = true)]
    show_version: bool,
    /// Optional config file path (defaults to fw-recovery.toml or env override).
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the workflow for one "device update failed" event.
    Trigger(TriggerCommand),
    /// Apply a "device update succeeded" signal.
    Recover(RecoverCommand),
    /// Device inspection and operator utilities.
    Device {
        /// Selected device subcommand.
        #[command(subcommand)]
        command: DeviceCommand,
    },
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

/// Device subcommands.
#[derive(Subcommand, Debug)]
enum DeviceCommand {
    /// Print the combined retry record and attribute snapshot of a device.
    Show(DeviceShowCommand),
    /// List retry records, optionally filtered by status.
    List(DeviceListCommand),
    /// Reset a device to ACTIVE and remove it from the quarantine group.
    Release(DeviceReleaseCommand),
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Validate a configuration file.
    Validate,
    /// Print a canonical example configuration.
    Example,
}

/// Arguments for `trigger`.
#[derive(Args, Debug)]
struct TriggerCommand {
    /// Path to the failure event JSON (`-` reads stdin).
    #[arg(long, value_name = "PATH")]
    event: PathBuf,
}

/// Arguments for `recover`.
#[derive(Args, Debug)]
struct RecoverCommand {
    /// Device that recovered.
    #[arg(long, value_name = "DEVICE_ID")]
    device: String,
    /// Override the event timestamp (unix milliseconds).
    #[arg(long, value_name = "UNIX_MS")]
    at_unix_ms: Option<i64>,
}

/// Arguments for `device show`.
#[derive(Args, Debug)]
struct DeviceShowCommand {
    /// Device to inspect.
    #[arg(long, value_name = "DEVICE_ID")]
    device: String,
}

/// Arguments for `device list`.
#[derive(Args, Debug)]
struct DeviceListCommand {
    /// Optional status filter.
    #[arg(long, value_enum, value_name = "STATUS")]
    status: Option<StatusArg>,
}

/// Arguments for `device release`.
#[derive(Args, Debug)]
struct DeviceReleaseCommand {
    /// Device to release.
    #[arg(long, value_name = "DEVICE_ID")]
    device: String,
    /// Override the release timestamp (unix milliseconds).
    #[arg(long, value_name = "UNIX_MS")]
    at_unix_ms: Option<i64>,
}

/// Status filter values.
#[derive(ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
enum StatusArg {
    /// No open retry episode.
    Active,
    /// Retry episode open.
    Retrying,
    /// Quarantined pending operator release.
    Quarantined,
}

impl From<StatusArg> for DeviceStatus {
    fn from(value: StatusArg) -> Self {
        match value {
            StatusArg::Active => Self::Active,
            StatusArg::Retrying => Self::Retrying,
            StatusArg::Quarantined => Self::Quarantined,
        }
    }
}

// ============================================================================
// SECTION: Output Types
// ============================================================================

/// Output of `recover`.
#[derive(Debug, Serialize)]
struct RecoverOutput {
    /// Device the signal applied to.
    device_id: DeviceId,
    /// Recovery result.
    #[serde(flatten)]
    outcome: RecoveryOutcome,
}

/// Output of `device show`.
#[derive(Debug, Serialize)]
struct DeviceShowOutput {
    /// Effective status (ACTIVE when no record exists).
    status: DeviceStatus,
    /// Effective retry count.
    retry_count: u32,
    /// Stored records.
    #[serde(flatten)]
    record: DeviceRecord,
}

/// Output of `device list`.
#[derive(Debug, Serialize)]
struct DeviceListOutput {
    /// Matching retry records.
    devices: Vec<RetryRecord>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper for user-facing messages.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`] from a message.
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
async fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();

    if cli.show_version {
        let version = env!("CARGO_PKG_VERSION");
        write_stdout_line(&format!("fw-recovery {version}"))
            .map_err(|err| CliError::new(output_error("stdout", &err)))?;
        return Ok(ExitCode::SUCCESS);
    }

    let Some(command) = cli.command else {
        show_help()?;
        return Ok(ExitCode::SUCCESS);
    };

    let config_path = cli.config.as_deref();
    match command {
        Commands::Trigger(command) => command_trigger(config_path, &command).await,
        Commands::Recover(command) => command_recover(config_path, &command).await,
        Commands::Device {
            command,
        } => command_device(config_path, command).await,
        Commands::Config {
            command,
        } => command_config(config_path, &command),
    }
}

/// Prints the top-level help text.
fn show_help() -> CliResult<()> {
    let mut command = Cli::command();
    command.print_help().map_err(|err| CliError::new(output_error("stdout", &err)))?;
    write_stdout_line("").map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(())
}

// ============================================================================
// SECTION: Workflow Commands
// ============================================================================

/// Executes `trigger`.
async fn command_trigger(config_path: Option<&Path>, command: &TriggerCommand) -> CliResult<ExitCode> {
    let event = read_failure_event(&command.event)?;
    let workflow = open_workflow(config_path)?;
    let report = workflow
        .handle_failure(&event)
        .await
        .map_err(|err| CliError::new(format!("Workflow failed: {err}")))?;
    write_canonical_json(&report)?;
    Ok(ExitCode::SUCCESS)
}

/// Executes `recover`.
async fn command_recover(config_path: Option<&Path>, command: &RecoverCommand) -> CliResult<ExitCode> {
    let event = RecoveryEvent {
        device_id: DeviceId::new(command.device.as_str()),
        event_timestamp: resolve_timestamp(command.at_unix_ms)?,
    };
    let workflow = open_workflow(config_path)?;
    let outcome = workflow
        .handle_recovery(&event)
        .await
        .map_err(|err| CliError::new(format!("Recovery failed: {err}")))?;
    write_canonical_json(&RecoverOutput {
        device_id: event.device_id,
        outcome,
    })?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Device Commands
// ============================================================================

/// Dispatches device subcommands.
async fn command_device(config_path: Option<&Path>, command: DeviceCommand) -> CliResult<ExitCode> {
    let workflow = open_workflow(config_path)?;
    match command {
        DeviceCommand::Show(command) => command_device_show(&workflow, &command).await,
        DeviceCommand::List(command) => command_device_list(&workflow, &command).await,
        DeviceCommand::Release(command) => command_device_release(&workflow, &command).await,
    }
}

/// Executes `device show`.
async fn command_device_show(
    workflow: &FirmwareUpdateWorkflow,
    command: &DeviceShowCommand,
) -> CliResult<ExitCode> {
    let device_id = DeviceId::new(command.device.as_str());
    let record = workflow
        .inspect(&device_id)
        .await
        .map_err(|err| CliError::new(format!("Device lookup failed: {err}")))?;
    write_canonical_json(&DeviceShowOutput {
        status: record.status(),
        retry_count: record.retry_count(),
        record,
    })?;
    Ok(ExitCode::SUCCESS)
}

/// Executes `device list`.
async fn command_device_list(
    workflow: &FirmwareUpdateWorkflow,
    command: &DeviceListCommand,
) -> CliResult<ExitCode> {
    let devices = workflow
        .list_devices(command.status.map(DeviceStatus::from))
        .await
        .map_err(|err| CliError::new(format!("Device listing failed: {err}")))?;
    write_canonical_json(&DeviceListOutput {
        devices,
    })?;
    Ok(ExitCode::SUCCESS)
}

/// Executes `device release`.
async fn command_device_release(
    workflow: &FirmwareUpdateWorkflow,
    command: &DeviceReleaseCommand,
) -> CliResult<ExitCode> {
    let device_id = DeviceId::new(command.device.as_str());
    let at = resolve_timestamp(command.at_unix_ms)?;
    let outcome = workflow
        .release_device(&device_id, at)
        .await
        .map_err(|err| CliError::new(format!("Device release failed: {err}")))?;
    write_canonical_json(&outcome)?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Config Commands
// ============================================================================

/// Dispatches config subcommands.
fn command_config(config_path: Option<&Path>, command: &ConfigCommand) -> CliResult<ExitCode> {
    match command {
        ConfigCommand::Validate => {
            load_config(config_path)?;
            write_stdout_line("Config valid.")
                .map_err(|err| CliError::new(output_error("stdout", &err)))?;
        }
        ConfigCommand::Example => {
            write_stdout_bytes(config_toml_example().as_bytes())
                .map_err(|err| CliError::new(output_error("stdout", &err)))?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Assembly Helpers
// ============================================================================

/// Loads and validates the configuration.
fn load_config(config_path: Option<&Path>) -> CliResult<FwRecoveryConfig> {
    FwRecoveryConfig::load(config_path)
        .map_err(|err| CliError::new(format!("Failed to load config: {err}")))
}

/// Loads the configuration and assembles the workflow.
fn open_workflow(config_path: Option<&Path>) -> CliResult<FirmwareUpdateWorkflow> {
    let config = load_config(config_path)?;
    build_workflow(&config)
        .map_err(|err| CliError::new(format!("Failed to assemble workflow: {err}")))
}

/// Resolves an explicit timestamp or reads the system clock.
fn resolve_timestamp(override_unix_ms: Option<i64>) -> CliResult<Timestamp> {
    if let Some(value) = override_unix_ms {
        if value < 0 {
            return Err(CliError::new(
                "Timestamp must be a non-negative unix timestamp in milliseconds.".to_string(),
            ));
        }
        return Ok(Timestamp::UnixMillis(value));
    }

    let duration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|err| CliError::new(format!("Failed to read system time: {err}")))?;
    let millis = i64::try_from(duration.as_millis())
        .map_err(|_| CliError::new("System time is out of range.".to_string()))?;
    Ok(Timestamp::UnixMillis(millis))
}

// ============================================================================
// SECTION: Input Helpers
// ============================================================================

/// Reads and parses a failure event from a file or stdin.
fn read_failure_event(path: &Path) -> CliResult<FailureEvent> {
    let read = if path.as_os_str() == STDIN_PATH {
        read_stdin_with_limit(MAX_EVENT_BYTES)
    } else {
        read_bytes_with_limit(path, MAX_EVENT_BYTES)
    };
    let bytes = read.map_err(|err| read_limit_message("failure event", path, err))?;
    serde_json::from_slice(&bytes)
        .map_err(|err| CliError::new(format!("Invalid failure event JSON: {err}")))
}

/// Maps a bounded-read failure onto a CLI error.
fn read_limit_message(kind: &str, path: &Path, err: ReadLimitError) -> CliError {
    match err {
        ReadLimitError::Io(err) => {
            CliError::new(format!("Failed to read {kind} at {}: {err}", path.display()))
        }
        ReadLimitError::TooLarge {
            size,
            limit,
        } => CliError::new(format!(
            "Refusing to read {kind} at {} because it is {size} bytes (limit {limit}).",
            path.display()
        )),
    }
}

/// Errors returned by bounded reads.
#[derive(Debug)]
enum ReadLimitError {
    /// I/O failure.
    Io(std::io::Error),
    /// Input exceeds the configured limit.
    TooLarge {
        /// Observed size in bytes.
        size: u64,
        /// Allowed limit in bytes.
        limit: usize,
    },
}

/// Reads a file from disk while enforcing a hard size limit.
fn read_bytes_with_limit(path: &Path, max_bytes: usize) -> Result<Vec<u8>, ReadLimitError> {
    let file = File::open(path).map_err(ReadLimitError::Io)?;
    let metadata = file.metadata().map_err(ReadLimitError::Io)?;
    let size = metadata.len();
    let limit = u64::try_from(max_bytes).map_err(|_| ReadLimitError::TooLarge {
        size,
        limit: max_bytes,
    })?;
    if size > limit {
        return Err(ReadLimitError::TooLarge {
            size,
            limit: max_bytes,
        });
    }
    read_to_limit(file, max_bytes)
}

/// Reads stdin while enforcing a hard size limit.
fn read_stdin_with_limit(max_bytes: usize) -> Result<Vec<u8>, ReadLimitError> {
    read_to_limit(std::io::stdin().lock(), max_bytes)
}

/// Reads at most `max_bytes + 1` bytes and rejects anything past the limit.
fn read_to_limit<R: Read>(reader: R, max_bytes: usize) -> Result<Vec<u8>, ReadLimitError> {
    let read_limit = u64::try_from(max_bytes).unwrap_or(u64::MAX).saturating_add(1);
    let mut limited = reader.take(read_limit);
    let mut bytes = Vec::new();
    limited.read_to_end(&mut bytes).map_err(ReadLimitError::Io)?;
    if bytes.len() > max_bytes {
        let actual = u64::try_from(bytes.len()).unwrap_or(u64::MAX);
        return Err(ReadLimitError::TooLarge {
            size: actual,
            limit: max_bytes,
        });
    }
    Ok(bytes)
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Writes a single line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes raw bytes to stdout without adding a newline.
fn write_stdout_bytes(bytes: &[u8]) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    stdout.write_all(bytes)
}

/// Writes a value to stdout as canonical JSON followed by a newline.
fn write_canonical_json<T: Serialize>(value: &T) -> CliResult<()> {
    let mut bytes = serde_jcs::to_vec(value)
        .map_err(|err| CliError::new(format!("Failed to encode output JSON: {err}")))?;
    bytes.push(b'\n');
    write_stdout_bytes(&bytes).map_err(|err| CliError::new(output_error("stdout", &err)))
}

/// Writes a single line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Formats an output error message.
fn output_error(stream: &str, error: &std::io::Error) -> String {
    format!("Failed to write to {stream}: {error}")
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}

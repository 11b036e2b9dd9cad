// crates/fw-recovery-config/src/config.rs
// ============================================================================
// Module: Firmware Recovery Configuration
// Description: Configuration loading and validation for the recovery workflow.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: fw-recovery-core, fw-recovery-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! The path resolves from an explicit argument, then the `FW_RECOVERY_CONFIG`
//! environment variable, then `fw-recovery.toml` in the working directory.
//! Unknown keys, out-of-range values, and inconsistent sections fail closed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use fw_recovery_core::BackoffPolicy;
use fw_recovery_core::DEFAULT_MESSAGE_GROUP;
use fw_recovery_core::DEFAULT_NOTIFICATION_SUBJECT;
use fw_recovery_core::GroupName;
use fw_recovery_core::MAX_GROUP_NAME_LENGTH;
use fw_recovery_core::RetryPolicy;
use fw_recovery_core::WorkflowConfig;
use fw_recovery_core::runtime::policy::DEFAULT_INITIAL_DELAY;
use fw_recovery_core::runtime::policy::DEFAULT_MAX_ATTEMPTS;
use fw_recovery_core::runtime::policy::DEFAULT_MAX_DELAY;
use fw_recovery_core::runtime::policy::DEFAULT_MULTIPLIER;
use fw_recovery_core::runtime::policy::DEFAULT_QUARANTINE_GROUP;
use fw_recovery_core::runtime::policy::DEFAULT_RETRY_THRESHOLD;
use fw_recovery_core::runtime::policy::DEFAULT_STEP_TIMEOUT;
use fw_recovery_store_sqlite::SqliteStoreConfig;
use fw_recovery_store_sqlite::SqliteStoreMode;
use fw_recovery_store_sqlite::SqliteSyncMode;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "fw-recovery.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "FW_RECOVERY_CONFIG";
/// Maximum configuration file size in bytes.
pub const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Upper bound for I/O attempts per step.
const MAX_IO_ATTEMPTS: u32 = 10;
/// Upper bound for the backoff multiplier.
const MAX_BACKOFF_MULTIPLIER: u32 = 10;
/// Lower bound for the per-call timeout.
const MIN_STEP_TIMEOUT_MS: u64 = 10;
/// Upper bound for the per-call timeout.
const MAX_STEP_TIMEOUT_MS: u64 = 60_000;
/// Upper bound for any backoff delay.
const MAX_BACKOFF_DELAY_MS: u64 = 60_000;
/// Upper bound for the notification dedup window (one day).
const MAX_DEDUP_WINDOW_MS: u64 = 86_400_000;
/// Default notification dedup window (five minutes).
const DEFAULT_DEDUP_WINDOW_MS: u64 = 300_000;
/// Default `SQLite` busy timeout.
const DEFAULT_STORE_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum subject or message group length.
const MAX_NOTIFICATION_LABEL_LENGTH: usize = 256;

// ============================================================================
// SECTION: Root Config
// ============================================================================

/// Firmware recovery configuration loaded from TOML.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FwRecoveryConfig {
    /// Retry threshold configuration.
    #[serde(default)]
    pub policy: PolicyConfig,
    /// Backoff configuration for external I/O.
    #[serde(default)]
    pub backoff: BackoffConfig,
    /// Device group configuration.
    #[serde(default)]
    pub groups: GroupsConfig,
    /// Notifier configuration.
    #[serde(default)]
    pub notifier: NotifierConfig,
    /// Device store configuration.
    #[serde(default)]
    pub store: StoreConfig,
    /// Audit sink configuration.
    #[serde(default)]
    pub audit: AuditConfig,
}

impl FwRecoveryConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        Self::from_toml_str(content)
    }

    /// Parses and validates configuration text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        if content.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.policy.validate()?;
        self.backoff.validate()?;
        self.groups.validate()?;
        self.notifier.validate()?;
        self.store.validate()?;
        self.audit.validate()?;
        self.workflow_config().validate().map_err(ConfigError::Invalid)
    }

    /// Builds the workflow configuration.
    #[must_use]
    pub fn workflow_config(&self) -> WorkflowConfig {
        WorkflowConfig {
            retry: RetryPolicy {
                retry_threshold: self.policy.retry_threshold,
            },
            backoff: BackoffPolicy {
                max_attempts: self.backoff.max_attempts,
                initial_delay: Duration::from_millis(self.backoff.initial_delay_ms),
                max_delay: Duration::from_millis(self.backoff.max_delay_ms),
                multiplier: self.backoff.multiplier,
                step_timeout: Duration::from_millis(self.backoff.step_timeout_ms),
            },
            quarantine_group: GroupName::new(self.groups.quarantine_group.as_str()),
            operational_groups: self
                .groups
                .operational_groups
                .iter()
                .map(|name| GroupName::new(name.as_str()))
                .collect(),
        }
    }
}

// ============================================================================
// SECTION: Policy
// ============================================================================

/// Retry threshold configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyConfig {
    /// Retry count at which a device is quarantined.
    #[serde(default = "default_retry_threshold")]
    pub retry_threshold: u32,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            retry_threshold: default_retry_threshold(),
        }
    }
}

impl PolicyConfig {
    /// Validates the retry threshold.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.retry_threshold == 0 {
            return Err(ConfigError::Invalid(
                "policy.retry_threshold must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Backoff
// ============================================================================

/// Backoff configuration for external I/O calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackoffConfig {
    /// Attempts per step, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Upper bound for any single delay.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Delay multiplier per attempt.
    #[serde(default = "default_multiplier")]
    pub multiplier: u32,
    /// Per-call timeout.
    #[serde(default = "default_step_timeout_ms")]
    pub step_timeout_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
            step_timeout_ms: default_step_timeout_ms(),
        }
    }
}

impl BackoffConfig {
    /// Validates backoff ranges.
    fn validate(&self) -> Result<(), ConfigError> {
        if !(1 ..= MAX_IO_ATTEMPTS).contains(&self.max_attempts) {
            return Err(ConfigError::Invalid(format!(
                "backoff.max_attempts must be between 1 and {MAX_IO_ATTEMPTS}"
            )));
        }
        if !(1 ..= MAX_BACKOFF_MULTIPLIER).contains(&self.multiplier) {
            return Err(ConfigError::Invalid(format!(
                "backoff.multiplier must be between 1 and {MAX_BACKOFF_MULTIPLIER}"
            )));
        }
        if self.max_delay_ms > MAX_BACKOFF_DELAY_MS {
            return Err(ConfigError::Invalid(format!(
                "backoff.max_delay_ms must be at most {MAX_BACKOFF_DELAY_MS}"
            )));
        }
        if self.max_delay_ms < self.initial_delay_ms {
            return Err(ConfigError::Invalid(
                "backoff.max_delay_ms must be >= backoff.initial_delay_ms".to_string(),
            ));
        }
        if !(MIN_STEP_TIMEOUT_MS ..= MAX_STEP_TIMEOUT_MS).contains(&self.step_timeout_ms) {
            return Err(ConfigError::Invalid(format!(
                "backoff.step_timeout_ms must be between {MIN_STEP_TIMEOUT_MS} and \
                 {MAX_STEP_TIMEOUT_MS}"
            )));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Groups
// ============================================================================

/// Device group configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroupsConfig {
    /// Group that quarantined devices are moved into.
    #[serde(default = "default_quarantine_group")]
    pub quarantine_group: String,
    /// Groups a device is removed from when quarantined.
    #[serde(default)]
    pub operational_groups: Vec<String>,
}

impl Default for GroupsConfig {
    fn default() -> Self {
        Self {
            quarantine_group: default_quarantine_group(),
            operational_groups: Vec::new(),
        }
    }
}

impl GroupsConfig {
    /// Validates group names and their relationships.
    fn validate(&self) -> Result<(), ConfigError> {
        validate_group_name("groups.quarantine_group", &self.quarantine_group)?;
        for (index, name) in self.operational_groups.iter().enumerate() {
            validate_group_name("groups.operational_groups", name)?;
            if *name == self.quarantine_group {
                return Err(ConfigError::Invalid(
                    "groups.operational_groups must not contain the quarantine group".to_string(),
                ));
            }
            if self.operational_groups[.. index].contains(name) {
                return Err(ConfigError::Invalid(format!(
                    "groups.operational_groups contains duplicate group: {name}"
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Notifier
// ============================================================================

/// Notifier backend type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NotifierType {
    /// Append JSON lines to a file.
    Log,
    /// Write JSON lines to stderr.
    #[default]
    Stderr,
}

/// Notifier configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NotifierConfig {
    /// Notifier backend type.
    #[serde(rename = "type", default)]
    pub notifier_type: NotifierType,
    /// Output path for the log backend.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Window in which identical notices are delivered once.
    #[serde(default = "default_dedup_window_ms")]
    pub dedup_window_ms: u64,
    /// Notification subject line.
    #[serde(default = "default_subject")]
    pub subject: String,
    /// Ordering group for FIFO channels.
    #[serde(default = "default_message_group")]
    pub message_group: String,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            notifier_type: NotifierType::default(),
            path: None,
            dedup_window_ms: default_dedup_window_ms(),
            subject: default_subject(),
            message_group: default_message_group(),
        }
    }
}

impl NotifierConfig {
    /// Returns the dedup window.
    #[must_use]
    pub const fn dedup_window(&self) -> Duration {
        Duration::from_millis(self.dedup_window_ms)
    }

    /// Validates notifier settings.
    fn validate(&self) -> Result<(), ConfigError> {
        match self.notifier_type {
            NotifierType::Log => {
                let path = self.path.as_ref().ok_or_else(|| {
                    ConfigError::Invalid("log notifier requires path".to_string())
                })?;
                validate_output_path("notifier.path", path)?;
            }
            NotifierType::Stderr => {
                if self.path.is_some() {
                    return Err(ConfigError::Invalid(
                        "stderr notifier must not set path".to_string(),
                    ));
                }
            }
        }
        if self.dedup_window_ms > MAX_DEDUP_WINDOW_MS {
            return Err(ConfigError::Invalid(format!(
                "notifier.dedup_window_ms must be at most {MAX_DEDUP_WINDOW_MS}"
            )));
        }
        validate_label("notifier.subject", &self.subject)?;
        validate_label("notifier.message_group", &self.message_group)
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Device store backend type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreType {
    /// Use the in-memory stores.
    #[default]
    Memory,
    /// Use the `SQLite`-backed durable store.
    Sqlite,
}

/// Device store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Store backend type.
    #[serde(rename = "type", default)]
    pub store_type: StoreType,
    /// `SQLite` database path when using the sqlite backend.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_store_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` synchronous mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            store_type: StoreType::default(),
            path: None,
            busy_timeout_ms: default_store_busy_timeout_ms(),
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

impl StoreConfig {
    /// Returns the `SQLite` config when the sqlite backend is selected.
    #[must_use]
    pub fn sqlite_config(&self) -> Option<SqliteStoreConfig> {
        match (self.store_type, &self.path) {
            (StoreType::Sqlite, Some(path)) => Some(SqliteStoreConfig {
                path: path.clone(),
                busy_timeout_ms: self.busy_timeout_ms,
                journal_mode: self.journal_mode,
                sync_mode: self.sync_mode,
            }),
            _ => None,
        }
    }

    /// Validates store settings.
    fn validate(&self) -> Result<(), ConfigError> {
        match self.store_type {
            StoreType::Memory => {
                if self.path.is_some() {
                    return Err(ConfigError::Invalid("memory store must not set path".to_string()));
                }
                Ok(())
            }
            StoreType::Sqlite => {
                let path = self.path.as_ref().ok_or_else(|| {
                    ConfigError::Invalid("sqlite store requires path".to_string())
                })?;
                validate_output_path("store.path", path)
            }
        }
    }
}

// ============================================================================
// SECTION: Audit
// ============================================================================

/// Audit sink type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuditType {
    /// JSON lines on stderr.
    #[default]
    Stderr,
    /// Append JSON lines to a file.
    File,
    /// Discard audit events.
    None,
}

/// Audit sink configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditConfig {
    /// Audit sink type.
    #[serde(rename = "type", default)]
    pub audit_type: AuditType,
    /// Output path for the file sink.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl AuditConfig {
    /// Validates audit settings.
    fn validate(&self) -> Result<(), ConfigError> {
        match (self.audit_type, &self.path) {
            (AuditType::File, Some(path)) => validate_output_path("audit.path", path),
            (AuditType::File, None) => {
                Err(ConfigError::Invalid("file audit sink requires path".to_string()))
            }
            (AuditType::Stderr | AuditType::None, Some(_)) => Err(ConfigError::Invalid(
                "audit.path is only valid for the file audit sink".to_string(),
            )),
            (AuditType::Stderr | AuditType::None, None) => Ok(()),
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from CLI or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against security limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates an output file path from the config.
fn validate_output_path(field: &str, path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.trim().is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in path.components() {
        if component.as_os_str().to_string_lossy().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

/// Validates a device group name.
fn validate_group_name(field: &str, name: &str) -> Result<(), ConfigError> {
    if name.trim().is_empty() {
        return Err(ConfigError::Invalid(format!("{field} entries must be non-empty")));
    }
    if name.len() > MAX_GROUP_NAME_LENGTH {
        return Err(ConfigError::Invalid(format!(
            "{field} entries must be at most {MAX_GROUP_NAME_LENGTH} bytes"
        )));
    }
    Ok(())
}

/// Validates a notification label.
fn validate_label(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if value.len() > MAX_NOTIFICATION_LABEL_LENGTH {
        return Err(ConfigError::Invalid(format!(
            "{field} must be at most {MAX_NOTIFICATION_LABEL_LENGTH} bytes"
        )));
    }
    Ok(())
}

// ============================================================================
// SECTION: Defaults
// ============================================================================

/// Default retry threshold.
const fn default_retry_threshold() -> u32 {
    DEFAULT_RETRY_THRESHOLD
}

/// Default attempts per step.
const fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

/// Default initial backoff delay.
const fn default_initial_delay_ms() -> u64 {
    duration_millis(DEFAULT_INITIAL_DELAY)
}

/// Default backoff ceiling.
const fn default_max_delay_ms() -> u64 {
    duration_millis(DEFAULT_MAX_DELAY)
}

/// Default backoff multiplier.
const fn default_multiplier() -> u32 {
    DEFAULT_MULTIPLIER
}

/// Default per-call timeout.
const fn default_step_timeout_ms() -> u64 {
    duration_millis(DEFAULT_STEP_TIMEOUT)
}

/// Default quarantine group.
fn default_quarantine_group() -> String {
    DEFAULT_QUARANTINE_GROUP.to_string()
}

/// Default dedup window.
const fn default_dedup_window_ms() -> u64 {
    DEFAULT_DEDUP_WINDOW_MS
}

/// Default notification subject.
fn default_subject() -> String {
    DEFAULT_NOTIFICATION_SUBJECT.to_string()
}

/// Default message group.
fn default_message_group() -> String {
    DEFAULT_MESSAGE_GROUP.to_string()
}

/// Default `SQLite` busy timeout.
const fn default_store_busy_timeout_ms() -> u64 {
    DEFAULT_STORE_BUSY_TIMEOUT_MS
}

/// Converts a default duration into whole milliseconds.
const fn duration_millis(duration: Duration) -> u64 {
    duration.as_secs() * 1_000 + duration.subsec_millis() as u64
}

// crates/fw-recovery-cli/src/assembly.rs
// ============================================================================
// Module: Workflow Assembly
// Description: Builds workflow collaborators from a loaded configuration.
// Purpose: Map config sections onto store, notifier, and audit backends.
// Dependencies: fw-recovery-broker, fw-recovery-config, fw-recovery-core, fw-recovery-store-sqlite
// ============================================================================

//! ## Overview
//! Assembly turns a validated [`FwRecoveryConfig`] into a ready
//! [`FirmwareUpdateWorkflow`]. The `SQLite` backend serves all four device
//! traits from one connection; the memory backend lives only as long as the
//! process. Every notifier is wrapped in a [`DedupNotifier`] using the
//! configured window.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::sync::Arc;

use fw_recovery_broker::DedupNotifier;
use fw_recovery_broker::LogNotifier;
use fw_recovery_broker::NotificationTemplate;
use fw_recovery_config::AuditConfig;
use fw_recovery_config::AuditType;
use fw_recovery_config::FwRecoveryConfig;
use fw_recovery_config::NotifierConfig;
use fw_recovery_config::NotifierType;
use fw_recovery_config::StoreConfig;
use fw_recovery_config::StoreType;
use fw_recovery_core::AttributeStore;
use fw_recovery_core::AuditSink;
use fw_recovery_core::DeviceGroupManager;
use fw_recovery_core::DeviceRegistry;
use fw_recovery_core::FileAuditSink;
use fw_recovery_core::FirmwareUpdateWorkflow;
use fw_recovery_core::InMemoryAttributeStore;
use fw_recovery_core::InMemoryDeviceGroups;
use fw_recovery_core::InMemoryDeviceRegistry;
use fw_recovery_core::InMemoryRetryStore;
use fw_recovery_core::NoopAuditSink;
use fw_recovery_core::Notifier;
use fw_recovery_core::RetryStore;
use fw_recovery_core::StderrAuditSink;
use fw_recovery_core::WorkflowCollaborators;
use fw_recovery_core::WorkflowError;
use fw_recovery_store_sqlite::SqliteDeviceStore;
use fw_recovery_store_sqlite::SqliteStoreError;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Failures while wiring configured backends.
#[derive(Debug, Error)]
pub enum AssemblyError {
    /// Device store could not be opened.
    #[error("device store open failed: {0}")]
    Store(#[from] SqliteStoreError),
    /// Notification log could not be opened.
    #[error("notification log open failed: {0}")]
    Notifier(io::Error),
    /// Audit log could not be opened.
    #[error("audit log open failed: {0}")]
    Audit(io::Error),
    /// A section was missing a value validation should have required.
    #[error("incomplete config: {0}")]
    Incomplete(&'static str),
    /// Workflow rejected the assembled configuration.
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
}

// ============================================================================
// SECTION: Device Stores
// ============================================================================

/// Device-facing collaborators produced by one store backend.
pub struct DeviceStores {
    /// Retry-count records.
    pub retry_store: Arc<dyn RetryStore>,
    /// Attribute-backup records.
    pub attribute_store: Arc<dyn AttributeStore>,
    /// Group membership manager.
    pub groups: Arc<dyn DeviceGroupManager>,
    /// Live device registry.
    pub registry: Arc<dyn DeviceRegistry>,
}

/// Opens the configured device store backend.
///
/// # Errors
///
/// Returns [`AssemblyError`] when the `SQLite` store cannot be opened.
pub fn build_device_stores(config: &StoreConfig) -> Result<DeviceStores, AssemblyError> {
    match config.store_type {
        StoreType::Memory => Ok(DeviceStores {
            retry_store: Arc::new(InMemoryRetryStore::new()),
            attribute_store: Arc::new(InMemoryAttributeStore::new()),
            groups: Arc::new(InMemoryDeviceGroups::new()),
            registry: Arc::new(InMemoryDeviceRegistry::new()),
        }),
        StoreType::Sqlite => {
            let sqlite = config.sqlite_config().ok_or(AssemblyError::Incomplete("store.path"))?;
            let store = Arc::new(SqliteDeviceStore::new(&sqlite)?);
            Ok(DeviceStores {
                retry_store: store.clone(),
                attribute_store: store.clone(),
                groups: store.clone(),
                registry: store,
            })
        }
    }
}

// ============================================================================
// SECTION: Notifier and Audit
// ============================================================================

/// Builds the configured notifier wrapped in content-hash dedup.
///
/// # Errors
///
/// Returns [`AssemblyError`] when the notification log cannot be opened.
pub fn build_notifier(config: &NotifierConfig) -> Result<Arc<dyn Notifier>, AssemblyError> {
    let template = NotificationTemplate {
        subject: config.subject.clone(),
        message_group: config.message_group.clone(),
    };
    let window = config.dedup_window();
    match config.notifier_type {
        NotifierType::Log => {
            let path = config.path.as_ref().ok_or(AssemblyError::Incomplete("notifier.path"))?;
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(AssemblyError::Notifier)?;
            let inner = LogNotifier::with_template(file, template);
            Ok(Arc::new(DedupNotifier::with_window(inner, window)))
        }
        NotifierType::Stderr => {
            let inner = LogNotifier::with_template(io::stderr(), template).with_dispatcher("stderr");
            Ok(Arc::new(DedupNotifier::with_window(inner, window)))
        }
    }
}

/// Builds the configured audit sink.
///
/// # Errors
///
/// Returns [`AssemblyError`] when the audit log cannot be opened.
pub fn build_audit_sink(config: &AuditConfig) -> Result<Arc<dyn AuditSink>, AssemblyError> {
    match config.audit_type {
        AuditType::Stderr => Ok(Arc::new(StderrAuditSink)),
        AuditType::None => Ok(Arc::new(NoopAuditSink)),
        AuditType::File => {
            let path = config.path.as_ref().ok_or(AssemblyError::Incomplete("audit.path"))?;
            let sink = FileAuditSink::new(path).map_err(AssemblyError::Audit)?;
            Ok(Arc::new(sink))
        }
    }
}

// ============================================================================
// SECTION: Workflow
// ============================================================================

/// Assembles the workflow described by `config`.
///
/// # Errors
///
/// Returns [`AssemblyError`] when a backend cannot be opened or the workflow
/// configuration is rejected.
pub fn build_workflow(config: &FwRecoveryConfig) -> Result<FirmwareUpdateWorkflow, AssemblyError> {
    let stores = build_device_stores(&config.store)?;
    let collaborators = WorkflowCollaborators {
        retry_store: stores.retry_store,
        attribute_store: stores.attribute_store,
        groups: stores.groups,
        notifier: build_notifier(&config.notifier)?,
        registry: stores.registry,
        audit: build_audit_sink(&config.audit)?,
    };
    Ok(FirmwareUpdateWorkflow::new(collaborators, config.workflow_config())?)
}

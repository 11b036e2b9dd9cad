// crates/fw-recovery-core/tests/common/mod.rs
// ============================================================================
// Module: Workflow Test Harness
// Description: Fault-injecting collaborators and a wired workflow fixture.
// Purpose: Share deterministic test scaffolding across workflow test suites.
// Dependencies: fw-recovery-core
// ============================================================================
//! ## Overview
//! Wraps the in-memory collaborators with switchable transient failures, a
//! stalling increment, and a recording notifier, then wires them into a
//! workflow with zero-delay backoff.

#![allow(
    dead_code,
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Shared test scaffolding; not every suite uses every helper."
)]

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use fw_recovery_core::AttributeBag;
use fw_recovery_core::BackoffPolicy;
use fw_recovery_core::DeviceGroupManager;
use fw_recovery_core::DeviceId;
use fw_recovery_core::DeviceRegistry;
use fw_recovery_core::DeviceStatus;
use fw_recovery_core::FailureEvent;
use fw_recovery_core::FirmwareUpdateWorkflow;
use fw_recovery_core::GroupError;
use fw_recovery_core::GroupName;
use fw_recovery_core::InMemoryAttributeStore;
use fw_recovery_core::InMemoryDeviceGroups;
use fw_recovery_core::InMemoryDeviceRegistry;
use fw_recovery_core::InMemoryRetryStore;
use fw_recovery_core::MemoryAuditSink;
use fw_recovery_core::Notifier;
use fw_recovery_core::NotifyError;
use fw_recovery_core::PublishReceipt;
use fw_recovery_core::QuarantineNotice;
use fw_recovery_core::RetryPolicy;
use fw_recovery_core::RetryRecord;
use fw_recovery_core::RetryStore;
use fw_recovery_core::SettleWrite;
use fw_recovery_core::StoreError;
use fw_recovery_core::Timestamp;
use fw_recovery_core::WorkflowCollaborators;
use fw_recovery_core::WorkflowConfig;
use fw_recovery_core::runtime::FIRMWARE_STATUS_ATTRIBUTE;
use serde_json::json;

// ============================================================================
// SECTION: Fault Injection
// ============================================================================

/// Transient-failure budget shared by the flaky wrappers.
#[derive(Default)]
pub struct Faults {
    /// Remaining calls that fail before calls pass through.
    remaining: AtomicU32,
    /// When set, every call fails.
    down: AtomicBool,
    /// Total calls observed.
    calls: AtomicU32,
}

impl Faults {
    pub fn fail_next(&self, count: u32) {
        self.remaining.store(count, Ordering::SeqCst);
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Returns true when this call should fail.
    fn trip(&self) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.down.load(Ordering::SeqCst) {
            return true;
        }
        self.remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// Retry store whose writes can fail transiently.
pub struct FlakyRetryStore {
    pub inner: InMemoryRetryStore,
    pub put_faults: Faults,
    /// Milliseconds the next increment sleeps after it commits.
    increment_stall_ms: AtomicU64,
}

impl FlakyRetryStore {
    /// Makes the next increment commit and then hold its caller for `delay`.
    pub fn stall_next_increment(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap();
        self.increment_stall_ms.store(millis, Ordering::SeqCst);
    }
}

impl RetryStore for FlakyRetryStore {
    fn get(&self, device_id: &DeviceId) -> Result<Option<RetryRecord>, StoreError> {
        self.inner.get(device_id)
    }

    fn put(&self, record: &RetryRecord) -> Result<(), StoreError> {
        if self.put_faults.trip() {
            return Err(StoreError::Unavailable("injected put failure".to_string()));
        }
        self.inner.put(record)
    }

    fn increment_retry_count(
        &self,
        device_id: &DeviceId,
        at: Timestamp,
    ) -> Result<RetryRecord, StoreError> {
        let record = self.inner.increment_retry_count(device_id, at)?;
        let stall = self.increment_stall_ms.swap(0, Ordering::SeqCst);
        if stall > 0 {
            thread::sleep(Duration::from_millis(stall));
        }
        Ok(record)
    }

    fn settle_quarantine(
        &self,
        device_id: &DeviceId,
        quarantined_at: Timestamp,
    ) -> Result<SettleWrite, StoreError> {
        self.inner.settle_quarantine(device_id, quarantined_at)
    }

    fn list(&self, status: Option<DeviceStatus>) -> Result<Vec<RetryRecord>, StoreError> {
        self.inner.list(status)
    }
}

/// Group manager that fails transiently before delegating.
pub struct FlakyGroups {
    pub inner: InMemoryDeviceGroups,
    pub faults: Faults,
}

impl DeviceGroupManager for FlakyGroups {
    fn add_to_group(&self, device_id: &DeviceId, group: &GroupName) -> Result<(), GroupError> {
        if self.faults.trip() {
            return Err(GroupError::Throttled("injected group failure".to_string()));
        }
        self.inner.add_to_group(device_id, group)
    }

    fn remove_from_group(
        &self,
        device_id: &DeviceId,
        group: &GroupName,
    ) -> Result<(), GroupError> {
        if self.faults.trip() {
            return Err(GroupError::Throttled("injected group failure".to_string()));
        }
        self.inner.remove_from_group(device_id, group)
    }
}

/// Callback run after a notice is delivered.
type PublishHook = Box<dyn Fn(&QuarantineNotice) + Send + Sync>;

/// Notifier that records deliveries and suppresses repeated dedup ids.
#[derive(Default)]
pub struct RecordingNotifier {
    pub faults: Faults,
    delivered: Mutex<Vec<QuarantineNotice>>,
    seen: Mutex<BTreeSet<String>>,
    after_publish: Mutex<Option<PublishHook>>,
}

impl RecordingNotifier {
    pub fn delivered(&self) -> Vec<QuarantineNotice> {
        self.delivered.lock().unwrap().clone()
    }

    /// Runs `hook` after every delivery, standing in for a concurrent actor.
    pub fn after_publish(&self, hook: impl Fn(&QuarantineNotice) + Send + Sync + 'static) {
        *self.after_publish.lock().unwrap() = Some(Box::new(hook));
    }
}

impl Notifier for RecordingNotifier {
    fn publish(&self, notice: &QuarantineNotice) -> Result<PublishReceipt, NotifyError> {
        if self.faults.trip() {
            return Err(NotifyError::Unavailable("injected notify failure".to_string()));
        }
        let dedup_id =
            notice.dedup_id().map_err(|err| NotifyError::Encoding(err.to_string()))?.value;
        let duplicate = !self.seen.lock().unwrap().insert(dedup_id.clone());
        if !duplicate {
            self.delivered.lock().unwrap().push(notice.clone());
        }
        if let Some(hook) = self.after_publish.lock().unwrap().as_ref() {
            hook(notice);
        }
        Ok(PublishReceipt {
            message_id: format!("msg-{}", &dedup_id[..12]),
            dedup_id,
            duplicate,
        })
    }
}

// ============================================================================
// SECTION: Harness
// ============================================================================

pub const QUARANTINE_GROUP: &str = "FailedToUpdate";
pub const OPERATIONAL_GROUP: &str = "fleet-default";

/// Workflow wired to inspectable collaborators.
pub struct Harness {
    pub retry: Arc<FlakyRetryStore>,
    pub attributes: InMemoryAttributeStore,
    pub groups: Arc<FlakyGroups>,
    pub registry: InMemoryDeviceRegistry,
    pub notifier: Arc<RecordingNotifier>,
    pub audit: Arc<MemoryAuditSink>,
    pub workflow: FirmwareUpdateWorkflow,
}

impl Harness {
    pub fn new(threshold: u32) -> Self {
        Self::with_attempts(threshold, 3)
    }

    pub fn with_attempts(threshold: u32, max_attempts: u32) -> Self {
        Self::with_backoff(threshold, BackoffPolicy::immediate(max_attempts))
    }

    pub fn with_backoff(threshold: u32, backoff: BackoffPolicy) -> Self {
        let retry = Arc::new(FlakyRetryStore {
            inner: InMemoryRetryStore::new(),
            put_faults: Faults::default(),
            increment_stall_ms: AtomicU64::new(0),
        });
        let attributes = InMemoryAttributeStore::new();
        let groups = Arc::new(FlakyGroups {
            inner: InMemoryDeviceGroups::new(),
            faults: Faults::default(),
        });
        let registry = InMemoryDeviceRegistry::new();
        let notifier = Arc::new(RecordingNotifier::default());
        let audit = Arc::new(MemoryAuditSink::new());
        let config = WorkflowConfig {
            retry: RetryPolicy {
                retry_threshold: threshold,
            },
            backoff,
            quarantine_group: GroupName::new(QUARANTINE_GROUP),
            operational_groups: vec![GroupName::new(OPERATIONAL_GROUP)],
        };
        let workflow = FirmwareUpdateWorkflow::new(
            WorkflowCollaborators {
                retry_store: retry.clone(),
                attribute_store: Arc::new(attributes.clone()),
                groups: groups.clone(),
                notifier: notifier.clone(),
                registry: Arc::new(registry.clone()),
                audit: audit.clone(),
            },
            config,
        )
        .expect("valid config");
        Self {
            retry,
            attributes,
            groups,
            registry,
            notifier,
            audit,
            workflow,
        }
    }

    /// Seeds a retry record directly.
    pub fn seed(&self, device: &str, retry_count: u32, status: DeviceStatus) {
        let mut record = RetryRecord::active(DeviceId::new(device), Timestamp::Logical(0));
        record.retry_count = retry_count;
        record.status = status;
        self.retry.inner.put(&record).unwrap();
    }

    pub fn record(&self, device: &str) -> Option<RetryRecord> {
        self.retry.inner.get(&DeviceId::new(device)).unwrap()
    }

    /// Returns the live firmware status tag of a device, if any.
    pub fn firmware_status(&self, device: &str) -> Option<String> {
        self.registry
            .current_attributes(&DeviceId::new(device))
            .unwrap()
            .and_then(|live| live.get(FIRMWARE_STATUS_ATTRIBUTE).cloned())
            .and_then(|value| value.as_str().map(str::to_string))
    }

    pub fn in_group(&self, group: &str, device: &str) -> bool {
        self.groups.inner.contains(&GroupName::new(group), &DeviceId::new(device)).unwrap()
    }
}

// ============================================================================
// SECTION: Fixtures
// ============================================================================

pub fn attrs(firmware: &str) -> AttributeBag {
    let mut bag = BTreeMap::new();
    bag.insert("firmware".to_string(), json!(firmware));
    bag.insert("channel".to_string(), json!("stable"));
    bag
}

pub fn failure(device: &str, at: u64) -> FailureEvent {
    FailureEvent::new(DeviceId::new(device), Timestamp::Logical(at))
}

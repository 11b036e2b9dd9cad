// crates/fw-recovery-core/src/runtime/store.rs
// ============================================================================
// Module: In-Memory Collaborators
// Description: In-memory stores, group manager, and device registry.
// Purpose: Provide deterministic collaborators without external deps.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! These collaborators back tests, local demos, and the CLI `memory` store
//! type. Each one guards its map with a mutex held only for the duration of a
//! single call, so the increment is atomic per process.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Mutex;

use crate::core::device::AttributeBag;
use crate::core::device::AttributeSnapshot;
use crate::core::device::DeviceStatus;
use crate::core::device::RetryRecord;
use crate::core::identifiers::DeviceId;
use crate::core::identifiers::GroupName;
use crate::core::time::Timestamp;
use crate::interfaces::AttributeStore;
use crate::interfaces::DeviceGroupManager;
use crate::interfaces::DeviceRegistry;
use crate::interfaces::GroupError;
use crate::interfaces::RegistryError;
use crate::interfaces::RetryStore;
use crate::interfaces::SettleWrite;
use crate::interfaces::SnapshotWrite;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Retry Store
// ============================================================================

/// In-memory retry store.
#[derive(Debug, Default, Clone)]
pub struct InMemoryRetryStore {
    /// Retry records protected by a mutex.
    records: Arc<Mutex<BTreeMap<DeviceId, RetryRecord>>>,
}

impl InMemoryRetryStore {
    /// Creates an empty retry store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl RetryStore for InMemoryRetryStore {
    fn get(&self, device_id: &DeviceId) -> Result<Option<RetryRecord>, StoreError> {
        let guard = self
            .records
            .lock()
            .map_err(|_| StoreError::Store("retry store mutex poisoned".to_string()))?;
        Ok(guard.get(device_id).cloned())
    }

    fn put(&self, record: &RetryRecord) -> Result<(), StoreError> {
        self.records
            .lock()
            .map_err(|_| StoreError::Store("retry store mutex poisoned".to_string()))?
            .insert(record.device_id.clone(), record.clone());
        Ok(())
    }

    fn increment_retry_count(
        &self,
        device_id: &DeviceId,
        at: Timestamp,
    ) -> Result<RetryRecord, StoreError> {
        let mut guard = self
            .records
            .lock()
            .map_err(|_| StoreError::Store("retry store mutex poisoned".to_string()))?;
        let next = RetryRecord::incremented(guard.get(device_id), device_id, at);
        guard.insert(device_id.clone(), next.clone());
        drop(guard);
        Ok(next)
    }

    fn settle_quarantine(
        &self,
        device_id: &DeviceId,
        quarantined_at: Timestamp,
    ) -> Result<SettleWrite, StoreError> {
        let mut guard = self
            .records
            .lock()
            .map_err(|_| StoreError::Store("retry store mutex poisoned".to_string()))?;
        let existing = guard.get(device_id).cloned();
        let Some(settled) =
            existing.as_ref().and_then(|record| record.settle_if_committed_at(quarantined_at))
        else {
            return Ok(SettleWrite::Superseded(existing));
        };
        guard.insert(device_id.clone(), settled.clone());
        drop(guard);
        Ok(SettleWrite::Settled(settled))
    }

    fn list(&self, status: Option<DeviceStatus>) -> Result<Vec<RetryRecord>, StoreError> {
        let guard = self
            .records
            .lock()
            .map_err(|_| StoreError::Store("retry store mutex poisoned".to_string()))?;
        Ok(guard
            .values()
            .filter(|record| status.is_none_or(|status| record.status == status))
            .cloned()
            .collect())
    }
}

// ============================================================================
// SECTION: Attribute Store
// ============================================================================

/// In-memory attribute-backup store.
#[derive(Debug, Default, Clone)]
pub struct InMemoryAttributeStore {
    /// Snapshots protected by a mutex.
    snapshots: Arc<Mutex<BTreeMap<DeviceId, AttributeSnapshot>>>,
}

impl InMemoryAttributeStore {
    /// Creates an empty attribute store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl AttributeStore for InMemoryAttributeStore {
    fn get(&self, device_id: &DeviceId) -> Result<Option<AttributeSnapshot>, StoreError> {
        let guard = self
            .snapshots
            .lock()
            .map_err(|_| StoreError::Store("attribute store mutex poisoned".to_string()))?;
        Ok(guard.get(device_id).cloned())
    }

    fn put(&self, snapshot: &AttributeSnapshot) -> Result<(), StoreError> {
        self.snapshots
            .lock()
            .map_err(|_| StoreError::Store("attribute store mutex poisoned".to_string()))?
            .insert(snapshot.device_id.clone(), snapshot.clone());
        Ok(())
    }

    fn put_if_newer(&self, snapshot: &AttributeSnapshot) -> Result<SnapshotWrite, StoreError> {
        let mut guard = self
            .snapshots
            .lock()
            .map_err(|_| StoreError::Store("attribute store mutex poisoned".to_string()))?;
        if let Some(existing) = guard.get(&snapshot.device_id)
            && !snapshot.supersedes(existing)
        {
            return Ok(SnapshotWrite::Superseded);
        }
        guard.insert(snapshot.device_id.clone(), snapshot.clone());
        drop(guard);
        Ok(SnapshotWrite::Stored)
    }
}

// ============================================================================
// SECTION: Device Groups
// ============================================================================

/// In-memory group membership table.
#[derive(Debug, Default, Clone)]
pub struct InMemoryDeviceGroups {
    /// Members keyed by group.
    groups: Arc<Mutex<BTreeMap<GroupName, BTreeSet<DeviceId>>>>,
}

impl InMemoryDeviceGroups {
    /// Creates an empty membership table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the members of a group.
    ///
    /// # Errors
    ///
    /// Returns [`GroupError::Rejected`] when the table mutex is poisoned.
    pub fn members(&self, group: &GroupName) -> Result<BTreeSet<DeviceId>, GroupError> {
        let guard = self
            .groups
            .lock()
            .map_err(|_| GroupError::Rejected("group table mutex poisoned".to_string()))?;
        Ok(guard.get(group).cloned().unwrap_or_default())
    }

    /// Returns true when `device_id` belongs to `group`.
    ///
    /// # Errors
    ///
    /// Returns [`GroupError::Rejected`] when the table mutex is poisoned.
    pub fn contains(&self, group: &GroupName, device_id: &DeviceId) -> Result<bool, GroupError> {
        Ok(self.members(group)?.contains(device_id))
    }
}

impl DeviceGroupManager for InMemoryDeviceGroups {
    fn add_to_group(&self, device_id: &DeviceId, group: &GroupName) -> Result<(), GroupError> {
        self.groups
            .lock()
            .map_err(|_| GroupError::Rejected("group table mutex poisoned".to_string()))?
            .entry(group.clone())
            .or_default()
            .insert(device_id.clone());
        Ok(())
    }

    fn remove_from_group(
        &self,
        device_id: &DeviceId,
        group: &GroupName,
    ) -> Result<(), GroupError> {
        let mut guard = self
            .groups
            .lock()
            .map_err(|_| GroupError::Rejected("group table mutex poisoned".to_string()))?;
        if let Some(members) = guard.get_mut(group) {
            members.remove(device_id);
        }
        drop(guard);
        Ok(())
    }
}

// ============================================================================
// SECTION: Device Registry
// ============================================================================

/// In-memory live attribute registry.
#[derive(Debug, Default, Clone)]
pub struct InMemoryDeviceRegistry {
    /// Live attributes keyed by device.
    devices: Arc<Mutex<BTreeMap<DeviceId, AttributeBag>>>,
}

impl InMemoryDeviceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl DeviceRegistry for InMemoryDeviceRegistry {
    fn current_attributes(
        &self,
        device_id: &DeviceId,
    ) -> Result<Option<AttributeBag>, RegistryError> {
        let guard = self
            .devices
            .lock()
            .map_err(|_| RegistryError::Rejected("registry mutex poisoned".to_string()))?;
        Ok(guard.get(device_id).cloned())
    }

    fn replace_attributes(
        &self,
        device_id: &DeviceId,
        attributes: &AttributeBag,
    ) -> Result<(), RegistryError> {
        self.devices
            .lock()
            .map_err(|_| RegistryError::Rejected("registry mutex poisoned".to_string()))?
            .insert(device_id.clone(), attributes.clone());
        Ok(())
    }

    fn merge_attributes(
        &self,
        device_id: &DeviceId,
        attributes: &AttributeBag,
    ) -> Result<(), RegistryError> {
        let mut guard = self
            .devices
            .lock()
            .map_err(|_| RegistryError::Rejected("registry mutex poisoned".to_string()))?;
        guard
            .entry(device_id.clone())
            .or_default()
            .extend(attributes.iter().map(|(key, value)| (key.clone(), value.clone())));
        drop(guard);
        Ok(())
    }
}

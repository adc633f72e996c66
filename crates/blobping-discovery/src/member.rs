//! Local member state shared with the group framework
//!
//! The framework updates the view as membership changes; the discovery core
//! only ever reads point-in-time snapshots.

use blobping_common::MemberAddress;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

/// Externally updated view of the local member
#[derive(Debug, Default)]
pub struct MemberView {
    local_address: RwLock<Option<MemberAddress>>,
    cluster_name: RwLock<Option<String>>,
    coordinator: AtomicBool,
}

/// Consistent copy of the view taken at one instant
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberSnapshot {
    pub local_address: Option<MemberAddress>,
    pub cluster_name: Option<String>,
    pub coordinator: bool,
}

impl MemberView {
    /// Create an empty view: no address, no cluster, not coordinator
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a view for a member that already joined `cluster`
    #[must_use]
    pub fn joined(address: impl Into<MemberAddress>, cluster: impl Into<String>) -> Self {
        let view = Self::new();
        view.set_local_address(address.into());
        view.set_cluster_name(cluster);
        view
    }

    pub fn set_local_address(&self, address: MemberAddress) {
        *self.local_address.write() = Some(address);
    }

    pub fn clear_local_address(&self) {
        *self.local_address.write() = None;
    }

    #[must_use]
    pub fn local_address(&self) -> Option<MemberAddress> {
        self.local_address.read().clone()
    }

    pub fn set_cluster_name(&self, cluster: impl Into<String>) {
        *self.cluster_name.write() = Some(cluster.into());
    }

    #[must_use]
    pub fn cluster_name(&self) -> Option<String> {
        self.cluster_name.read().clone()
    }

    pub fn set_coordinator(&self, coordinator: bool) {
        self.coordinator.store(coordinator, Ordering::Release);
    }

    #[must_use]
    pub fn is_coordinator(&self) -> bool {
        self.coordinator.load(Ordering::Acquire)
    }

    /// Copy the current state
    #[must_use]
    pub fn snapshot(&self) -> MemberSnapshot {
        MemberSnapshot {
            local_address: self.local_address(),
            cluster_name: self.cluster_name(),
            coordinator: self.is_coordinator(),
        }
    }
}

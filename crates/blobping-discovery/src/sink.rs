//! Discovery results
//!
//! [`ResponseSink`] receives the records a discovery round found;
//! [`AddressCache`] learns the logical name and transport endpoint of every
//! peer seen along the way.

use blobping_common::{MemberAddress, MembershipRecord};
use dashmap::DashMap;
use std::collections::HashMap;
use std::net::SocketAddr;

/// Receives discovery responses
pub trait ResponseSink: Send {
    fn add_response(&mut self, record: MembershipRecord, is_coordinator: bool);
}

/// Learns peer name and endpoint mappings
pub trait AddressCache: Send + Sync {
    fn add_discovery_response(
        &self,
        address: &MemberAddress,
        logical_name: Option<&str>,
        physical_addr: Option<SocketAddr>,
    );
}

/// One discovered member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub record: MembershipRecord,
    pub is_coordinator: bool,
}

/// Response set deduplicated by address
///
/// A later response for an address replaces the earlier record; once any
/// response marked the address as coordinator it stays marked.
#[derive(Debug, Clone, Default)]
pub struct Responses {
    entries: Vec<Response>,
    index: HashMap<MemberAddress, usize>,
}

impl Responses {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn get(&self, address: &MemberAddress) -> Option<&Response> {
        self.index.get(address).map(|&idx| &self.entries[idx])
    }

    #[must_use]
    pub fn contains(&self, address: &MemberAddress) -> bool {
        self.index.contains_key(address)
    }

    /// Responses in first-seen order
    pub fn iter(&self) -> impl Iterator<Item = &Response> {
        self.entries.iter()
    }

    /// Addresses of the members reported as coordinator
    pub fn coordinators(&self) -> impl Iterator<Item = &MemberAddress> {
        self.entries
            .iter()
            .filter(|r| r.is_coordinator)
            .map(|r| &r.record.address)
    }

    /// Addresses in first-seen order
    #[must_use]
    pub fn addresses(&self) -> Vec<MemberAddress> {
        self.entries.iter().map(|r| r.record.address.clone()).collect()
    }
}

impl ResponseSink for Responses {
    fn add_response(&mut self, record: MembershipRecord, is_coordinator: bool) {
        if let Some(&idx) = self.index.get(&record.address) {
            let existing = &mut self.entries[idx];
            existing.is_coordinator |= is_coordinator;
            existing.record = record;
            return;
        }
        self.index.insert(record.address.clone(), self.entries.len());
        self.entries.push(Response {
            record,
            is_coordinator,
        });
    }
}

impl IntoIterator for Responses {
    type Item = Response;
    type IntoIter = std::vec::IntoIter<Response>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Known peer details
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerInfo {
    pub logical_name: Option<String>,
    pub physical_addr: Option<SocketAddr>,
}

/// Concurrent in-memory address cache
#[derive(Debug, Default)]
pub struct DiscoveryCache {
    peers: DashMap<MemberAddress, PeerInfo>,
}

impl DiscoveryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, address: &MemberAddress) -> Option<PeerInfo> {
        self.peers.get(address).map(|entry| entry.value().clone())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn remove(&self, address: &MemberAddress) -> Option<PeerInfo> {
        self.peers.remove(address).map(|(_, info)| info)
    }
}

impl AddressCache for DiscoveryCache {
    fn add_discovery_response(
        &self,
        address: &MemberAddress,
        logical_name: Option<&str>,
        physical_addr: Option<SocketAddr>,
    ) {
        let mut entry = self.peers.entry(address.clone()).or_default();
        // Known details are kept when a response omits them
        if let Some(name) = logical_name {
            entry.logical_name = Some(name.to_string());
        }
        if physical_addr.is_some() {
            entry.physical_addr = physical_addr;
        }
    }
}

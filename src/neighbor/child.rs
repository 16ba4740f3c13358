//! Child neighbor data.

use std::net::Ipv6Addr;

use super::{Neighbor, NeighborCore};
use crate::address::ExtAddress;

/// A child attached to this router.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Child {
    core: NeighborCore,
    /// Child timeout in seconds.
    pub timeout_secs: u32,
    addresses: Vec<Ipv6Addr>,
    /// TLV types the child asked for in its last request.
    pub request_tlvs: Vec<u8>,
    /// Network data version last delivered to this child.
    pub network_data_version: u8,
    pub supervision_interval_secs: u16,
}

impl Child {
    pub fn new(ext_address: ExtAddress, noise_floor: i8) -> Self {
        Self {
            core: NeighborCore::new(ext_address, noise_floor),
            timeout_secs: 0,
            addresses: Vec::new(),
            request_tlvs: Vec::new(),
            network_data_version: 0,
            supervision_interval_secs: 0,
        }
    }

    pub fn addresses(&self) -> &[Ipv6Addr] {
        &self.addresses
    }

    pub fn has_address(&self, addr: &Ipv6Addr) -> bool {
        self.addresses.contains(addr)
    }

    /// Store an address if it fits. Returns false when the set is full.
    pub(crate) fn push_address(&mut self, addr: Ipv6Addr, capacity: usize) -> bool {
        if self.addresses.contains(&addr) {
            return true;
        }
        if self.addresses.len() >= capacity {
            return false;
        }
        self.addresses.push(addr);
        true
    }

    pub(crate) fn remove_address(&mut self, addr: &Ipv6Addr) -> bool {
        let before = self.addresses.len();
        self.addresses.retain(|a| a != addr);
        self.addresses.len() != before
    }

    pub(crate) fn clear_addresses(&mut self) {
        self.addresses.clear();
    }

    /// Timestamp (ms) at which this child expires if not heard again.
    pub fn expires_at_ms(&self) -> u64 {
        self.core
            .last_heard_ms
            .saturating_add(self.timeout_secs as u64 * 1000)
    }
}

impl Neighbor for Child {
    fn core(&self) -> &NeighborCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut NeighborCore {
        &mut self.core
    }
}

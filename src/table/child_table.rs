//! Fixed-capacity child table with generation-checked handles.

use std::net::Ipv6Addr;

use tracing::debug;

use super::TableError;
use crate::address::{ExtAddress, MAX_CHILD_ID, MIN_CHILD_ID, child_id_from_rloc16};
use crate::neighbor::{Child, Neighbor, NeighborState};

/// Registered addresses kept per child.
pub const DEFAULT_MAX_CHILD_ADDRESSES: usize = 4;

/// Handle to a child table slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChildIndex {
    slot: u16,
    generation: u32,
}

#[derive(Clone, Debug, Default)]
struct Slot {
    generation: u32,
    child: Option<Child>,
}

/// Pool of children attached to this router.
#[derive(Clone, Debug)]
pub struct ChildTable {
    slots: Vec<Slot>,
    max_addresses: usize,
    next_child_id: u16,
}

impl ChildTable {
    pub fn new(capacity: usize, max_addresses: usize) -> Self {
        Self {
            slots: vec![Slot::default(); capacity],
            max_addresses,
            next_child_id: MIN_CHILD_ID,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn max_addresses(&self) -> usize {
        self.max_addresses
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.child.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() == self.capacity()
    }

    /// Children that completed the Child ID exchange.
    pub fn valid_count(&self) -> usize {
        self.iter().filter(|(_, c)| c.is_valid()).count()
    }

    /// Place a child in a free slot.
    pub fn insert(&mut self, child: Child) -> Result<ChildIndex, TableError> {
        let capacity = self.capacity();
        let (slot, entry) = self
            .slots
            .iter_mut()
            .enumerate()
            .find(|(_, s)| s.child.is_none())
            .ok_or(TableError::NoBufs { capacity })?;
        entry.generation = entry.generation.wrapping_add(1);
        entry.child = Some(child);
        Ok(ChildIndex {
            slot: slot as u16,
            generation: entry.generation,
        })
    }

    pub fn get(&self, index: ChildIndex) -> Option<&Child> {
        self.slots
            .get(index.slot as usize)
            .filter(|s| s.generation == index.generation)
            .and_then(|s| s.child.as_ref())
    }

    pub fn get_mut(&mut self, index: ChildIndex) -> Option<&mut Child> {
        self.slots
            .get_mut(index.slot as usize)
            .filter(|s| s.generation == index.generation)
            .and_then(|s| s.child.as_mut())
    }

    /// Free a slot; the handle and any copies of it become stale.
    pub fn remove(&mut self, index: ChildIndex) -> Option<Child> {
        let slot = self
            .slots
            .get_mut(index.slot as usize)
            .filter(|s| s.generation == index.generation)?;
        let child = slot.child.take();
        slot.generation = slot.generation.wrapping_add(1);
        child
    }

    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            if slot.child.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (ChildIndex, &Child)> + '_ {
        self.slots.iter().enumerate().filter_map(|(i, s)| {
            s.child.as_ref().map(|c| {
                (
                    ChildIndex {
                        slot: i as u16,
                        generation: s.generation,
                    },
                    c,
                )
            })
        })
    }

    /// Handles of all occupied slots, for mutation while iterating.
    pub fn indices(&self) -> Vec<ChildIndex> {
        self.iter().map(|(i, _)| i).collect()
    }

    pub fn find_by_ext_address(&self, ext_address: &ExtAddress) -> Option<ChildIndex> {
        self.iter()
            .find(|(_, c)| c.ext_address() == *ext_address)
            .map(|(i, _)| i)
    }

    /// Look up a child by RLOC16, ignoring children still attaching.
    pub fn find_by_rloc16(&self, rloc16: u16) -> Option<ChildIndex> {
        self.iter()
            .find(|(_, c)| c.rloc16() == rloc16 && c.state() != NeighborState::ParentRequest)
            .map(|(i, _)| i)
    }

    pub fn find_by_address(&self, addr: &Ipv6Addr) -> Option<ChildIndex> {
        self.iter()
            .find(|(_, c)| c.has_address(addr))
            .map(|(i, _)| i)
    }

    /// Pick the next unused child ID, cycling through the ID space.
    pub fn allocate_child_id(&mut self) -> Option<u16> {
        let span = MAX_CHILD_ID - MIN_CHILD_ID + 1;
        for _ in 0..span {
            let candidate = self.next_child_id;
            self.next_child_id = if candidate >= MAX_CHILD_ID {
                MIN_CHILD_ID
            } else {
                candidate + 1
            };
            let in_use = self
                .iter()
                .any(|(_, c)| c.is_valid() && child_id_from_rloc16(c.rloc16()) == candidate);
            if !in_use {
                return Some(candidate);
            }
        }
        None
    }

    /// Register one address for a child. Any other child holding the same
    /// address loses it. Fails with `NoBufs` when the child's address set
    /// is full; the address is then not held by anyone.
    pub fn register_address(&mut self, index: ChildIndex, addr: Ipv6Addr) -> Result<(), TableError> {
        if self.get(index).is_none() {
            return Err(TableError::StaleIndex);
        }
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if i == index.slot as usize {
                continue;
            }
            if let Some(other) = slot.child.as_mut()
                && other.remove_address(&addr)
            {
                debug!(child = %other.ext_address(), address = %addr, "Address moved to another child");
            }
        }
        let capacity = self.max_addresses;
        let child = self.get_mut(index).ok_or(TableError::StaleIndex)?;
        if child.push_address(addr, capacity) {
            Ok(())
        } else {
            Err(TableError::NoBufs { capacity })
        }
    }

    /// Replace a child's address set. Returns the addresses accepted; the
    /// rest did not fit.
    pub fn register_addresses(
        &mut self,
        index: ChildIndex,
        addrs: &[Ipv6Addr],
    ) -> Result<Vec<Ipv6Addr>, TableError> {
        self.get_mut(index)
            .ok_or(TableError::StaleIndex)?
            .clear_addresses();
        let mut accepted = Vec::with_capacity(addrs.len());
        for addr in addrs {
            match self.register_address(index, *addr) {
                Ok(()) => accepted.push(*addr),
                Err(TableError::NoBufs { .. }) => {
                    debug!(address = %addr, "Child address set full, registration truncated");
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(accepted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::rloc16_from_parts;

    fn make_child(n: u8) -> Child {
        Child::new(ExtAddress::from_bytes([n; 8]), -100)
    }

    fn addr(last: u16) -> Ipv6Addr {
        Ipv6Addr::new(0xfd00, 0xdb8, 0, 0, 0, 0, 0, last)
    }

    #[test]
    fn test_insert_until_full() {
        let mut table = ChildTable::new(2, 4);
        table.insert(make_child(1)).unwrap();
        table.insert(make_child(2)).unwrap();
        assert!(table.is_full());
        assert_eq!(
            table.insert(make_child(3)),
            Err(TableError::NoBufs { capacity: 2 })
        );
    }

    #[test]
    fn test_stale_index_after_remove() {
        let mut table = ChildTable::new(1, 4);
        let first = table.insert(make_child(1)).unwrap();
        assert!(table.remove(first).is_some());
        let second = table.insert(make_child(2)).unwrap();

        assert!(table.get(first).is_none());
        assert!(table.remove(first).is_none());
        assert_eq!(
            table.get(second).unwrap().ext_address(),
            ExtAddress::from_bytes([2; 8])
        );
    }

    #[test]
    fn test_find_by_ext_address_and_rloc16() {
        let mut table = ChildTable::new(4, 4);
        let idx = table.insert(make_child(7)).unwrap();
        {
            let child = table.get_mut(idx).unwrap();
            child.core_mut().rloc16 = rloc16_from_parts(3, 1);
            child.set_state(NeighborState::Valid);
        }
        assert_eq!(table.find_by_ext_address(&ExtAddress::from_bytes([7; 8])), Some(idx));
        assert_eq!(table.find_by_rloc16(0x0c01), Some(idx));
        assert_eq!(table.find_by_rloc16(0x0c02), None);
    }

    #[test]
    fn test_address_dedup_last_registrant_wins() {
        let mut table = ChildTable::new(4, 4);
        let a = table.insert(make_child(1)).unwrap();
        let b = table.insert(make_child(2)).unwrap();

        table.register_address(a, addr(1)).unwrap();
        table.register_address(b, addr(1)).unwrap();

        assert!(!table.get(a).unwrap().has_address(&addr(1)));
        assert!(table.get(b).unwrap().has_address(&addr(1)));
        assert_eq!(table.find_by_address(&addr(1)), Some(b));
    }

    #[test]
    fn test_register_addresses_partial_acceptance() {
        let mut table = ChildTable::new(2, 2);
        let a = table.insert(make_child(1)).unwrap();
        let accepted = table
            .register_addresses(a, &[addr(1), addr(2), addr(3)])
            .unwrap();
        assert_eq!(accepted, vec![addr(1), addr(2)]);
        assert_eq!(table.get(a).unwrap().addresses().len(), 2);

        // Re-registration replaces the previous set.
        let accepted = table.register_addresses(a, &[addr(3)]).unwrap();
        assert_eq!(accepted, vec![addr(3)]);
        assert!(!table.get(a).unwrap().has_address(&addr(1)));
    }

    #[test]
    fn test_allocate_child_id_skips_used() {
        let mut table = ChildTable::new(4, 4);
        let idx = table.insert(make_child(1)).unwrap();
        let first = table.allocate_child_id().unwrap();
        assert_eq!(first, MIN_CHILD_ID);
        {
            let child = table.get_mut(idx).unwrap();
            child.core_mut().rloc16 = rloc16_from_parts(0, 2);
            child.set_state(NeighborState::Valid);
        }
        assert_eq!(table.allocate_child_id(), Some(3));
    }
}

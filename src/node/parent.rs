//! Parent and partition selection.
//!
//! Both comparisons are three-way and short-circuit on the first
//! differing criterion. `Ordering::Greater` means the left side is
//! preferred.

use std::cmp::Ordering;

use crate::address::{ExtAddress, is_active_router};
use crate::neighbor::{Neighbor, Router, link_quality_from_margin};
use crate::protocol::{Connectivity, LeaderData};

/// A prospective parent learned from a Parent Response.
#[derive(Clone, Debug)]
pub struct ParentCandidate {
    /// Link state and frame counters, in `ParentResponse` state.
    pub router: Router,
    /// Challenge carried by the Parent Response, echoed in the Child ID
    /// Request.
    pub challenge: Vec<u8>,
    pub connectivity: Connectivity,
    pub leader_data: LeaderData,
    /// Lower of our measured margin and the margin the parent reported.
    pub link_margin: u8,
    pub version: u16,
}

impl ParentCandidate {
    pub fn ext_address(&self) -> ExtAddress {
        self.router.ext_address()
    }

    pub fn rloc16(&self) -> u16 {
        self.router.rloc16()
    }

    /// Two-way link quality derived from the combined margin.
    pub fn link_quality(&self) -> u8 {
        link_quality_from_margin(self.link_margin)
    }

    /// Whether the responder already holds a router ID (not a REED).
    pub fn is_router(&self) -> bool {
        is_active_router(self.rloc16())
    }

    pub fn partition(&self) -> PartitionInfo {
        PartitionInfo::new(
            &self.leader_data,
            self.connectivity.active_routers as usize,
        )
    }
}

/// Preference order between two parent candidates.
pub fn compare_parents(a: &ParentCandidate, b: &ParentCandidate) -> Ordering {
    let (ca, cb) = (&a.connectivity, &b.connectivity);
    let sed = |c: &Connectivity| c.sed_capacity.unwrap_or_default();
    a.link_quality()
        .cmp(&b.link_quality())
        .then_with(|| a.is_router().cmp(&b.is_router()))
        .then_with(|| ca.parent_priority.cmp(&cb.parent_priority))
        .then_with(|| ca.link_quality_3.cmp(&cb.link_quality_3))
        .then_with(|| a.version.cmp(&b.version))
        .then_with(|| sed(ca).buffer_size.cmp(&sed(cb).buffer_size))
        .then_with(|| sed(ca).datagram_count.cmp(&sed(cb).datagram_count))
        .then_with(|| ca.link_quality_2.cmp(&cb.link_quality_2))
        .then_with(|| ca.link_quality_1.cmp(&cb.link_quality_1))
        .then_with(|| a.link_margin.cmp(&b.link_margin))
}

/// What partition merge decisions look at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PartitionInfo {
    pub partition_id: u32,
    pub weighting: u8,
    /// Routers in the partition, as far as we know.
    pub active_routers: usize,
}

impl PartitionInfo {
    pub fn new(leader_data: &LeaderData, active_routers: usize) -> Self {
        Self {
            partition_id: leader_data.partition_id,
            weighting: leader_data.weighting,
            active_routers,
        }
    }

    pub fn is_singleton(&self) -> bool {
        self.active_routers <= 1
    }
}

/// Preference order between two partitions: weighting, then a
/// multi-router partition over a singleton, then the higher partition ID.
pub fn compare_partitions(a: &PartitionInfo, b: &PartitionInfo) -> Ordering {
    a.weighting
        .cmp(&b.weighting)
        .then_with(|| (!a.is_singleton()).cmp(&!b.is_singleton()))
        .then_with(|| a.partition_id.cmp(&b.partition_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::rloc16_from_parts;
    use crate::protocol::SedCapacity;

    fn candidate(router_id: u8, child_id: u16, margin: u8) -> ParentCandidate {
        let mut router = Router::new(router_id, -100);
        router.core_mut().rloc16 = rloc16_from_parts(router_id, child_id);
        ParentCandidate {
            router,
            challenge: vec![0; 8],
            connectivity: Connectivity::default(),
            leader_data: LeaderData::default(),
            link_margin: margin,
            version: 4,
        }
    }

    fn partition(id: u32, weighting: u8, routers: usize) -> PartitionInfo {
        PartitionInfo {
            partition_id: id,
            weighting,
            active_routers: routers,
        }
    }

    #[test]
    fn test_link_quality_dominates() {
        let lq3 = candidate(1, 0, 30);
        let mut lq2 = candidate(2, 0, 15);
        lq2.connectivity.parent_priority = Connectivity::PRIORITY_HIGH;
        lq2.connectivity.link_quality_3 = 10;
        assert_eq!(compare_parents(&lq3, &lq2), Ordering::Greater);
        assert_eq!(compare_parents(&lq2, &lq3), Ordering::Less);
    }

    #[test]
    fn test_router_beats_reed_at_equal_quality() {
        let router = candidate(1, 0, 30);
        let mut reed = candidate(2, 5, 40);
        reed.connectivity.parent_priority = Connectivity::PRIORITY_HIGH;
        assert_eq!(compare_parents(&router, &reed), Ordering::Greater);
    }

    #[test]
    fn test_tie_breakers_in_order() {
        let base = candidate(1, 0, 30);

        let mut prio = base.clone();
        prio.connectivity.parent_priority = Connectivity::PRIORITY_HIGH;
        assert_eq!(compare_parents(&prio, &base), Ordering::Greater);

        let mut lq3 = base.clone();
        lq3.connectivity.link_quality_3 = 2;
        assert_eq!(compare_parents(&lq3, &base), Ordering::Greater);

        let mut newer = base.clone();
        newer.version = 5;
        assert_eq!(compare_parents(&newer, &base), Ordering::Greater);

        let mut sed = base.clone();
        sed.connectivity.sed_capacity = Some(SedCapacity {
            buffer_size: 1280,
            datagram_count: 1,
        });
        assert_eq!(compare_parents(&sed, &base), Ordering::Greater);

        let mut lq2 = base.clone();
        lq2.connectivity.link_quality_2 = 1;
        assert_eq!(compare_parents(&lq2, &base), Ordering::Greater);

        let mut margin = base.clone();
        margin.link_margin = 35;
        assert_eq!(compare_parents(&margin, &base), Ordering::Greater);

        assert_eq!(compare_parents(&base, &base.clone()), Ordering::Equal);
    }

    #[test]
    fn test_partition_order() {
        let heavy = partition(1, 80, 1);
        let light = partition(9, 64, 5);
        assert_eq!(compare_partitions(&heavy, &light), Ordering::Greater);

        let single = partition(9, 64, 1);
        let multi = partition(1, 64, 3);
        assert_eq!(compare_partitions(&multi, &single), Ordering::Greater);

        let low = partition(1, 64, 3);
        let high = partition(2, 64, 3);
        assert_eq!(compare_partitions(&high, &low), Ordering::Greater);
        assert_eq!(compare_partitions(&low, &low), Ordering::Equal);
    }

    #[test]
    fn test_partition_order_is_transitive_and_antisymmetric() {
        let all = [
            partition(1, 64, 1),
            partition(2, 64, 1),
            partition(1, 64, 4),
            partition(7, 64, 2),
            partition(3, 65, 1),
            partition(0, 0, 9),
        ];
        for a in &all {
            for b in &all {
                assert_eq!(compare_partitions(a, b), compare_partitions(b, a).reverse());
                for c in &all {
                    if compare_partitions(a, b) == Ordering::Greater
                        && compare_partitions(b, c) == Ordering::Greater
                    {
                        assert_eq!(compare_partitions(a, c), Ordering::Greater);
                    }
                }
            }
        }
    }
}

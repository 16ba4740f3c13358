//! Router neighbor data.

use super::{MAX_ROUTE_COST, Neighbor, NeighborCore};
use crate::address::{ExtAddress, MAX_ROUTER_ID, rloc16_from_router_id};

pub(crate) const ROUTER_SLOTS: usize = MAX_ROUTER_ID as usize + 1;

/// One entry of the router table: an allocated router ID, and if we have a
/// direct link to it, the neighbor state of that link.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Router {
    core: NeighborCore,
    router_id: u8,
    /// Next hop toward this router, `None` when unreachable.
    pub next_hop: Option<u8>,
    /// Cost advertised by `next_hop` for reaching this router.
    pub cost: u8,
    /// Link quality this neighbor reports for its link to us.
    pub link_quality_out: u8,
    /// Inbound link quality this neighbor reported per router ID in its
    /// last Route TLV.
    pub advertised_link_quality: [u8; ROUTER_SLOTS],
    /// Route cost this neighbor reported per router ID in its last Route TLV.
    pub advertised_cost: [u8; ROUTER_SLOTS],
    /// Last time (ms) a route to this router was known.
    pub last_reachable_ms: u64,
}

impl Router {
    pub fn new(router_id: u8, noise_floor: i8) -> Self {
        let mut core = NeighborCore::new(ExtAddress::default(), noise_floor);
        core.rloc16 = rloc16_from_router_id(router_id);
        Self {
            core,
            router_id,
            next_hop: None,
            cost: MAX_ROUTE_COST,
            link_quality_out: 0,
            advertised_link_quality: [0; ROUTER_SLOTS],
            advertised_cost: [MAX_ROUTE_COST; ROUTER_SLOTS],
            last_reachable_ms: 0,
        }
    }

    pub fn router_id(&self) -> u8 {
        self.router_id
    }

    /// Two-way link quality: the worse of both directions.
    pub fn two_way_link_quality(&self) -> u8 {
        self.link_quality_in().min(self.link_quality_out)
    }

    /// Forget the link while keeping the allocation.
    pub(crate) fn reset_link(&mut self) {
        self.core.ext_address = ExtAddress::default();
        self.core.state = super::NeighborState::Invalid;
        self.core.link.clear();
        self.core.counters = Default::default();
        self.core.pending_challenge = None;
        self.link_quality_out = 0;
        self.advertised_link_quality = [0; ROUTER_SLOTS];
        self.advertised_cost = [MAX_ROUTE_COST; ROUTER_SLOTS];
    }

    /// Whether we hold a usable direct link to this router.
    pub fn is_neighbor(&self) -> bool {
        self.core.state.is_valid_or_restoring()
    }

    /// Cost of the direct link, from the two-way link quality.
    pub fn link_cost(&self) -> u8 {
        super::link_quality_to_cost(self.two_way_link_quality())
    }
}

impl Neighbor for Router {
    fn core(&self) -> &NeighborCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut NeighborCore {
        &mut self.core
    }
}

//! Router ID allocation and route computation.

use rand::Rng;
use tracing::{debug, trace};

use super::TableError;
use crate::address::MAX_ROUTER_ID;
use crate::neighbor::{MAX_ROUTE_COST, Neighbor, ROUTER_SLOTS, Router};
use crate::protocol::{RouteData, RouteTlv, RouterIdSet};

/// How long a released router ID stays unavailable.
pub const DEFAULT_ROUTER_ID_REUSE_DELAY_MS: u64 = 100_000;

/// Whether `incoming` is a strictly newer Router-ID Sequence than
/// `current`, using signed 8-bit wraparound.
pub fn sequence_is_newer(incoming: u8, current: u8) -> bool {
    (incoming.wrapping_sub(current) as i8) > 0
}

/// The partition's allocated router IDs and our routes toward them.
#[derive(Clone, Debug)]
pub struct RouterTable {
    routers: Vec<Option<Router>>,
    id_sequence: u8,
    /// Time (ms) until which a released ID may not be reassigned.
    reuse_until_ms: [u64; ROUTER_SLOTS],
    reuse_delay_ms: u64,
    own_router_id: Option<u8>,
    noise_floor: i8,
}

impl RouterTable {
    pub fn new(noise_floor: i8) -> Self {
        Self {
            routers: vec![None; ROUTER_SLOTS],
            id_sequence: 0,
            reuse_until_ms: [0; ROUTER_SLOTS],
            reuse_delay_ms: DEFAULT_ROUTER_ID_REUSE_DELAY_MS,
            own_router_id: None,
            noise_floor,
        }
    }

    pub fn with_reuse_delay(mut self, reuse_delay_ms: u64) -> Self {
        self.reuse_delay_ms = reuse_delay_ms;
        self
    }

    pub fn id_sequence(&self) -> u8 {
        self.id_sequence
    }

    pub fn own_router_id(&self) -> Option<u8> {
        self.own_router_id
    }

    /// Router ID of this node, excluded from next-hop computation.
    pub fn set_own_router_id(&mut self, router_id: Option<u8>) {
        self.own_router_id = router_id;
        self.recompute_routes();
    }

    pub fn router_mask(&self) -> RouterIdSet {
        self.allocated_ids().collect()
    }

    pub fn allocated_ids(&self) -> impl Iterator<Item = u8> + '_ {
        self.routers
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_some())
            .map(|(id, _)| id as u8)
    }

    /// Number of allocated router IDs.
    pub fn active_count(&self) -> usize {
        self.routers.iter().filter(|r| r.is_some()).count()
    }

    pub fn is_allocated(&self, router_id: u8) -> bool {
        self.get(router_id).is_some()
    }

    /// Whether `router_id` could be assigned now.
    pub fn is_available(&self, router_id: u8, now_ms: u64) -> bool {
        router_id <= MAX_ROUTER_ID
            && !self.is_allocated(router_id)
            && self.reuse_until_ms[router_id as usize] <= now_ms
    }

    pub fn get(&self, router_id: u8) -> Option<&Router> {
        self.routers.get(router_id as usize).and_then(|r| r.as_ref())
    }

    pub fn get_mut(&mut self, router_id: u8) -> Option<&mut Router> {
        self.routers
            .get_mut(router_id as usize)
            .and_then(|r| r.as_mut())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Router> + '_ {
        self.routers.iter().flatten()
    }

    /// Routers we currently hold a direct link to.
    pub fn neighbors(&self) -> impl Iterator<Item = &Router> + '_ {
        self.iter()
            .filter(|r| r.is_neighbor() && Some(r.router_id()) != self.own_router_id)
    }

    pub fn neighbor_count(&self) -> usize {
        self.neighbors().count()
    }

    /// Allocate a specific router ID and bump the sequence.
    pub fn allocate(&mut self, router_id: u8, now_ms: u64) -> Result<&mut Router, TableError> {
        if router_id > MAX_ROUTER_ID {
            return Err(TableError::InvalidRouterId(router_id));
        }
        if self.is_allocated(router_id) {
            return Err(TableError::Already(router_id));
        }
        self.insert_router(router_id, now_ms);
        self.id_sequence = self.id_sequence.wrapping_add(1);
        debug!(router_id, id_sequence = self.id_sequence, "Router ID allocated");
        self.get_mut(router_id)
            .ok_or(TableError::NotAllocated(router_id))
    }

    /// Allocate a uniformly chosen free ID outside its reuse delay.
    pub fn allocate_any<R: Rng + ?Sized>(&mut self, rng: &mut R, now_ms: u64) -> Result<u8, TableError> {
        let free: Vec<u8> = (0..=MAX_ROUTER_ID)
            .filter(|id| self.is_available(*id, now_ms))
            .collect();
        if free.is_empty() {
            return Err(TableError::NoBufs {
                capacity: ROUTER_SLOTS,
            });
        }
        let router_id = free[rng.random_range(0..free.len())];
        self.allocate(router_id, now_ms)?;
        Ok(router_id)
    }

    /// Release a router ID, hold it in the reuse delay, and drop every
    /// route that went through it.
    pub fn release(&mut self, router_id: u8, now_ms: u64) -> Result<(), TableError> {
        if router_id > MAX_ROUTER_ID {
            return Err(TableError::InvalidRouterId(router_id));
        }
        if self.routers[router_id as usize].take().is_none() {
            return Err(TableError::NotAllocated(router_id));
        }
        self.reuse_until_ms[router_id as usize] = now_ms.saturating_add(self.reuse_delay_ms);
        self.id_sequence = self.id_sequence.wrapping_add(1);
        debug!(router_id, id_sequence = self.id_sequence, "Router ID released");
        self.recompute_routes();
        Ok(())
    }

    /// Drop every allocation and link.
    pub fn clear(&mut self) {
        self.routers.iter_mut().for_each(|r| *r = None);
        self.reuse_until_ms = [0; ROUTER_SLOTS];
        self.own_router_id = None;
    }

    /// Adopt the sequence and mask from a Route TLV unconditionally, as done
    /// when joining a partition.
    pub fn reset_from_route(&mut self, route: &RouteTlv, now_ms: u64) {
        self.reset_from_mask(route.id_sequence, &route.router_mask, now_ms);
    }

    /// Adopt a Router-ID Sequence and mask, as carried by an Address
    /// Solicit Response.
    pub fn reset_from_mask(&mut self, id_sequence: u8, mask: &RouterIdSet, now_ms: u64) {
        self.id_sequence = id_sequence;
        self.apply_mask(mask, now_ms);
    }

    /// Merge a Route TLV if its sequence is strictly newer. Returns whether
    /// the allocation set was replaced.
    pub fn process_route_tlv(&mut self, route: &RouteTlv, now_ms: u64) -> bool {
        if !sequence_is_newer(route.id_sequence, self.id_sequence) {
            trace!(
                incoming = route.id_sequence,
                current = self.id_sequence,
                "Route TLV not newer, ignoring mask"
            );
            return false;
        }
        self.id_sequence = route.id_sequence;
        self.apply_mask(&route.router_mask, now_ms);
        true
    }

    fn apply_mask(&mut self, mask: &RouterIdSet, now_ms: u64) {
        for id in 0..=MAX_ROUTER_ID {
            let wanted = mask.contains(id);
            match (wanted, self.is_allocated(id)) {
                (true, false) => self.insert_router(id, now_ms),
                (false, true) => {
                    self.routers[id as usize] = None;
                    debug!(router_id = id, "Router evicted by newer mask");
                }
                _ => {}
            }
        }
        self.recompute_routes();
    }

    fn insert_router(&mut self, router_id: u8, now_ms: u64) {
        let mut router = Router::new(router_id, self.noise_floor);
        router.last_reachable_ms = now_ms;
        self.routers[router_id as usize] = Some(router);
    }

    /// Record the costs a neighboring router advertised and rerun route
    /// selection.
    pub fn update_neighbor_routes(&mut self, neighbor_id: u8, route: &RouteTlv) {
        let own = self.own_router_id;
        let Some(neighbor) = self.get_mut(neighbor_id) else {
            return;
        };
        neighbor.advertised_cost = [MAX_ROUTE_COST; ROUTER_SLOTS];
        neighbor.advertised_link_quality = [0; ROUTER_SLOTS];
        for (id, data) in route.entries() {
            let slot = id as usize;
            if id == neighbor_id {
                neighbor.advertised_cost[slot] = 0;
                continue;
            }
            // A zero cost marks "no route" except for the sender itself.
            let cost = match data.route_cost() {
                0 => MAX_ROUTE_COST,
                c => c,
            };
            neighbor.advertised_cost[slot] = cost;
            neighbor.advertised_link_quality[slot] = data.link_quality_in();
            if Some(id) == own {
                neighbor.link_quality_out = data.link_quality_in();
            }
        }
        self.recompute_routes();
    }

    /// Recompute every next hop from direct links and the costs advertised
    /// by neighboring routers.
    pub fn recompute_routes(&mut self) {
        let links: Vec<(u8, u8, [u8; ROUTER_SLOTS])> = self
            .neighbors()
            .map(|n| (n.router_id(), n.link_cost(), n.advertised_cost))
            .collect();
        let own = self.own_router_id;
        for dest in 0..=MAX_ROUTER_ID {
            if Some(dest) == own {
                if let Some(router) = self.get_mut(dest) {
                    router.next_hop = Some(dest);
                    router.cost = 0;
                }
                continue;
            }
            let Some(router) = self.routers[dest as usize].as_mut() else {
                continue;
            };
            let mut best: Option<(u8, u8)> = None;
            for (via, link_cost, advertised) in &links {
                let cost = if *via == dest {
                    *link_cost
                } else {
                    link_cost.saturating_add(advertised[dest as usize])
                };
                if cost >= MAX_ROUTE_COST {
                    continue;
                }
                let better = match best {
                    None => true,
                    Some((best_cost, best_via)) => {
                        cost < best_cost || (cost == best_cost && *via == dest && best_via != dest)
                    }
                };
                if better {
                    best = Some((cost, *via));
                }
            }
            match best {
                Some((cost, via)) => {
                    router.next_hop = Some(via);
                    router.cost = cost;
                }
                None => {
                    router.next_hop = None;
                    router.cost = MAX_ROUTE_COST;
                }
            }
        }
    }

    /// Next-hop router ID toward `router_id`, if reachable.
    pub fn next_hop(&self, router_id: u8) -> Option<u8> {
        self.get(router_id).and_then(|r| r.next_hop)
    }

    /// Path cost toward `router_id`; `MAX_ROUTE_COST` when unreachable.
    pub fn path_cost(&self, router_id: u8) -> u8 {
        if Some(router_id) == self.own_router_id {
            return 0;
        }
        self.get(router_id)
            .filter(|r| r.next_hop.is_some())
            .map(|r| r.cost)
            .unwrap_or(MAX_ROUTE_COST)
    }

    /// Build the Route TLV describing this node's view.
    pub fn build_route_tlv(&self) -> RouteTlv {
        let router_mask = self.router_mask();
        let route_data = router_mask
            .iter()
            .map(|id| {
                if Some(id) == self.own_router_id {
                    return RouteData::new(0, 0, 1);
                }
                match self.get(id) {
                    Some(r) if r.is_neighbor() => RouteData::new(
                        r.link_quality_out,
                        r.link_quality_in(),
                        route_cost_byte(self.path_cost(id)),
                    ),
                    _ => RouteData::new(0, 0, route_cost_byte(self.path_cost(id))),
                }
            })
            .collect();
        RouteTlv {
            id_sequence: self.id_sequence,
            router_mask,
            route_data,
        }
    }

    /// Neighbors whose two-way link quality is at least `min_quality`.
    pub fn good_neighbor_count(&self, min_quality: u8) -> usize {
        self.neighbors()
            .filter(|r| r.two_way_link_quality() >= min_quality)
            .count()
    }
}

fn route_cost_byte(cost: u8) -> u8 {
    if cost >= MAX_ROUTE_COST { 0 } else { cost }
}

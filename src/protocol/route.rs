//! Route64 TLV value and the router ID bitset it carries.

use super::error::ProtocolError;
use crate::address::MAX_ROUTER_ID;

/// Set of router IDs 0..=62, laid out MSB-first exactly as on the wire.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct RouterIdSet([u8; 8]);

impl RouterIdSet {
    pub const SIZE: usize = 8;

    pub fn from_bytes(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }

    pub fn contains(&self, router_id: u8) -> bool {
        router_id <= MAX_ROUTER_ID && self.0[router_id as usize / 8] & (0x80 >> (router_id % 8)) != 0
    }

    pub fn insert(&mut self, router_id: u8) {
        if router_id <= MAX_ROUTER_ID {
            self.0[router_id as usize / 8] |= 0x80 >> (router_id % 8);
        }
    }

    pub fn remove(&mut self, router_id: u8) {
        if router_id <= MAX_ROUTER_ID {
            self.0[router_id as usize / 8] &= !(0x80 >> (router_id % 8));
        }
    }

    pub fn len(&self) -> usize {
        self.0.iter().map(|b| b.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    /// Allocated IDs in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        (0..=MAX_ROUTER_ID).filter(move |id| self.contains(*id))
    }
}

impl std::fmt::Debug for RouterIdSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl FromIterator<u8> for RouterIdSet {
    fn from_iter<I: IntoIterator<Item = u8>>(iter: I) -> Self {
        let mut set = RouterIdSet::default();
        for id in iter {
            set.insert(id);
        }
        set
    }
}

/// Packed per-router route byte: `[lq_out:2][lq_in:2][cost:4]`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RouteData(u8);

impl RouteData {
    pub fn new(link_quality_out: u8, link_quality_in: u8, route_cost: u8) -> Self {
        Self(((link_quality_out & 0x03) << 6) | ((link_quality_in & 0x03) << 4) | (route_cost & 0x0f))
    }

    pub fn from_byte(b: u8) -> Self {
        Self(b)
    }

    pub fn to_byte(self) -> u8 {
        self.0
    }

    pub fn link_quality_out(self) -> u8 {
        self.0 >> 6
    }

    pub fn link_quality_in(self) -> u8 {
        (self.0 >> 4) & 0x03
    }

    pub fn route_cost(self) -> u8 {
        self.0 & 0x0f
    }
}

/// Route64 TLV: Router-ID Sequence, Router-ID Mask, and one route byte per
/// allocated router.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RouteTlv {
    pub id_sequence: u8,
    pub router_mask: RouterIdSet,
    pub route_data: Vec<RouteData>,
}

impl RouteTlv {
    pub fn encoded_len(&self) -> usize {
        1 + RouterIdSet::SIZE + self.route_data.len()
    }

    pub fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(self.id_sequence);
        buf.extend_from_slice(self.router_mask.as_bytes());
        buf.extend(self.route_data.iter().map(|r| r.to_byte()));
    }

    pub fn decode(value: &[u8]) -> Result<Self, ProtocolError> {
        if value.len() < 1 + RouterIdSet::SIZE {
            return Err(ProtocolError::MessageTooShort {
                expected: 1 + RouterIdSet::SIZE,
                got: value.len(),
            });
        }
        let mut mask = [0u8; 8];
        mask.copy_from_slice(&value[1..9]);
        // Bit 63 is outside the router ID namespace.
        if mask[7] & 0x01 != 0 {
            return Err(ProtocolError::Malformed("router mask sets id 63".into()));
        }
        let router_mask = RouterIdSet::from_bytes(mask);
        let route_data: Vec<RouteData> = value[9..].iter().map(|b| RouteData::from_byte(*b)).collect();
        if route_data.len() != router_mask.len() {
            return Err(ProtocolError::Malformed(format!(
                "route data count {} does not match mask count {}",
                route_data.len(),
                router_mask.len()
            )));
        }
        Ok(Self {
            id_sequence: value[0],
            router_mask,
            route_data,
        })
    }

    /// Route byte for a router ID present in the mask.
    pub fn route_data_for(&self, router_id: u8) -> Option<RouteData> {
        if !self.router_mask.contains(router_id) {
            return None;
        }
        let index = self.router_mask.iter().take_while(|id| *id != router_id).count();
        self.route_data.get(index).copied()
    }

    /// Iterate `(router_id, route_data)` pairs.
    pub fn entries(&self) -> impl Iterator<Item = (u8, RouteData)> + '_ {
        self.router_mask.iter().zip(self.route_data.iter().copied())
    }
}

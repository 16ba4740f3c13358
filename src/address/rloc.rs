//! RLOC16 bit layout helpers.
//!
//! ```text
//!  15          10 9  8                0
//! +--------------+---+----------------+
//! |  router id   | 0 |    child id    |
//! +--------------+---+----------------+
//! ```

/// Highest assignable router ID.
pub const MAX_ROUTER_ID: u8 = 62;

/// Router ID value meaning "none".
pub const INVALID_ROUTER_ID: u8 = MAX_ROUTER_ID + 1;

/// Bit offset of the router ID within an RLOC16.
pub const ROUTER_ID_OFFSET: u16 = 10;

/// Lowest child ID a parent hands out.
pub const MIN_CHILD_ID: u16 = 1;

/// Highest child ID a parent hands out.
pub const MAX_CHILD_ID: u16 = 511;

/// RLOC16 value meaning "not assigned".
pub const INVALID_RLOC16: u16 = 0xfffe;

/// Anycast locator of the partition leader.
pub const ALOC16_LEADER: u16 = 0xfc00;

const CHILD_ID_MASK: u16 = 0x01ff;

/// Extract the router ID from an RLOC16.
pub fn router_id_from_rloc16(rloc16: u16) -> u8 {
    (rloc16 >> ROUTER_ID_OFFSET) as u8
}

/// Extract the child ID from an RLOC16.
pub fn child_id_from_rloc16(rloc16: u16) -> u16 {
    rloc16 & CHILD_ID_MASK
}

/// RLOC16 of the router with the given ID.
pub fn rloc16_from_router_id(router_id: u8) -> u16 {
    (router_id as u16) << ROUTER_ID_OFFSET
}

/// Combine a router ID and a child ID.
pub fn rloc16_from_parts(router_id: u8, child_id: u16) -> u16 {
    rloc16_from_router_id(router_id) | (child_id & CHILD_ID_MASK)
}

/// True if the RLOC16 names a router rather than one of its children.
pub fn is_active_router(rloc16: u16) -> bool {
    child_id_from_rloc16(rloc16) == 0
}

/// True if both RLOC16s fall in the same router region.
pub fn router_ids_match(a: u16, b: u16) -> bool {
    router_id_from_rloc16(a) == router_id_from_rloc16(b)
}

pub fn is_valid_router_id(router_id: u8) -> bool {
    router_id <= MAX_ROUTER_ID
}

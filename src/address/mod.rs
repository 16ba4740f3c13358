//! Thread Addressing
//!
//! Extended (EUI-64 style) addresses, 16-bit routing locators (RLOC16),
//! and the IPv6 addresses MLE derives from them. The link-local address of
//! a node is a pure function of its extended address, and its mesh-local
//! routing locator is a pure function of the mesh-local prefix and RLOC16,
//! so neither ever needs to be negotiated.

mod ext_address;
mod mesh_local;
mod rloc;

use thiserror::Error;

pub use ext_address::ExtAddress;
pub use mesh_local::{
    LINK_LOCAL_ALL_NODES, LINK_LOCAL_ALL_ROUTERS, MeshLocalPrefix, ext_address_from_link_local,
    link_local_from_ext_address,
};
pub use rloc::{
    ALOC16_LEADER, INVALID_RLOC16, INVALID_ROUTER_ID, MAX_CHILD_ID, MAX_ROUTER_ID, MIN_CHILD_ID,
    ROUTER_ID_OFFSET, child_id_from_rloc16, is_active_router, is_valid_router_id,
    rloc16_from_parts, rloc16_from_router_id, router_id_from_rloc16, router_ids_match,
};

/// Errors that can occur when parsing or deriving addresses.
#[derive(Debug, Error)]
pub enum AddressError {
    #[error("invalid extended address length: expected 8, got {0}")]
    InvalidExtAddressLength(usize),

    #[error("invalid extended address hex: {0}")]
    InvalidExtAddressHex(String),

    #[error("invalid mesh-local prefix: {0}")]
    InvalidPrefix(String),
}

//! Neighbor Abstraction
//!
//! Every device this node has a direct link to is a neighbor: the parent
//! (while a child), children (while a router), and adjacent routers. They
//! share a [`NeighborCore`] (addresses, link statistics, frame counters,
//! neighbor state) and differ in role-specific data held by [`Child`] and
//! [`Router`]. The [`Neighbor`] trait exposes the shared part;
//! [`NeighborKind`] is a borrowed view used when a lookup may return
//! either kind.

mod child;
mod link;
mod router;

pub use child::Child;
pub use link::{
    DEFAULT_NOISE_FLOOR_DBM, LinkInfo, MAX_ROUTE_COST, link_quality_from_margin,
    link_quality_to_cost,
};
pub use router::Router;
pub(crate) use router::ROUTER_SLOTS;

use crate::address::{ExtAddress, INVALID_RLOC16};
use crate::protocol::DeviceMode;
use crate::security::{Challenge, FrameCounters};
use std::fmt;

// ============================================================================
// Neighbor State
// ============================================================================

/// Link establishment progress for a neighbor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NeighborState {
    /// Free slot / no relationship.
    #[default]
    Invalid,
    /// Recovered from persisted settings; not yet re-verified.
    Restored,
    /// Parent Request received; Parent Response pending.
    ParentRequest,
    /// Parent Response received (child side candidate).
    ParentResponse,
    /// Child ID Request received, waiting for a router ID to answer it.
    ChildIdRequest,
    /// Link Request sent; waiting for Link Accept.
    LinkRequest,
    /// Child Update Request sent; waiting for the response.
    ChildUpdateRequest,
    /// Fully established.
    Valid,
}

impl NeighborState {
    pub fn is_valid(&self) -> bool {
        matches!(self, NeighborState::Valid)
    }

    /// Valid, or valid enough to route to while being refreshed.
    pub fn is_valid_or_restoring(&self) -> bool {
        matches!(
            self,
            NeighborState::Valid | NeighborState::Restored | NeighborState::ChildUpdateRequest
        )
    }

    pub fn is_attaching(&self) -> bool {
        matches!(
            self,
            NeighborState::ParentRequest | NeighborState::ChildIdRequest
        )
    }
}

impl fmt::Display for NeighborState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NeighborState::Invalid => "invalid",
            NeighborState::Restored => "restored",
            NeighborState::ParentRequest => "parent-request",
            NeighborState::ParentResponse => "parent-response",
            NeighborState::ChildIdRequest => "child-id-request",
            NeighborState::LinkRequest => "link-request",
            NeighborState::ChildUpdateRequest => "child-update-request",
            NeighborState::Valid => "valid",
        };
        write!(f, "{}", s)
    }
}

// ============================================================================
// Shared Core
// ============================================================================

/// State common to every neighbor kind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NeighborCore {
    pub ext_address: ExtAddress,
    pub rloc16: u16,
    pub state: NeighborState,
    pub link: LinkInfo,
    pub counters: FrameCounters,
    pub mode: DeviceMode,
    pub version: u16,
    /// Timestamp (ms) of the last frame accepted from this neighbor.
    pub last_heard_ms: u64,
    /// Challenge we sent and expect echoed back.
    pub pending_challenge: Option<Challenge>,
}

impl NeighborCore {
    pub fn new(ext_address: ExtAddress, noise_floor: i8) -> Self {
        Self {
            ext_address,
            rloc16: INVALID_RLOC16,
            state: NeighborState::Invalid,
            link: LinkInfo::new(noise_floor),
            counters: FrameCounters::default(),
            mode: DeviceMode::default(),
            version: 0,
            last_heard_ms: 0,
            pending_challenge: None,
        }
    }
}

/// Capability shared by [`Child`] and [`Router`].
pub trait Neighbor {
    fn core(&self) -> &NeighborCore;
    fn core_mut(&mut self) -> &mut NeighborCore;

    fn ext_address(&self) -> ExtAddress {
        self.core().ext_address
    }

    fn rloc16(&self) -> u16 {
        self.core().rloc16
    }

    fn state(&self) -> NeighborState {
        self.core().state
    }

    fn set_state(&mut self, state: NeighborState) {
        self.core_mut().state = state;
    }

    fn is_valid(&self) -> bool {
        self.core().state.is_valid()
    }

    fn link_quality_in(&self) -> u8 {
        self.core().link.link_quality_in()
    }

    fn last_heard_ms(&self) -> u64 {
        self.core().last_heard_ms
    }

    /// Record a received frame's signal strength and arrival time.
    fn heard(&mut self, rss: i8, now_ms: u64) {
        let core = self.core_mut();
        core.link.add_rss(rss);
        core.last_heard_ms = now_ms;
    }
}

/// Borrowed view of either neighbor kind.
#[derive(Clone, Copy, Debug)]
pub enum NeighborKind<'a> {
    Child(&'a Child),
    Router(&'a Router),
}

impl NeighborKind<'_> {
    pub fn core(&self) -> &NeighborCore {
        match self {
            NeighborKind::Child(c) => c.core(),
            NeighborKind::Router(r) => r.core(),
        }
    }

    pub fn ext_address(&self) -> ExtAddress {
        self.core().ext_address
    }

    pub fn rloc16(&self) -> u16 {
        self.core().rloc16
    }

    pub fn is_child(&self) -> bool {
        matches!(self, NeighborKind::Child(_))
    }
}

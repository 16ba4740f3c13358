//! MLE behaviour configuration (`mle.*`).
//!
//! Timing defaults are the Thread 1.1 protocol constants; they are exposed
//! so simulations can compress time and tests can pin behaviour.

use serde::{Deserialize, Serialize};

use crate::address::ExtAddress;
use crate::protocol::DeviceMode;

// ============================================================================
// Attach
// ============================================================================

/// Attach procedure timing (`mle.attach.*`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachConfig {
    /// Max random delay before the first Parent Request (`mle.attach.start_jitter_ms`).
    #[serde(default = "AttachConfig::default_start_jitter_ms")]
    pub start_jitter_ms: u64,
    /// Wait after a routers-only Parent Request (`mle.attach.parent_request_router_timeout_ms`).
    #[serde(default = "AttachConfig::default_parent_request_router_timeout_ms")]
    pub parent_request_router_timeout_ms: u64,
    /// Wait after a routers-and-REEDs Parent Request (`mle.attach.parent_request_reed_timeout_ms`).
    #[serde(default = "AttachConfig::default_parent_request_reed_timeout_ms")]
    pub parent_request_reed_timeout_ms: u64,
    /// Wait for a Child ID Response (`mle.attach.child_id_request_timeout_ms`).
    #[serde(default = "AttachConfig::default_child_id_request_timeout_ms")]
    pub child_id_request_timeout_ms: u64,
    /// Time to collect Announce messages before reattaching (`mle.attach.announce_process_timeout_ms`).
    #[serde(default = "AttachConfig::default_announce_process_timeout_ms")]
    pub announce_process_timeout_ms: u64,
    /// Base of the exponential attach backoff (`mle.attach.backoff_base_ms`).
    #[serde(default = "AttachConfig::default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// Cap on the attach backoff (`mle.attach.backoff_max_ms`).
    #[serde(default = "AttachConfig::default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

impl Default for AttachConfig {
    fn default() -> Self {
        Self {
            start_jitter_ms: 50,
            parent_request_router_timeout_ms: 750,
            parent_request_reed_timeout_ms: 1250,
            child_id_request_timeout_ms: 5000,
            announce_process_timeout_ms: 250,
            backoff_base_ms: 1000,
            backoff_max_ms: 60_000,
        }
    }
}

impl AttachConfig {
    fn default_start_jitter_ms() -> u64 { 50 }
    fn default_parent_request_router_timeout_ms() -> u64 { 750 }
    fn default_parent_request_reed_timeout_ms() -> u64 { 1250 }
    fn default_child_id_request_timeout_ms() -> u64 { 5000 }
    fn default_announce_process_timeout_ms() -> u64 { 250 }
    fn default_backoff_base_ms() -> u64 { 1000 }
    fn default_backoff_max_ms() -> u64 { 60_000 }
}

// ============================================================================
// Child Keepalive
// ============================================================================

/// Child-side update and keepalive timing (`mle.child.*`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChildConfig {
    /// Timeout requested from the parent, seconds (`mle.child.timeout_secs`).
    #[serde(default = "ChildConfig::default_timeout_secs")]
    pub timeout_secs: u32,
    /// Coalescing delay for deferred Child Update Requests (`mle.child.update_pending_delay_ms`).
    #[serde(default = "ChildConfig::default_update_pending_delay_ms")]
    pub update_pending_delay_ms: u64,
    /// Retransmission interval (`mle.child.retransmission_delay_ms`).
    #[serde(default = "ChildConfig::default_retransmission_delay_ms")]
    pub retransmission_delay_ms: u64,
    /// Unanswered keepalives before detaching (`mle.child.max_keepalive_attempts`).
    #[serde(default = "ChildConfig::default_max_keepalive_attempts")]
    pub max_keepalive_attempts: u8,
    /// Wait for a Child Update Response (`mle.child.update_response_timeout_ms`).
    #[serde(default = "ChildConfig::default_update_response_timeout_ms")]
    pub update_response_timeout_ms: u64,
}

impl Default for ChildConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 240,
            update_pending_delay_ms: 100,
            retransmission_delay_ms: 1000,
            max_keepalive_attempts: 4,
            update_response_timeout_ms: 2000,
        }
    }
}

impl ChildConfig {
    fn default_timeout_secs() -> u32 { 240 }
    fn default_update_pending_delay_ms() -> u64 { 100 }
    fn default_retransmission_delay_ms() -> u64 { 1000 }
    fn default_max_keepalive_attempts() -> u8 { 4 }
    fn default_update_response_timeout_ms() -> u64 { 2000 }
}

// ============================================================================
// Router Role
// ============================================================================

/// Router and leader role management (`mle.router.*`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// May become a router (`mle.router.eligible`).
    #[serde(default = "RouterConfig::default_eligible")]
    pub eligible: bool,
    /// Active routers below which a REED upgrades (`mle.router.upgrade_threshold`).
    #[serde(default = "RouterConfig::default_upgrade_threshold")]
    pub upgrade_threshold: u8,
    /// Active routers above which a router considers downgrading (`mle.router.downgrade_threshold`).
    #[serde(default = "RouterConfig::default_downgrade_threshold")]
    pub downgrade_threshold: u8,
    /// Good-link neighbors required before downgrading (`mle.router.min_downgrade_neighbors`).
    #[serde(default = "RouterConfig::default_min_downgrade_neighbors")]
    pub min_downgrade_neighbors: u8,
    /// Children tolerated per excess router when downgrading (`mle.router.children_per_excess_router`).
    #[serde(default = "RouterConfig::default_children_per_excess_router")]
    pub children_per_excess_router: u8,
    /// Upper bound of the role transition countdown, seconds (`mle.router.selection_jitter_secs`).
    #[serde(default = "RouterConfig::default_selection_jitter_secs")]
    pub selection_jitter_secs: u32,
    /// Weight advertised when becoming leader (`mle.router.leader_weight`).
    #[serde(default = "RouterConfig::default_leader_weight")]
    pub leader_weight: u8,
    /// Priority advertised in Parent Responses (`mle.router.parent_priority`).
    #[serde(default)]
    pub parent_priority: i8,
    /// Seconds without leader contact before reattaching (`mle.router.network_id_timeout_secs`).
    #[serde(default = "RouterConfig::default_network_id_timeout_secs")]
    pub network_id_timeout_secs: u32,
    /// Seconds a released router ID is held back (`mle.router.id_reuse_delay_secs`).
    #[serde(default = "RouterConfig::default_id_reuse_delay_secs")]
    pub id_reuse_delay_secs: u32,
    /// Seconds an unreachable router keeps its ID (`mle.router.max_unreachable_secs`).
    #[serde(default = "RouterConfig::default_max_unreachable_secs")]
    pub max_unreachable_secs: u32,
    /// Link Request response timeout (`mle.router.link_request_timeout_ms`).
    #[serde(default = "RouterConfig::default_link_request_timeout_ms")]
    pub link_request_timeout_ms: u64,
    /// Multicast Link Request attempts after reset (`mle.router.link_request_attempts`).
    #[serde(default = "RouterConfig::default_link_request_attempts")]
    pub link_request_attempts: u8,
    /// Address Solicit response timeout (`mle.router.address_solicit_timeout_ms`).
    #[serde(default = "RouterConfig::default_address_solicit_timeout_ms")]
    pub address_solicit_timeout_ms: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            eligible: true,
            upgrade_threshold: 16,
            downgrade_threshold: 23,
            min_downgrade_neighbors: 7,
            children_per_excess_router: 3,
            selection_jitter_secs: 120,
            leader_weight: 64,
            parent_priority: 0,
            network_id_timeout_secs: 120,
            id_reuse_delay_secs: 100,
            max_unreachable_secs: 90,
            link_request_timeout_ms: 2000,
            link_request_attempts: 2,
            address_solicit_timeout_ms: 5000,
        }
    }
}

impl RouterConfig {
    fn default_eligible() -> bool { true }
    fn default_upgrade_threshold() -> u8 { 16 }
    fn default_downgrade_threshold() -> u8 { 23 }
    fn default_min_downgrade_neighbors() -> u8 { 7 }
    fn default_children_per_excess_router() -> u8 { 3 }
    fn default_selection_jitter_secs() -> u32 { 120 }
    fn default_leader_weight() -> u8 { 64 }
    fn default_network_id_timeout_secs() -> u32 { 120 }
    fn default_id_reuse_delay_secs() -> u32 { 100 }
    fn default_max_unreachable_secs() -> u32 { 90 }
    fn default_link_request_timeout_ms() -> u64 { 2000 }
    fn default_link_request_attempts() -> u8 { 2 }
    fn default_address_solicit_timeout_ms() -> u64 { 5000 }
}

// ============================================================================
// Advertisement
// ============================================================================

/// Advertisement schedule (`mle.advertise.*`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvertiseConfig {
    /// Minimum trickle interval (`mle.advertise.imin_ms`).
    #[serde(default = "AdvertiseConfig::default_imin_ms")]
    pub imin_ms: u64,
    /// Maximum trickle interval (`mle.advertise.imax_ms`).
    #[serde(default = "AdvertiseConfig::default_imax_ms")]
    pub imax_ms: u64,
    /// REED advertisement period, seconds (`mle.advertise.reed_interval_secs`).
    #[serde(default = "AdvertiseConfig::default_reed_interval_secs")]
    pub reed_interval_secs: u32,
    /// Extra random REED delay, seconds (`mle.advertise.reed_jitter_secs`).
    #[serde(default = "AdvertiseConfig::default_reed_jitter_secs")]
    pub reed_jitter_secs: u32,
    /// Upper bound for randomized unicast/multicast response delays (`mle.advertise.max_response_delay_ms`).
    #[serde(default = "AdvertiseConfig::default_max_response_delay_ms")]
    pub max_response_delay_ms: u64,
}

impl Default for AdvertiseConfig {
    fn default() -> Self {
        Self {
            imin_ms: 1000,
            imax_ms: 32_000,
            reed_interval_secs: 570,
            reed_jitter_secs: 60,
            max_response_delay_ms: 1000,
        }
    }
}

impl AdvertiseConfig {
    fn default_imin_ms() -> u64 { 1000 }
    fn default_imax_ms() -> u64 { 32_000 }
    fn default_reed_interval_secs() -> u32 { 570 }
    fn default_reed_jitter_secs() -> u32 { 60 }
    fn default_max_response_delay_ms() -> u64 { 1000 }
}

// ============================================================================
// Root MLE Section
// ============================================================================

/// MLE configuration (`mle.*`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MleConfig {
    /// Fixed extended address; random when absent (`mle.ext_address`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext_address: Option<ExtAddress>,
    /// Device mode flags (`mle.mode.*`).
    #[serde(default = "MleConfig::default_mode")]
    pub mode: DeviceMode,
    /// Child table capacity (`mle.max_children`).
    #[serde(default = "MleConfig::default_max_children")]
    pub max_children: usize,
    /// Registered addresses per child (`mle.max_child_addresses`).
    #[serde(default = "MleConfig::default_max_child_addresses")]
    pub max_child_addresses: usize,
    /// Receiver noise floor in dBm (`mle.noise_floor_dbm`).
    #[serde(default = "MleConfig::default_noise_floor_dbm")]
    pub noise_floor_dbm: i8,
    /// Attach timing (`mle.attach.*`).
    #[serde(default)]
    pub attach: AttachConfig,
    /// Child keepalive (`mle.child.*`).
    #[serde(default)]
    pub child: ChildConfig,
    /// Router role (`mle.router.*`).
    #[serde(default)]
    pub router: RouterConfig,
    /// Advertisements (`mle.advertise.*`).
    #[serde(default)]
    pub advertise: AdvertiseConfig,
}

impl Default for MleConfig {
    fn default() -> Self {
        Self {
            ext_address: None,
            mode: Self::default_mode(),
            max_children: 10,
            max_child_addresses: 4,
            noise_floor_dbm: -100,
            attach: AttachConfig::default(),
            child: ChildConfig::default(),
            router: RouterConfig::default(),
            advertise: AdvertiseConfig::default(),
        }
    }
}

impl MleConfig {
    fn default_mode() -> DeviceMode {
        DeviceMode::new(true, true, true)
    }
    fn default_max_children() -> usize { 10 }
    fn default_max_child_addresses() -> usize { 4 }
    fn default_noise_floor_dbm() -> i8 { -100 }

    /// Router-capable: full thread device with router eligibility on.
    pub fn is_router_capable(&self) -> bool {
        self.router.eligible && self.mode.is_full_thread_device()
    }
}

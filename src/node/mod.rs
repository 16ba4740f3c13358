//! MLE Engine
//!
//! [`Mle`] is the single context object of a Thread device's Mesh Link
//! Establishment layer. It owns the role state machine, the parent and
//! parent-candidate slots, the child and router tables, and every timer.
//! Nothing in it blocks or spawns. All mutation happens inside one of three
//! entry points:
//!
//! - [`Mle::handle_receive`] for an inbound UDP datagram
//! - [`Mle::poll`] once the earliest timer deadline has passed
//! - a direct API call such as [`Mle::become_router`]
//!
//! Outbound datagrams go to the [`Transport`] collaborator and observable
//! changes are queued as [`MleEvent`]s for the embedding to drain.
//!
//! ## Role Transitions
//!
//! ```text
//! Disabled -> Detached
//! Detached -> Child | Router (restore) | Leader
//! Child    -> Router | Leader
//! Router   -> Child (downgrade) | Leader
//! Leader   -> Child (partition merge)
//! any      -> Detached | Disabled
//! ```

mod attach;
mod child;
mod handlers;
mod leader;
mod lifecycle;
mod parent;
mod persist;
mod retry;
mod router;
#[cfg(test)]
mod tests;

pub use parent::{ParentCandidate, PartitionInfo, compare_parents, compare_partitions};

use rand::SeedableRng;
use rand::rngs::StdRng;
use std::fmt;
use std::net::Ipv6Addr;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::address::{
    ExtAddress, INVALID_RLOC16, MeshLocalPrefix, child_id_from_rloc16, link_local_from_ext_address,
    rloc16_from_router_id, router_id_from_rloc16,
};
use crate::config::{Config, ConfigError};
use crate::network_data::{LocalNetworkData, NetworkDataError, NetworkDataProvider};
use crate::neighbor::{Neighbor, Router};
use crate::protocol::{LeaderData, MLE_PORT, MleMessage, ProtocolError, TMF_PORT, TmfFrame};
use crate::security::{
    ChaChaFrameCipher, Challenge, EnvelopeError, FrameCipher, KeyManager, KeySource, SecurityError,
    seal_frame,
};
use crate::settings::{MemorySettings, SettingsError, SettingsRecord, SettingsStore};
use crate::table::{ChildTable, RouterTable, TableError};
use crate::timer::{DelayedQueue, TimerKind, TimerQueue, TrickleTimer};
use crate::transport::{OutboundFrame, Transport, TransportError};

// ============================================================================
// Errors
// ============================================================================

/// Errors surfaced by MLE operations.
///
/// Receive-path failures are logged and counted, never returned to the
/// caller of [`Mle::handle_receive`].
#[derive(Debug, Error)]
pub enum MleError {
    #[error("parse error: {0}")]
    Parse(#[from] ProtocolError),

    #[error("security failure: {0}")]
    Security(SecurityError),

    #[error("duplicated frame counter {counter} at key sequence {key_sequence}")]
    Duplicated { key_sequence: u32, counter: u32 },

    #[error("operation already in progress")]
    Busy,

    #[error("already in requested state")]
    Already,

    #[error("attach already in progress")]
    AlreadyAttaching,

    #[error("no buffers available")]
    NoBufs,

    #[error("invalid state")]
    InvalidState,

    #[error("not found")]
    NotFound,

    #[error("message dropped: {0}")]
    Drop(&'static str),

    #[error("no route to destination")]
    NoRoute,

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("network data error: {0}")]
    NetworkData(#[from] NetworkDataError),
}

impl From<SecurityError> for MleError {
    fn from(e: SecurityError) -> Self {
        match e {
            SecurityError::Replay {
                key_sequence,
                counter,
                ..
            } => MleError::Duplicated {
                key_sequence,
                counter,
            },
            other => MleError::Security(other),
        }
    }
}

impl From<EnvelopeError> for MleError {
    fn from(e: EnvelopeError) -> Self {
        match e {
            EnvelopeError::Protocol(e) => MleError::Parse(e),
            EnvelopeError::Security(e) => e.into(),
        }
    }
}

impl From<TableError> for MleError {
    fn from(e: TableError) -> Self {
        match e {
            TableError::NoBufs { .. } => MleError::NoBufs,
            TableError::Already(_) => MleError::Already,
            TableError::NotAllocated(_) | TableError::StaleIndex => MleError::NotFound,
            TableError::InvalidRouterId(_) => MleError::InvalidState,
        }
    }
}

// ============================================================================
// Role and Attach State
// ============================================================================

/// Thread device role.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeviceRole {
    Disabled,
    Detached,
    Child,
    Router,
    Leader,
}

impl DeviceRole {
    pub fn is_attached(&self) -> bool {
        matches!(self, DeviceRole::Child | DeviceRole::Router | DeviceRole::Leader)
    }

    pub fn is_router_or_leader(&self) -> bool {
        matches!(self, DeviceRole::Router | DeviceRole::Leader)
    }

    /// Whether `self -> to` appears in the role transition table.
    pub fn can_transition_to(&self, to: DeviceRole) -> bool {
        use DeviceRole::*;
        match (*self, to) {
            (from, to) if from == to => false,
            (_, Disabled) => true,
            (Disabled, Detached) => true,
            (Disabled, _) => false,
            (_, Detached) => true,
            (Detached, Child | Router | Leader) => true,
            (Child, Router | Leader) => true,
            (Router, Child | Leader) => true,
            (Leader, Child) => true,
            _ => false,
        }
    }
}

impl fmt::Display for DeviceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeviceRole::Disabled => "disabled",
            DeviceRole::Detached => "detached",
            DeviceRole::Child => "child",
            DeviceRole::Router => "router",
            DeviceRole::Leader => "leader",
        };
        write!(f, "{}", s)
    }
}

/// Progress of the attach procedure.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AttachState {
    #[default]
    Idle,
    /// Attach timer armed; the first Parent Request has not gone out.
    Start,
    /// Routers-only Parent Request sent.
    ParentRequestRouters,
    /// Routers-and-REEDs Parent Request sent.
    ParentRequestRoutersAndReeds,
    /// Collecting Announce results before switching channel.
    Announce,
    /// Child ID Request sent to the selected candidate.
    ChildIdRequest,
    /// Restored child re-validating with its saved parent.
    Synchronize,
}

impl AttachState {
    pub fn is_idle(&self) -> bool {
        matches!(self, AttachState::Idle)
    }

    pub fn is_parent_request(&self) -> bool {
        matches!(
            self,
            AttachState::ParentRequestRouters | AttachState::ParentRequestRoutersAndReeds
        )
    }
}

impl fmt::Display for AttachState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AttachState::Idle => "idle",
            AttachState::Start => "start",
            AttachState::ParentRequestRouters => "parent-request-routers",
            AttachState::ParentRequestRoutersAndReeds => "parent-request-routers-and-reeds",
            AttachState::Announce => "announce",
            AttachState::ChildIdRequest => "child-id-request",
            AttachState::Synchronize => "synchronize",
        };
        write!(f, "{}", s)
    }
}

/// Which partitions an attach cycle may join.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AttachMode {
    #[default]
    AnyPartition,
    /// First attempt to rejoin our own partition.
    SamePartition,
    /// Second attempt to rejoin our own partition.
    SamePartitionRetry,
    /// Only a partition that compares better than ours.
    BetterPartition,
    /// A router looking for a parent before giving up its router ID.
    DowngradeToReed,
}

impl AttachMode {
    pub fn is_same_partition(&self) -> bool {
        matches!(self, AttachMode::SamePartition | AttachMode::SamePartitionRetry)
    }
}

impl fmt::Display for AttachMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AttachMode::AnyPartition => "any-partition",
            AttachMode::SamePartition => "same-partition",
            AttachMode::SamePartitionRetry => "same-partition-retry",
            AttachMode::BetterPartition => "better-partition",
            AttachMode::DowngradeToReed => "downgrade-to-reed",
        };
        write!(f, "{}", s)
    }
}

/// Announce-driven channel change progress.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReattachState {
    #[default]
    Idle,
    /// An alternate channel is stored; it is tried once the current attach
    /// cycle fails.
    Pending,
    /// Attaching on the alternate channel; failure falls back to the
    /// configured channel.
    Active,
}

/// Channel parameters learned from a newer Announce.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AlternateChannel {
    pub channel: u16,
    pub pan_id: u16,
    pub active_timestamp: u64,
}

// ============================================================================
// Events and Counters
// ============================================================================

/// Observable changes, drained with [`Mle::take_events`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MleEvent {
    RoleChanged { from: DeviceRole, to: DeviceRole },
    PartitionChanged { partition_id: u32 },
    ParentChanged { ext_address: ExtAddress, rloc16: u16 },
    NeighborAdded { ext_address: ExtAddress, rloc16: u16 },
    NeighborRemoved { ext_address: ExtAddress, rloc16: u16 },
    ChildAdded { ext_address: ExtAddress, rloc16: u16 },
    ChildRemoved { ext_address: ExtAddress, rloc16: u16 },
}

/// Message statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MleCounters {
    pub rx_messages: u64,
    pub rx_dropped: u64,
    pub rx_parse_errors: u64,
    pub rx_security_failures: u64,
    pub rx_duplicated: u64,
    pub tx_messages: u64,
    pub tx_failures: u64,
    pub attach_attempts: u64,
    pub parent_changes: u64,
    pub role_changes: u64,
}

/// A network heard in a Discovery Response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiscoveredNetwork {
    pub ext_pan_id: [u8; 8],
    pub network_name: String,
    pub source: ExtAddress,
    pub rss: i8,
}

// ============================================================================
// Collaborators
// ============================================================================

/// Everything the engine consumes but does not implement.
pub struct Collaborators {
    pub transport: Box<dyn Transport>,
    pub keys: Box<dyn KeySource>,
    pub cipher: Box<dyn FrameCipher>,
    pub settings: Box<dyn SettingsStore>,
    pub network_data: Box<dyn NetworkDataProvider>,
}

impl Collaborators {
    /// Bundled implementations keyed from `config`, sending through
    /// `transport` and persisting to memory.
    pub fn from_config(config: &Config, transport: Box<dyn Transport>) -> Result<Self, ConfigError> {
        let network_key = config.security.network_key_bytes()?;
        Ok(Self {
            transport,
            keys: Box::new(KeyManager::new(network_key, config.security.key_sequence)),
            cipher: Box::new(ChaChaFrameCipher),
            settings: Box::new(MemorySettings::new()),
            network_data: Box::new(LocalNetworkData::new(config.network.mesh_local_prefix)),
        })
    }

    /// Replace the settings store.
    pub fn with_settings(mut self, settings: Box<dyn SettingsStore>) -> Self {
        self.settings = settings;
        self
    }
}

/// An MLE message waiting in the delayed-response queue. Sealed when it
/// leaves the queue so it carries a fresh frame counter.
#[derive(Clone, Debug)]
pub(crate) struct PendingSend {
    pub destination: Ipv6Addr,
    pub message: MleMessage,
}

/// Period of the maintenance tick.
const STATE_UPDATE_PERIOD_MS: u64 = 1000;

// ============================================================================
// Engine
// ============================================================================

/// Mesh Link Establishment engine for one Thread interface.
pub struct Mle {
    // === Configuration ===
    config: Config,

    // === Addressing ===
    ext_address: ExtAddress,
    rloc16: u16,
    mesh_local_prefix: MeshLocalPrefix,
    /// Router ID held before the last detach, requested again on upgrade.
    previous_router_id: Option<u8>,
    channel: u16,
    pan_id: u16,
    active_timestamp: u64,

    // === Role ===
    role: DeviceRole,
    leader_data: LeaderData,

    // === Attach (owns parent and candidate) ===
    attach_state: AttachState,
    attach_mode: AttachMode,
    reattach_state: ReattachState,
    attach_backoff: retry::AttachBackoff,
    parent_request_challenge: Option<Challenge>,
    parent: Option<Router>,
    parent_candidate: Option<ParentCandidate>,
    alternate_channel: Option<AlternateChannel>,

    // === Child Role ===
    child_update: child::ChildUpdateState,

    // === Router Role (owns the tables) ===
    child_table: ChildTable,
    router_table: RouterTable,
    pending_solicit: Option<router::PendingSolicit>,
    role_transition: Option<router::RoleTransition>,
    /// Set when a router ID request failed; no new request until the
    /// partition's router set changes.
    upgrade_hold: Option<router::UpgradeHold>,
    link_request: Option<router::MulticastLinkRequest>,
    /// Set when the leader stopped being reachable while we route.
    leader_unreachable_since_ms: Option<u64>,
    next_tmf_transaction: u16,

    // === Timers ===
    timers: TimerQueue,
    trickle: TrickleTimer,
    delayed: DelayedQueue<PendingSend>,

    // === Collaborators ===
    transport: Box<dyn Transport>,
    keys: Box<dyn KeySource>,
    cipher: Box<dyn FrameCipher>,
    settings: Box<dyn SettingsStore>,
    network_data: Box<dyn NetworkDataProvider>,
    /// Last record written, used to decide when counters need refreshing.
    last_saved: Option<SettingsRecord>,

    // === Discovery ===
    discovered: Vec<DiscoveredNetwork>,

    // === Bookkeeping ===
    rng: StdRng,
    events: Vec<MleEvent>,
    counters: MleCounters,
}

impl Mle {
    /// Create a disabled engine. `seed` drives every random choice, so two
    /// engines built with the same inputs behave identically.
    pub fn new(config: Config, collaborators: Collaborators, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let ext_address = config
            .mle
            .ext_address
            .unwrap_or_else(|| ExtAddress::random(&mut rng));
        let noise_floor = config.mle.noise_floor_dbm;
        let router_table = RouterTable::new(noise_floor)
            .with_reuse_delay(config.mle.router.id_reuse_delay_secs as u64 * 1000);
        let child_table = ChildTable::new(config.mle.max_children, config.mle.max_child_addresses);
        let trickle = TrickleTimer::new(config.mle.advertise.imin_ms, config.mle.advertise.imax_ms);

        Self {
            ext_address,
            rloc16: INVALID_RLOC16,
            mesh_local_prefix: config.network.mesh_local_prefix,
            previous_router_id: None,
            channel: config.network.channel,
            pan_id: config.network.pan_id,
            active_timestamp: config.network.active_timestamp,
            role: DeviceRole::Disabled,
            leader_data: LeaderData::default(),
            attach_state: AttachState::Idle,
            attach_mode: AttachMode::AnyPartition,
            reattach_state: ReattachState::Idle,
            attach_backoff: retry::AttachBackoff::new(),
            parent_request_challenge: None,
            parent: None,
            parent_candidate: None,
            alternate_channel: None,
            child_update: child::ChildUpdateState::default(),
            child_table,
            router_table,
            pending_solicit: None,
            role_transition: None,
            upgrade_hold: None,
            link_request: None,
            leader_unreachable_since_ms: None,
            next_tmf_transaction: 1,
            timers: TimerQueue::new(),
            trickle,
            delayed: DelayedQueue::new(),
            transport: collaborators.transport,
            keys: collaborators.keys,
            cipher: collaborators.cipher,
            settings: collaborators.settings,
            network_data: collaborators.network_data,
            last_saved: None,
            discovered: Vec::new(),
            rng,
            events: Vec::new(),
            counters: MleCounters::default(),
            config,
        }
    }

    // === Accessors ===

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn role(&self) -> DeviceRole {
        self.role
    }

    pub fn ext_address(&self) -> ExtAddress {
        self.ext_address
    }

    pub fn rloc16(&self) -> u16 {
        self.rloc16
    }

    /// Our router ID while routing.
    pub fn router_id(&self) -> Option<u8> {
        self.role
            .is_router_or_leader()
            .then(|| router_id_from_rloc16(self.rloc16))
    }

    pub fn leader_data(&self) -> &LeaderData {
        &self.leader_data
    }

    pub fn partition_id(&self) -> u32 {
        self.leader_data.partition_id
    }

    pub fn attach_state(&self) -> AttachState {
        self.attach_state
    }

    pub fn attach_mode(&self) -> AttachMode {
        self.attach_mode
    }

    pub fn reattach_state(&self) -> ReattachState {
        self.reattach_state
    }

    pub fn parent(&self) -> Option<&Router> {
        self.parent.as_ref()
    }

    pub fn parent_candidate(&self) -> Option<&ParentCandidate> {
        self.parent_candidate.as_ref()
    }

    pub fn alternate_channel(&self) -> Option<AlternateChannel> {
        self.alternate_channel
    }

    pub fn channel(&self) -> u16 {
        self.channel
    }

    pub fn child_table(&self) -> &ChildTable {
        &self.child_table
    }

    pub fn router_table(&self) -> &RouterTable {
        &self.router_table
    }

    pub fn counters(&self) -> &MleCounters {
        &self.counters
    }

    pub fn mesh_local_prefix(&self) -> &MeshLocalPrefix {
        &self.mesh_local_prefix
    }

    pub fn discovered_networks(&self) -> &[DiscoveredNetwork] {
        &self.discovered
    }

    pub fn is_router_capable(&self) -> bool {
        self.config.mle.is_router_capable()
    }

    /// Drain queued events.
    pub fn take_events(&mut self) -> Vec<MleEvent> {
        std::mem::take(&mut self.events)
    }

    // === Addresses ===

    pub fn link_local_address(&self) -> Ipv6Addr {
        link_local_from_ext_address(&self.ext_address)
    }

    /// Mesh-local endpoint identifier, stable across role changes.
    pub fn mesh_local_eid(&self) -> Ipv6Addr {
        self.mesh_local_prefix
            .endpoint_identifier(self.ext_address.to_iid())
    }

    /// Mesh-local routing locator for the current RLOC16.
    pub fn mesh_local_rloc(&self) -> Ipv6Addr {
        self.mesh_local_prefix.routing_locator(self.rloc16)
    }

    pub fn is_mesh_local_address(&self, addr: &Ipv6Addr) -> bool {
        self.mesh_local_prefix.contains(addr)
    }

    pub fn is_routing_locator(&self, addr: &Ipv6Addr) -> bool {
        self.mesh_local_prefix.is_routing_locator(addr)
    }

    pub fn is_anycast_locator(&self, addr: &Ipv6Addr) -> bool {
        self.mesh_local_prefix.is_anycast_locator(addr)
    }

    // === Routing ===

    /// RLOC16 of the next hop toward `destination`.
    pub fn next_hop(&self, destination: u16) -> Result<u16, MleError> {
        match self.role {
            DeviceRole::Child => self
                .parent
                .as_ref()
                .map(|p| p.rloc16())
                .ok_or(MleError::NoRoute),
            DeviceRole::Router | DeviceRole::Leader => {
                if destination == self.rloc16 {
                    return Ok(destination);
                }
                let dest_router = router_id_from_rloc16(destination);
                if dest_router == router_id_from_rloc16(self.rloc16) {
                    // One of our children, or nobody.
                    return self
                        .child_table
                        .find_by_rloc16(destination)
                        .and_then(|idx| self.child_table.get(idx))
                        .filter(|c| c.is_valid())
                        .map(|_| destination)
                        .ok_or(MleError::NoRoute);
                }
                self.router_table
                    .next_hop(dest_router)
                    .map(rloc16_from_router_id)
                    .ok_or(MleError::NoRoute)
            }
            DeviceRole::Disabled | DeviceRole::Detached => Err(MleError::NoRoute),
        }
    }

    // === Internal: state changes ===

    pub(in crate::node) fn emit(&mut self, event: MleEvent) {
        trace!(event = ?event, "MLE event");
        self.events.push(event);
    }

    /// Switch role, refusing anything outside the transition table.
    pub(in crate::node) fn set_role(&mut self, to: DeviceRole) -> Result<(), MleError> {
        let from = self.role;
        if from == to {
            return Ok(());
        }
        if !from.can_transition_to(to) {
            warn!(from = %from, to = %to, "Rejected role transition");
            return Err(MleError::InvalidState);
        }
        self.role = to;
        self.counters.role_changes += 1;
        info!(from = %from, to = %to, rloc16 = format_args!("{:#06x}", self.rloc16), "Role changed");
        self.emit(MleEvent::RoleChanged { from, to });
        Ok(())
    }

    pub(in crate::node) fn set_leader_data(&mut self, leader_data: LeaderData) {
        if leader_data.partition_id != self.leader_data.partition_id {
            info!(
                partition_id = format_args!("{:#010x}", leader_data.partition_id),
                leader_router_id = leader_data.leader_router_id,
                "Partition changed"
            );
            self.emit(MleEvent::PartitionChanged {
                partition_id: leader_data.partition_id,
            });
        }
        self.leader_data = leader_data;
    }

    /// Leader Data as we advertise it, with our current Network Data
    /// versions.
    pub(in crate::node) fn current_leader_data(&self) -> LeaderData {
        LeaderData {
            data_version: self.network_data.version(),
            stable_data_version: self.network_data.stable_version(),
            ..self.leader_data
        }
    }

    /// Drop every child, signalling each removal.
    pub(in crate::node) fn remove_all_children(&mut self) {
        for idx in self.child_table.indices() {
            if let Some(child) = self.child_table.remove(idx)
                && child.is_valid()
            {
                info!(child = %child.ext_address(), rloc16 = format_args!("{:#06x}", child.rloc16()), "Child removed");
                self.emit(MleEvent::ChildRemoved {
                    ext_address: child.ext_address(),
                    rloc16: child.rloc16(),
                });
            }
        }
    }

    // === Internal: sending ===

    /// Seal and send an MLE message from our link-local address.
    pub(in crate::node) fn send_mle(
        &mut self,
        destination: Ipv6Addr,
        message: MleMessage,
    ) -> Result<(), MleError> {
        let source = self.link_local_address();
        let command = message.command;
        let payload = seal_frame(
            &message,
            &self.ext_address,
            &source,
            &destination,
            self.keys.as_mut(),
            self.cipher.as_ref(),
        )?;
        let frame = OutboundFrame {
            source,
            destination,
            port: MLE_PORT,
            payload,
            link_security: false,
        };
        if let Err(e) = self.transport.send(frame) {
            self.counters.tx_failures += 1;
            warn!(command = %command, destination = %destination, error = %e, "MLE send failed");
            return Err(e.into());
        }
        self.counters.tx_messages += 1;
        debug!(command = %command, destination = %destination, "Sent MLE message");
        self.refresh_settings();
        Ok(())
    }

    /// Queue an MLE message to go out `delay_ms` from now.
    pub(in crate::node) fn send_mle_after(
        &mut self,
        destination: Ipv6Addr,
        message: MleMessage,
        now_ms: u64,
        delay_ms: u64,
    ) {
        trace!(command = %message.command, delay_ms, "Queued delayed MLE message");
        self.delayed.push(
            now_ms.saturating_add(delay_ms),
            PendingSend {
                destination,
                message,
            },
        );
        if let Some(deadline) = self.delayed.next_deadline() {
            self.timers.start_at(TimerKind::DelayedResponse, deadline);
        }
    }

    /// Send a TMF message from our routing locator.
    pub(in crate::node) fn send_tmf(
        &mut self,
        destination: Ipv6Addr,
        frame: TmfFrame,
    ) -> Result<(), MleError> {
        let out = OutboundFrame {
            source: self.mesh_local_rloc(),
            destination,
            port: TMF_PORT,
            payload: frame.encode(),
            link_security: true,
        };
        if let Err(e) = self.transport.send(out) {
            self.counters.tx_failures += 1;
            return Err(e.into());
        }
        self.counters.tx_messages += 1;
        debug!(destination = %destination, transaction = frame.transaction, "Sent TMF message");
        Ok(())
    }

    pub(in crate::node) fn next_transaction(&mut self) -> u16 {
        let t = self.next_tmf_transaction;
        self.next_tmf_transaction = self.next_tmf_transaction.wrapping_add(1).max(1);
        t
    }

    /// Link margin in dB for a frame received at `rss`.
    pub(in crate::node) fn link_margin_for(&self, rss: i8) -> u8 {
        (rss as i16 - self.config.mle.noise_floor_dbm as i16).clamp(0, u8::MAX as i16) as u8
    }

    /// Router-eligible end device attached as a child.
    pub(in crate::node) fn is_reed(&self) -> bool {
        self.role == DeviceRole::Child && self.is_router_capable()
    }

    /// Child ID of an RLOC16 in our router region, if it names one of ours.
    pub(in crate::node) fn is_own_child_rloc16(&self, rloc16: u16) -> bool {
        self.role.is_router_or_leader()
            && child_id_from_rloc16(rloc16) != 0
            && router_id_from_rloc16(rloc16) == router_id_from_rloc16(self.rloc16)
    }
}

impl fmt::Debug for Mle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mle")
            .field("ext_address", &self.ext_address)
            .field("role", &self.role)
            .field("rloc16", &format_args!("{:#06x}", self.rloc16))
            .field("attach_state", &self.attach_state)
            .field("partition_id", &format_args!("{:#010x}", self.leader_data.partition_id))
            .finish()
    }
}

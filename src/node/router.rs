//! Router Role Manager
//!
//! Router ID acquisition through Address Solicit, the advertisement
//! schedule, multicast Link Requests after a restore or an upgrade, and the
//! once-a-second maintenance tick: child expiry, router reachability,
//! leader loss, and the jittered upgrade/downgrade countdown.

use tracing::{debug, info, warn};

use super::{AttachMode, AttachState, DeviceRole, Mle, MleError, MleEvent};
use crate::address::{LINK_LOCAL_ALL_NODES, LINK_LOCAL_ALL_ROUTERS, rloc16_from_router_id, router_id_from_rloc16};
use crate::neighbor::{Neighbor, NeighborState};
use crate::protocol::{
    AddressSolicitRequest, AddressSolicitResponse, Command, MleMessage, SolicitReason,
    SolicitStatus, THREAD_VERSION, Tlv, TlvType, TmfFrame, TmfMessage,
};
use crate::security::Challenge;
use crate::timer::{TimerKind, jitter};

/// How long a child may sit half-attached before its slot is reclaimed.
pub(crate) const ATTACHING_CHILD_TIMEOUT_MS: u64 = 10_000;

/// A router link not heard from for this long is dropped.
const MAX_NEIGHBOR_AGE_MS: u64 = 100_000;

/// Link quality a neighbor must reach to count toward downgrade.
const GOOD_LINK_QUALITY: u8 = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct PendingSolicit {
    pub transaction: u16,
    pub reason: SolicitReason,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum TransitionKind {
    Upgrade,
    Downgrade,
}

/// Countdown toward a role change, restarted whenever the wanted change
/// flips.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct RoleTransition {
    pub kind: TransitionKind,
    pub fires_at_ms: u64,
}

/// Partition view at the time a router ID request failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct UpgradeHold {
    pub partition_id: u32,
    pub id_sequence: u8,
    pub active_routers: usize,
}

/// Outstanding multicast Link Request.
#[derive(Clone, Copy, Debug)]
pub(crate) struct MulticastLinkRequest {
    pub challenge: Challenge,
    pub attempts_left: u8,
    /// Sent while resuming a role from settings; failing to find any
    /// router then detaches.
    pub restoring: bool,
}

impl Mle {
    // === Router ID acquisition ===

    /// Ask the Leader for a router ID. Only a router-capable child may
    /// ask, one request at a time.
    pub fn become_router(&mut self, reason: SolicitReason, now_ms: u64) -> Result<(), MleError> {
        if !self.is_router_capable() {
            return Err(MleError::InvalidState);
        }
        match self.role {
            DeviceRole::Router | DeviceRole::Leader => return Err(MleError::Already),
            DeviceRole::Child => {}
            DeviceRole::Disabled | DeviceRole::Detached => return Err(MleError::InvalidState),
        }
        if self.pending_solicit.is_some() {
            return Err(MleError::Busy);
        }
        let transaction = self.next_transaction();
        let frame = TmfFrame {
            transaction,
            message: TmfMessage::SolicitRequest(AddressSolicitRequest {
                ext_address: self.ext_address,
                rloc16: self.previous_router_id.map(rloc16_from_router_id),
                reason,
            }),
        };
        info!(reason = ?reason, previous_router_id = ?self.previous_router_id, "Requesting router ID");
        self.pending_solicit = Some(PendingSolicit {
            transaction,
            reason,
        });
        self.timers.start(
            TimerKind::AddressSolicit,
            now_ms,
            self.config.mle.router.address_solicit_timeout_ms,
        );
        let leader = self.mesh_local_prefix.leader_aloc();
        if let Err(e) = self.send_tmf(leader, frame) {
            self.pending_solicit = None;
            self.timers.stop(TimerKind::AddressSolicit);
            return Err(e);
        }
        Ok(())
    }

    pub(in crate::node) fn handle_address_solicit_response(
        &mut self,
        transaction: u16,
        response: AddressSolicitResponse,
        now_ms: u64,
    ) -> Result<(), MleError> {
        let pending = self
            .pending_solicit
            .filter(|p| p.transaction == transaction)
            .ok_or(MleError::Drop("unexpected Address Solicit Response"))?;
        self.pending_solicit = None;
        self.timers.stop(TimerKind::AddressSolicit);
        if self.role != DeviceRole::Child {
            debug!(role = %self.role, "Address Solicit Response after role change, ignoring");
            return Ok(());
        }
        match response {
            AddressSolicitResponse {
                status: SolicitStatus::Success,
                rloc16: Some(rloc16),
                router_mask: Some((id_sequence, mask)),
            } => {
                let router_id = router_id_from_rloc16(rloc16);
                info!(router_id, reason = ?pending.reason, "Router ID granted");
                self.router_table.reset_from_mask(id_sequence, &mask, now_ms);
                self.set_state_router(router_id, now_ms)
            }
            other => {
                info!(status = ?other.status, "Router ID request rejected");
                self.abandon_router_upgrade();
                Ok(())
            }
        }
    }

    pub(in crate::node) fn handle_solicit_timeout(&mut self, _now_ms: u64) -> Result<(), MleError> {
        if self.pending_solicit.take().is_some() {
            warn!("Address Solicit timed out");
            self.abandon_router_upgrade();
        }
        Ok(())
    }

    /// Stay a child: release children held for the upgrade and hold off
    /// further requests until the router set changes.
    fn abandon_router_upgrade(&mut self) {
        self.role_transition = None;
        self.upgrade_hold = Some(self.current_upgrade_view());
        for index in self.child_table.indices() {
            if self
                .child_table
                .get(index)
                .is_some_and(|c| c.state() == NeighborState::ChildIdRequest)
                && let Some(child) = self.child_table.remove(index)
            {
                debug!(child = %child.ext_address(), "Released held child");
            }
        }
    }

    /// Take up `router_id` after a granted solicit.
    fn set_state_router(&mut self, router_id: u8, now_ms: u64) -> Result<(), MleError> {
        if !self.router_table.is_allocated(router_id) {
            self.router_table.allocate(router_id, now_ms)?;
        }
        self.router_table.set_own_router_id(Some(router_id));
        self.rloc16 = rloc16_from_router_id(router_id);
        self.previous_router_id = Some(router_id);

        // The parent becomes our first router neighbor.
        if let Some(parent) = self.parent.take()
            && let Some(entry) = self.router_table.get_mut(parent.router_id())
        {
            *entry.core_mut() = parent.core().clone();
            entry.set_state(NeighborState::Valid);
            entry.link_quality_out = parent.link_quality_out;
            entry.last_reachable_ms = now_ms;
            self.router_table.recompute_routes();
        }

        self.set_role(DeviceRole::Router)?;
        self.timers.stop(TimerKind::Attach);
        self.timers.stop(TimerKind::ChildUpdate);
        self.attach_state = AttachState::Idle;
        self.child_update = Default::default();
        self.role_transition = None;
        self.upgrade_hold = None;
        self.leader_unreachable_since_ms = None;

        self.start_advertising(now_ms);
        self.begin_link_request(self.config.mle.router.link_request_attempts, false, now_ms);

        let held: Vec<_> = self
            .child_table
            .iter()
            .filter(|(_, c)| c.state() == NeighborState::ChildIdRequest)
            .map(|(i, _)| i)
            .collect();
        for index in held {
            if let Err(e) = self.send_child_id_response(index) {
                warn!(error = %e, "Failed to answer held Child ID Request");
            }
        }
        self.store_settings();
        Ok(())
    }

    /// Stop everything that only a router does, ahead of becoming a child.
    pub(in crate::node) fn leave_router_role(&mut self) {
        self.trickle.stop();
        self.timers.stop(TimerKind::Advertise);
        self.timers.stop(TimerKind::LinkRequest);
        self.link_request = None;
        self.role_transition = None;
        self.leader_unreachable_since_ms = None;
        self.previous_router_id = self.router_table.own_router_id();
        self.remove_all_children();
        self.remove_router_neighbors();
    }

    // === Advertisements ===

    pub(in crate::node) fn start_advertising(&mut self, now_ms: u64) {
        match self.role {
            DeviceRole::Router | DeviceRole::Leader => {
                let deadline = self.trickle.start(now_ms, &mut self.rng);
                self.timers.start_at(TimerKind::Advertise, deadline);
            }
            DeviceRole::Child if self.is_reed() => {
                self.trickle.stop();
                let advertise = &self.config.mle.advertise;
                let base = u64::from(advertise.reed_interval_secs) * 1000;
                let spread = u64::from(advertise.reed_jitter_secs) * 1000;
                let delay = base + jitter(&mut self.rng, spread);
                self.timers.start(TimerKind::Advertise, now_ms, delay);
            }
            _ => {
                self.trickle.stop();
                self.timers.stop(TimerKind::Advertise);
            }
        }
    }

    /// Shorten the advertisement interval after a topology change.
    pub(in crate::node) fn reset_trickle(&mut self, now_ms: u64) {
        if !self.role.is_router_or_leader() {
            return;
        }
        if let Some(deadline) = self.trickle.reset(now_ms, &mut self.rng) {
            self.timers.start_at(TimerKind::Advertise, deadline);
        }
    }

    pub(in crate::node) fn handle_advertise_timer(&mut self, now_ms: u64) -> Result<(), MleError> {
        match self.role {
            DeviceRole::Router | DeviceRole::Leader => {
                let (transmit, next) = self.trickle.fire(now_ms, &mut self.rng);
                self.timers.start_at(TimerKind::Advertise, next);
                if transmit {
                    self.send_advertisement()?;
                }
                Ok(())
            }
            DeviceRole::Child if self.is_reed() => {
                self.start_advertising(now_ms);
                self.send_advertisement()
            }
            _ => Ok(()),
        }
    }

    fn send_advertisement(&mut self) -> Result<(), MleError> {
        let mut message = MleMessage::new(Command::Advertisement)
            .with(Tlv::SourceAddress(self.rloc16))
            .with(Tlv::LeaderData(self.current_leader_data()));
        if self.role.is_router_or_leader() {
            message.push(Tlv::Route(self.router_table.build_route_tlv()));
        }
        self.send_mle(LINK_LOCAL_ALL_NODES, message)
    }

    // === Multicast Link Request ===

    /// Rediscover router neighbors after resuming a router role. Devices
    /// that were Leader or had children get a larger retry budget.
    pub(in crate::node) fn start_multicast_link_request(&mut self, extended: bool, now_ms: u64) {
        let attempts = self.config.mle.router.link_request_attempts;
        let attempts = if extended {
            attempts.saturating_mul(2)
        } else {
            attempts
        };
        self.begin_link_request(attempts, true, now_ms);
    }

    fn begin_link_request(&mut self, attempts: u8, restoring: bool, now_ms: u64) {
        self.link_request = Some(MulticastLinkRequest {
            challenge: Challenge::generate(&mut self.rng),
            attempts_left: attempts.max(1),
            restoring,
        });
        self.send_multicast_link_request(now_ms);
    }

    fn send_multicast_link_request(&mut self, now_ms: u64) {
        let challenge = Challenge::generate(&mut self.rng);
        let Some(request) = self.link_request.as_mut() else {
            return;
        };
        request.attempts_left = request.attempts_left.saturating_sub(1);
        request.challenge = challenge;
        let message = self.link_request_message(challenge);
        self.timers.start(
            TimerKind::LinkRequest,
            now_ms,
            self.config.mle.router.link_request_timeout_ms,
        );
        if let Err(e) = self.send_mle(LINK_LOCAL_ALL_ROUTERS, message) {
            warn!(error = %e, "Multicast Link Request not sent");
        }
    }

    pub(in crate::node) fn link_request_message(&self, challenge: Challenge) -> MleMessage {
        MleMessage::new(Command::LinkRequest)
            .with(Tlv::SourceAddress(self.rloc16))
            .with(Tlv::LeaderData(self.current_leader_data()))
            .with(Tlv::Challenge(challenge.to_vec()))
            .with(Tlv::Version(THREAD_VERSION))
            .with(Tlv::TlvRequest(vec![
                TlvType::LinkMargin.to_byte(),
                TlvType::Route.to_byte(),
            ]))
    }

    pub(in crate::node) fn handle_link_request_timer(&mut self, now_ms: u64) -> Result<(), MleError> {
        let Some(request) = self.link_request else {
            return Ok(());
        };
        if request.attempts_left > 0 {
            self.send_multicast_link_request(now_ms);
            return Ok(());
        }
        self.link_request = None;
        let neighbors = self.router_table.neighbor_count();
        debug!(neighbors, restoring = request.restoring, "Link Request window closed");
        if request.restoring && neighbors == 0 && self.role == DeviceRole::Router {
            info!("No router answered after restore");
            return self.become_detached(now_ms);
        }
        Ok(())
    }

    // === Maintenance tick ===

    pub(in crate::node) fn handle_state_update(&mut self, now_ms: u64) -> Result<(), MleError> {
        self.expire_children(now_ms);
        if !self.role.is_router_or_leader() {
            return self.update_role_transition(now_ms);
        }
        self.age_router_neighbors(now_ms);
        self.refresh_reachability(now_ms);
        match self.role {
            DeviceRole::Leader => self.release_unreachable_routers(now_ms),
            DeviceRole::Router => {
                if self.check_leader_reachable(now_ms) {
                    return Ok(());
                }
            }
            _ => {}
        }
        self.update_role_transition(now_ms)
    }

    fn expire_children(&mut self, now_ms: u64) {
        let mut removed_valid = false;
        for index in self.child_table.indices() {
            let Some(child) = self.child_table.get(index) else {
                continue;
            };
            let expired = if child.is_valid() {
                now_ms >= child.expires_at_ms()
            } else if child.state().is_attaching() {
                now_ms.saturating_sub(child.last_heard_ms()) >= ATTACHING_CHILD_TIMEOUT_MS
            } else {
                false
            };
            if !expired {
                continue;
            }
            let Some(child) = self.child_table.remove(index) else {
                continue;
            };
            if child.is_valid() {
                info!(
                    child = %child.ext_address(),
                    rloc16 = format_args!("{:#06x}", child.rloc16()),
                    timeout_secs = child.timeout_secs,
                    "Child timed out"
                );
                self.emit(MleEvent::ChildRemoved {
                    ext_address: child.ext_address(),
                    rloc16: child.rloc16(),
                });
                removed_valid = true;
            } else {
                debug!(child = %child.ext_address(), state = %child.state(), "Half-attached child dropped");
            }
        }
        if removed_valid {
            self.store_settings();
        }
    }

    fn age_router_neighbors(&mut self, now_ms: u64) {
        let stale: Vec<u8> = self
            .router_table
            .neighbors()
            .filter(|r| now_ms.saturating_sub(r.last_heard_ms()) >= MAX_NEIGHBOR_AGE_MS)
            .map(|r| r.router_id())
            .collect();
        if stale.is_empty() {
            return;
        }
        for router_id in stale {
            let Some(router) = self.router_table.get_mut(router_id) else {
                continue;
            };
            let (ext_address, rloc16) = (router.ext_address(), router.rloc16());
            router.reset_link();
            info!(router_id, neighbor = %ext_address, "Router link aged out");
            self.emit(MleEvent::NeighborRemoved {
                ext_address,
                rloc16,
            });
        }
        self.router_table.recompute_routes();
    }

    fn refresh_reachability(&mut self, now_ms: u64) {
        let own = self.router_table.own_router_id();
        let reachable: Vec<u8> = self
            .router_table
            .allocated_ids()
            .filter(|id| Some(*id) == own || self.router_table.next_hop(*id).is_some())
            .collect();
        for router_id in reachable {
            if let Some(router) = self.router_table.get_mut(router_id) {
                router.last_reachable_ms = now_ms;
            }
        }
    }

    /// Leader only: free router IDs nobody can reach any more.
    fn release_unreachable_routers(&mut self, now_ms: u64) {
        let limit_ms = u64::from(self.config.mle.router.max_unreachable_secs) * 1000;
        let own = self.router_table.own_router_id();
        let lost: Vec<(u8, bool, u16)> = self
            .router_table
            .iter()
            .filter(|r| Some(r.router_id()) != own)
            .filter(|r| now_ms.saturating_sub(r.last_reachable_ms) >= limit_ms)
            .map(|r| (r.router_id(), r.is_neighbor(), r.rloc16()))
            .collect();
        for (router_id, was_neighbor, rloc16) in lost {
            let ext_address = self
                .router_table
                .get(router_id)
                .map(|r| r.ext_address())
                .unwrap_or_default();
            if let Err(e) = self.router_table.release(router_id, now_ms) {
                debug!(router_id, error = %e, "Release of unreachable router failed");
                continue;
            }
            info!(router_id, "Released unreachable router");
            if was_neighbor {
                self.emit(MleEvent::NeighborRemoved {
                    ext_address,
                    rloc16,
                });
            }
            self.reset_trickle(now_ms);
        }
    }

    /// Router only: reattach to the partition once the leader has been
    /// unreachable for the network-ID timeout. Returns whether it did.
    fn check_leader_reachable(&mut self, now_ms: u64) -> bool {
        let leader_id = self.leader_data.leader_router_id;
        if self.router_table.next_hop(leader_id).is_some() {
            self.leader_unreachable_since_ms = None;
            return false;
        }
        let since = *self.leader_unreachable_since_ms.get_or_insert(now_ms);
        let timeout_ms = u64::from(self.config.mle.router.network_id_timeout_secs) * 1000;
        if now_ms.saturating_sub(since) < timeout_ms {
            return false;
        }
        warn!(leader_router_id = leader_id, "Leader unreachable, reattaching to partition");
        if let Err(e) = self.enter_detached() {
            warn!(error = %e, "Failed to detach after leader loss");
            return false;
        }
        self.begin_attach(AttachMode::SamePartition, now_ms, 0);
        true
    }

    // === Role transition countdown ===

    fn current_upgrade_view(&self) -> UpgradeHold {
        UpgradeHold {
            partition_id: self.leader_data.partition_id,
            id_sequence: self.router_table.id_sequence(),
            active_routers: self.router_table.active_count(),
        }
    }

    /// Whether a failed router ID request still stands for the current
    /// partition. A stale hold is dropped.
    fn upgrade_held(&mut self) -> bool {
        match self.upgrade_hold {
            Some(hold) if hold == self.current_upgrade_view() => true,
            Some(_) => {
                debug!("Router set changed, router ID request allowed again");
                self.upgrade_hold = None;
                false
            }
            None => false,
        }
    }

    fn wanted_transition(&mut self) -> Option<TransitionKind> {
        if self.role == DeviceRole::Child && self.upgrade_held() {
            return None;
        }
        let router = &self.config.mle.router;
        let active = self.router_table.active_count();
        match self.role {
            DeviceRole::Child
                if self.is_reed()
                    && self.attach_state.is_idle()
                    && self.pending_solicit.is_none()
                    && active < usize::from(router.upgrade_threshold) =>
            {
                Some(TransitionKind::Upgrade)
            }
            DeviceRole::Router if self.attach_state.is_idle() && self.should_downgrade() => {
                Some(TransitionKind::Downgrade)
            }
            _ => None,
        }
    }

    /// Too many routers, and our departure costs nobody connectivity.
    pub(in crate::node) fn should_downgrade(&self) -> bool {
        let router = &self.config.mle.router;
        let active = self.router_table.active_count();
        let threshold = usize::from(router.downgrade_threshold);
        if active <= threshold {
            return false;
        }
        if self.router_table.good_neighbor_count(GOOD_LINK_QUALITY)
            < usize::from(router.min_downgrade_neighbors)
        {
            return false;
        }
        let allowed_children = (active - threshold) * usize::from(router.children_per_excess_router);
        if self.child_table.valid_count() > allowed_children {
            return false;
        }
        self.has_redundant_neighbor()
    }

    /// A neighbor that reaches every router we reach well at least as
    /// well as we do.
    fn has_redundant_neighbor(&self) -> bool {
        let ours: Vec<(u8, u8)> = self
            .router_table
            .neighbors()
            .map(|r| (r.router_id(), r.two_way_link_quality()))
            .filter(|(_, q)| *q >= GOOD_LINK_QUALITY)
            .collect();
        self.router_table
            .neighbors()
            .filter(|n| n.two_way_link_quality() >= GOOD_LINK_QUALITY)
            .any(|n| {
                ours.iter().all(|(id, quality)| {
                    *id == n.router_id() || n.advertised_link_quality[usize::from(*id)] >= *quality
                })
            })
    }

    fn update_role_transition(&mut self, now_ms: u64) -> Result<(), MleError> {
        let Some(kind) = self.wanted_transition() else {
            if self.role_transition.take().is_some() {
                debug!("Role transition no longer wanted");
            }
            return Ok(());
        };
        match self.role_transition {
            Some(transition) if transition.kind == kind => {
                if now_ms < transition.fires_at_ms {
                    return Ok(());
                }
                self.role_transition = None;
                self.fire_role_transition(kind, now_ms)
            }
            _ => {
                let spread = u64::from(self.config.mle.router.selection_jitter_secs) * 1000;
                let delay = jitter(&mut self.rng, spread);
                debug!(kind = ?kind, delay_ms = delay, "Role transition countdown started");
                self.role_transition = Some(RoleTransition {
                    kind,
                    fires_at_ms: now_ms + delay,
                });
                Ok(())
            }
        }
    }

    fn fire_role_transition(&mut self, kind: TransitionKind, now_ms: u64) -> Result<(), MleError> {
        let result = match kind {
            TransitionKind::Upgrade => {
                info!(active_routers = self.router_table.active_count(), "Too few routers, upgrading");
                self.become_router(SolicitReason::TooFewRouters, now_ms)
            }
            TransitionKind::Downgrade => {
                info!(active_routers = self.router_table.active_count(), "Too many routers, downgrading");
                self.become_child(AttachMode::DowngradeToReed, now_ms)
            }
        };
        match result {
            Ok(()) | Err(MleError::Busy) | Err(MleError::AlreadyAttaching) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

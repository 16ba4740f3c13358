//! Router links: Link Request/Accept/Reject and Advertisement.

use std::cmp::Ordering;
use tracing::{debug, info, warn};

use super::{RxContext, required};
use crate::address::{ExtAddress, is_active_router, link_local_from_ext_address, router_id_from_rloc16};
use crate::neighbor::{Neighbor, NeighborState, link_quality_from_margin};
use crate::node::{AttachMode, DeviceRole, Mle, MleError, MleEvent, PartitionInfo, compare_partitions};
use crate::protocol::{Command, MleMessage, RouteTlv, STATUS_ERROR, THREAD_VERSION, Tlv, TlvType};
use crate::security::{Challenge, FrameCounters, SecurityError};
use crate::table::sequence_is_newer;
use crate::timer::jitter;

impl Mle {
    pub(in crate::node) fn handle_link_request(
        &mut self,
        message: &MleMessage,
        ctx: &RxContext,
    ) -> Result<(), MleError> {
        if !self.role.is_router_or_leader() {
            if ctx.info.is_multicast() {
                return Err(MleError::Drop("not a router"));
            }
            debug!(sender = %ctx.sender, "Rejecting Link Request while not a router");
            let reject = MleMessage::new(Command::LinkReject).with(Tlv::Status(STATUS_ERROR));
            return self.send_mle(ctx.reply_address(), reject);
        }
        let tlvs = &message.tlvs;
        let their_challenge = required(tlvs.challenge(), TlvType::Challenge)?;
        let version = required(tlvs.version(), TlvType::Version)?;
        let source = required(tlvs.source_address(), TlvType::SourceAddress)?;
        if let Some(leader_data) = tlvs.leader_data()
            && leader_data.partition_id != self.leader_data.partition_id
        {
            return Err(MleError::Drop("Link Request from another partition"));
        }
        if !is_active_router(source) {
            return Err(MleError::Drop("Link Request from non-router"));
        }
        let router_id = router_id_from_rloc16(source);
        if Some(router_id) == self.router_table.own_router_id() {
            return Err(MleError::Drop("Link Request claims our router ID"));
        }
        if !self.router_table.is_allocated(router_id) {
            return Err(MleError::Drop("router ID not allocated"));
        }

        let link_valid = self
            .router_table
            .get(router_id)
            .is_some_and(|r| r.is_valid() && r.ext_address() == ctx.sender);
        let command = if link_valid {
            Command::LinkAccept
        } else {
            Command::LinkAcceptAndRequest
        };
        let mut reply = MleMessage::new(command)
            .with(Tlv::Response(their_challenge.to_vec()))
            .with(Tlv::SourceAddress(self.rloc16))
            .with(Tlv::LeaderData(self.current_leader_data()))
            .with(Tlv::LinkFrameCounter(self.keys.link_frame_counter()))
            .with(Tlv::MleFrameCounter(self.keys.mle_frame_counter()))
            .with(Tlv::Version(THREAD_VERSION))
            .with(Tlv::LinkMargin(self.link_margin_for(ctx.rss())))
            .with(Tlv::Route(self.router_table.build_route_tlv()));

        if !link_valid {
            let fresh = Challenge::generate(&mut self.rng);
            let entry = self.router_table.get_mut(router_id).ok_or(MleError::NotFound)?;
            // Crossing requests keep the challenge already sent to this router.
            let challenge = match entry.core().pending_challenge {
                Some(existing) if entry.ext_address() == ctx.sender => existing,
                _ => fresh,
            };
            let core = entry.core_mut();
            core.ext_address = ctx.sender;
            core.rloc16 = source;
            core.version = version;
            core.pending_challenge = Some(challenge);
            core.state = NeighborState::LinkRequest;
            entry.heard(ctx.rss(), ctx.now_ms);
            reply.push(Tlv::Challenge(challenge.to_vec()));
        }

        debug!(sender = %ctx.sender, router_id, link_valid, "Answering Link Request");
        if ctx.info.is_multicast() {
            let delay = jitter(&mut self.rng, self.config.mle.advertise.max_response_delay_ms);
            self.send_mle_after(ctx.reply_address(), reply, ctx.now_ms, delay);
            Ok(())
        } else {
            self.send_mle(ctx.reply_address(), reply)
        }
    }

    pub(in crate::node) fn handle_link_accept(
        &mut self,
        message: &MleMessage,
        ctx: &RxContext,
        and_request: bool,
    ) -> Result<(), MleError> {
        if !self.role.is_router_or_leader() {
            return Err(MleError::Drop("not a router"));
        }
        let tlvs = &message.tlvs;
        let response = required(tlvs.response(), TlvType::Response)?;
        let source = required(tlvs.source_address(), TlvType::SourceAddress)?;
        let leader_data = required(tlvs.leader_data(), TlvType::LeaderData)?;
        let link_frame_counter = required(tlvs.link_frame_counter(), TlvType::LinkFrameCounter)?;
        let mle_frame_counter = required(tlvs.mle_frame_counter(), TlvType::MleFrameCounter)?;
        let version = required(tlvs.version(), TlvType::Version)?;
        if !is_active_router(source) {
            return Err(MleError::Drop("Link Accept from non-router"));
        }
        let router_id = router_id_from_rloc16(source);

        let unicast_match = self
            .router_table
            .get(router_id)
            .and_then(|r| r.core().pending_challenge)
            .is_some_and(|c| c.matches(response));
        let multicast_match = self
            .link_request
            .as_ref()
            .is_some_and(|r| r.challenge.matches(response));
        if !unicast_match && !multicast_match {
            warn!(sender = %ctx.sender, router_id, "Link Accept does not echo our challenge");
            return Err(MleError::Security(SecurityError::ResponseMismatch));
        }
        if leader_data.partition_id != self.leader_data.partition_id {
            return Err(MleError::Drop("Link Accept from another partition"));
        }

        if let Some(route) = tlvs.route()
            && self.merge_route(route, ctx.now_ms)?
        {
            return Ok(());
        }
        if Some(router_id) == self.router_table.own_router_id() {
            return Err(MleError::Drop("Link Accept claims our router ID"));
        }
        let entry = self
            .router_table
            .get_mut(router_id)
            .ok_or(MleError::Drop("router ID not allocated"))?;
        let was_neighbor = entry.is_valid();
        {
            let core = entry.core_mut();
            core.ext_address = ctx.sender;
            core.rloc16 = source;
            core.state = NeighborState::Valid;
            core.version = version;
            core.pending_challenge = None;
            core.counters = FrameCounters::from_advertised(
                ctx.key_sequence,
                link_frame_counter,
                ctx.next_mle_counter(mle_frame_counter),
            );
        }
        if let Some(margin) = tlvs.link_margin() {
            entry.link_quality_out = link_quality_from_margin(margin);
        }
        entry.heard(ctx.rss(), ctx.now_ms);
        entry.last_reachable_ms = ctx.now_ms;
        match tlvs.route() {
            Some(route) => self.router_table.update_neighbor_routes(router_id, route),
            None => self.router_table.recompute_routes(),
        }
        if !was_neighbor {
            info!(router_id, neighbor = %ctx.sender, "Router link established");
            self.emit(MleEvent::NeighborAdded {
                ext_address: ctx.sender,
                rloc16: source,
            });
            self.reset_trickle(ctx.now_ms);
        }

        if and_request {
            let their_challenge = required(tlvs.challenge(), TlvType::Challenge)?;
            let reply = MleMessage::new(Command::LinkAccept)
                .with(Tlv::Response(their_challenge.to_vec()))
                .with(Tlv::SourceAddress(self.rloc16))
                .with(Tlv::LeaderData(self.current_leader_data()))
                .with(Tlv::LinkFrameCounter(self.keys.link_frame_counter()))
                .with(Tlv::MleFrameCounter(self.keys.mle_frame_counter()))
                .with(Tlv::Version(THREAD_VERSION))
                .with(Tlv::LinkMargin(self.link_margin_for(ctx.rss())))
                .with(Tlv::Route(self.router_table.build_route_tlv()));
            self.send_mle(ctx.reply_address(), reply)?;
        }
        Ok(())
    }

    /// Fold a neighbor's Route TLV into the router table. Returns true when
    /// our own router ID vanished and the device detached.
    fn merge_route(&mut self, route: &RouteTlv, now_ms: u64) -> Result<bool, MleError> {
        if self.role == DeviceRole::Leader {
            return Ok(false);
        }
        let restoring = self.link_request.as_ref().is_some_and(|r| r.restoring);
        if restoring && self.router_table.neighbor_count() == 0 {
            let own = self.router_table.own_router_id();
            self.router_table.reset_from_route(route, now_ms);
            self.router_table.set_own_router_id(own);
        } else if !self.router_table.process_route_tlv(route, now_ms) {
            return Ok(false);
        }
        match self.router_table.own_router_id() {
            Some(own) if !self.router_table.is_allocated(own) => {
                warn!(router_id = own, "Our router ID was released by the leader");
                self.become_detached(now_ms)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub(in crate::node) fn handle_link_reject(&mut self, ctx: &RxContext) -> Result<(), MleError> {
        let router_id = self
            .router_neighbor_id(&ctx.sender)
            .ok_or(MleError::Drop("Link Reject from non-neighbor"))?;
        let Some(router) = self.router_table.get_mut(router_id) else {
            return Ok(());
        };
        let rloc16 = router.rloc16();
        router.reset_link();
        self.router_table.recompute_routes();
        info!(router_id, neighbor = %ctx.sender, "Router link rejected");
        self.emit(MleEvent::NeighborRemoved {
            ext_address: ctx.sender,
            rloc16,
        });
        Ok(())
    }

    /// Unicast Link Request toward a router we hear but hold no link with.
    fn send_link_request_to(
        &mut self,
        router_id: u8,
        ext_address: ExtAddress,
        now_ms: u64,
    ) -> Result<(), MleError> {
        let fresh = Challenge::generate(&mut self.rng);
        let entry = self.router_table.get_mut(router_id).ok_or(MleError::NotFound)?;
        let challenge = match entry.core().pending_challenge {
            Some(existing) if entry.ext_address() == ext_address => existing,
            _ => fresh,
        };
        {
            let core = entry.core_mut();
            core.ext_address = ext_address;
            core.pending_challenge = Some(challenge);
            core.state = NeighborState::LinkRequest;
            core.last_heard_ms = now_ms;
        }
        debug!(router_id, neighbor = %ext_address, "Sending Link Request");
        let message = self.link_request_message(challenge);
        self.send_mle(link_local_from_ext_address(&ext_address), message)
    }

    pub(in crate::node) fn handle_advertisement(
        &mut self,
        message: &MleMessage,
        ctx: &RxContext,
    ) -> Result<(), MleError> {
        let tlvs = &message.tlvs;
        let source = required(tlvs.source_address(), TlvType::SourceAddress)?;
        let leader_data = required(tlvs.leader_data(), TlvType::LeaderData)?;
        if !is_active_router(source) {
            return Ok(());
        }
        let router_id = router_id_from_rloc16(source);
        let route = tlvs.route();

        match self.role {
            DeviceRole::Child => {
                if leader_data.partition_id != self.leader_data.partition_id {
                    return Ok(());
                }
                if let Some(route) = route
                    && self.config.mle.mode.is_full_thread_device()
                {
                    self.router_table.process_route_tlv(route, ctx.now_ms);
                }
                if self.is_parent(&ctx.sender)
                    && sequence_is_newer(leader_data.data_version, self.network_data.version())
                {
                    self.send_data_request(ctx.reply_address())?;
                }
                Ok(())
            }
            DeviceRole::Router | DeviceRole::Leader => {
                if leader_data.partition_id != self.leader_data.partition_id {
                    let routers = route.map(|r| r.router_mask.len()).unwrap_or(1);
                    let theirs = PartitionInfo::new(&leader_data, routers);
                    let ours = PartitionInfo::new(&self.leader_data, self.router_table.active_count());
                    if compare_partitions(&theirs, &ours) == Ordering::Greater {
                        info!(
                            partition_id = format_args!("{:#010x}", leader_data.partition_id),
                            "Heard a better partition, merging"
                        );
                        return match self.become_child(AttachMode::BetterPartition, ctx.now_ms) {
                            Ok(()) | Err(MleError::AlreadyAttaching) => Ok(()),
                            Err(e) => Err(e),
                        };
                    }
                    return Ok(());
                }
                if leader_data.leader_router_id != self.leader_data.leader_router_id {
                    warn!(
                        ours = self.leader_data.leader_router_id,
                        theirs = leader_data.leader_router_id,
                        "Leader mismatch within partition"
                    );
                    return self.become_detached(ctx.now_ms);
                }
                let Some(route) = route else {
                    return Ok(());
                };
                if self.merge_route(route, ctx.now_ms)? {
                    return Ok(());
                }
                let own = self.router_table.own_router_id();
                let linked = self
                    .router_table
                    .get(router_id)
                    .is_some_and(|r| r.is_neighbor() && r.ext_address() == ctx.sender);
                if linked {
                    self.router_table.update_neighbor_routes(router_id, route);
                } else if Some(router_id) != own && self.router_table.is_allocated(router_id) {
                    self.send_link_request_to(router_id, ctx.sender, ctx.now_ms)?;
                }
                if self.role == DeviceRole::Router
                    && sequence_is_newer(leader_data.data_version, self.network_data.version())
                {
                    self.send_data_request(ctx.reply_address())?;
                }
                Ok(())
            }
            DeviceRole::Disabled | DeviceRole::Detached => Ok(()),
        }
    }
}

//! Parent side of attachment: Parent Request, Child ID Request and Child
//! Update Request from our children.

use std::net::Ipv6Addr;
use tracing::{debug, info, warn};

use super::{RxContext, required};
use crate::address::{MeshLocalPrefix, link_local_from_ext_address, rloc16_from_parts, router_id_from_rloc16};
use crate::neighbor::{Child, MAX_ROUTE_COST, Neighbor, NeighborState};
use crate::node::{DeviceRole, Mle, MleError, MleEvent};
use crate::protocol::{
    AddressEntry, Command, Connectivity, MleMessage, STATUS_ERROR, SedCapacity, SolicitReason,
    THREAD_VERSION, Tlv, TlvType,
};
use crate::security::{Challenge, FrameCounters, SecurityError};
use crate::table::ChildIndex;
use crate::timer::jitter;

/// Buffer we offer each sleepy child.
const SED_BUFFER_SIZE: u16 = 1280;
const SED_DATAGRAM_COUNT: u8 = 1;

fn requested(tlvs: &[u8], tlv: TlvType) -> bool {
    tlvs.contains(&tlv.to_byte())
}

impl Mle {
    pub(in crate::node) fn handle_parent_request(
        &mut self,
        message: &MleMessage,
        ctx: &RxContext,
    ) -> Result<(), MleError> {
        let tlvs = &message.tlvs;
        let scan_mask = required(tlvs.scan_mask(), TlvType::ScanMask)?;
        let is_reed = self.is_reed() && self.attach_state.is_idle();
        let answers = match self.role {
            DeviceRole::Router | DeviceRole::Leader => scan_mask.includes_routers(),
            DeviceRole::Child => is_reed && scan_mask.includes_end_devices(),
            DeviceRole::Disabled | DeviceRole::Detached => false,
        };
        if !answers {
            return Err(MleError::Drop("not answering this scan"));
        }
        let mode = required(tlvs.mode(), TlvType::Mode)?;
        let their_challenge = required(tlvs.challenge(), TlvType::Challenge)?;
        let version = required(tlvs.version(), TlvType::Version)?;

        let index = match self.child_table.find_by_ext_address(&ctx.sender) {
            Some(index) => index,
            None => {
                let child = Child::new(ctx.sender, self.config.mle.noise_floor_dbm);
                self.child_table.insert(child).inspect_err(|_| {
                    debug!(sender = %ctx.sender, "Child table full, declining Parent Request");
                })?
            }
        };
        let challenge = Challenge::generate(&mut self.rng);
        let child = self.child_table.get_mut(index).ok_or(MleError::NotFound)?;
        if !child.is_valid() {
            child.set_state(NeighborState::ParentRequest);
        }
        child.heard(ctx.rss(), ctx.now_ms);
        {
            let core = child.core_mut();
            core.mode = mode;
            core.version = version;
            core.pending_challenge = Some(challenge);
        }

        let reply = MleMessage::new(Command::ParentResponse)
            .with(Tlv::Challenge(challenge.to_vec()))
            .with(Tlv::Response(their_challenge.to_vec()))
            .with(Tlv::LinkFrameCounter(self.keys.link_frame_counter()))
            .with(Tlv::MleFrameCounter(self.keys.mle_frame_counter()))
            .with(Tlv::SourceAddress(self.rloc16))
            .with(Tlv::LeaderData(self.current_leader_data()))
            .with(Tlv::LinkMargin(self.link_margin_for(ctx.rss())))
            .with(Tlv::Connectivity(self.connectivity()))
            .with(Tlv::Version(THREAD_VERSION));

        let half = self.config.mle.advertise.max_response_delay_ms / 2;
        let delay = if is_reed {
            half + jitter(&mut self.rng, half)
        } else {
            jitter(&mut self.rng, half)
        };
        debug!(child = %ctx.sender, delay_ms = delay, "Parent Response scheduled");
        self.send_mle_after(ctx.reply_address(), reply, ctx.now_ms, delay);
        Ok(())
    }

    /// How well connected we are, as offered to a prospective child.
    pub(in crate::node) fn connectivity(&self) -> Connectivity {
        let mut counts = [0u8; 4];
        let parent_quality = self.parent.as_ref().map(|p| p.two_way_link_quality());
        let qualities = self
            .router_table
            .neighbors()
            .map(|r| r.two_way_link_quality())
            .chain(parent_quality);
        for quality in qualities {
            let slot = usize::from(quality.min(3));
            counts[slot] = counts[slot].saturating_add(1);
        }
        let leader_cost = match self.role {
            DeviceRole::Leader => 0,
            DeviceRole::Router => self.router_table.path_cost(self.leader_data.leader_router_id),
            _ => MAX_ROUTE_COST,
        };
        Connectivity {
            parent_priority: self.config.mle.router.parent_priority,
            link_quality_3: counts[3],
            link_quality_2: counts[2],
            link_quality_1: counts[1],
            leader_cost,
            id_sequence: self.router_table.id_sequence(),
            active_routers: self.router_table.active_count().min(u8::MAX as usize) as u8,
            sed_capacity: Some(SedCapacity {
                buffer_size: SED_BUFFER_SIZE,
                datagram_count: SED_DATAGRAM_COUNT,
            }),
        }
    }

    pub(in crate::node) fn handle_child_id_request(
        &mut self,
        message: &MleMessage,
        ctx: &RxContext,
    ) -> Result<(), MleError> {
        let is_reed = self.is_reed();
        if !self.role.is_router_or_leader() && !is_reed {
            return Err(MleError::Drop("cannot take children"));
        }
        let index = self
            .child_table
            .find_by_ext_address(&ctx.sender)
            .ok_or(MleError::Drop("Child ID Request without Parent Request"))?;
        let tlvs = &message.tlvs;
        let response = required(tlvs.response(), TlvType::Response)?;
        let link_frame_counter = required(tlvs.link_frame_counter(), TlvType::LinkFrameCounter)?;
        let mle_frame_counter = required(tlvs.mle_frame_counter(), TlvType::MleFrameCounter)?;
        let mode = required(tlvs.mode(), TlvType::Mode)?;
        let timeout = required(tlvs.timeout(), TlvType::Timeout)?;
        let version = required(tlvs.version(), TlvType::Version)?;

        let expected = self
            .child_table
            .get(index)
            .and_then(|c| c.core().pending_challenge)
            .ok_or(MleError::Drop("no Parent Response outstanding"))?;
        if !expected.matches(response) {
            warn!(child = %ctx.sender, "Child ID Request does not echo our challenge");
            return Err(MleError::Security(SecurityError::ResponseMismatch));
        }
        let addresses = tlvs
            .address_registration()
            .map(|entries| self.resolve_address_entries(entries))
            .unwrap_or_default();
        let request_tlvs = tlvs.tlv_request().map(<[u8]>::to_vec).unwrap_or_default();

        let child = self.child_table.get_mut(index).ok_or(MleError::NotFound)?;
        {
            let core = child.core_mut();
            core.counters = FrameCounters::from_advertised(
                ctx.key_sequence,
                link_frame_counter,
                ctx.next_mle_counter(mle_frame_counter),
            );
            core.mode = mode;
            core.version = version;
            core.pending_challenge = None;
            core.state = NeighborState::ChildIdRequest;
        }
        child.timeout_secs = timeout;
        child.request_tlvs = request_tlvs;
        child.heard(ctx.rss(), ctx.now_ms);
        let accepted = self.child_table.register_addresses(index, &addresses)?;
        if accepted.len() < addresses.len() {
            debug!(child = %ctx.sender, accepted = accepted.len(), offered = addresses.len(), "Registered part of the child's addresses");
        }

        if is_reed {
            info!(child = %ctx.sender, "Holding Child ID Request while requesting a router ID");
            return match self.become_router(SolicitReason::HaveChildIdRequest, ctx.now_ms) {
                Ok(()) | Err(MleError::Busy) => Ok(()),
                Err(e) => Err(e),
            };
        }
        self.send_child_id_response(index)
    }

    /// Assign a child ID and confirm the attachment.
    pub(in crate::node) fn send_child_id_response(&mut self, index: ChildIndex) -> Result<(), MleError> {
        let child_id = self.child_table.allocate_child_id().ok_or(MleError::NoBufs)?;
        let rloc16 = rloc16_from_parts(router_id_from_rloc16(self.rloc16), child_id);
        let leader_data = self.current_leader_data();
        let child = self.child_table.get_mut(index).ok_or(MleError::NotFound)?;
        child.core_mut().rloc16 = rloc16;
        child.set_state(NeighborState::Valid);
        child.network_data_version = leader_data.data_version;
        let ext_address = child.ext_address();
        let full_network_data = child.core().mode.is_full_network_data();
        let request_tlvs = child.request_tlvs.clone();
        let timeout = child.timeout_secs;
        let addresses = child.addresses().to_vec();

        let mut reply = MleMessage::new(Command::ChildIdResponse)
            .with(Tlv::SourceAddress(self.rloc16))
            .with(Tlv::LeaderData(leader_data))
            .with(Tlv::Address16(rloc16))
            .with(Tlv::Timeout(timeout));
        if requested(&request_tlvs, TlvType::NetworkData) {
            reply.push(Tlv::NetworkData(self.network_data.get(!full_network_data)));
        }
        if requested(&request_tlvs, TlvType::Route) {
            reply.push(Tlv::Route(self.router_table.build_route_tlv()));
        }
        if !addresses.is_empty() {
            reply.push(self.address_registration(&addresses));
        }

        info!(child = %ext_address, rloc16 = format_args!("{:#06x}", rloc16), "Child added");
        self.emit(MleEvent::ChildAdded { ext_address, rloc16 });
        self.store_settings();
        self.send_mle(link_local_from_ext_address(&ext_address), reply)
    }

    /// Refresh a child's registration, or tell a stranger it is not ours.
    pub(in crate::node) fn handle_child_update_request(
        &mut self,
        message: &MleMessage,
        ctx: &RxContext,
    ) -> Result<(), MleError> {
        if !self.role.is_router_or_leader() {
            return Err(MleError::Drop("not a parent"));
        }
        let tlvs = &message.tlvs;
        let challenge = tlvs.challenge().map(<[u8]>::to_vec);
        let index = self
            .child_table
            .find_by_ext_address(&ctx.sender)
            .filter(|idx| self.child_table.get(*idx).is_some_and(|c| c.is_valid()));
        let Some(index) = index else {
            debug!(sender = %ctx.sender, "Child Update Request from unknown child");
            let mut reply = MleMessage::new(Command::ChildUpdateResponse)
                .with(Tlv::Status(STATUS_ERROR));
            if let Some(challenge) = challenge {
                reply.push(Tlv::Response(challenge));
            }
            return self.send_mle(ctx.reply_address(), reply);
        };

        let addresses = tlvs
            .address_registration()
            .map(|entries| self.resolve_address_entries(entries));
        let request_tlvs = tlvs.tlv_request().map(<[u8]>::to_vec).unwrap_or_default();
        let leader_data = self.current_leader_data();
        let child = self.child_table.get_mut(index).ok_or(MleError::NotFound)?;
        if let Some(mode) = tlvs.mode() {
            child.core_mut().mode = mode;
        }
        if let Some(timeout) = tlvs.timeout() {
            child.timeout_secs = timeout;
        }
        child.heard(ctx.rss(), ctx.now_ms);
        child.network_data_version = leader_data.data_version;
        let mode = child.core().mode;
        let timeout = child.timeout_secs;
        let rloc16 = child.rloc16();
        let accepted = match addresses {
            Some(addresses) => Some(self.child_table.register_addresses(index, &addresses)?),
            None => None,
        };

        let mut reply = MleMessage::new(Command::ChildUpdateResponse)
            .with(Tlv::SourceAddress(self.rloc16))
            .with(Tlv::Mode(mode))
            .with(Tlv::LeaderData(leader_data))
            .with(Tlv::Timeout(timeout));
        if let Some(challenge) = challenge {
            reply.push(Tlv::Response(challenge));
            reply.push(Tlv::LinkFrameCounter(self.keys.link_frame_counter()));
            reply.push(Tlv::MleFrameCounter(self.keys.mle_frame_counter()));
        }
        if requested(&request_tlvs, TlvType::Address16) {
            reply.push(Tlv::Address16(rloc16));
        }
        if requested(&request_tlvs, TlvType::NetworkData) {
            reply.push(Tlv::NetworkData(self.network_data.get(!mode.is_full_network_data())));
        }
        if requested(&request_tlvs, TlvType::Route) {
            reply.push(Tlv::Route(self.router_table.build_route_tlv()));
        }
        // Addresses that did not fit are left out of the echo.
        if let Some(accepted) = accepted {
            reply.push(self.address_registration(&accepted));
        }
        debug!(child = %ctx.sender, rloc16 = format_args!("{:#06x}", rloc16), "Child refreshed");
        self.send_mle(ctx.reply_address(), reply)
    }

    /// Address Registration echo, compressed where a context covers the
    /// prefix.
    fn address_registration(&self, addresses: &[Ipv6Addr]) -> Tlv {
        let entries = addresses
            .iter()
            .map(|addr| {
                let octets = addr.octets();
                let mut prefix = [0u8; 8];
                prefix.copy_from_slice(&octets[..8]);
                let mut iid = [0u8; 8];
                iid.copy_from_slice(&octets[8..]);
                match self.network_data.context_for_prefix(&prefix) {
                    Some(context_id) => AddressEntry::Compressed { context_id, iid },
                    None => AddressEntry::Uncompressed(*addr),
                }
            })
            .collect();
        Tlv::AddressRegistration(entries)
    }

    /// Expand registered entries; compressed ones with an unknown context
    /// are skipped.
    fn resolve_address_entries(&self, entries: &[AddressEntry]) -> Vec<Ipv6Addr> {
        entries
            .iter()
            .filter_map(|entry| match entry {
                AddressEntry::Compressed { context_id, iid } => self
                    .network_data
                    .context_prefix(*context_id)
                    .map(|prefix| MeshLocalPrefix::from_bytes(prefix).endpoint_identifier(*iid)),
                AddressEntry::Uncompressed(addr) => Some(*addr),
            })
            .collect()
    }
}

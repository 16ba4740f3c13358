//! Receive path: envelope, neighbor lookup, replay check, dispatch.

use std::net::Ipv6Addr;
use tracing::{debug, info, trace, warn};

use super::RxContext;
use crate::address::{
    ExtAddress, LINK_LOCAL_ALL_NODES, LINK_LOCAL_ALL_ROUTERS, ext_address_from_link_local,
};
use crate::neighbor::{Neighbor, NeighborCore, NeighborState};
use crate::node::{DeviceRole, Mle, MleError};
use crate::protocol::{Command, MLE_PORT, MleMessage, TMF_PORT, TmfFrame, TmfMessage};
use crate::security::open_frame;
use crate::table::ChildIndex;
use crate::transport::MessageInfo;

/// Where a sender lives in the engine's state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(in crate::node) enum NeighborRef {
    Parent,
    Candidate,
    Router(u8),
    Child(ChildIndex),
}

/// Commands accepted from a sender whose frame counters we do not hold.
fn allowed_from_unknown(command: Command) -> bool {
    matches!(
        command,
        Command::LinkRequest
            | Command::LinkAccept
            | Command::LinkAcceptAndRequest
            | Command::LinkReject
            | Command::Advertisement
            | Command::ParentRequest
            | Command::ParentResponse
            | Command::ChildIdRequest
            | Command::ChildUpdateRequest
            | Command::Announce
    )
}

/// Neighbor states in which the frame counters we hold are meaningful.
fn counters_known(state: NeighborState) -> bool {
    matches!(
        state,
        NeighborState::Valid
            | NeighborState::Restored
            | NeighborState::ChildUpdateRequest
            | NeighborState::ParentResponse
            | NeighborState::ChildIdRequest
    )
}

impl Mle {
    /// Process one inbound UDP datagram. Failures are logged and counted;
    /// nothing is returned to the caller.
    pub fn handle_receive(&mut self, bytes: &[u8], info: &MessageInfo, now_ms: u64) {
        if self.role == DeviceRole::Disabled {
            return;
        }
        self.counters.rx_messages += 1;
        let result = match info.port {
            MLE_PORT => self.receive_mle(bytes, info, now_ms),
            TMF_PORT => self.receive_tmf(bytes, info, now_ms),
            _ => Err(MleError::Drop("unknown port")),
        };
        if let Err(e) = result {
            self.note_receive_error(&e, info);
        }
    }

    fn note_receive_error(&mut self, error: &MleError, info: &MessageInfo) {
        match error {
            MleError::Parse(e) => {
                self.counters.rx_parse_errors += 1;
                debug!(source = %info.source, error = %e, "Dropped malformed message");
            }
            MleError::Security(e) => {
                self.counters.rx_security_failures += 1;
                warn!(source = %info.source, error = %e, "Dropped message failing security");
            }
            MleError::Duplicated {
                key_sequence,
                counter,
            } => {
                self.counters.rx_duplicated += 1;
                debug!(source = %info.source, key_sequence, counter, "Dropped duplicated frame");
            }
            MleError::Drop(reason) => {
                self.counters.rx_dropped += 1;
                trace!(source = %info.source, reason, "Dropped message");
            }
            other => {
                self.counters.rx_dropped += 1;
                debug!(source = %info.source, error = %other, "Message handling failed");
            }
        }
    }

    /// Destinations this node listens on for MLE.
    fn accepts_destination(&self, destination: &Ipv6Addr) -> bool {
        *destination == self.link_local_address()
            || *destination == LINK_LOCAL_ALL_NODES
            || (*destination == LINK_LOCAL_ALL_ROUTERS && self.config.mle.mode.is_full_thread_device())
            || *destination == self.mesh_local_eid()
            || (self.role.is_attached() && *destination == self.mesh_local_rloc())
    }

    fn receive_mle(&mut self, bytes: &[u8], info: &MessageInfo, now_ms: u64) -> Result<(), MleError> {
        if !self.accepts_destination(&info.destination) {
            return Err(MleError::Drop("not addressed to us"));
        }
        let sender = ext_address_from_link_local(&info.source)
            .ok_or(MleError::Drop("source is not link-local"))?;
        if sender == self.ext_address {
            return Err(MleError::Drop("own frame"));
        }

        let opened = open_frame(
            bytes,
            &sender,
            &info.source,
            &info.destination,
            self.keys.as_ref(),
            self.cipher.as_ref(),
        )?;
        let message = opened.message;
        let Some((key_sequence, frame_counter)) = opened.security else {
            return self.receive_unsecured(sender, &message, info, now_ms);
        };
        trace!(command = %message.command, sender = %sender, frame_counter, "Received MLE message");

        // The replay window advances before dispatch, so a frame is consumed
        // even when its handler fails.
        let neighbor = self.find_neighbor(&sender);
        let mut known = false;
        let mut known_valid = false;
        if let Some(core) = neighbor.and_then(|n| self.neighbor_core_mut(n))
            && counters_known(core.state)
        {
            let mut counters = core.counters;
            counters.accept_mle_frame(key_sequence, frame_counter)?;
            core.counters = counters;
            known = true;
            known_valid = core.state.is_valid_or_restoring();
        } else if !allowed_from_unknown(message.command) {
            return Err(MleError::Drop("command requires an established neighbor"));
        }

        if key_sequence > self.keys.current_key_sequence() && known_valid {
            info!(
                from = self.keys.current_key_sequence(),
                to = key_sequence,
                neighbor = %sender,
                "Switching to newer key sequence"
            );
            self.keys.set_current_key_sequence(key_sequence);
            self.store_settings();
        }

        let ctx = RxContext {
            sender,
            info: *info,
            key_sequence,
            frame_counter,
            now_ms,
        };
        self.dispatch_mle(&message, &ctx)?;

        if known
            && let Some(n) = self.find_neighbor(&sender)
            && let Some(core) = self.neighbor_core_mut(n)
        {
            core.link.add_rss(info.rss);
            core.last_heard_ms = now_ms;
        }
        Ok(())
    }

    fn dispatch_mle(&mut self, message: &MleMessage, ctx: &RxContext) -> Result<(), MleError> {
        debug!(command = %message.command, sender = %ctx.sender, "Handling MLE message");
        match message.command {
            Command::LinkRequest => self.handle_link_request(message, ctx),
            Command::LinkAccept => self.handle_link_accept(message, ctx, false),
            Command::LinkAcceptAndRequest => self.handle_link_accept(message, ctx, true),
            Command::LinkReject => self.handle_link_reject(ctx),
            Command::Advertisement => self.handle_advertisement(message, ctx),
            Command::DataRequest => self.handle_data_request(message, ctx),
            Command::DataResponse => self.handle_data_response(message, ctx),
            Command::ParentRequest => self.handle_parent_request(message, ctx),
            Command::ParentResponse => self.handle_parent_response(message, ctx),
            Command::ChildIdRequest => self.handle_child_id_request(message, ctx),
            Command::ChildIdResponse => self.handle_child_id_response(message, ctx),
            Command::ChildUpdateRequest => {
                if self.is_parent(&ctx.sender) {
                    self.handle_parent_update_request(message, ctx)
                } else {
                    self.handle_child_update_request(message, ctx)
                }
            }
            Command::ChildUpdateResponse => {
                if self.is_parent(&ctx.sender) {
                    self.handle_child_update_response(message, ctx)
                } else {
                    Err(MleError::Drop("child update response not from parent"))
                }
            }
            Command::Announce => self.handle_announce(message, ctx),
            Command::Update | Command::UpdateRequest => Err(MleError::Drop("unsupported command")),
            Command::DiscoveryRequest | Command::DiscoveryResponse => {
                Err(MleError::Drop("discovery must be unsecured"))
            }
        }
    }

    fn receive_unsecured(
        &mut self,
        sender: ExtAddress,
        message: &MleMessage,
        info: &MessageInfo,
        now_ms: u64,
    ) -> Result<(), MleError> {
        match message.command {
            Command::DiscoveryRequest => self.handle_discovery_request(sender, message, now_ms),
            Command::DiscoveryResponse => self.handle_discovery_response(sender, message, info),
            _ => Err(MleError::Drop("unsecured command")),
        }
    }

    fn receive_tmf(&mut self, bytes: &[u8], info: &MessageInfo, now_ms: u64) -> Result<(), MleError> {
        if !info.link_security {
            return Err(MleError::Drop("TMF without link security"));
        }
        let to_leader = info.destination == self.mesh_local_prefix.leader_aloc();
        if to_leader {
            if self.role != DeviceRole::Leader {
                return Err(MleError::Drop("leader ALOC while not leader"));
            }
        } else if !self.role.is_attached() || info.destination != self.mesh_local_rloc() {
            return Err(MleError::Drop("TMF not addressed to us"));
        }

        let frame = TmfFrame::decode(bytes)?;
        trace!(transaction = frame.transaction, source = %info.source, "Received TMF message");
        match frame.message {
            TmfMessage::SolicitRequest(request) => {
                self.handle_address_solicit(frame.transaction, request, info, now_ms)
            }
            TmfMessage::SolicitResponse(response) => {
                self.handle_address_solicit_response(frame.transaction, response, now_ms)
            }
            TmfMessage::ReleaseRequest(request) => {
                self.handle_address_release(frame.transaction, request, info, now_ms)
            }
            TmfMessage::ReleaseResponse => {
                debug!(transaction = frame.transaction, "Address release acknowledged");
                Ok(())
            }
        }
    }

    // === Neighbor lookup ===

    pub(in crate::node) fn is_parent(&self, ext_address: &ExtAddress) -> bool {
        self.parent
            .as_ref()
            .is_some_and(|p| p.ext_address() == *ext_address)
    }

    /// Locate a sender: parent, then candidate, then routers, then children.
    pub(in crate::node) fn find_neighbor(&self, ext_address: &ExtAddress) -> Option<NeighborRef> {
        if self
            .parent
            .as_ref()
            .is_some_and(|p| p.ext_address() == *ext_address && p.state() != NeighborState::Invalid)
        {
            return Some(NeighborRef::Parent);
        }
        if self
            .parent_candidate
            .as_ref()
            .is_some_and(|c| c.ext_address() == *ext_address)
        {
            return Some(NeighborRef::Candidate);
        }
        if let Some(router) = self
            .router_table
            .iter()
            .find(|r| r.ext_address() == *ext_address && r.state() != NeighborState::Invalid)
        {
            return Some(NeighborRef::Router(router.router_id()));
        }
        self.child_table
            .find_by_ext_address(ext_address)
            .map(NeighborRef::Child)
    }

    pub(in crate::node) fn neighbor_core(&self, neighbor: NeighborRef) -> Option<&NeighborCore> {
        match neighbor {
            NeighborRef::Parent => self.parent.as_ref().map(|p| p.core()),
            NeighborRef::Candidate => self.parent_candidate.as_ref().map(|c| c.router.core()),
            NeighborRef::Router(id) => self.router_table.get(id).map(|r| r.core()),
            NeighborRef::Child(idx) => self.child_table.get(idx).map(|c| c.core()),
        }
    }

    pub(in crate::node) fn neighbor_core_mut(&mut self, neighbor: NeighborRef) -> Option<&mut NeighborCore> {
        match neighbor {
            NeighborRef::Parent => self.parent.as_mut().map(|p| p.core_mut()),
            NeighborRef::Candidate => self.parent_candidate.as_mut().map(|c| c.router.core_mut()),
            NeighborRef::Router(id) => self.router_table.get_mut(id).map(|r| r.core_mut()),
            NeighborRef::Child(idx) => self.child_table.get_mut(idx).map(|c| c.core_mut()),
        }
    }

    /// Valid router neighbor whose link is bound to `ext_address`.
    pub(in crate::node) fn router_neighbor_id(&self, ext_address: &ExtAddress) -> Option<u8> {
        self.router_table
            .neighbors()
            .find(|r| r.ext_address() == *ext_address)
            .map(|r| r.router_id())
    }
}

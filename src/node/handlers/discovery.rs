//! Unsecured Discovery and channel Announce.

use tracing::{debug, info};

use super::{RxContext, required};
use crate::address::{ExtAddress, LINK_LOCAL_ALL_NODES, link_local_from_ext_address};
use crate::node::{AlternateChannel, DeviceRole, DiscoveredNetwork, Mle, MleError, ReattachState};
use crate::protocol::{
    Command, DiscoveryRequest, DiscoveryResponse, MleMessage, THREAD_VERSION, Tlv, TlvType,
};
use crate::timer::jitter;
use crate::transport::MessageInfo;

impl Mle {
    /// Broadcast a Discovery Request; answers collect in
    /// [`Mle::discovered_networks`].
    pub fn discover(&mut self, joiner: bool) -> Result<(), MleError> {
        if self.role == DeviceRole::Disabled {
            return Err(MleError::InvalidState);
        }
        self.discovered.clear();
        let request = DiscoveryRequest {
            version: THREAD_VERSION as u8,
            joiner,
        };
        let message =
            MleMessage::new(Command::DiscoveryRequest).with(Tlv::Discovery(request.encode()));
        info!(joiner, "Starting network discovery");
        self.send_mle(LINK_LOCAL_ALL_NODES, message)
    }

    pub(in crate::node) fn handle_discovery_request(
        &mut self,
        sender: ExtAddress,
        message: &MleMessage,
        now_ms: u64,
    ) -> Result<(), MleError> {
        if !self.role.is_router_or_leader() {
            return Err(MleError::Drop("Discovery Request while not a router"));
        }
        let payload = required(message.tlvs.discovery(), TlvType::Discovery)?;
        let request = DiscoveryRequest::decode(payload)?;
        let ext_pan_id = self
            .config
            .network
            .ext_pan_id_bytes()
            .map_err(|_| MleError::Drop("invalid extended PAN ID"))?;
        let response = DiscoveryResponse {
            version: THREAD_VERSION as u8,
            native_commissioner: false,
            ext_pan_id,
            network_name: self.config.network.name.clone(),
        };
        let reply =
            MleMessage::new(Command::DiscoveryResponse).with(Tlv::Discovery(response.encode()?));
        let delay = jitter(&mut self.rng, self.config.mle.advertise.max_response_delay_ms);
        debug!(sender = %sender, joiner = request.joiner, delay_ms = delay, "Answering Discovery Request");
        self.send_mle_after(link_local_from_ext_address(&sender), reply, now_ms, delay);
        Ok(())
    }

    pub(in crate::node) fn handle_discovery_response(
        &mut self,
        sender: ExtAddress,
        message: &MleMessage,
        info: &MessageInfo,
    ) -> Result<(), MleError> {
        let payload = required(message.tlvs.discovery(), TlvType::Discovery)?;
        let response = DiscoveryResponse::decode(payload)?;
        if let Some(known) = self.discovered.iter_mut().find(|n| n.source == sender) {
            known.rss = info.rss;
            return Ok(());
        }
        info!(
            network_name = %response.network_name,
            ext_pan_id = %hex::encode(response.ext_pan_id),
            source = %sender,
            "Discovered network"
        );
        self.discovered.push(DiscoveredNetwork {
            ext_pan_id: response.ext_pan_id,
            network_name: response.network_name,
            source: sender,
            rss: info.rss,
        });
        Ok(())
    }

    pub(in crate::node) fn handle_announce(
        &mut self,
        message: &MleMessage,
        ctx: &RxContext,
    ) -> Result<(), MleError> {
        let tlvs = &message.tlvs;
        let (_page, channel) = required(tlvs.channel(), TlvType::Channel)?;
        let pan_id = required(tlvs.pan_id(), TlvType::PanId)?;
        let active_timestamp = required(tlvs.active_timestamp(), TlvType::ActiveTimestamp)?;

        if active_timestamp > self.active_timestamp && (channel != self.channel || pan_id != self.pan_id) {
            info!(
                channel,
                pan_id = format_args!("{:#06x}", pan_id),
                active_timestamp,
                "Announce of a newer dataset, storing alternate channel"
            );
            self.alternate_channel = Some(AlternateChannel {
                channel,
                pan_id,
                active_timestamp,
            });
            if self.reattach_state == ReattachState::Idle {
                self.reattach_state = ReattachState::Pending;
            }
        } else if active_timestamp < self.active_timestamp && self.role.is_attached() {
            let delay = jitter(&mut self.rng, self.config.mle.advertise.max_response_delay_ms);
            debug!(sender = %ctx.sender, delay_ms = delay, "Sender is behind, announcing our channel");
            let announce = self.announce_message();
            self.send_mle_after(LINK_LOCAL_ALL_NODES, announce, ctx.now_ms, delay);
        }
        Ok(())
    }

    fn announce_message(&self) -> MleMessage {
        MleMessage::new(Command::Announce)
            .with(Tlv::Channel {
                page: 0,
                channel: self.channel,
            })
            .with(Tlv::PanId(self.pan_id))
            .with(Tlv::ActiveTimestamp(self.active_timestamp))
    }

    /// Broadcast our channel, PAN ID and active timestamp.
    pub fn send_announce(&mut self) -> Result<(), MleError> {
        if !self.role.is_attached() {
            return Err(MleError::InvalidState);
        }
        let message = self.announce_message();
        self.send_mle(LINK_LOCAL_ALL_NODES, message)
    }
}

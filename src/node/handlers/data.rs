//! Network Data distribution: Data Request and Data Response.

use std::net::Ipv6Addr;
use tracing::{debug, info};

use super::{RxContext, required};
use crate::address::LINK_LOCAL_ALL_NODES;
use crate::neighbor::Neighbor;
use crate::node::{DeviceRole, Mle, MleError};
use crate::protocol::{Command, MleMessage, Tlv, TlvType};
use crate::table::sequence_is_newer;
use crate::timer::jitter;

impl Mle {
    /// Ask `destination` for its Network Data.
    pub(in crate::node) fn send_data_request(&mut self, destination: Ipv6Addr) -> Result<(), MleError> {
        let message = MleMessage::new(Command::DataRequest)
            .with(Tlv::TlvRequest(vec![TlvType::NetworkData.to_byte()]));
        debug!(destination = %destination, "Requesting network data");
        self.send_mle(destination, message)
    }

    pub(in crate::node) fn handle_data_request(
        &mut self,
        _message: &MleMessage,
        ctx: &RxContext,
    ) -> Result<(), MleError> {
        if !self.role.is_router_or_leader() {
            return Err(MleError::Drop("Data Request while not a router"));
        }
        let child_mode = self
            .child_table
            .find_by_ext_address(&ctx.sender)
            .and_then(|idx| self.child_table.get(idx))
            .filter(|c| c.is_valid())
            .map(|c| c.core().mode);
        let stable_only = match child_mode {
            Some(mode) => !mode.is_full_network_data(),
            None if self.router_neighbor_id(&ctx.sender).is_some() => false,
            None => return Err(MleError::Drop("Data Request from non-neighbor")),
        };
        let reply = self.data_response(stable_only);
        self.send_mle(ctx.reply_address(), reply)
    }

    fn data_response(&self, stable_only: bool) -> MleMessage {
        MleMessage::new(Command::DataResponse)
            .with(Tlv::SourceAddress(self.rloc16))
            .with(Tlv::LeaderData(self.current_leader_data()))
            .with(Tlv::NetworkData(self.network_data.get(stable_only)))
    }

    pub(in crate::node) fn handle_data_response(
        &mut self,
        message: &MleMessage,
        ctx: &RxContext,
    ) -> Result<(), MleError> {
        if !self.role.is_attached() {
            return Err(MleError::Drop("Data Response while detached"));
        }
        if self.role == DeviceRole::Leader {
            return Err(MleError::Drop("leader owns network data"));
        }
        let tlvs = &message.tlvs;
        let leader_data = required(tlvs.leader_data(), TlvType::LeaderData)?;
        let data = required(tlvs.network_data(), TlvType::NetworkData)?;
        if leader_data.partition_id != self.leader_data.partition_id {
            return Err(MleError::Drop("Data Response from another partition"));
        }
        if !self.is_parent(&ctx.sender) && self.router_neighbor_id(&ctx.sender).is_none() {
            return Err(MleError::Drop("Data Response from non-neighbor"));
        }
        let newer = sequence_is_newer(leader_data.data_version, self.network_data.version())
            || sequence_is_newer(leader_data.stable_data_version, self.network_data.stable_version());
        if !newer {
            return Ok(());
        }
        let stable_only = !self.config.mle.mode.is_full_network_data();
        self.network_data.set(
            leader_data.data_version,
            leader_data.stable_data_version,
            stable_only,
            data,
        )?;
        info!(
            version = leader_data.data_version,
            stable_version = leader_data.stable_data_version,
            "Network data updated"
        );
        self.leader_data.data_version = leader_data.data_version;
        self.leader_data.stable_data_version = leader_data.stable_data_version;
        if self.role == DeviceRole::Router {
            self.schedule_data_response(ctx.now_ms);
        }
        Ok(())
    }

    /// Multicast our Network Data after a random delay.
    fn schedule_data_response(&mut self, now_ms: u64) {
        let delay = jitter(&mut self.rng, self.config.mle.advertise.max_response_delay_ms);
        let message = self.data_response(false);
        self.send_mle_after(LINK_LOCAL_ALL_NODES, message, now_ms, delay);
    }

    /// Tell the partition that the local Network Data changed. Only a
    /// router or the leader distributes it.
    pub fn notify_network_data_changed(&mut self, now_ms: u64) -> Result<(), MleError> {
        if !self.role.is_router_or_leader() {
            return Err(MleError::InvalidState);
        }
        self.leader_data.data_version = self.network_data.version();
        self.leader_data.stable_data_version = self.network_data.stable_version();
        self.schedule_data_response(now_ms);
        self.reset_trickle(now_ms);
        Ok(())
    }
}

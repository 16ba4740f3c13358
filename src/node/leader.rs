//! Leader role: partition formation and router ID administration.

use rand::Rng;
use tracing::{debug, info, warn};

use super::{AttachState, DeviceRole, Mle, MleError, MleEvent};
use crate::address::{rloc16_from_router_id, router_id_from_rloc16};
use crate::neighbor::Neighbor;
use crate::protocol::{
    AddressReleaseRequest, AddressSolicitRequest, AddressSolicitResponse, LeaderData,
    SolicitStatus, TmfFrame, TmfMessage,
};
use crate::timer::TimerKind;
use crate::transport::MessageInfo;

/// Most router IDs a leader hands out at once.
pub(crate) const MAX_ACTIVE_ROUTERS: usize = 32;

impl Mle {
    /// Form a new partition with this device as Leader.
    pub fn become_leader(&mut self, now_ms: u64) -> Result<(), MleError> {
        if !self.is_router_capable() {
            return Err(MleError::InvalidState);
        }
        match self.role {
            DeviceRole::Leader => return Err(MleError::Already),
            DeviceRole::Disabled => return Err(MleError::InvalidState),
            DeviceRole::Detached | DeviceRole::Child | DeviceRole::Router => {}
        }
        let old_router_id = self
            .role
            .is_router_or_leader()
            .then(|| router_id_from_rloc16(self.rloc16));

        self.timers.stop(TimerKind::Attach);
        self.timers.stop(TimerKind::AddressSolicit);
        self.timers.stop(TimerKind::ChildUpdate);
        self.attach_state = AttachState::Idle;
        self.parent_candidate = None;
        self.parent_request_challenge = None;
        self.pending_solicit = None;
        self.child_update = Default::default();
        self.role_transition = None;
        self.upgrade_hold = None;
        self.link_request = None;
        self.leader_unreachable_since_ms = None;
        if let Some(parent) = self.parent.take() {
            debug!(parent = %parent.ext_address(), "Leaving parent to lead");
        }
        self.remove_router_neighbors();
        self.router_table.clear();

        let router_id = match self
            .previous_router_id
            .filter(|id| self.router_table.is_available(*id, now_ms))
        {
            Some(id) => {
                self.router_table.allocate(id, now_ms)?;
                id
            }
            None => self.router_table.allocate_any(&mut self.rng, now_ms)?,
        };
        if old_router_id != Some(router_id) {
            self.remove_all_children();
        }
        if let Some(entry) = self.router_table.get_mut(router_id) {
            entry.core_mut().ext_address = self.ext_address;
        }
        self.router_table.set_own_router_id(Some(router_id));
        self.rloc16 = rloc16_from_router_id(router_id);
        self.previous_router_id = Some(router_id);

        let partition_id: u32 = self.rng.random();
        let data_version: u8 = self.rng.random();
        let stable_data_version: u8 = self.rng.random();
        self.network_data.reset_as_leader(data_version, stable_data_version);
        self.set_leader_data(LeaderData {
            partition_id,
            weighting: self.config.mle.router.leader_weight,
            data_version,
            stable_data_version,
            leader_router_id: router_id,
        });
        self.set_role(DeviceRole::Leader)?;
        self.attach_backoff.reset();
        info!(
            router_id,
            partition_id = format_args!("{:#010x}", partition_id),
            "Formed new partition as leader"
        );
        self.start_advertising(now_ms);
        self.store_settings();
        Ok(())
    }

    pub(in crate::node) fn handle_address_solicit(
        &mut self,
        transaction: u16,
        request: AddressSolicitRequest,
        info: &MessageInfo,
        now_ms: u64,
    ) -> Result<(), MleError> {
        if self.role != DeviceRole::Leader {
            return Err(MleError::Drop("Address Solicit while not leader"));
        }
        let existing = self
            .router_table
            .iter()
            .find(|r| r.ext_address() == request.ext_address)
            .map(|r| r.router_id());
        let granted = match existing {
            Some(id) => Some(id),
            None if self.router_table.active_count() >= MAX_ACTIVE_ROUTERS => None,
            None => {
                let requested = request
                    .rloc16
                    .map(router_id_from_rloc16)
                    .filter(|id| self.router_table.is_available(*id, now_ms));
                let allocated = match requested {
                    Some(id) => self.router_table.allocate(id, now_ms).map(|_| id),
                    None => self.router_table.allocate_any(&mut self.rng, now_ms),
                };
                allocated
                    .inspect_err(|e| debug!(error = %e, "No router ID to grant"))
                    .ok()
            }
        };

        let response = match granted {
            Some(router_id) => {
                if let Some(entry) = self.router_table.get_mut(router_id) {
                    entry.core_mut().ext_address = request.ext_address;
                }
                info!(
                    router_id,
                    requester = %request.ext_address,
                    reason = ?request.reason,
                    "Router ID granted"
                );
                self.reset_trickle(now_ms);
                AddressSolicitResponse {
                    status: SolicitStatus::Success,
                    rloc16: Some(rloc16_from_router_id(router_id)),
                    router_mask: Some((self.router_table.id_sequence(), self.router_table.router_mask())),
                }
            }
            None => {
                warn!(requester = %request.ext_address, "Router ID request refused");
                AddressSolicitResponse {
                    status: SolicitStatus::NoAddressAvailable,
                    rloc16: None,
                    router_mask: None,
                }
            }
        };
        let frame = TmfFrame {
            transaction,
            message: TmfMessage::SolicitResponse(response),
        };
        self.send_tmf(info.source, frame)
    }

    pub(in crate::node) fn handle_address_release(
        &mut self,
        transaction: u16,
        request: AddressReleaseRequest,
        info: &MessageInfo,
        now_ms: u64,
    ) -> Result<(), MleError> {
        if self.role != DeviceRole::Leader {
            return Err(MleError::Drop("Address Release while not leader"));
        }
        let router_id = router_id_from_rloc16(request.rloc16);
        if Some(router_id) == self.router_table.own_router_id() {
            return Err(MleError::Drop("release of our own router ID"));
        }
        let router = self
            .router_table
            .get(router_id)
            .filter(|r| r.ext_address() == request.ext_address)
            .ok_or(MleError::Drop("release for unknown router"))?;
        let was_neighbor = router.is_neighbor();
        let rloc16 = router.rloc16();
        self.router_table.release(router_id, now_ms)?;
        info!(router_id, requester = %request.ext_address, "Router ID released on request");
        if was_neighbor {
            self.emit(MleEvent::NeighborRemoved {
                ext_address: request.ext_address,
                rloc16,
            });
        }
        self.reset_trickle(now_ms);
        let frame = TmfFrame {
            transaction,
            message: TmfMessage::ReleaseResponse,
        };
        self.send_tmf(info.source, frame)
    }
}

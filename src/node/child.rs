//! Child-side Child Update exchange.
//!
//! One timer carries three exclusive duties: a short coalescing delay for
//! a requested update, retransmission of an unanswered request, and the
//! periodic keepalive of an rx-on-when-idle child. Too many unanswered
//! requests detach the device.

use tracing::{debug, info, warn};

use super::handlers::{RxContext, required};
use super::{AttachState, Mle, MleError};
use crate::address::{link_local_from_ext_address, router_id_from_rloc16};
use crate::neighbor::{Neighbor, NeighborState};
use crate::protocol::{AddressEntry, Command, MleMessage, STATUS_ERROR, Tlv, TlvType};
use crate::security::{Challenge, FrameCounters, SecurityError};
use crate::table::sequence_is_newer;
use crate::timer::TimerKind;

/// What the Child Update timer is armed for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) enum ChildUpdateDuty {
    #[default]
    Idle,
    Pending,
    Retransmit,
    Keepalive,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct ChildUpdateState {
    pub duty: ChildUpdateDuty,
    /// Requests sent since the last answered one.
    pub attempts: u8,
    pub challenge: Option<Challenge>,
}

impl Mle {
    /// Schedule a Child Update Request to the parent shortly, coalescing
    /// with any already pending.
    pub fn request_child_update(&mut self, now_ms: u64) -> Result<(), MleError> {
        if self.parent.is_none() {
            return Err(MleError::InvalidState);
        }
        if self.child_update.duty == ChildUpdateDuty::Pending
            || self.child_update.duty == ChildUpdateDuty::Retransmit
        {
            return Ok(());
        }
        self.child_update.duty = ChildUpdateDuty::Pending;
        self.timers.start(
            TimerKind::ChildUpdate,
            now_ms,
            self.config.mle.child.update_pending_delay_ms,
        );
        Ok(())
    }

    /// Send a Child Update Request now and keep retransmitting until the
    /// parent answers.
    pub(in crate::node) fn start_child_update_retransmit(&mut self, now_ms: u64) {
        self.child_update.attempts = 0;
        if let Err(e) = self.send_child_update_request(now_ms) {
            debug!(error = %e, "Child Update Request not sent, will retry");
        }
    }

    /// Arm the keepalive for an rx-on-when-idle child.
    pub(in crate::node) fn schedule_keepalive(&mut self, now_ms: u64) {
        self.child_update = Default::default();
        if !self.config.mle.mode.is_rx_on_when_idle() {
            self.timers.stop(TimerKind::ChildUpdate);
            return;
        }
        let interval_ms = u64::from(self.config.mle.child.timeout_secs) * 1000 / 2;
        self.child_update.duty = ChildUpdateDuty::Keepalive;
        self.timers.start(TimerKind::ChildUpdate, now_ms, interval_ms);
    }

    pub(in crate::node) fn handle_child_update_timer(&mut self, now_ms: u64) -> Result<(), MleError> {
        match self.child_update.duty {
            ChildUpdateDuty::Idle => Ok(()),
            ChildUpdateDuty::Pending | ChildUpdateDuty::Keepalive => {
                self.child_update.attempts = 0;
                self.send_child_update_request(now_ms)
            }
            ChildUpdateDuty::Retransmit => {
                if self.child_update.attempts >= self.config.mle.child.max_keepalive_attempts {
                    warn!(
                        attempts = self.child_update.attempts,
                        "Parent stopped answering Child Update Requests"
                    );
                    self.child_update = Default::default();
                    return self.become_detached(now_ms);
                }
                self.send_child_update_request(now_ms)
            }
        }
    }

    fn send_child_update_request(&mut self, now_ms: u64) -> Result<(), MleError> {
        let Some(parent) = &self.parent else {
            return Err(MleError::InvalidState);
        };
        let destination = link_local_from_ext_address(&parent.ext_address());
        let mode = self.config.mle.mode;
        let challenge = Challenge::generate(&mut self.rng);
        let mut message = MleMessage::new(Command::ChildUpdateRequest)
            .with(Tlv::Mode(mode))
            .with(Tlv::Challenge(challenge.to_vec()))
            .with(Tlv::Timeout(self.config.mle.child.timeout_secs))
            .with(Tlv::SourceAddress(self.rloc16))
            .with(Tlv::LeaderData(self.leader_data));
        if !mode.is_full_thread_device() {
            message.push(Tlv::AddressRegistration(vec![AddressEntry::Compressed {
                context_id: 0,
                iid: self.ext_address.to_iid(),
            }]));
        }
        if self.attach_state == AttachState::Synchronize {
            let mut requested = vec![TlvType::Address16.to_byte(), TlvType::NetworkData.to_byte()];
            if mode.is_full_thread_device() {
                requested.push(TlvType::Route.to_byte());
            }
            message.push(Tlv::TlvRequest(requested));
        }

        self.child_update.challenge = Some(challenge);
        self.child_update.attempts = self.child_update.attempts.saturating_add(1);
        self.child_update.duty = ChildUpdateDuty::Retransmit;
        self.timers.start(
            TimerKind::ChildUpdate,
            now_ms,
            self.config.mle.child.retransmission_delay_ms,
        );
        debug!(attempt = self.child_update.attempts, "Sending Child Update Request");
        self.send_mle(destination, message)
    }

    /// The parent answered our Child Update Request.
    pub(in crate::node) fn handle_child_update_response(
        &mut self,
        message: &MleMessage,
        ctx: &RxContext,
    ) -> Result<(), MleError> {
        let tlvs = &message.tlvs;
        if tlvs.status() == Some(STATUS_ERROR) {
            warn!(parent = %ctx.sender, "Parent no longer holds us as a child");
            return self.become_detached(ctx.now_ms);
        }
        let response = required(tlvs.response(), TlvType::Response)?;
        let expected = self
            .child_update
            .challenge
            .ok_or(MleError::Drop("no Child Update Request outstanding"))?;
        if !expected.matches(response) {
            warn!(parent = %ctx.sender, "Child Update Response does not echo our challenge");
            return Err(MleError::Security(SecurityError::ResponseMismatch));
        }
        let source = required(tlvs.source_address(), TlvType::SourceAddress)?;
        let leader_data = required(tlvs.leader_data(), TlvType::LeaderData)?;

        if router_id_from_rloc16(source) != router_id_from_rloc16(self.rloc16)
            || leader_data.partition_id != self.leader_data.partition_id
        {
            info!(
                source = format_args!("{:#06x}", source),
                partition_id = format_args!("{:#010x}", leader_data.partition_id),
                "Parent moved, detaching"
            );
            return self.become_detached(ctx.now_ms);
        }
        if let Some(address16) = tlvs.address16()
            && address16 != self.rloc16
        {
            info!(address16 = format_args!("{:#06x}", address16), "Parent reassigned our RLOC16, detaching");
            return self.become_detached(ctx.now_ms);
        }

        if self.attach_state == AttachState::Synchronize {
            let link_frame_counter = tlvs.link_frame_counter();
            let mle_frame_counter = tlvs.mle_frame_counter();
            if let Some(parent) = self.parent.as_mut() {
                let core = parent.core_mut();
                core.rloc16 = source;
                core.state = NeighborState::Valid;
                if let (Some(link), Some(mle)) = (link_frame_counter, mle_frame_counter) {
                    core.counters = FrameCounters::from_advertised(
                        ctx.key_sequence,
                        link,
                        ctx.next_mle_counter(mle),
                    );
                }
            }
            if let Some(route) = tlvs.route()
                && self.config.mle.mode.is_full_thread_device()
            {
                self.router_table.reset_from_route(route, ctx.now_ms);
            }
            self.attach_state = AttachState::Idle;
            info!(parent = %ctx.sender, "Child role restored");
        }

        if let Some(data) = tlvs.network_data() {
            let stable_only = !self.config.mle.mode.is_full_network_data();
            self.network_data.set(
                leader_data.data_version,
                leader_data.stable_data_version,
                stable_only,
                data,
            )?;
        } else if sequence_is_newer(leader_data.data_version, self.network_data.version()) {
            self.send_data_request(ctx.reply_address())?;
        }
        self.set_leader_data(leader_data);
        self.schedule_keepalive(ctx.now_ms);
        self.store_settings();
        Ok(())
    }

    /// Our parent asks for our state; answer with what it needs.
    pub(in crate::node) fn handle_parent_update_request(
        &mut self,
        message: &MleMessage,
        ctx: &RxContext,
    ) -> Result<(), MleError> {
        let tlvs = &message.tlvs;
        if let Some(leader_data) = tlvs.leader_data()
            && leader_data.partition_id == self.leader_data.partition_id
        {
            if let Some(data) = tlvs.network_data() {
                let stable_only = !self.config.mle.mode.is_full_network_data();
                self.network_data.set(
                    leader_data.data_version,
                    leader_data.stable_data_version,
                    stable_only,
                    data,
                )?;
            }
            self.set_leader_data(leader_data);
        }
        let mut reply = MleMessage::new(Command::ChildUpdateResponse)
            .with(Tlv::SourceAddress(self.rloc16))
            .with(Tlv::Mode(self.config.mle.mode))
            .with(Tlv::Timeout(self.config.mle.child.timeout_secs))
            .with(Tlv::LeaderData(self.leader_data));
        if let Some(challenge) = tlvs.challenge() {
            reply.push(Tlv::Response(challenge.to_vec()));
        }
        if !self.config.mle.mode.is_full_thread_device() {
            reply.push(Tlv::AddressRegistration(vec![AddressEntry::Compressed {
                context_id: 0,
                iid: self.ext_address.to_iid(),
            }]));
        }
        self.send_mle(ctx.reply_address(), reply)
    }
}

//! Attach State Machine
//!
//! ```text
//! Idle -> Start -(timer)-> ParentRequestRouters -(timer)-> ParentRequestRoutersAndReeds
//!                                 |                               |
//!                                 +---- candidate? ----> ChildIdRequest -> attached
//!                                                                 |
//!                              no candidate after both scans -> attach_failed
//! ```
//!
//! A failed cycle escalates by mode: SamePartition retries once, then any
//! partition, then a router-capable device forms its own partition while
//! any other device backs off and retries. A stored Announce alternate
//! channel is tried before giving up on the current one.

use std::cmp::Ordering;
use tracing::{debug, info, warn};

use super::handlers::{RxContext, required};
use super::parent::{ParentCandidate, PartitionInfo, compare_parents, compare_partitions};
use super::{AttachMode, AttachState, DeviceRole, Mle, MleError, MleEvent, ReattachState};
use crate::address::{
    LINK_LOCAL_ALL_ROUTERS, child_id_from_rloc16, is_active_router, link_local_from_ext_address,
    router_id_from_rloc16,
};
use crate::neighbor::{Neighbor, NeighborState, Router, link_quality_from_margin};
use crate::protocol::{
    AddressEntry, AddressReleaseRequest, Command, LeaderData, MleMessage, RouteTlv, ScanMask,
    SolicitReason, THREAD_VERSION, Tlv, TlvType, TmfFrame, TmfMessage,
};
use crate::security::{Challenge, FrameCounters, SecurityError};
use crate::timer::{TimerKind, jitter};

impl Mle {
    /// Start an attach cycle in `mode`.
    ///
    /// Fails with `AlreadyAttaching` while a cycle runs and with
    /// `InvalidState` while disabled. The current role, if any, is kept
    /// until a new parent accepts us.
    pub fn become_child(&mut self, mode: AttachMode, now_ms: u64) -> Result<(), MleError> {
        if self.role == DeviceRole::Disabled {
            return Err(MleError::InvalidState);
        }
        if !self.attach_state.is_idle() {
            return Err(MleError::AlreadyAttaching);
        }
        let attach = &self.config.mle.attach;
        // Keep spreading out after failed cycles; a successful attach resets.
        let backoff = if self.attach_backoff.is_first_attempt() {
            0
        } else {
            self.attach_backoff.backoff_ms(attach.backoff_base_ms, attach.backoff_max_ms)
        };
        let start_jitter_ms = attach.start_jitter_ms;
        let delay = backoff + jitter(&mut self.rng, start_jitter_ms);
        self.begin_attach(mode, now_ms, delay);
        Ok(())
    }

    pub(in crate::node) fn begin_attach(&mut self, mode: AttachMode, now_ms: u64, delay_ms: u64) {
        self.attach_mode = mode;
        self.attach_state = AttachState::Start;
        self.parent_candidate = None;
        self.parent_request_challenge = None;
        self.counters.attach_attempts += 1;
        self.timers.start(TimerKind::Attach, now_ms, delay_ms);
        info!(mode = %mode, role = %self.role, delay_ms, "Attach cycle scheduled");
    }

    pub(in crate::node) fn handle_attach_timer(&mut self, now_ms: u64) -> Result<(), MleError> {
        let attach = self.config.mle.attach.clone();
        match self.attach_state {
            AttachState::Idle | AttachState::Synchronize => Ok(()),
            AttachState::Start => {
                self.send_parent_request(ScanMask::routers_only());
                self.attach_state = AttachState::ParentRequestRouters;
                self.timers.start(
                    TimerKind::Attach,
                    now_ms,
                    attach.parent_request_router_timeout_ms,
                );
                Ok(())
            }
            AttachState::ParentRequestRouters => {
                if self.parent_candidate.is_some() {
                    return self.send_child_id_request(now_ms);
                }
                self.send_parent_request(ScanMask::routers_and_reeds());
                self.attach_state = AttachState::ParentRequestRoutersAndReeds;
                self.timers.start(
                    TimerKind::Attach,
                    now_ms,
                    attach.parent_request_reed_timeout_ms,
                );
                Ok(())
            }
            AttachState::ParentRequestRoutersAndReeds => {
                if self.parent_candidate.is_some() {
                    return self.send_child_id_request(now_ms);
                }
                self.attach_failed(now_ms)
            }
            AttachState::Announce => self.switch_to_alternate_channel(now_ms),
            AttachState::ChildIdRequest => {
                warn!("Child ID Request timed out");
                self.attach_failed(now_ms)
            }
        }
    }

    /// Multicast a Parent Request with a fresh challenge. A send failure is
    /// logged; the cycle continues on its timer.
    fn send_parent_request(&mut self, scan_mask: ScanMask) {
        let challenge = Challenge::generate(&mut self.rng);
        let message = MleMessage::new(Command::ParentRequest)
            .with(Tlv::Mode(self.config.mle.mode))
            .with(Tlv::Challenge(challenge.to_vec()))
            .with(Tlv::ScanMask(scan_mask))
            .with(Tlv::Version(THREAD_VERSION));
        self.parent_request_challenge = Some(challenge);
        debug!(
            routers = scan_mask.includes_routers(),
            end_devices = scan_mask.includes_end_devices(),
            "Sending Parent Request"
        );
        if let Err(e) = self.send_mle(LINK_LOCAL_ALL_ROUTERS, message) {
            warn!(error = %e, "Parent Request not sent");
        }
    }

    /// Evaluate a Parent Response and keep the better of it and the
    /// current candidate.
    pub(in crate::node) fn handle_parent_response(
        &mut self,
        message: &MleMessage,
        ctx: &RxContext,
    ) -> Result<(), MleError> {
        if !self.attach_state.is_parent_request() {
            return Err(MleError::Drop("not requesting a parent"));
        }
        let tlvs = &message.tlvs;
        let response = required(tlvs.response(), TlvType::Response)?;
        let expected = self
            .parent_request_challenge
            .as_ref()
            .ok_or(MleError::Drop("no Parent Request outstanding"))?;
        if !expected.matches(response) {
            warn!(sender = %ctx.sender, "Parent Response does not echo our challenge");
            return Err(MleError::Security(SecurityError::ResponseMismatch));
        }
        let source = required(tlvs.source_address(), TlvType::SourceAddress)?;
        let leader_data = required(tlvs.leader_data(), TlvType::LeaderData)?;
        let link_frame_counter = required(tlvs.link_frame_counter(), TlvType::LinkFrameCounter)?;
        let mle_frame_counter = required(tlvs.mle_frame_counter(), TlvType::MleFrameCounter)?;
        let challenge = required(tlvs.challenge(), TlvType::Challenge)?;
        let reported_margin = required(tlvs.link_margin(), TlvType::LinkMargin)?;
        let connectivity = required(tlvs.connectivity(), TlvType::Connectivity)?;
        let version = required(tlvs.version(), TlvType::Version)?;

        let partition = PartitionInfo::new(&leader_data, connectivity.active_routers as usize);
        match self.attach_mode {
            AttachMode::AnyPartition => {}
            AttachMode::SamePartition | AttachMode::SamePartitionRetry => {
                if leader_data.partition_id != self.leader_data.partition_id {
                    return Err(MleError::Drop("parent in another partition"));
                }
            }
            AttachMode::BetterPartition => {
                let ours = PartitionInfo::new(&self.leader_data, self.router_table.active_count());
                if compare_partitions(&partition, &ours) != Ordering::Greater {
                    return Err(MleError::Drop("partition not better than ours"));
                }
            }
            AttachMode::DowngradeToReed => {
                if leader_data.partition_id != self.leader_data.partition_id
                    || !is_active_router(source)
                {
                    return Err(MleError::Drop("not a router of our partition"));
                }
            }
        }

        let link_margin = self.link_margin_for(ctx.rss()).min(reported_margin);
        if self.attach_state == AttachState::ParentRequestRouters
            && link_quality_from_margin(link_margin) < 3
        {
            debug!(sender = %ctx.sender, link_margin, "Ignoring weak router in first scan");
            return Ok(());
        }

        let mut router = Router::new(router_id_from_rloc16(source), self.config.mle.noise_floor_dbm);
        {
            let core = router.core_mut();
            core.ext_address = ctx.sender;
            core.rloc16 = source;
            core.state = NeighborState::ParentResponse;
            core.version = version;
            core.counters = FrameCounters::from_advertised(
                ctx.key_sequence,
                link_frame_counter,
                ctx.next_mle_counter(mle_frame_counter),
            );
        }
        router.heard(ctx.rss(), ctx.now_ms);
        router.link_quality_out = link_quality_from_margin(reported_margin);
        let candidate = ParentCandidate {
            router,
            challenge: challenge.to_vec(),
            connectivity,
            leader_data,
            link_margin,
            version,
        };

        if let Some(current) = &self.parent_candidate
            && current.ext_address() != ctx.sender
            && compare_parents(&candidate, current) != Ordering::Greater
        {
            debug!(sender = %ctx.sender, kept = %current.ext_address(), "Parent Response not better than candidate");
            return Ok(());
        }
        debug!(
            sender = %ctx.sender,
            rloc16 = format_args!("{:#06x}", source),
            link_quality = candidate.link_quality(),
            partition_id = format_args!("{:#010x}", leader_data.partition_id),
            "Parent candidate selected"
        );
        self.parent_candidate = Some(candidate);
        Ok(())
    }

    /// Ask the selected candidate for a child ID.
    fn send_child_id_request(&mut self, now_ms: u64) -> Result<(), MleError> {
        let Some(candidate) = &self.parent_candidate else {
            return self.attach_failed(now_ms);
        };
        let destination = link_local_from_ext_address(&candidate.ext_address());
        let mode = self.config.mle.mode;
        let mut message = MleMessage::new(Command::ChildIdRequest)
            .with(Tlv::Response(candidate.challenge.clone()))
            .with(Tlv::LinkFrameCounter(self.keys.link_frame_counter()))
            .with(Tlv::MleFrameCounter(self.keys.mle_frame_counter()))
            .with(Tlv::Mode(mode))
            .with(Tlv::Timeout(self.config.mle.child.timeout_secs))
            .with(Tlv::Version(THREAD_VERSION));
        if !mode.is_full_thread_device() {
            message.push(Tlv::AddressRegistration(vec![AddressEntry::Compressed {
                context_id: 0,
                iid: self.ext_address.to_iid(),
            }]));
        }
        let mut requested = vec![TlvType::Address16.to_byte(), TlvType::NetworkData.to_byte()];
        if mode.is_full_thread_device() {
            requested.push(TlvType::Route.to_byte());
        }
        message.push(Tlv::TlvRequest(requested));

        info!(parent = %candidate.ext_address(), "Sending Child ID Request");
        self.parent_request_challenge = None;
        self.attach_state = AttachState::ChildIdRequest;
        self.timers.start(
            TimerKind::Attach,
            now_ms,
            self.config.mle.attach.child_id_request_timeout_ms,
        );
        self.send_mle(destination, message)
    }

    pub(in crate::node) fn handle_child_id_response(
        &mut self,
        message: &MleMessage,
        ctx: &RxContext,
    ) -> Result<(), MleError> {
        if self.attach_state != AttachState::ChildIdRequest {
            return Err(MleError::Drop("no Child ID Request outstanding"));
        }
        let candidate = self
            .parent_candidate
            .as_ref()
            .filter(|c| c.ext_address() == ctx.sender)
            .ok_or(MleError::Drop("Child ID Response not from candidate"))?;
        let tlvs = &message.tlvs;
        let source = required(tlvs.source_address(), TlvType::SourceAddress)?;
        let leader_data = required(tlvs.leader_data(), TlvType::LeaderData)?;
        let address16 = required(tlvs.address16(), TlvType::Address16)?;
        if router_id_from_rloc16(address16) != router_id_from_rloc16(source)
            || child_id_from_rloc16(address16) == 0
        {
            return Err(MleError::Drop("Address16 outside parent's range"));
        }

        let mut parent = candidate.router.clone();
        parent.core_mut().rloc16 = source;
        if let Some(data) = tlvs.network_data() {
            let stable_only = !self.config.mle.mode.is_full_network_data();
            self.network_data.set(
                leader_data.data_version,
                leader_data.stable_data_version,
                stable_only,
                data,
            )?;
        }
        let route = tlvs.route().cloned();
        self.set_state_child(parent, address16, leader_data, route, ctx.now_ms)
    }

    /// Complete attachment under `parent`.
    pub(in crate::node) fn set_state_child(
        &mut self,
        mut parent: Router,
        rloc16: u16,
        leader_data: LeaderData,
        route: Option<RouteTlv>,
        now_ms: u64,
    ) -> Result<(), MleError> {
        let was_router = self.role.is_router_or_leader();
        let mode = self.attach_mode;
        if was_router {
            if mode == AttachMode::DowngradeToReed {
                self.send_address_release();
            }
            self.leave_router_role();
        }

        self.router_table.clear();
        if let Some(route) = &route
            && self.config.mle.mode.is_full_thread_device()
        {
            self.router_table.reset_from_route(route, now_ms);
        }

        parent.core_mut().state = NeighborState::Valid;
        let parent_ext = parent.ext_address();
        let parent_rloc16 = parent.rloc16();
        self.parent = Some(parent);
        self.parent_candidate = None;
        self.rloc16 = rloc16;
        self.timers.stop(TimerKind::Attach);
        self.attach_state = AttachState::Idle;
        self.attach_backoff.reset();
        if self.reattach_state == ReattachState::Active {
            if let Some(alternate) = self.alternate_channel.take() {
                self.active_timestamp = alternate.active_timestamp;
            }
            self.reattach_state = ReattachState::Idle;
        }
        self.set_leader_data(leader_data);
        self.set_role(DeviceRole::Child)?;
        self.counters.parent_changes += 1;
        info!(
            parent = %parent_ext,
            rloc16 = format_args!("{:#06x}", rloc16),
            partition_id = format_args!("{:#010x}", leader_data.partition_id),
            "Attached as child"
        );
        self.emit(MleEvent::ParentChanged {
            ext_address: parent_ext,
            rloc16: parent_rloc16,
        });

        self.schedule_keepalive(now_ms);
        self.start_advertising(now_ms);
        self.store_settings();

        if was_router && mode == AttachMode::BetterPartition && self.is_router_capable() {
            match self.become_router(SolicitReason::ParentPartitionChange, now_ms) {
                Ok(()) | Err(MleError::Busy) => {}
                Err(e) => debug!(error = %e, "Router re-acquisition after merge failed"),
            }
        }
        Ok(())
    }

    /// Give our router ID back to the leader before downgrading.
    fn send_address_release(&mut self) {
        let transaction = self.next_transaction();
        let frame = TmfFrame {
            transaction,
            message: TmfMessage::ReleaseRequest(AddressReleaseRequest {
                ext_address: self.ext_address,
                rloc16: self.rloc16,
            }),
        };
        let leader = self.mesh_local_prefix.leader_aloc();
        if let Err(e) = self.send_tmf(leader, frame) {
            warn!(error = %e, "Address Release not sent");
        }
    }

    /// An attach cycle ended without a parent.
    pub(in crate::node) fn attach_failed(&mut self, now_ms: u64) -> Result<(), MleError> {
        let mode = self.attach_mode;
        self.timers.stop(TimerKind::Attach);
        self.attach_state = AttachState::Idle;
        self.parent_candidate = None;
        self.parent_request_challenge = None;
        info!(mode = %mode, role = %self.role, "Attach cycle found no parent");

        if self.reattach_state == ReattachState::Active {
            info!("Alternate channel failed, returning to configured channel");
            self.reattach_state = ReattachState::Idle;
            self.alternate_channel = None;
            let (channel, pan_id) = (self.config.network.channel, self.config.network.pan_id);
            self.switch_channel(channel, pan_id)?;
            if !self.role.is_attached() {
                let delay = self.backoff_delay();
                self.begin_attach(AttachMode::AnyPartition, now_ms, delay);
            }
            return Ok(());
        }

        if self.role.is_attached() {
            return Ok(());
        }

        if self.reattach_state == ReattachState::Pending && self.alternate_channel.is_some() {
            info!("Trying channel from Announce");
            self.attach_state = AttachState::Announce;
            self.timers.start(
                TimerKind::Attach,
                now_ms,
                self.config.mle.attach.announce_process_timeout_ms,
            );
            return Ok(());
        }

        match mode {
            AttachMode::SamePartition => {
                self.begin_attach(AttachMode::SamePartitionRetry, now_ms, 0);
                Ok(())
            }
            AttachMode::SamePartitionRetry
            | AttachMode::BetterPartition
            | AttachMode::DowngradeToReed => {
                self.begin_attach(AttachMode::AnyPartition, now_ms, 0);
                Ok(())
            }
            AttachMode::AnyPartition => {
                if self.is_router_capable() {
                    self.become_leader(now_ms)
                } else {
                    let delay = self.backoff_delay();
                    self.begin_attach(AttachMode::AnyPartition, now_ms, delay);
                    Ok(())
                }
            }
        }
    }

    fn backoff_delay(&mut self) -> u64 {
        let attach = &self.config.mle.attach;
        let (base, max) = (attach.backoff_base_ms, attach.backoff_max_ms);
        self.attach_backoff.next_delay(&mut self.rng, base, max)
    }

    // === Announce ===

    fn switch_to_alternate_channel(&mut self, now_ms: u64) -> Result<(), MleError> {
        self.attach_state = AttachState::Idle;
        let Some(alternate) = self.alternate_channel else {
            self.reattach_state = ReattachState::Idle;
            self.begin_attach(AttachMode::AnyPartition, now_ms, 0);
            return Ok(());
        };
        self.switch_channel(alternate.channel, alternate.pan_id)?;
        self.reattach_state = ReattachState::Active;
        self.begin_attach(AttachMode::AnyPartition, now_ms, 0);
        Ok(())
    }

    pub(in crate::node) fn switch_channel(&mut self, channel: u16, pan_id: u16) -> Result<(), MleError> {
        self.transport.set_channel(channel, pan_id)?;
        info!(channel, pan_id = format_args!("{:#06x}", pan_id), "Switched channel");
        self.channel = channel;
        self.pan_id = pan_id;
        Ok(())
    }
}

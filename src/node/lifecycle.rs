//! Engine lifecycle: start, stop, detach, and the timer poll loop.

use tracing::{debug, info, warn};

use super::{AttachMode, AttachState, DeviceRole, Mle, MleError, MleEvent, STATE_UPDATE_PERIOD_MS};
use crate::address::{INVALID_RLOC16, router_id_from_rloc16};
use crate::neighbor::{Neighbor, NeighborState};
use crate::settings::SettingsError;
use crate::timer::TimerKind;

impl Mle {
    /// Enable MLE. A saved role is resumed when the settings store holds
    /// one for this device, otherwise an attach cycle begins.
    pub fn start(&mut self, now_ms: u64) -> Result<(), MleError> {
        if self.role != DeviceRole::Disabled {
            return Err(MleError::Already);
        }
        info!(ext_address = %self.ext_address, "Starting MLE");
        self.set_role(DeviceRole::Detached)?;
        self.timers
            .start(TimerKind::StateUpdate, now_ms, STATE_UPDATE_PERIOD_MS);

        match self.settings.restore() {
            Ok(record) => {
                if let Some(configured) = self.config.mle.ext_address
                    && configured != record.ext_address
                {
                    warn!(
                        saved = %record.ext_address,
                        configured = %configured,
                        "Saved settings belong to another extended address, ignoring"
                    );
                    return self.become_child(AttachMode::AnyPartition, now_ms);
                }
                self.restore_from(record, now_ms)
            }
            Err(SettingsError::NotFound) => self.become_child(AttachMode::AnyPartition, now_ms),
            Err(e) => {
                warn!(error = %e, "Failed to restore settings");
                self.become_child(AttachMode::AnyPartition, now_ms)
            }
        }
    }

    /// Disable MLE. Frame counters are persisted first so a later start
    /// never reuses one.
    pub fn stop(&mut self) {
        if self.role == DeviceRole::Disabled {
            return;
        }
        self.store_settings();
        self.clear_role_state();
        self.timers.stop_all();
        self.rloc16 = INVALID_RLOC16;
        if let Err(e) = self.set_role(DeviceRole::Disabled) {
            warn!(error = %e, "Failed to disable MLE");
        }
        info!("MLE stopped");
    }

    /// Drop every relationship and restart attaching in any partition.
    ///
    /// Synchronous and idempotent: a second call while already detached
    /// and attaching changes nothing.
    pub fn become_detached(&mut self, now_ms: u64) -> Result<(), MleError> {
        if self.role == DeviceRole::Disabled {
            return Err(MleError::InvalidState);
        }
        if self.role == DeviceRole::Detached && !self.attach_state.is_idle() {
            return Ok(());
        }
        self.enter_detached()?;
        self.become_child(AttachMode::AnyPartition, now_ms)
    }

    /// Leave the current role without starting a new attach cycle.
    pub(in crate::node) fn enter_detached(&mut self) -> Result<(), MleError> {
        info!(role = %self.role, "Detaching");
        self.clear_role_state();
        self.rloc16 = INVALID_RLOC16;
        self.set_role(DeviceRole::Detached)
    }

    /// Cancel all in-flight work and forget every neighbor.
    fn clear_role_state(&mut self) {
        for kind in [
            TimerKind::Attach,
            TimerKind::ChildUpdate,
            TimerKind::Advertise,
            TimerKind::DelayedResponse,
            TimerKind::LinkRequest,
            TimerKind::AddressSolicit,
        ] {
            self.timers.stop(kind);
        }
        self.delayed.clear();
        self.trickle.stop();
        self.attach_state = AttachState::Idle;
        self.parent_request_challenge = None;
        self.parent_candidate = None;
        self.pending_solicit = None;
        self.role_transition = None;
        self.upgrade_hold = None;
        self.link_request = None;
        self.leader_unreachable_since_ms = None;
        self.child_update = Default::default();

        if self.role.is_router_or_leader() {
            self.previous_router_id = Some(router_id_from_rloc16(self.rloc16));
        }
        if let Some(parent) = self.parent.take() {
            debug!(parent = %parent.ext_address(), "Parent dropped");
        }
        self.remove_all_children();
        self.remove_router_neighbors();
        self.router_table.clear();
    }

    /// Signal removal of every router we held a link to.
    pub(in crate::node) fn remove_router_neighbors(&mut self) {
        let removed: Vec<(crate::address::ExtAddress, u16)> = self
            .router_table
            .neighbors()
            .filter(|r| r.state() == NeighborState::Valid)
            .map(|r| (r.ext_address(), r.rloc16()))
            .collect();
        for (ext_address, rloc16) in removed {
            self.emit(MleEvent::NeighborRemoved {
                ext_address,
                rloc16,
            });
        }
    }

    // === Event loop ===

    /// Run every timer due at `now_ms`.
    pub fn poll(&mut self, now_ms: u64) {
        while let Some(kind) = self.timers.pop_due(now_ms) {
            if let Err(e) = self.handle_timer(kind, now_ms) {
                debug!(timer = %kind, error = %e, "Timer handler failed");
            }
        }
    }

    /// Earliest armed deadline, for the embedding's sleep.
    pub fn next_deadline(&self) -> Option<u64> {
        self.timers.next_deadline()
    }
}

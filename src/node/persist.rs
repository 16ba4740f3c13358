//! Settings persistence and role restoration after reset.

use tracing::{debug, info, warn};

use super::{AttachMode, AttachState, DeviceRole, Mle, MleError};
use crate::address::{rloc16_from_router_id, router_id_from_rloc16};
use crate::neighbor::{Neighbor, NeighborState, Router};
use crate::security::FrameCounters;
use crate::settings::{SavedRole, SettingsRecord};

impl Mle {
    /// Snapshot of what a reboot needs, while attached.
    fn current_record(&self) -> Option<SettingsRecord> {
        let role = match self.role {
            DeviceRole::Child => SavedRole::Child,
            DeviceRole::Router => SavedRole::Router,
            DeviceRole::Leader => SavedRole::Leader,
            DeviceRole::Disabled | DeviceRole::Detached => return None,
        };
        Some(SettingsRecord {
            role,
            rloc16: self.rloc16,
            ext_address: self.ext_address,
            parent: self.parent.as_ref().map(|p| p.ext_address()),
            key_sequence: self.keys.current_key_sequence(),
            mle_frame_counter: self.keys.mle_frame_counter(),
            link_frame_counter: self.keys.link_frame_counter(),
            partition_id: self.leader_data.partition_id,
            leader_router_id: self.leader_data.leader_router_id,
            timeout_secs: self.config.mle.child.timeout_secs,
            child_count: self.child_table.valid_count(),
        })
    }

    /// Write the current record with counters pushed ahead by the guard.
    /// While detached only the counters of the last record are advanced.
    pub(in crate::node) fn store_settings(&mut self) {
        let base = match (self.current_record(), &self.last_saved) {
            (Some(record), _) => record,
            (None, Some(saved)) => SettingsRecord {
                key_sequence: self.keys.current_key_sequence(),
                ..saved.clone()
            },
            (None, None) => return,
        };
        let record =
            base.with_guarded_counters(self.keys.mle_frame_counter(), self.keys.link_frame_counter());
        match self.settings.save(&record) {
            Ok(()) => {
                debug!(
                    role = ?record.role,
                    mle_frame_counter = record.mle_frame_counter,
                    "Settings saved"
                );
                self.last_saved = Some(record);
            }
            Err(e) => warn!(error = %e, "Failed to save settings"),
        }
    }

    /// Re-save once our counters reach the persisted guard.
    pub(in crate::node) fn refresh_settings(&mut self) {
        let Some(saved) = &self.last_saved else {
            return;
        };
        if saved.needs_refresh(
            self.keys.current_key_sequence(),
            self.keys.mle_frame_counter(),
            self.keys.link_frame_counter(),
        ) {
            self.store_settings();
        }
    }

    /// Resume the role held before reset.
    pub(in crate::node) fn restore_from(
        &mut self,
        record: SettingsRecord,
        now_ms: u64,
    ) -> Result<(), MleError> {
        info!(
            role = ?record.role,
            rloc16 = format_args!("{:#06x}", record.rloc16),
            partition_id = format_args!("{:#010x}", record.partition_id),
            "Restoring saved role"
        );
        self.ext_address = record.ext_address;
        self.keys.set_current_key_sequence(record.key_sequence);
        self.keys
            .restore_frame_counters(record.mle_frame_counter, record.link_frame_counter);
        self.leader_data.partition_id = record.partition_id;
        self.leader_data.leader_router_id = record.leader_router_id;
        self.leader_data.weighting = self.config.mle.router.leader_weight;
        self.last_saved = Some(record.clone());

        match record.role {
            SavedRole::Child => {
                let Some(parent_ext) = record.parent else {
                    return self.become_child(AttachMode::AnyPartition, now_ms);
                };
                let parent_id = router_id_from_rloc16(record.rloc16);
                let mut parent = Router::new(parent_id, self.config.mle.noise_floor_dbm);
                {
                    let core = parent.core_mut();
                    core.ext_address = parent_ext;
                    core.rloc16 = rloc16_from_router_id(parent_id);
                    core.state = NeighborState::Restored;
                    core.counters = FrameCounters::from_advertised(record.key_sequence, 0, 0);
                }
                self.parent = Some(parent);
                self.rloc16 = record.rloc16;
                self.set_role(DeviceRole::Child)?;
                self.attach_state = AttachState::Synchronize;
                self.start_child_update_retransmit(now_ms);
                Ok(())
            }
            SavedRole::Router | SavedRole::Leader => {
                let router_id = router_id_from_rloc16(record.rloc16);
                self.rloc16 = rloc16_from_router_id(router_id);
                self.router_table.clear();
                self.router_table.allocate(router_id, now_ms)?;
                self.router_table.set_own_router_id(Some(router_id));
                let role = if record.was_leader() {
                    DeviceRole::Leader
                } else {
                    DeviceRole::Router
                };
                self.set_role(role)?;
                self.start_advertising(now_ms);
                self.start_multicast_link_request(record.was_leader() || record.child_count > 0, now_ms);
                Ok(())
            }
        }
    }
}

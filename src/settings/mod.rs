//! Persisted Device Settings
//!
//! The record written on every role or counter change so a rebooted device
//! can restore its role without a fresh attach. Frame counters are stored
//! ahead of their live value by [`FRAME_COUNTER_GUARD`]: the live counters
//! are only persisted again once they catch up with the stored value, and a
//! restored device resumes from the stored value, so no counter is ever
//! reused across a reboot.

mod file;

use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use thiserror::Error;

use crate::address::ExtAddress;

pub use file::FileSettings;

/// Headroom added to frame counters when persisting them.
pub const FRAME_COUNTER_GUARD: u32 = 1000;

/// Errors from settings storage.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("no settings stored")]
    NotFound,

    #[error("failed to access settings file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("failed to encode settings: {0}")]
    Encode(#[from] serde_yaml::Error),
}

/// Role recorded in settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SavedRole {
    Child,
    Router,
    Leader,
}

/// Everything needed to resume a role after reboot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsRecord {
    pub role: SavedRole,
    pub rloc16: u16,
    pub ext_address: ExtAddress,
    /// Extended address of the parent while a child.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<ExtAddress>,
    pub key_sequence: u32,
    pub mle_frame_counter: u32,
    pub link_frame_counter: u32,
    pub partition_id: u32,
    pub leader_router_id: u8,
    /// Child timeout in seconds while a child.
    #[serde(default)]
    pub timeout_secs: u32,
    /// Children attached when the record was written.
    #[serde(default)]
    pub child_count: usize,
}

impl SettingsRecord {
    /// Whether the counters advanced past what this record protects.
    pub fn needs_refresh(&self, key_sequence: u32, mle_frame_counter: u32, link_frame_counter: u32) -> bool {
        key_sequence != self.key_sequence
            || mle_frame_counter >= self.mle_frame_counter
            || link_frame_counter >= self.link_frame_counter
    }

    /// Copy with counters pushed ahead by the guard.
    pub fn with_guarded_counters(mut self, mle_frame_counter: u32, link_frame_counter: u32) -> Self {
        self.mle_frame_counter = mle_frame_counter.saturating_add(FRAME_COUNTER_GUARD);
        self.link_frame_counter = link_frame_counter.saturating_add(FRAME_COUNTER_GUARD);
        self
    }

    pub fn was_leader(&self) -> bool {
        self.role == SavedRole::Leader
    }
}

/// Persistent storage for the settings record.
pub trait SettingsStore {
    fn save(&mut self, record: &SettingsRecord) -> Result<(), SettingsError>;

    fn restore(&self) -> Result<SettingsRecord, SettingsError>;

    fn clear(&mut self) -> Result<(), SettingsError>;
}

/// Volatile settings store. Clones share the same slot, so a test can keep
/// a handle and hand the other to an engine.
#[derive(Clone, Debug, Default)]
pub struct MemorySettings {
    record: Rc<RefCell<Option<SettingsRecord>>>,
    saves: Rc<RefCell<usize>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<SettingsRecord> {
        self.record.borrow().clone()
    }

    /// Number of successful saves.
    pub fn save_count(&self) -> usize {
        *self.saves.borrow()
    }
}

impl SettingsStore for MemorySettings {
    fn save(&mut self, record: &SettingsRecord) -> Result<(), SettingsError> {
        *self.record.borrow_mut() = Some(record.clone());
        *self.saves.borrow_mut() += 1;
        Ok(())
    }

    fn restore(&self) -> Result<SettingsRecord, SettingsError> {
        self.record.borrow().clone().ok_or(SettingsError::NotFound)
    }

    fn clear(&mut self) -> Result<(), SettingsError> {
        *self.record.borrow_mut() = None;
        Ok(())
    }
}

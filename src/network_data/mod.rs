//! Network Data Collaborator
//!
//! The engine only carries Network Data: it learns versions from Leader Data,
//! fetches or distributes the blob in Data Response, Child ID Response and
//! Child Update messages, and looks up 6LoWPAN contexts to expand compressed
//! Address Registration entries. Interpreting prefixes and services is the
//! provider's business.

use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

use crate::address::MeshLocalPrefix;

/// Largest Network Data blob that fits a single TLV.
pub const MAX_NETWORK_DATA_LEN: usize = 255;

/// Errors from Network Data updates.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NetworkDataError {
    #[error("network data too long: {0} bytes")]
    TooLong(usize),
}

/// Source and sink of partition Network Data.
pub trait NetworkDataProvider {
    /// Full Network Data version.
    fn version(&self) -> u8;

    /// Stable-subset Network Data version.
    fn stable_version(&self) -> u8;

    /// Encoded Network Data; only the stable subset when `stable_only`.
    fn get(&self, stable_only: bool) -> Vec<u8>;

    /// Replace Network Data with a copy learned from the leader.
    fn set(
        &mut self,
        version: u8,
        stable_version: u8,
        stable_only: bool,
        data: &[u8],
    ) -> Result<(), NetworkDataError>;

    /// Prefix bound to a 6LoWPAN context ID.
    fn context_prefix(&self, context_id: u8) -> Option<[u8; 8]>;

    /// Context ID whose prefix covers `prefix`.
    fn context_for_prefix(&self, prefix: &[u8; 8]) -> Option<u8>;

    /// Leader only: start a new partition's Network Data at random versions.
    fn reset_as_leader(&mut self, version: u8, stable_version: u8);
}

/// In-process Network Data store.
#[derive(Clone, Debug, Default)]
pub struct LocalNetworkData {
    version: u8,
    stable_version: u8,
    data: Vec<u8>,
    stable_data: Vec<u8>,
    contexts: HashMap<u8, [u8; 8]>,
}

impl LocalNetworkData {
    /// Context 0 is always the mesh-local prefix.
    pub fn new(mesh_local_prefix: MeshLocalPrefix) -> Self {
        let mut contexts = HashMap::new();
        contexts.insert(0, *mesh_local_prefix.as_bytes());
        Self {
            contexts,
            ..Self::default()
        }
    }

    pub fn add_context(&mut self, context_id: u8, prefix: [u8; 8]) {
        self.contexts.insert(context_id & 0x0f, prefix);
    }

    /// Leader only: publish new Network Data, bumping the versions.
    pub fn publish(&mut self, data: Vec<u8>, stable_data: Vec<u8>) -> Result<(), NetworkDataError> {
        if data.len() > MAX_NETWORK_DATA_LEN {
            return Err(NetworkDataError::TooLong(data.len()));
        }
        if stable_data != self.stable_data {
            self.stable_version = self.stable_version.wrapping_add(1);
        }
        self.version = self.version.wrapping_add(1);
        self.data = data;
        self.stable_data = stable_data;
        debug!(version = self.version, stable_version = self.stable_version, "Network data published");
        Ok(())
    }
}

impl NetworkDataProvider for LocalNetworkData {
    fn version(&self) -> u8 {
        self.version
    }

    fn stable_version(&self) -> u8 {
        self.stable_version
    }

    fn get(&self, stable_only: bool) -> Vec<u8> {
        if stable_only {
            self.stable_data.clone()
        } else {
            self.data.clone()
        }
    }

    fn set(
        &mut self,
        version: u8,
        stable_version: u8,
        stable_only: bool,
        data: &[u8],
    ) -> Result<(), NetworkDataError> {
        if data.len() > MAX_NETWORK_DATA_LEN {
            return Err(NetworkDataError::TooLong(data.len()));
        }
        if stable_only {
            self.stable_data = data.to_vec();
        } else {
            self.data = data.to_vec();
        }
        self.version = version;
        self.stable_version = stable_version;
        Ok(())
    }

    fn context_prefix(&self, context_id: u8) -> Option<[u8; 8]> {
        self.contexts.get(&context_id).copied()
    }

    fn context_for_prefix(&self, prefix: &[u8; 8]) -> Option<u8> {
        let mut matches: Vec<u8> = self
            .contexts
            .iter()
            .filter(|(_, p)| *p == prefix)
            .map(|(id, _)| *id)
            .collect();
        matches.sort_unstable();
        matches.first().copied()
    }

    fn reset_as_leader(&mut self, version: u8, stable_version: u8) {
        self.version = version;
        self.stable_version = stable_version;
        self.data.clear();
        self.stable_data.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mesh_local_context() {
        let prefix = MeshLocalPrefix::default();
        let nd = LocalNetworkData::new(prefix);
        assert_eq!(nd.context_prefix(0), Some(*prefix.as_bytes()));
        assert_eq!(nd.context_for_prefix(prefix.as_bytes()), Some(0));
        assert_eq!(nd.context_prefix(1), None);
    }

    #[test]
    fn test_publish_bumps_versions() {
        let mut nd = LocalNetworkData::new(MeshLocalPrefix::default());
        nd.reset_as_leader(10, 20);
        nd.publish(vec![1, 2, 3], vec![]).unwrap();
        assert_eq!(nd.version(), 11);
        assert_eq!(nd.stable_version(), 20);

        nd.publish(vec![1, 2, 3, 4], vec![9]).unwrap();
        assert_eq!(nd.version(), 12);
        assert_eq!(nd.stable_version(), 21);
        assert_eq!(nd.get(true), vec![9]);
        assert_eq!(nd.get(false), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_set_from_leader() {
        let mut nd = LocalNetworkData::new(MeshLocalPrefix::default());
        nd.set(5, 6, false, &[7, 7]).unwrap();
        assert_eq!(nd.version(), 5);
        assert_eq!(nd.stable_version(), 6);
        assert_eq!(nd.get(false), vec![7, 7]);

        assert_eq!(
            nd.set(1, 1, false, &[0; 256]),
            Err(NetworkDataError::TooLong(256))
        );
    }
}

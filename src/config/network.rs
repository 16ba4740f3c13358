//! Network and security parameters (`network.*`, `security.*`).

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::address::MeshLocalPrefix;

/// Network credentials and radio parameters (`network.*`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Mesh-local /64 prefix (`network.mesh_local_prefix`).
    #[serde(default)]
    pub mesh_local_prefix: MeshLocalPrefix,
    /// Human readable network name (`network.name`).
    #[serde(default = "NetworkConfig::default_name")]
    pub name: String,
    /// Extended PAN ID as 16 hex chars (`network.ext_pan_id`).
    #[serde(default = "NetworkConfig::default_ext_pan_id")]
    pub ext_pan_id: String,
    /// IEEE 802.15.4 channel (`network.channel`).
    #[serde(default = "NetworkConfig::default_channel")]
    pub channel: u16,
    /// PAN ID (`network.pan_id`).
    #[serde(default = "NetworkConfig::default_pan_id")]
    pub pan_id: u16,
    /// Active Operational Dataset timestamp, compared against Announce
    /// messages (`network.active_timestamp`).
    #[serde(default)]
    pub active_timestamp: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            mesh_local_prefix: MeshLocalPrefix::default(),
            name: Self::default_name(),
            ext_pan_id: Self::default_ext_pan_id(),
            channel: 11,
            pan_id: 0xface,
            active_timestamp: 0,
        }
    }
}

impl NetworkConfig {
    fn default_name() -> String { "thread-mle".to_string() }
    fn default_ext_pan_id() -> String { "dead00beef00cafe".to_string() }
    fn default_channel() -> u16 { 11 }
    fn default_pan_id() -> u16 { 0xface }

    /// Decode the configured extended PAN ID.
    pub fn ext_pan_id_bytes(&self) -> Result<[u8; 8], ConfigError> {
        decode_fixed_hex(&self.ext_pan_id, "network.ext_pan_id")
    }
}

/// Key material (`security.*`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// 128-bit network key as 32 hex chars (`security.network_key`).
    #[serde(default = "SecurityConfig::default_network_key")]
    pub network_key: String,
    /// Key sequence to start from (`security.key_sequence`).
    #[serde(default)]
    pub key_sequence: u32,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            network_key: Self::default_network_key(),
            key_sequence: 0,
        }
    }
}

impl SecurityConfig {
    fn default_network_key() -> String { "00112233445566778899aabbccddeeff".to_string() }

    /// Decode the configured network key.
    pub fn network_key_bytes(&self) -> Result<[u8; 16], ConfigError> {
        decode_fixed_hex(&self.network_key, "security.network_key")
    }
}

fn decode_fixed_hex<const N: usize>(s: &str, field: &'static str) -> Result<[u8; N], ConfigError> {
    let bytes = hex::decode(s).map_err(|e| ConfigError::InvalidValue {
        field,
        reason: e.to_string(),
    })?;
    bytes
        .try_into()
        .map_err(|b: Vec<u8>| ConfigError::InvalidValue {
            field,
            reason: format!("expected {} bytes, got {}", N, b.len()),
        })
}

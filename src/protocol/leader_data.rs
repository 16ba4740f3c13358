//! Leader Data TLV value.

use super::error::ProtocolError;

/// Partition identity as advertised by the Leader.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LeaderData {
    pub partition_id: u32,
    pub weighting: u8,
    pub data_version: u8,
    pub stable_data_version: u8,
    pub leader_router_id: u8,
}

impl LeaderData {
    pub const SIZE: usize = 8;

    pub fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.partition_id.to_be_bytes());
        buf.push(self.weighting);
        buf.push(self.data_version);
        buf.push(self.stable_data_version);
        buf.push(self.leader_router_id);
    }

    pub fn decode(value: &[u8]) -> Result<Self, ProtocolError> {
        let bytes: [u8; Self::SIZE] = value
            .try_into()
            .map_err(|_| ProtocolError::Malformed(format!("leader data length {}", value.len())))?;
        Ok(Self {
            partition_id: u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            weighting: bytes[4],
            data_version: bytes[5],
            stable_data_version: bytes[6],
            leader_router_id: bytes[7],
        })
    }
}

//! Connectivity TLV value, advertised by a prospective parent.

use super::error::ProtocolError;

/// Buffering capacity a parent offers to sleepy children.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SedCapacity {
    pub buffer_size: u16,
    pub datagram_count: u8,
}

/// How well connected a prospective parent is.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Connectivity {
    /// Signed 2-bit priority: 1 high, 0 medium, -1 low. The reserved
    /// encoding `0b10` decodes as medium.
    pub parent_priority: i8,
    pub link_quality_3: u8,
    pub link_quality_2: u8,
    pub link_quality_1: u8,
    pub leader_cost: u8,
    pub id_sequence: u8,
    pub active_routers: u8,
    pub sed_capacity: Option<SedCapacity>,
}

impl Connectivity {
    pub const BASE_SIZE: usize = 7;
    pub const FULL_SIZE: usize = 10;

    pub const PRIORITY_HIGH: i8 = 1;
    pub const PRIORITY_MEDIUM: i8 = 0;
    pub const PRIORITY_LOW: i8 = -1;

    /// Decode the 2-bit priority field.
    fn priority_from_bits(bits: u8) -> i8 {
        match bits & 0x03 {
            0b01 => Self::PRIORITY_HIGH,
            0b11 => Self::PRIORITY_LOW,
            _ => Self::PRIORITY_MEDIUM,
        }
    }

    pub fn encoded_len(&self) -> usize {
        if self.sed_capacity.is_some() {
            Self::FULL_SIZE
        } else {
            Self::BASE_SIZE
        }
    }

    pub fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(((self.parent_priority as u8) & 0x03) << 6);
        buf.push(self.link_quality_3);
        buf.push(self.link_quality_2);
        buf.push(self.link_quality_1);
        buf.push(self.leader_cost);
        buf.push(self.id_sequence);
        buf.push(self.active_routers);
        if let Some(sed) = self.sed_capacity {
            buf.extend_from_slice(&sed.buffer_size.to_be_bytes());
            buf.push(sed.datagram_count);
        }
    }

    pub fn decode(value: &[u8]) -> Result<Self, ProtocolError> {
        if value.len() != Self::BASE_SIZE && value.len() != Self::FULL_SIZE {
            return Err(ProtocolError::Malformed(format!(
                "connectivity length {}",
                value.len()
            )));
        }
        let sed_capacity = (value.len() == Self::FULL_SIZE).then(|| SedCapacity {
            buffer_size: u16::from_be_bytes([value[7], value[8]]),
            datagram_count: value[9],
        });
        Ok(Self {
            parent_priority: Self::priority_from_bits(value[0] >> 6),
            link_quality_3: value[1],
            link_quality_2: value[2],
            link_quality_1: value[3],
            leader_cost: value[4],
            id_sequence: value[5],
            active_routers: value[6],
            sed_capacity,
        })
    }
}

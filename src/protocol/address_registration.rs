//! Address Registration TLV entries.

use super::error::ProtocolError;
use std::net::Ipv6Addr;

const CONTROL_COMPRESSED: u8 = 0x80;
const CONTEXT_ID_MASK: u8 = 0x0f;

/// One registered address, either context-compressed or in full.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddressEntry {
    /// Prefix elided; recovered from the 6LoWPAN context with this ID.
    Compressed { context_id: u8, iid: [u8; 8] },
    Uncompressed(Ipv6Addr),
}

impl AddressEntry {
    pub fn encoded_len(&self) -> usize {
        match self {
            AddressEntry::Compressed { .. } => 1 + 8,
            AddressEntry::Uncompressed(_) => 1 + 16,
        }
    }

    pub fn encode(&self, buf: &mut Vec<u8>) {
        match self {
            AddressEntry::Compressed { context_id, iid } => {
                buf.push(CONTROL_COMPRESSED | (context_id & CONTEXT_ID_MASK));
                buf.extend_from_slice(iid);
            }
            AddressEntry::Uncompressed(addr) => {
                buf.push(0);
                buf.extend_from_slice(&addr.octets());
            }
        }
    }

    /// Decode every entry in a TLV value.
    pub fn decode_all(value: &[u8]) -> Result<Vec<Self>, ProtocolError> {
        let mut entries = Vec::new();
        let mut pos = 0;
        while pos < value.len() {
            let control = value[pos];
            pos += 1;
            if control & CONTROL_COMPRESSED != 0 {
                let iid: [u8; 8] = value
                    .get(pos..pos + 8)
                    .and_then(|s| s.try_into().ok())
                    .ok_or_else(|| ProtocolError::Malformed("truncated compressed entry".into()))?;
                pos += 8;
                entries.push(AddressEntry::Compressed {
                    context_id: control & CONTEXT_ID_MASK,
                    iid,
                });
            } else {
                let raw: [u8; 16] = value
                    .get(pos..pos + 16)
                    .and_then(|s| s.try_into().ok())
                    .ok_or_else(|| ProtocolError::Malformed("truncated address entry".into()))?;
                pos += 16;
                entries.push(AddressEntry::Uncompressed(Ipv6Addr::from(raw)));
            }
        }
        Ok(entries)
    }
}

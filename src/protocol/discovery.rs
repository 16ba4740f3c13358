//! Discovery TLV payloads.
//!
//! The Discovery TLV nests its own small TLV space:
//!
//! ```text
//! 0 Discovery Request   [version:4][joiner:1][reserved:3][reserved:8]
//! 1 Discovery Response  [version:4][native:1][reserved:3][reserved:8]
//! 2 Extended PAN ID     8 bytes
//! 3 Network Name        1..=16 bytes UTF-8
//! ```

use super::error::ProtocolError;

const SUB_REQUEST: u8 = 0;
const SUB_RESPONSE: u8 = 1;
const SUB_EXT_PAN_ID: u8 = 2;
const SUB_NETWORK_NAME: u8 = 3;

/// Longest network name carried on the wire.
pub const MAX_NETWORK_NAME_LEN: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DiscoveryRequest {
    pub version: u8,
    pub joiner: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiscoveryResponse {
    pub version: u8,
    pub native_commissioner: bool,
    pub ext_pan_id: [u8; 8],
    pub network_name: String,
}

fn flags_byte(version: u8, flag: bool) -> u8 {
    ((version & 0x0f) << 4) | if flag { 0x08 } else { 0 }
}

fn sub_tlvs(mut bytes: &[u8]) -> Result<Vec<(u8, &[u8])>, ProtocolError> {
    let mut out = Vec::new();
    while !bytes.is_empty() {
        if bytes.len() < 2 {
            return Err(ProtocolError::MessageTooShort {
                expected: 2,
                got: bytes.len(),
            });
        }
        let (kind, len) = (bytes[0], bytes[1] as usize);
        let rest = &bytes[2..];
        if rest.len() < len {
            return Err(ProtocolError::TruncatedTlv {
                tlv_type: kind,
                len,
                remaining: rest.len(),
            });
        }
        out.push((kind, &rest[..len]));
        bytes = &rest[len..];
    }
    Ok(out)
}

impl DiscoveryRequest {
    pub fn encode(&self) -> Vec<u8> {
        vec![SUB_REQUEST, 2, flags_byte(self.version, self.joiner), 0]
    }

    pub fn decode(value: &[u8]) -> Result<Self, ProtocolError> {
        sub_tlvs(value)?
            .into_iter()
            .find(|(kind, _)| *kind == SUB_REQUEST)
            .and_then(|(_, v)| v.first().copied())
            .map(|b| Self {
                version: b >> 4,
                joiner: b & 0x08 != 0,
            })
            .ok_or_else(|| ProtocolError::Malformed("missing discovery request".into()))
    }
}

impl DiscoveryResponse {
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let name = self.network_name.as_bytes();
        if name.len() > MAX_NETWORK_NAME_LEN {
            return Err(ProtocolError::Malformed(format!(
                "network name longer than {MAX_NETWORK_NAME_LEN} bytes"
            )));
        }
        let mut buf = vec![SUB_RESPONSE, 2, flags_byte(self.version, self.native_commissioner), 0];
        buf.extend_from_slice(&[SUB_EXT_PAN_ID, 8]);
        buf.extend_from_slice(&self.ext_pan_id);
        buf.extend_from_slice(&[SUB_NETWORK_NAME, name.len() as u8]);
        buf.extend_from_slice(name);
        Ok(buf)
    }

    pub fn decode(value: &[u8]) -> Result<Self, ProtocolError> {
        let mut flags = None;
        let mut ext_pan_id = None;
        let mut network_name = String::new();
        for (kind, v) in sub_tlvs(value)? {
            match kind {
                SUB_RESPONSE => flags = v.first().copied(),
                SUB_EXT_PAN_ID => {
                    ext_pan_id = Some(v.try_into().map_err(|_| {
                        ProtocolError::Malformed(format!("ext pan id length {}", v.len()))
                    })?)
                }
                SUB_NETWORK_NAME => {
                    network_name = String::from_utf8(v.to_vec())
                        .map_err(|_| ProtocolError::Malformed("network name not utf-8".into()))?
                }
                _ => {}
            }
        }
        let flags = flags.ok_or_else(|| ProtocolError::Malformed("missing discovery response".into()))?;
        Ok(Self {
            version: flags >> 4,
            native_commissioner: flags & 0x08 != 0,
            ext_pan_id: ext_pan_id
                .ok_or_else(|| ProtocolError::Malformed("missing ext pan id".into()))?,
            network_name,
        })
    }
}

//! Thread management messages exchanged with the Leader: Address Solicit
//! and Address Release.
//!
//! ```text
//! [kind:1][transaction:2 BE][tlvs...]
//! ```
//!
//! TLVs use the network-layer type space (`ExtMacAddress`, `Rloc16`,
//! `Status`, `RouterMask`), not the MLE one.

use super::error::ProtocolError;
use super::route::RouterIdSet;
use crate::address::ExtAddress;

const TLV_EXT_MAC_ADDRESS: u8 = 1;
const TLV_RLOC16: u8 = 2;
const TLV_STATUS: u8 = 4;
const TLV_ROUTER_MASK: u8 = 7;

const HEADER_SIZE: usize = 3;

/// Why a device asks the Leader for a router ID.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum SolicitReason {
    TooFewRouters = 2,
    HaveChildIdRequest = 3,
    ParentPartitionChange = 4,
    BorderRouterRequest = 5,
}

impl SolicitReason {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            2 => Some(SolicitReason::TooFewRouters),
            3 => Some(SolicitReason::HaveChildIdRequest),
            4 => Some(SolicitReason::ParentPartitionChange),
            5 => Some(SolicitReason::BorderRouterRequest),
            _ => None,
        }
    }
}

/// Leader's answer to an Address Solicit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum SolicitStatus {
    Success = 0,
    NoAddressAvailable = 1,
}

impl SolicitStatus {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(SolicitStatus::Success),
            1 => Some(SolicitStatus::NoAddressAvailable),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddressSolicitRequest {
    pub ext_address: ExtAddress,
    /// Previously held RLOC16, if the device wants its old router ID back.
    pub rloc16: Option<u16>,
    pub reason: SolicitReason,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddressSolicitResponse {
    pub status: SolicitStatus,
    pub rloc16: Option<u16>,
    /// Router-ID Sequence and Mask at the time of allocation.
    pub router_mask: Option<(u8, RouterIdSet)>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddressReleaseRequest {
    pub ext_address: ExtAddress,
    pub rloc16: u16,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TmfMessage {
    SolicitRequest(AddressSolicitRequest),
    SolicitResponse(AddressSolicitResponse),
    ReleaseRequest(AddressReleaseRequest),
    ReleaseResponse,
}

impl TmfMessage {
    fn kind(&self) -> u8 {
        match self {
            TmfMessage::SolicitRequest(_) => 1,
            TmfMessage::SolicitResponse(_) => 2,
            TmfMessage::ReleaseRequest(_) => 3,
            TmfMessage::ReleaseResponse => 4,
        }
    }
}

/// A TMF message tagged with its transaction ID.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TmfFrame {
    pub transaction: u16,
    pub message: TmfMessage,
}

fn push_tlv(buf: &mut Vec<u8>, tlv_type: u8, value: &[u8]) {
    buf.push(tlv_type);
    buf.push(value.len() as u8);
    buf.extend_from_slice(value);
}

impl TmfFrame {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(32);
        buf.push(self.message.kind());
        buf.extend_from_slice(&self.transaction.to_be_bytes());
        match &self.message {
            TmfMessage::SolicitRequest(req) => {
                push_tlv(&mut buf, TLV_EXT_MAC_ADDRESS, req.ext_address.as_bytes());
                if let Some(rloc16) = req.rloc16 {
                    push_tlv(&mut buf, TLV_RLOC16, &rloc16.to_be_bytes());
                }
                push_tlv(&mut buf, TLV_STATUS, &[req.reason as u8]);
            }
            TmfMessage::SolicitResponse(resp) => {
                push_tlv(&mut buf, TLV_STATUS, &[resp.status as u8]);
                if let Some(rloc16) = resp.rloc16 {
                    push_tlv(&mut buf, TLV_RLOC16, &rloc16.to_be_bytes());
                }
                if let Some((seq, mask)) = resp.router_mask {
                    let mut value = Vec::with_capacity(9);
                    value.push(seq);
                    value.extend_from_slice(mask.as_bytes());
                    push_tlv(&mut buf, TLV_ROUTER_MASK, &value);
                }
            }
            TmfMessage::ReleaseRequest(req) => {
                push_tlv(&mut buf, TLV_RLOC16, &req.rloc16.to_be_bytes());
                push_tlv(&mut buf, TLV_EXT_MAC_ADDRESS, req.ext_address.as_bytes());
            }
            TmfMessage::ReleaseResponse => {}
        }
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < HEADER_SIZE {
            return Err(ProtocolError::MessageTooShort {
                expected: HEADER_SIZE,
                got: bytes.len(),
            });
        }
        let kind = bytes[0];
        let transaction = u16::from_be_bytes([bytes[1], bytes[2]]);
        let tlvs = TmfTlvs::parse(&bytes[HEADER_SIZE..])?;

        let message = match kind {
            1 => {
                let reason = tlvs.status()?;
                TmfMessage::SolicitRequest(AddressSolicitRequest {
                    ext_address: tlvs.ext_address()?,
                    rloc16: tlvs.rloc16()?,
                    reason: SolicitReason::from_byte(reason).ok_or_else(|| {
                        ProtocolError::Malformed(format!("solicit reason {reason}"))
                    })?,
                })
            }
            2 => {
                let status = tlvs.status()?;
                TmfMessage::SolicitResponse(AddressSolicitResponse {
                    status: SolicitStatus::from_byte(status).ok_or_else(|| {
                        ProtocolError::Malformed(format!("solicit status {status}"))
                    })?,
                    rloc16: tlvs.rloc16()?,
                    router_mask: tlvs.router_mask()?,
                })
            }
            3 => TmfMessage::ReleaseRequest(AddressReleaseRequest {
                ext_address: tlvs.ext_address()?,
                rloc16: tlvs
                    .rloc16()?
                    .ok_or_else(|| ProtocolError::Malformed("release without rloc16".into()))?,
            }),
            4 => TmfMessage::ReleaseResponse,
            other => return Err(ProtocolError::InvalidTmfKind(other)),
        };
        Ok(Self {
            transaction,
            message,
        })
    }
}

/// Raw `(type, value)` pairs of a TMF body.
struct TmfTlvs<'a>(Vec<(u8, &'a [u8])>);

impl<'a> TmfTlvs<'a> {
    fn parse(mut bytes: &'a [u8]) -> Result<Self, ProtocolError> {
        let mut tlvs = Vec::new();
        while !bytes.is_empty() {
            if bytes.len() < 2 {
                return Err(ProtocolError::MessageTooShort {
                    expected: 2,
                    got: bytes.len(),
                });
            }
            let len = bytes[1] as usize;
            if bytes.len() < 2 + len {
                return Err(ProtocolError::TruncatedTlv {
                    tlv_type: bytes[0],
                    len,
                    remaining: bytes.len() - 2,
                });
            }
            tlvs.push((bytes[0], &bytes[2..2 + len]));
            bytes = &bytes[2 + len..];
        }
        Ok(Self(tlvs))
    }

    fn find(&self, tlv_type: u8) -> Option<&'a [u8]> {
        self.0.iter().find(|(t, _)| *t == tlv_type).map(|(_, v)| *v)
    }

    fn ext_address(&self) -> Result<ExtAddress, ProtocolError> {
        let value = self
            .find(TLV_EXT_MAC_ADDRESS)
            .ok_or_else(|| ProtocolError::Malformed("missing ext address".into()))?;
        ExtAddress::from_slice(value).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }

    fn rloc16(&self) -> Result<Option<u16>, ProtocolError> {
        self.find(TLV_RLOC16)
            .map(|v| {
                <[u8; 2]>::try_from(v)
                    .map(u16::from_be_bytes)
                    .map_err(|_| ProtocolError::Malformed("rloc16 length".into()))
            })
            .transpose()
    }

    fn status(&self) -> Result<u8, ProtocolError> {
        match self.find(TLV_STATUS) {
            Some([b]) => Ok(*b),
            Some(_) => Err(ProtocolError::Malformed("status length".into())),
            None => Err(ProtocolError::Malformed("missing status".into())),
        }
    }

    fn router_mask(&self) -> Result<Option<(u8, RouterIdSet)>, ProtocolError> {
        self.find(TLV_ROUTER_MASK)
            .map(|v| {
                if v.len() != 1 + RouterIdSet::SIZE {
                    return Err(ProtocolError::Malformed("router mask length".into()));
                }
                let mut mask = [0u8; 8];
                mask.copy_from_slice(&v[1..]);
                Ok((v[0], RouterIdSet::from_bytes(mask)))
            })
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ext() -> ExtAddress {
        ExtAddress::from_bytes([1, 2, 3, 4, 5, 6, 7, 8])
    }

    #[test]
    fn test_solicit_request_round_trip() {
        let frame = TmfFrame {
            transaction: 0x1234,
            message: TmfMessage::SolicitRequest(AddressSolicitRequest {
                ext_address: ext(),
                rloc16: Some(0x1400),
                reason: SolicitReason::HaveChildIdRequest,
            }),
        };
        assert_eq!(TmfFrame::decode(&frame.encode()).unwrap(), frame);
    }

    #[test]
    fn test_solicit_response_round_trip() {
        let frame = TmfFrame {
            transaction: 7,
            message: TmfMessage::SolicitResponse(AddressSolicitResponse {
                status: SolicitStatus::Success,
                rloc16: Some(0x0800),
                router_mask: Some((9, [0u8, 2].into_iter().collect())),
            }),
        };
        assert_eq!(TmfFrame::decode(&frame.encode()).unwrap(), frame);

        let reject = TmfFrame {
            transaction: 8,
            message: TmfMessage::SolicitResponse(AddressSolicitResponse {
                status: SolicitStatus::NoAddressAvailable,
                rloc16: None,
                router_mask: None,
            }),
        };
        assert_eq!(TmfFrame::decode(&reject.encode()).unwrap(), reject);
    }

    #[test]
    fn test_release_round_trip() {
        let frame = TmfFrame {
            transaction: 1,
            message: TmfMessage::ReleaseRequest(AddressReleaseRequest {
                ext_address: ext(),
                rloc16: 0x2000,
            }),
        };
        assert_eq!(TmfFrame::decode(&frame.encode()).unwrap(), frame);
        let ack = TmfFrame {
            transaction: 1,
            message: TmfMessage::ReleaseResponse,
        };
        assert_eq!(TmfFrame::decode(&ack.encode()).unwrap(), ack);
    }

    #[test]
    fn test_unknown_kind_rejected() {
        assert!(matches!(
            TmfFrame::decode(&[9, 0, 0]),
            Err(ProtocolError::InvalidTmfKind(9))
        ));
    }
}

//! MLE Type-Length-Value records.
//!
//! Every MLE command body is a flat sequence of TLVs:
//!
//! ```text
//! [type:1][length:1][value:length]
//! ```
//!
//! Fixed-size TLVs must carry exactly their defined length. Variable TLVs
//! (network data, datasets, request lists, discovery) carry 0..=255 bytes.
//! Types this engine does not interpret are preserved as [`Tlv::Unknown`].

use super::address_registration::AddressEntry;
use super::connectivity::Connectivity;
use super::error::ProtocolError;
use super::leader_data::LeaderData;
use super::mode::{DeviceMode, ScanMask};
use super::route::RouteTlv;
use std::fmt;

/// Largest value a one-byte length field can describe.
pub const MAX_TLV_VALUE_LEN: usize = 255;

/// Challenge and Response TLVs carry 4..=8 random bytes.
pub const MIN_CHALLENGE_SIZE: usize = 4;
pub const MAX_CHALLENGE_SIZE: usize = 8;

/// Status TLV value meaning "error".
pub const STATUS_ERROR: u8 = 1;

/// MLE TLV type codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TlvType {
    SourceAddress = 0,
    Mode = 1,
    Timeout = 2,
    Challenge = 3,
    Response = 4,
    LinkFrameCounter = 5,
    LinkQuality = 6,
    NetworkParameter = 7,
    MleFrameCounter = 8,
    Route = 9,
    Address16 = 10,
    LeaderData = 11,
    NetworkData = 12,
    TlvRequest = 13,
    ScanMask = 14,
    Connectivity = 15,
    LinkMargin = 16,
    Status = 17,
    Version = 18,
    AddressRegistration = 19,
    Channel = 20,
    PanId = 21,
    ActiveTimestamp = 22,
    PendingTimestamp = 23,
    ActiveDataset = 24,
    PendingDataset = 25,
    Discovery = 26,
}

impl TlvType {
    pub fn from_byte(b: u8) -> Option<Self> {
        let t = match b {
            0 => TlvType::SourceAddress,
            1 => TlvType::Mode,
            2 => TlvType::Timeout,
            3 => TlvType::Challenge,
            4 => TlvType::Response,
            5 => TlvType::LinkFrameCounter,
            6 => TlvType::LinkQuality,
            7 => TlvType::NetworkParameter,
            8 => TlvType::MleFrameCounter,
            9 => TlvType::Route,
            10 => TlvType::Address16,
            11 => TlvType::LeaderData,
            12 => TlvType::NetworkData,
            13 => TlvType::TlvRequest,
            14 => TlvType::ScanMask,
            15 => TlvType::Connectivity,
            16 => TlvType::LinkMargin,
            17 => TlvType::Status,
            18 => TlvType::Version,
            19 => TlvType::AddressRegistration,
            20 => TlvType::Channel,
            21 => TlvType::PanId,
            22 => TlvType::ActiveTimestamp,
            23 => TlvType::PendingTimestamp,
            24 => TlvType::ActiveDataset,
            25 => TlvType::PendingDataset,
            26 => TlvType::Discovery,
            _ => return None,
        };
        Some(t)
    }

    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for TlvType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// A decoded MLE TLV.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Tlv {
    SourceAddress(u16),
    Mode(DeviceMode),
    /// Child timeout in seconds.
    Timeout(u32),
    Challenge(Vec<u8>),
    Response(Vec<u8>),
    LinkFrameCounter(u32),
    MleFrameCounter(u32),
    Route(RouteTlv),
    Address16(u16),
    LeaderData(LeaderData),
    NetworkData(Vec<u8>),
    /// List of TLV type bytes the sender wants in the reply.
    TlvRequest(Vec<u8>),
    ScanMask(ScanMask),
    Connectivity(Connectivity),
    LinkMargin(u8),
    Status(u8),
    Version(u16),
    AddressRegistration(Vec<AddressEntry>),
    Channel { page: u8, channel: u16 },
    PanId(u16),
    ActiveTimestamp(u64),
    PendingTimestamp(u64),
    ActiveDataset(Vec<u8>),
    PendingDataset(Vec<u8>),
    Discovery(Vec<u8>),
    /// Any type not interpreted above, kept verbatim.
    Unknown { tlv_type: u8, value: Vec<u8> },
}

impl Tlv {
    /// Raw type byte of this TLV.
    pub fn type_byte(&self) -> u8 {
        match self {
            Tlv::SourceAddress(_) => TlvType::SourceAddress.to_byte(),
            Tlv::Mode(_) => TlvType::Mode.to_byte(),
            Tlv::Timeout(_) => TlvType::Timeout.to_byte(),
            Tlv::Challenge(_) => TlvType::Challenge.to_byte(),
            Tlv::Response(_) => TlvType::Response.to_byte(),
            Tlv::LinkFrameCounter(_) => TlvType::LinkFrameCounter.to_byte(),
            Tlv::MleFrameCounter(_) => TlvType::MleFrameCounter.to_byte(),
            Tlv::Route(_) => TlvType::Route.to_byte(),
            Tlv::Address16(_) => TlvType::Address16.to_byte(),
            Tlv::LeaderData(_) => TlvType::LeaderData.to_byte(),
            Tlv::NetworkData(_) => TlvType::NetworkData.to_byte(),
            Tlv::TlvRequest(_) => TlvType::TlvRequest.to_byte(),
            Tlv::ScanMask(_) => TlvType::ScanMask.to_byte(),
            Tlv::Connectivity(_) => TlvType::Connectivity.to_byte(),
            Tlv::LinkMargin(_) => TlvType::LinkMargin.to_byte(),
            Tlv::Status(_) => TlvType::Status.to_byte(),
            Tlv::Version(_) => TlvType::Version.to_byte(),
            Tlv::AddressRegistration(_) => TlvType::AddressRegistration.to_byte(),
            Tlv::Channel { .. } => TlvType::Channel.to_byte(),
            Tlv::PanId(_) => TlvType::PanId.to_byte(),
            Tlv::ActiveTimestamp(_) => TlvType::ActiveTimestamp.to_byte(),
            Tlv::PendingTimestamp(_) => TlvType::PendingTimestamp.to_byte(),
            Tlv::ActiveDataset(_) => TlvType::ActiveDataset.to_byte(),
            Tlv::PendingDataset(_) => TlvType::PendingDataset.to_byte(),
            Tlv::Discovery(_) => TlvType::Discovery.to_byte(),
            Tlv::Unknown { tlv_type, .. } => *tlv_type,
        }
    }

    /// Append `[type][len][value]` to `buf`.
    pub fn encode(&self, buf: &mut Vec<u8>) -> Result<(), ProtocolError> {
        let mut value = Vec::new();
        match self {
            Tlv::SourceAddress(v) | Tlv::Address16(v) | Tlv::PanId(v) | Tlv::Version(v) => {
                value.extend_from_slice(&v.to_be_bytes())
            }
            Tlv::Mode(m) => value.push(m.to_byte()),
            Tlv::Timeout(v) | Tlv::LinkFrameCounter(v) | Tlv::MleFrameCounter(v) => {
                value.extend_from_slice(&v.to_be_bytes())
            }
            Tlv::Challenge(bytes) | Tlv::Response(bytes) => {
                check_challenge_len(self, bytes.len())?;
                value.extend_from_slice(bytes);
            }
            Tlv::Route(route) => route.encode(&mut value),
            Tlv::LeaderData(ld) => ld.encode(&mut value),
            Tlv::NetworkData(bytes)
            | Tlv::TlvRequest(bytes)
            | Tlv::ActiveDataset(bytes)
            | Tlv::PendingDataset(bytes)
            | Tlv::Discovery(bytes)
            | Tlv::Unknown { value: bytes, .. } => value.extend_from_slice(bytes),
            Tlv::ScanMask(m) => value.push(m.to_byte()),
            Tlv::Connectivity(c) => c.encode(&mut value),
            Tlv::LinkMargin(v) | Tlv::Status(v) => value.push(*v),
            Tlv::AddressRegistration(entries) => {
                for entry in entries {
                    entry.encode(&mut value);
                }
            }
            Tlv::Channel { page, channel } => {
                value.push(*page);
                value.extend_from_slice(&channel.to_be_bytes());
            }
            Tlv::ActiveTimestamp(v) | Tlv::PendingTimestamp(v) => {
                value.extend_from_slice(&v.to_be_bytes())
            }
        }

        if value.len() > MAX_TLV_VALUE_LEN {
            return Err(ProtocolError::TlvTooLong(value.len()));
        }
        buf.push(self.type_byte());
        buf.push(value.len() as u8);
        buf.extend_from_slice(&value);
        Ok(())
    }

    /// Decode a single TLV value of the given type.
    pub fn decode_value(tlv_type: u8, value: &[u8]) -> Result<Self, ProtocolError> {
        let Some(known) = TlvType::from_byte(tlv_type) else {
            return Ok(Tlv::Unknown {
                tlv_type,
                value: value.to_vec(),
            });
        };

        let tlv = match known {
            TlvType::SourceAddress => Tlv::SourceAddress(be_u16(known, value)?),
            TlvType::Mode => Tlv::Mode(DeviceMode::from_byte(single(known, value)?)),
            TlvType::Timeout => Tlv::Timeout(be_u32(known, value)?),
            TlvType::Challenge | TlvType::Response => {
                if !(MIN_CHALLENGE_SIZE..=MAX_CHALLENGE_SIZE).contains(&value.len()) {
                    return Err(ProtocolError::InvalidTlvLength {
                        tlv: known,
                        len: value.len(),
                    });
                }
                if known == TlvType::Challenge {
                    Tlv::Challenge(value.to_vec())
                } else {
                    Tlv::Response(value.to_vec())
                }
            }
            TlvType::LinkFrameCounter => Tlv::LinkFrameCounter(be_u32(known, value)?),
            TlvType::MleFrameCounter => Tlv::MleFrameCounter(be_u32(known, value)?),
            TlvType::Route => Tlv::Route(RouteTlv::decode(value)?),
            TlvType::Address16 => Tlv::Address16(be_u16(known, value)?),
            TlvType::LeaderData => Tlv::LeaderData(LeaderData::decode(value)?),
            TlvType::NetworkData => Tlv::NetworkData(value.to_vec()),
            TlvType::TlvRequest => Tlv::TlvRequest(value.to_vec()),
            TlvType::ScanMask => Tlv::ScanMask(ScanMask::from_byte(single(known, value)?)),
            TlvType::Connectivity => Tlv::Connectivity(Connectivity::decode(value)?),
            TlvType::LinkMargin => Tlv::LinkMargin(single(known, value)?),
            TlvType::Status => Tlv::Status(single(known, value)?),
            TlvType::Version => Tlv::Version(be_u16(known, value)?),
            TlvType::AddressRegistration => {
                Tlv::AddressRegistration(AddressEntry::decode_all(value)?)
            }
            TlvType::Channel => {
                if value.len() != 3 {
                    return Err(ProtocolError::InvalidTlvLength {
                        tlv: known,
                        len: value.len(),
                    });
                }
                Tlv::Channel {
                    page: value[0],
                    channel: u16::from_be_bytes([value[1], value[2]]),
                }
            }
            TlvType::PanId => Tlv::PanId(be_u16(known, value)?),
            TlvType::ActiveTimestamp => Tlv::ActiveTimestamp(be_u64(known, value)?),
            TlvType::PendingTimestamp => Tlv::PendingTimestamp(be_u64(known, value)?),
            TlvType::ActiveDataset => Tlv::ActiveDataset(value.to_vec()),
            TlvType::PendingDataset => Tlv::PendingDataset(value.to_vec()),
            TlvType::Discovery => Tlv::Discovery(value.to_vec()),
            TlvType::LinkQuality | TlvType::NetworkParameter => Tlv::Unknown {
                tlv_type,
                value: value.to_vec(),
            },
        };
        Ok(tlv)
    }
}

fn check_challenge_len(tlv: &Tlv, len: usize) -> Result<(), ProtocolError> {
    if (MIN_CHALLENGE_SIZE..=MAX_CHALLENGE_SIZE).contains(&len) {
        return Ok(());
    }
    let tlv = if matches!(tlv, Tlv::Challenge(_)) {
        TlvType::Challenge
    } else {
        TlvType::Response
    };
    Err(ProtocolError::InvalidTlvLength { tlv, len })
}

fn fixed<const N: usize>(tlv: TlvType, value: &[u8]) -> Result<[u8; N], ProtocolError> {
    value
        .try_into()
        .map_err(|_| ProtocolError::InvalidTlvLength {
            tlv,
            len: value.len(),
        })
}

fn single(tlv: TlvType, value: &[u8]) -> Result<u8, ProtocolError> {
    Ok(fixed::<1>(tlv, value)?[0])
}

fn be_u16(tlv: TlvType, value: &[u8]) -> Result<u16, ProtocolError> {
    Ok(u16::from_be_bytes(fixed(tlv, value)?))
}

fn be_u32(tlv: TlvType, value: &[u8]) -> Result<u32, ProtocolError> {
    Ok(u32::from_be_bytes(fixed(tlv, value)?))
}

fn be_u64(tlv: TlvType, value: &[u8]) -> Result<u64, ProtocolError> {
    Ok(u64::from_be_bytes(fixed(tlv, value)?))
}

/// An ordered collection of TLVs with typed lookups.
///
/// Lookups return the first TLV of the requested type; duplicates are kept
/// so that encoding reproduces the input exactly.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TlvSet(Vec<Tlv>);

impl TlvSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, tlv: Tlv) {
        self.0.push(tlv);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tlv> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, tlv_type: TlvType) -> bool {
        self.0.iter().any(|t| t.type_byte() == tlv_type.to_byte())
    }

    pub fn encode(&self, buf: &mut Vec<u8>) -> Result<(), ProtocolError> {
        for tlv in &self.0 {
            tlv.encode(buf)?;
        }
        Ok(())
    }

    pub fn decode(mut bytes: &[u8]) -> Result<Self, ProtocolError> {
        let mut set = TlvSet::new();
        while !bytes.is_empty() {
            if bytes.len() < 2 {
                return Err(ProtocolError::MessageTooShort {
                    expected: 2,
                    got: bytes.len(),
                });
            }
            let tlv_type = bytes[0];
            let len = bytes[1] as usize;
            let rest = &bytes[2..];
            if rest.len() < len {
                return Err(ProtocolError::TruncatedTlv {
                    tlv_type,
                    len,
                    remaining: rest.len(),
                });
            }
            set.push(Tlv::decode_value(tlv_type, &rest[..len])?);
            bytes = &rest[len..];
        }
        Ok(set)
    }

    // ========================================================================
    // Typed lookups
    // ========================================================================

    pub fn source_address(&self) -> Option<u16> {
        self.0.iter().find_map(|t| match t {
            Tlv::SourceAddress(v) => Some(*v),
            _ => None,
        })
    }

    pub fn mode(&self) -> Option<DeviceMode> {
        self.0.iter().find_map(|t| match t {
            Tlv::Mode(m) => Some(*m),
            _ => None,
        })
    }

    pub fn timeout(&self) -> Option<u32> {
        self.0.iter().find_map(|t| match t {
            Tlv::Timeout(v) => Some(*v),
            _ => None,
        })
    }

    pub fn challenge(&self) -> Option<&[u8]> {
        self.0.iter().find_map(|t| match t {
            Tlv::Challenge(v) => Some(v.as_slice()),
            _ => None,
        })
    }

    pub fn response(&self) -> Option<&[u8]> {
        self.0.iter().find_map(|t| match t {
            Tlv::Response(v) => Some(v.as_slice()),
            _ => None,
        })
    }

    pub fn link_frame_counter(&self) -> Option<u32> {
        self.0.iter().find_map(|t| match t {
            Tlv::LinkFrameCounter(v) => Some(*v),
            _ => None,
        })
    }

    pub fn mle_frame_counter(&self) -> Option<u32> {
        self.0.iter().find_map(|t| match t {
            Tlv::MleFrameCounter(v) => Some(*v),
            _ => None,
        })
    }

    pub fn route(&self) -> Option<&RouteTlv> {
        self.0.iter().find_map(|t| match t {
            Tlv::Route(r) => Some(r),
            _ => None,
        })
    }

    pub fn address16(&self) -> Option<u16> {
        self.0.iter().find_map(|t| match t {
            Tlv::Address16(v) => Some(*v),
            _ => None,
        })
    }

    pub fn leader_data(&self) -> Option<LeaderData> {
        self.0.iter().find_map(|t| match t {
            Tlv::LeaderData(ld) => Some(*ld),
            _ => None,
        })
    }

    pub fn network_data(&self) -> Option<&[u8]> {
        self.0.iter().find_map(|t| match t {
            Tlv::NetworkData(v) => Some(v.as_slice()),
            _ => None,
        })
    }

    pub fn tlv_request(&self) -> Option<&[u8]> {
        self.0.iter().find_map(|t| match t {
            Tlv::TlvRequest(v) => Some(v.as_slice()),
            _ => None,
        })
    }

    pub fn scan_mask(&self) -> Option<ScanMask> {
        self.0.iter().find_map(|t| match t {
            Tlv::ScanMask(m) => Some(*m),
            _ => None,
        })
    }

    pub fn connectivity(&self) -> Option<Connectivity> {
        self.0.iter().find_map(|t| match t {
            Tlv::Connectivity(c) => Some(*c),
            _ => None,
        })
    }

    pub fn link_margin(&self) -> Option<u8> {
        self.0.iter().find_map(|t| match t {
            Tlv::LinkMargin(v) => Some(*v),
            _ => None,
        })
    }

    pub fn status(&self) -> Option<u8> {
        self.0.iter().find_map(|t| match t {
            Tlv::Status(v) => Some(*v),
            _ => None,
        })
    }

    pub fn version(&self) -> Option<u16> {
        self.0.iter().find_map(|t| match t {
            Tlv::Version(v) => Some(*v),
            _ => None,
        })
    }

    pub fn address_registration(&self) -> Option<&[AddressEntry]> {
        self.0.iter().find_map(|t| match t {
            Tlv::AddressRegistration(v) => Some(v.as_slice()),
            _ => None,
        })
    }

    pub fn channel(&self) -> Option<(u8, u16)> {
        self.0.iter().find_map(|t| match t {
            Tlv::Channel { page, channel } => Some((*page, *channel)),
            _ => None,
        })
    }

    pub fn pan_id(&self) -> Option<u16> {
        self.0.iter().find_map(|t| match t {
            Tlv::PanId(v) => Some(*v),
            _ => None,
        })
    }

    pub fn active_timestamp(&self) -> Option<u64> {
        self.0.iter().find_map(|t| match t {
            Tlv::ActiveTimestamp(v) => Some(*v),
            _ => None,
        })
    }

    pub fn discovery(&self) -> Option<&[u8]> {
        self.0.iter().find_map(|t| match t {
            Tlv::Discovery(v) => Some(v.as_slice()),
            _ => None,
        })
    }
}

impl FromIterator<Tlv> for TlvSet {
    fn from_iter<I: IntoIterator<Item = Tlv>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<Vec<Tlv>> for TlvSet {
    fn from(tlvs: Vec<Tlv>) -> Self {
        Self(tlvs)
    }
}

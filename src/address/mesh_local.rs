//! Link-local and mesh-local IPv6 address derivation and classification.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::net::Ipv6Addr;
use std::str::FromStr;

use super::{AddressError, ExtAddress, ALOC16_LEADER};

/// Link-local all-nodes multicast (`ff02::1`).
pub const LINK_LOCAL_ALL_NODES: Ipv6Addr = Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 1);

/// Link-local all-routers multicast (`ff02::2`).
pub const LINK_LOCAL_ALL_ROUTERS: Ipv6Addr = Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 2);

/// Interface identifier prefix shared by RLOC and ALOC addresses: `0000:00ff:fe00:xxxx`.
const LOCATOR_IID_PREFIX: [u8; 6] = [0x00, 0x00, 0x00, 0xff, 0xfe, 0x00];

/// Derive the link-local address (`fe80::/64` + IID) of an extended address.
pub fn link_local_from_ext_address(ext: &ExtAddress) -> Ipv6Addr {
    let mut bytes = [0u8; 16];
    bytes[0] = 0xfe;
    bytes[1] = 0x80;
    bytes[8..].copy_from_slice(&ext.to_iid());
    Ipv6Addr::from(bytes)
}

/// Recover the extended address from a link-local source address.
///
/// Returns `None` for anything outside `fe80::/64`.
pub fn ext_address_from_link_local(addr: &Ipv6Addr) -> Option<ExtAddress> {
    let bytes = addr.octets();
    if bytes[0] != 0xfe || bytes[1] != 0x80 || bytes[2..8].iter().any(|b| *b != 0) {
        return None;
    }
    let mut iid = [0u8; 8];
    iid.copy_from_slice(&bytes[8..]);
    Some(ExtAddress::from_iid(iid))
}

/// The /64 mesh-local prefix of a Thread partition.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshLocalPrefix([u8; 8]);

impl MeshLocalPrefix {
    pub fn from_bytes(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }

    fn with_iid(&self, iid: [u8; 8]) -> Ipv6Addr {
        let mut bytes = [0u8; 16];
        bytes[..8].copy_from_slice(&self.0);
        bytes[8..].copy_from_slice(&iid);
        Ipv6Addr::from(bytes)
    }

    fn locator_iid(locator: u16) -> [u8; 8] {
        let mut iid = [0u8; 8];
        iid[..6].copy_from_slice(&LOCATOR_IID_PREFIX);
        iid[6..].copy_from_slice(&locator.to_be_bytes());
        iid
    }

    /// Mesh-local routing locator for an RLOC16.
    pub fn routing_locator(&self, rloc16: u16) -> Ipv6Addr {
        self.with_iid(Self::locator_iid(rloc16))
    }

    /// Mesh-local anycast locator for an ALOC16.
    pub fn anycast_locator(&self, aloc16: u16) -> Ipv6Addr {
        self.with_iid(Self::locator_iid(aloc16))
    }

    /// Leader anycast locator.
    pub fn leader_aloc(&self) -> Ipv6Addr {
        self.anycast_locator(ALOC16_LEADER)
    }

    /// Mesh-local EID built from an arbitrary interface identifier.
    pub fn endpoint_identifier(&self, iid: [u8; 8]) -> Ipv6Addr {
        self.with_iid(iid)
    }

    /// True if the address lies within this /64.
    pub fn contains(&self, addr: &Ipv6Addr) -> bool {
        addr.octets()[..8] == self.0
    }

    /// Locator value of an RLOC or ALOC address, if it is one.
    fn locator(&self, addr: &Ipv6Addr) -> Option<u16> {
        let bytes = addr.octets();
        if !self.contains(addr) || bytes[8..14] != LOCATOR_IID_PREFIX {
            return None;
        }
        Some(u16::from_be_bytes([bytes[14], bytes[15]]))
    }

    /// True for a mesh-local routing locator (`...:00ff:fe00:xxxx`, xxxx < 0xfc00).
    pub fn is_routing_locator(&self, addr: &Ipv6Addr) -> bool {
        self.locator(addr).is_some_and(|l| l < ALOC16_LEADER)
    }

    /// True for a mesh-local anycast locator (`...:00ff:fe00:fcxx`).
    pub fn is_anycast_locator(&self, addr: &Ipv6Addr) -> bool {
        self.locator(addr).is_some_and(|l| l >= ALOC16_LEADER)
    }

    /// RLOC16 carried by a routing locator address.
    pub fn rloc16_of(&self, addr: &Ipv6Addr) -> Option<u16> {
        self.locator(addr).filter(|l| *l < ALOC16_LEADER)
    }
}

impl Default for MeshLocalPrefix {
    fn default() -> Self {
        Self([0xfd, 0x00, 0x0d, 0xb8, 0x00, 0x00, 0x00, 0x00])
    }
}

impl FromStr for MeshLocalPrefix {
    type Err = AddressError;

    /// Accepts `fdxx:...::` or `fdxx:...::/64`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr_part, len) = match s.split_once('/') {
            Some((a, l)) => (a, Some(l)),
            None => (s, None),
        };
        if let Some(len) = len
            && len != "64"
        {
            return Err(AddressError::InvalidPrefix(format!(
                "prefix length must be 64, got {len}"
            )));
        }
        let addr = Ipv6Addr::from_str(addr_part)
            .map_err(|e| AddressError::InvalidPrefix(format!("{addr_part}: {e}")))?;
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&addr.octets()[..8]);
        Ok(Self(bytes))
    }
}

impl fmt::Debug for MeshLocalPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MeshLocalPrefix({self})")
    }
}

impl fmt::Display for MeshLocalPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/64", self.with_iid([0u8; 8]))
    }
}

impl Serialize for MeshLocalPrefix {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for MeshLocalPrefix {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

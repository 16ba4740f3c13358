//! 64-bit IEEE 802.15.4 extended address.

use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use super::AddressError;

/// 64-bit extended address identifying a radio interface.
///
/// The extended address is the stable identity of a Thread node: it seeds
/// the link-local IPv6 address, the AEAD nonce of every secured MLE frame,
/// and the lookup key for neighbors before an RLOC16 has been assigned.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExtAddress([u8; 8]);

impl ExtAddress {
    /// Wire size in bytes.
    pub const SIZE: usize = 8;

    /// Create an ExtAddress from an 8-byte array.
    pub fn from_bytes(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    /// Create an ExtAddress from a slice.
    pub fn from_slice(slice: &[u8]) -> Result<Self, AddressError> {
        let bytes: [u8; 8] = slice
            .try_into()
            .map_err(|_| AddressError::InvalidExtAddressLength(slice.len()))?;
        Ok(Self(bytes))
    }

    /// Parse from a 16-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, AddressError> {
        let raw = hex::decode(s).map_err(|e| AddressError::InvalidExtAddressHex(e.to_string()))?;
        Self::from_slice(&raw)
    }

    /// Generate a random, locally administered extended address.
    pub fn random<R: RngCore + ?Sized>(rng: &mut R) -> Self {
        let mut bytes = [0u8; 8];
        rng.fill_bytes(&mut bytes);
        // Locally administered, unicast.
        bytes[0] = (bytes[0] | 0x02) & !0x01;
        Self(bytes)
    }

    /// Return the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }

    /// Interface identifier form used in IPv6 addresses (U/L bit flipped).
    pub fn to_iid(&self) -> [u8; 8] {
        let mut iid = self.0;
        iid[0] ^= 0x02;
        iid
    }

    /// Inverse of [`to_iid`](Self::to_iid).
    pub fn from_iid(iid: [u8; 8]) -> Self {
        let mut bytes = iid;
        bytes[0] ^= 0x02;
        Self(bytes)
    }
}

impl fmt::Debug for ExtAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExtAddress({})", hex::encode(self.0))
    }
}

impl fmt::Display for ExtAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl AsRef<[u8]> for ExtAddress {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for ExtAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for ExtAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ExtAddress::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

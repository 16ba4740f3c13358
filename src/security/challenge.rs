//! Challenge/Response nonces.

use rand::RngCore;
use std::fmt;

use crate::protocol::MAX_CHALLENGE_SIZE;

/// Random nonce that binds a request to its response.
///
/// A fresh value is drawn for every attempt; the peer must echo it exactly.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Challenge([u8; MAX_CHALLENGE_SIZE]);

impl Challenge {
    pub fn generate<R: RngCore + ?Sized>(rng: &mut R) -> Self {
        let mut bytes = [0u8; MAX_CHALLENGE_SIZE];
        rng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    /// Byte-for-byte comparison against an echoed Response.
    ///
    /// Runs in time independent of where the first mismatch is.
    pub fn matches(&self, response: &[u8]) -> bool {
        if response.len() != self.0.len() {
            return false;
        }
        self.0
            .iter()
            .zip(response)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

impl fmt::Debug for Challenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Challenge({})", hex::encode(self.0))
    }
}

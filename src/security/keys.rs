//! Key Manager: MLE key derivation and outgoing frame counters.

use hkdf::Hkdf;
use sha2::Sha256;
use std::fmt;

/// 256-bit MLE key for one key sequence.
#[derive(Clone, PartialEq, Eq)]
pub struct MleKey([u8; 32]);

impl MleKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for MleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MleKey({}..)", hex::encode(&self.0[..4]))
    }
}

/// Source of MLE keys and outgoing frame counters.
pub trait KeySource {
    /// The key sequence currently authoritative for transmission.
    fn current_key_sequence(&self) -> u32;

    /// Switch to a new key sequence. Resets outgoing frame counters when the
    /// sequence changes.
    fn set_current_key_sequence(&mut self, key_sequence: u32);

    /// Key for the current key sequence.
    fn current_key(&self) -> MleKey;

    /// Key for an arbitrary key sequence, without switching to it.
    fn temporary_key(&self, key_sequence: u32) -> MleKey;

    /// Next outgoing MLE frame counter (post-incremented).
    fn next_mle_frame_counter(&mut self) -> Option<u32>;

    /// Next outgoing MLE frame counter value, without consuming it.
    fn mle_frame_counter(&self) -> u32;

    /// Outgoing link-layer frame counter, as advertised to new neighbors.
    fn link_frame_counter(&self) -> u32;

    /// Restore counters after reboot.
    fn restore_frame_counters(&mut self, mle_frame_counter: u32, link_frame_counter: u32);
}

const KEY_INFO: &[u8] = b"thread-mle key";

/// HKDF-SHA256 key manager keyed by a 128-bit network key.
pub struct KeyManager {
    network_key: [u8; 16],
    key_sequence: u32,
    current_key: MleKey,
    mle_frame_counter: u32,
    link_frame_counter: u32,
}

impl KeyManager {
    pub fn new(network_key: [u8; 16], key_sequence: u32) -> Self {
        let current_key = Self::derive(&network_key, key_sequence);
        Self {
            network_key,
            key_sequence,
            current_key,
            mle_frame_counter: 0,
            link_frame_counter: 0,
        }
    }

    fn derive(network_key: &[u8; 16], key_sequence: u32) -> MleKey {
        let hk = Hkdf::<Sha256>::new(Some(&key_sequence.to_be_bytes()), network_key);
        let mut okm = [0u8; 32];
        hk.expand(KEY_INFO, &mut okm)
            .expect("32 bytes is valid output length");
        MleKey(okm)
    }
}

impl KeySource for KeyManager {
    fn current_key_sequence(&self) -> u32 {
        self.key_sequence
    }

    fn set_current_key_sequence(&mut self, key_sequence: u32) {
        if key_sequence == self.key_sequence {
            return;
        }
        self.key_sequence = key_sequence;
        self.current_key = Self::derive(&self.network_key, key_sequence);
        self.mle_frame_counter = 0;
        self.link_frame_counter = 0;
    }

    fn current_key(&self) -> MleKey {
        self.current_key.clone()
    }

    fn temporary_key(&self, key_sequence: u32) -> MleKey {
        if key_sequence == self.key_sequence {
            return self.current_key.clone();
        }
        Self::derive(&self.network_key, key_sequence)
    }

    fn next_mle_frame_counter(&mut self) -> Option<u32> {
        let counter = self.mle_frame_counter;
        self.mle_frame_counter = counter.checked_add(1)?;
        Some(counter)
    }

    fn mle_frame_counter(&self) -> u32 {
        self.mle_frame_counter
    }

    fn link_frame_counter(&self) -> u32 {
        self.link_frame_counter
    }

    fn restore_frame_counters(&mut self, mle_frame_counter: u32, link_frame_counter: u32) {
        self.mle_frame_counter = mle_frame_counter;
        self.link_frame_counter = link_frame_counter;
    }
}

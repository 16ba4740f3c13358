//! MLE Security
//!
//! Everything needed to seal and open MLE frames and to keep them
//! replay-safe:
//!
//! - [`KeySource`]: the Key Manager collaborator. Selects the MLE key by
//!   key sequence and hands out outgoing frame counters. [`KeyManager`] is
//!   the bundled implementation (HKDF-SHA256 over the network key).
//! - [`FrameCipher`]: the AEAD collaborator. [`ChaChaFrameCipher`] is the
//!   bundled implementation.
//! - [`Challenge`]: random nonces echoed in handshake responses.
//! - [`FrameCounters`]: per-neighbor key sequence and frame counter
//!   bookkeeping.
//! - [`seal_frame`] / [`open_frame`]: the security envelope around an
//!   encoded [`MleMessage`](crate::protocol::MleMessage).

mod challenge;
mod cipher;
mod counters;
mod envelope;
mod keys;

use thiserror::Error;

pub use challenge::Challenge;
pub use cipher::{ChaChaFrameCipher, FrameCipher, Nonce};
pub use counters::FrameCounters;
pub use envelope::{
    AuxHeader, EnvelopeError, OpenedFrame, SECURITY_LEVEL, SECURITY_SUITE_SECURED, SECURITY_SUITE_UNSECURED,
    key_index_for, open_frame, resolve_key_sequence, seal_frame,
};
pub use keys::{KeyManager, KeySource, MleKey};

/// Errors from sealing, opening, or replay-checking MLE frames.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SecurityError {
    #[error("message integrity check failed")]
    MicFailure,

    #[error("encryption failed")]
    EncryptFailed,

    #[error("replayed frame counter {counter} at key sequence {key_sequence} (expected >= {expected})")]
    Replay {
        key_sequence: u32,
        counter: u32,
        expected: u32,
    },

    #[error("stale key sequence {received} (neighbor at {current})")]
    StaleKeySequence { received: u32, current: u32 },

    #[error("frame counter exhausted")]
    CounterExhausted,

    #[error("response does not match challenge")]
    ResponseMismatch,

    #[error("command {0} must not be sent unsecured")]
    UnsecuredCommand(u8),
}

//! MLE security envelope.
//!
//! ```text
//! [suite:1]                              0x00 secured, 0xff unsecured
//! [control:1][frame_counter:4 LE]        secured only
//! [key_source:4 BE]                      key id mode 2 only
//! [key_index:1]
//! [ciphertext(command || tlvs)][mic]
//! ```
//!
//! The additional authenticated data is `src_ip || dst_ip || aux_header`,
//! so a frame cannot be replayed towards a different destination.

use std::net::Ipv6Addr;
use thiserror::Error;

use super::SecurityError;
use super::cipher::{FrameCipher, Nonce};
use super::keys::KeySource;
use crate::address::ExtAddress;
use crate::protocol::{KeyIdMode, MleMessage, ProtocolError};

pub const SECURITY_SUITE_SECURED: u8 = 0x00;
pub const SECURITY_SUITE_UNSECURED: u8 = 0xff;

/// ENC-MIC-32.
pub const SECURITY_LEVEL: u8 = 5;

const KEY_ID_MODE_1: u8 = 0x08;
const KEY_ID_MODE_2: u8 = 0x10;
const KEY_ID_MODE_MASK: u8 = 0x18;
const SECURITY_LEVEL_MASK: u8 = 0x07;

/// Key index carried on the wire for a key sequence: low 7 bits, plus one.
pub fn key_index_for(key_sequence: u32) -> u8 {
    ((key_sequence & 0x7f) + 1) as u8
}

/// Recover the full key sequence from a mode-1 key index.
///
/// Picks the sequence with the given low bits that lies closest to
/// `current`, which tolerates rotation in either direction within 64 steps.
pub fn resolve_key_sequence(current: u32, key_index: u8) -> u32 {
    let low = (key_index.wrapping_sub(1) & 0x7f) as u32;
    let base = (current & !0x7f) | low;
    [base.wrapping_sub(128), base, base.wrapping_add(128)]
        .into_iter()
        .min_by_key(|candidate| candidate.abs_diff(current))
        .unwrap_or(base)
}

/// Auxiliary security header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AuxHeader {
    pub key_id_mode: KeyIdMode,
    pub frame_counter: u32,
    /// Full key sequence (mode 2 only; mode 1 carries just the index).
    pub key_source: Option<u32>,
    pub key_index: u8,
}

impl AuxHeader {
    pub fn encoded_len(&self) -> usize {
        match self.key_id_mode {
            KeyIdMode::Mode1 => 1 + 4 + 1,
            KeyIdMode::Mode2 => 1 + 4 + 4 + 1,
        }
    }

    pub fn encode(&self, buf: &mut Vec<u8>) {
        let mode_bits = match self.key_id_mode {
            KeyIdMode::Mode1 => KEY_ID_MODE_1,
            KeyIdMode::Mode2 => KEY_ID_MODE_2,
        };
        buf.push(mode_bits | SECURITY_LEVEL);
        buf.extend_from_slice(&self.frame_counter.to_le_bytes());
        if self.key_id_mode == KeyIdMode::Mode2 {
            buf.extend_from_slice(&self.key_source.unwrap_or(0).to_be_bytes());
        }
        buf.push(self.key_index);
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let control = *bytes
            .first()
            .ok_or(ProtocolError::MessageTooShort { expected: 1, got: 0 })?;
        if control & SECURITY_LEVEL_MASK != SECURITY_LEVEL {
            return Err(ProtocolError::Malformed(format!(
                "security level {}",
                control & SECURITY_LEVEL_MASK
            )));
        }
        let key_id_mode = match control & KEY_ID_MODE_MASK {
            KEY_ID_MODE_1 => KeyIdMode::Mode1,
            KEY_ID_MODE_2 => KeyIdMode::Mode2,
            other => return Err(ProtocolError::UnsupportedKeyIdMode(other >> 3)),
        };
        let needed = match key_id_mode {
            KeyIdMode::Mode1 => 6,
            KeyIdMode::Mode2 => 10,
        };
        if bytes.len() < needed {
            return Err(ProtocolError::MessageTooShort {
                expected: needed,
                got: bytes.len(),
            });
        }
        let frame_counter = u32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
        let (key_source, key_index) = match key_id_mode {
            KeyIdMode::Mode1 => (None, bytes[5]),
            KeyIdMode::Mode2 => (
                Some(u32::from_be_bytes([bytes[5], bytes[6], bytes[7], bytes[8]])),
                bytes[9],
            ),
        };
        Ok(Self {
            key_id_mode,
            frame_counter,
            key_source,
            key_index,
        })
    }
}

/// Result of opening an inbound frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpenedFrame {
    pub message: MleMessage,
    /// `(key_sequence, frame_counter)` for secured frames.
    pub security: Option<(u32, u32)>,
}

/// Errors surfaced by the envelope, keeping codec and crypto failures apart.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Security(#[from] SecurityError),
}

fn build_aad(src: &Ipv6Addr, dst: &Ipv6Addr, aux: &[u8]) -> Vec<u8> {
    let mut aad = Vec::with_capacity(32 + aux.len());
    aad.extend_from_slice(&src.octets());
    aad.extend_from_slice(&dst.octets());
    aad.extend_from_slice(aux);
    aad
}

/// Seal a message for transmission from `our_ext` (`src`) to `dst`.
pub fn seal_frame(
    message: &MleMessage,
    our_ext: &ExtAddress,
    src: &Ipv6Addr,
    dst: &Ipv6Addr,
    keys: &mut dyn KeySource,
    cipher: &dyn FrameCipher,
) -> Result<Vec<u8>, EnvelopeError> {
    let plaintext = message.encode()?;
    if !message.command.is_secured() {
        let mut out = Vec::with_capacity(1 + plaintext.len());
        out.push(SECURITY_SUITE_UNSECURED);
        out.extend_from_slice(&plaintext);
        return Ok(out);
    }

    let key_sequence = keys.current_key_sequence();
    let frame_counter = keys
        .next_mle_frame_counter()
        .ok_or(SecurityError::CounterExhausted)?;
    let key_id_mode = message.command.key_id_mode();
    let aux = AuxHeader {
        key_id_mode,
        frame_counter,
        key_source: (key_id_mode == KeyIdMode::Mode2).then_some(key_sequence),
        key_index: key_index_for(key_sequence),
    };
    let mut aux_bytes = Vec::with_capacity(aux.encoded_len());
    aux.encode(&mut aux_bytes);

    let nonce = Nonce::new(our_ext, frame_counter, SECURITY_LEVEL);
    let sealed = cipher.seal(
        &keys.current_key(),
        &nonce,
        &build_aad(src, dst, &aux_bytes),
        &plaintext,
    )?;

    let mut out = Vec::with_capacity(1 + aux_bytes.len() + sealed.len());
    out.push(SECURITY_SUITE_SECURED);
    out.extend_from_slice(&aux_bytes);
    out.extend_from_slice(&sealed);
    Ok(out)
}

/// Open a frame received from `sender_ext` (`src`) addressed to `dst`.
///
/// Only the MIC is verified here; replay checking is the caller's job once
/// the sending neighbor has been identified.
pub fn open_frame(
    bytes: &[u8],
    sender_ext: &ExtAddress,
    src: &Ipv6Addr,
    dst: &Ipv6Addr,
    keys: &dyn KeySource,
    cipher: &dyn FrameCipher,
) -> Result<OpenedFrame, EnvelopeError> {
    let (&suite, rest) = bytes
        .split_first()
        .ok_or(ProtocolError::MessageTooShort { expected: 1, got: 0 })?;

    match suite {
        SECURITY_SUITE_UNSECURED => {
            let message = MleMessage::decode(rest)?;
            if message.command.is_secured() {
                return Err(SecurityError::UnsecuredCommand(message.command.to_byte()).into());
            }
            Ok(OpenedFrame {
                message,
                security: None,
            })
        }
        SECURITY_SUITE_SECURED => {
            let aux = AuxHeader::decode(rest)?;
            let aux_len = aux.encoded_len();
            let (aux_bytes, sealed) = rest.split_at(aux_len);
            let key_sequence = match aux.key_source {
                Some(seq) => seq,
                None => resolve_key_sequence(keys.current_key_sequence(), aux.key_index),
            };
            let key = keys.temporary_key(key_sequence);
            let nonce = Nonce::new(sender_ext, aux.frame_counter, SECURITY_LEVEL);
            let plaintext = cipher.open(&key, &nonce, &build_aad(src, dst, aux_bytes), sealed)?;
            let message = MleMessage::decode(&plaintext)?;
            if !message.command.is_secured() {
                return Err(ProtocolError::Malformed(format!(
                    "{} must be sent unsecured",
                    message.command
                ))
                .into());
            }
            Ok(OpenedFrame {
                message,
                security: Some((key_sequence, aux.frame_counter)),
            })
        }
        other => Err(ProtocolError::InvalidSecuritySuite(other).into()),
    }
}

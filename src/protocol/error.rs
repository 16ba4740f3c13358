//! Protocol error types.

use super::tlv::TlvType;
use thiserror::Error;

/// Errors raised while encoding or decoding MLE and TMF payloads.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid command: {0}")]
    InvalidCommand(u8),

    #[error("message too short: expected at least {expected}, got {got}")]
    MessageTooShort { expected: usize, got: usize },

    #[error("truncated TLV type {tlv_type}: length {len} exceeds remaining {remaining}")]
    TruncatedTlv {
        tlv_type: u8,
        len: usize,
        remaining: usize,
    },

    #[error("invalid {tlv} TLV length: {len}")]
    InvalidTlvLength { tlv: TlvType, len: usize },

    #[error("TLV value too long: max 255, got {0}")]
    TlvTooLong(usize),

    #[error("missing required {0} TLV")]
    MissingTlv(TlvType),

    #[error("invalid security suite: 0x{0:02x}")]
    InvalidSecuritySuite(u8),

    #[error("unsupported key id mode: {0}")]
    UnsupportedKeyIdMode(u8),

    #[error("unknown TMF message kind: 0x{0:02x}")]
    InvalidTmfKind(u8),

    #[error("malformed message: {0}")]
    Malformed(String),
}

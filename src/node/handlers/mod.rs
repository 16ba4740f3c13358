//! Inbound message handlers and timer dispatch.

mod children;
mod data;
mod discovery;
mod link;
mod receive;
mod timers;

use std::net::Ipv6Addr;

use crate::address::{ExtAddress, link_local_from_ext_address};
use crate::protocol::{ProtocolError, TlvType};
use crate::transport::MessageInfo;

use super::MleError;

/// Facts about a frame that passed the security envelope.
#[derive(Clone, Copy, Debug)]
pub(in crate::node) struct RxContext {
    pub sender: ExtAddress,
    pub info: MessageInfo,
    pub key_sequence: u32,
    pub frame_counter: u32,
    pub now_ms: u64,
}

impl RxContext {
    pub fn rss(&self) -> i8 {
        self.info.rss
    }

    /// Link-local address of the sender, where replies go.
    pub fn reply_address(&self) -> Ipv6Addr {
        link_local_from_ext_address(&self.sender)
    }

    /// Next MLE frame counter to accept from the sender, given what it
    /// advertised and the frame that carried the advertisement.
    pub fn next_mle_counter(&self, advertised: u32) -> u32 {
        advertised.max(self.frame_counter.saturating_add(1))
    }
}

/// Unwrap a TLV every valid message of this kind carries.
pub(in crate::node) fn required<T>(value: Option<T>, tlv: TlvType) -> Result<T, MleError> {
    value.ok_or(MleError::Parse(ProtocolError::MissingTlv(tlv)))
}

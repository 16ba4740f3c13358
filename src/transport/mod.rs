//! Transport Layer Abstractions
//!
//! MLE rides on UDP over the mesh link. The engine never touches a socket:
//! it hands fully encoded datagrams to a [`Transport`] and receives inbound
//! datagrams, annotated with [`MessageInfo`], through `Mle::handle_receive`.
//! An in-memory shared medium for simulations and tests lives in [`sim`].

pub mod sim;

use std::fmt;
use std::net::Ipv6Addr;
use thiserror::Error;

pub use sim::{CaptureTransport, Delivery, SimBus, SimTransport};

// ============================================================================
// Datagram Types
// ============================================================================

/// A datagram the engine wants sent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboundFrame {
    pub source: Ipv6Addr,
    pub destination: Ipv6Addr,
    /// UDP port on both ends (MLE or TMF).
    pub port: u16,
    pub payload: Vec<u8>,
    /// Whether the MAC layer should apply link-layer security.
    pub link_security: bool,
}

impl OutboundFrame {
    pub fn is_multicast(&self) -> bool {
        self.destination.is_multicast()
    }
}

impl fmt::Display for OutboundFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} port {} ({} bytes)",
            self.source,
            self.destination,
            self.port,
            self.payload.len()
        )
    }
}

/// Metadata accompanying a received datagram.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MessageInfo {
    pub source: Ipv6Addr,
    pub destination: Ipv6Addr,
    pub port: u16,
    /// Received signal strength in dBm.
    pub rss: i8,
    /// Whether the frame arrived with link-layer security.
    pub link_security: bool,
}

impl MessageInfo {
    pub fn is_multicast(&self) -> bool {
        self.destination.is_multicast()
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Errors related to transport operations.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("send queue full: max {capacity} frames")]
    QueueFull { capacity: usize },

    #[error("unsupported channel {0}")]
    InvalidChannel(u16),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

// ============================================================================
// Transport Trait
// ============================================================================

/// Outbound side of the UDP path used by the engine.
pub trait Transport {
    /// Queue a datagram for transmission. Must not block.
    fn send(&mut self, frame: OutboundFrame) -> Result<(), TransportError>;

    /// Switch radio channel and PAN ID, as requested by Announce handling.
    fn set_channel(&mut self, channel: u16, pan_id: u16) -> Result<(), TransportError> {
        let _ = (channel, pan_id);
        Ok(())
    }
}

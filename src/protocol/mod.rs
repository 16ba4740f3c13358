//! MLE Protocol Messages
//!
//! Wire definitions for the two message families this engine speaks:
//!
//! ## MLE (UDP port 19788)
//!
//! A security envelope (see `crate::security`) around a one-byte
//! [`Command`] and a [`TlvSet`]. Discovery Request/Response travel without
//! MLE-layer security; everything else is sealed.
//!
//! ## TMF (UDP port 61631)
//!
//! Address Solicit and Address Release exchanged with the Leader, protected
//! by link-layer security only.

mod address_registration;
mod command;
mod connectivity;
mod discovery;
mod error;
mod leader_data;
mod message;
mod mode;
mod route;
mod tlv;
mod tmf;

pub use address_registration::AddressEntry;
pub use command::{Command, KeyIdMode};
pub use connectivity::{Connectivity, SedCapacity};
pub use discovery::{DiscoveryRequest, DiscoveryResponse, MAX_NETWORK_NAME_LEN};
pub use error::ProtocolError;
pub use leader_data::LeaderData;
pub use message::MleMessage;
pub use mode::{DeviceMode, ScanMask};
pub use route::{RouteData, RouteTlv, RouterIdSet};
pub use tlv::{
    MAX_CHALLENGE_SIZE, MAX_TLV_VALUE_LEN, MIN_CHALLENGE_SIZE, STATUS_ERROR, Tlv, TlvSet, TlvType,
};
pub use tmf::{
    AddressReleaseRequest, AddressSolicitRequest, AddressSolicitResponse, SolicitReason,
    SolicitStatus, TmfFrame, TmfMessage,
};

/// UDP port MLE listens on.
pub const MLE_PORT: u16 = 19788;

/// UDP port of the Thread management framework.
pub const TMF_PORT: u16 = 61631;

/// Thread version advertised in the Version TLV.
pub const THREAD_VERSION: u16 = 4;

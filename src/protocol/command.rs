//! MLE command codes.

use std::fmt;

/// The one-byte command that follows the security header of every MLE
/// message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    LinkRequest = 0,
    LinkAccept = 1,
    LinkAcceptAndRequest = 2,
    LinkReject = 3,
    Advertisement = 4,
    Update = 5,
    UpdateRequest = 6,
    DataRequest = 7,
    DataResponse = 8,
    ParentRequest = 9,
    ParentResponse = 10,
    ChildIdRequest = 11,
    ChildIdResponse = 12,
    ChildUpdateRequest = 13,
    ChildUpdateResponse = 14,
    Announce = 15,
    DiscoveryRequest = 16,
    DiscoveryResponse = 17,
}

/// How the auxiliary security header identifies the key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyIdMode {
    /// One-byte key index; the receiver infers the full key sequence.
    Mode1,
    /// Four-byte key source carrying the full key sequence plus key index.
    Mode2,
}

impl Command {
    /// Try to convert from a byte.
    pub fn from_byte(b: u8) -> Option<Self> {
        let cmd = match b {
            0 => Command::LinkRequest,
            1 => Command::LinkAccept,
            2 => Command::LinkAcceptAndRequest,
            3 => Command::LinkReject,
            4 => Command::Advertisement,
            5 => Command::Update,
            6 => Command::UpdateRequest,
            7 => Command::DataRequest,
            8 => Command::DataResponse,
            9 => Command::ParentRequest,
            10 => Command::ParentResponse,
            11 => Command::ChildIdRequest,
            12 => Command::ChildIdResponse,
            13 => Command::ChildUpdateRequest,
            14 => Command::ChildUpdateResponse,
            15 => Command::Announce,
            16 => Command::DiscoveryRequest,
            17 => Command::DiscoveryResponse,
            _ => return None,
        };
        Some(cmd)
    }

    /// Convert to a byte.
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    /// Discovery is the only exchange carried without MLE-layer security.
    pub fn is_secured(self) -> bool {
        !matches!(self, Command::DiscoveryRequest | Command::DiscoveryResponse)
    }

    /// Key identifier mode used when sending this command.
    ///
    /// Commands that may be exchanged before the peer knows our key index
    /// carry the full key sequence.
    pub fn key_id_mode(self) -> KeyIdMode {
        match self {
            Command::Advertisement
            | Command::ChildIdRequest
            | Command::LinkReject
            | Command::ParentRequest
            | Command::ParentResponse => KeyIdMode::Mode2,
            _ => KeyIdMode::Mode1,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Command::LinkRequest => "LinkRequest",
            Command::LinkAccept => "LinkAccept",
            Command::LinkAcceptAndRequest => "LinkAcceptAndRequest",
            Command::LinkReject => "LinkReject",
            Command::Advertisement => "Advertisement",
            Command::Update => "Update",
            Command::UpdateRequest => "UpdateRequest",
            Command::DataRequest => "DataRequest",
            Command::DataResponse => "DataResponse",
            Command::ParentRequest => "ParentRequest",
            Command::ParentResponse => "ParentResponse",
            Command::ChildIdRequest => "ChildIdRequest",
            Command::ChildIdResponse => "ChildIdResponse",
            Command::ChildUpdateRequest => "ChildUpdateRequest",
            Command::ChildUpdateResponse => "ChildUpdateResponse",
            Command::Announce => "Announce",
            Command::DiscoveryRequest => "DiscoveryRequest",
            Command::DiscoveryResponse => "DiscoveryResponse",
        };
        write!(f, "{}", name)
    }
}

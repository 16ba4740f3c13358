//! Plaintext MLE message: command byte followed by TLVs.

use super::command::Command;
use super::error::ProtocolError;
use super::tlv::{Tlv, TlvSet};

/// An MLE command and its TLVs, before sealing or after opening.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MleMessage {
    pub command: Command,
    pub tlvs: TlvSet,
}

impl MleMessage {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            tlvs: TlvSet::new(),
        }
    }

    /// Builder-style append.
    pub fn with(mut self, tlv: Tlv) -> Self {
        self.tlvs.push(tlv);
        self
    }

    pub fn push(&mut self, tlv: Tlv) {
        self.tlvs.push(tlv);
    }

    /// Encode as `[command][tlvs...]`.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut buf = Vec::with_capacity(64);
        buf.push(self.command.to_byte());
        self.tlvs.encode(&mut buf)?;
        Ok(buf)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let (&command, rest) = bytes
            .split_first()
            .ok_or(ProtocolError::MessageTooShort { expected: 1, got: 0 })?;
        let command = Command::from_byte(command).ok_or(ProtocolError::InvalidCommand(command))?;
        Ok(Self {
            command,
            tlvs: TlvSet::decode(rest)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_round_trip() {
        let msg = MleMessage::new(Command::ParentRequest)
            .with(Tlv::Mode(crate::protocol::DeviceMode::new(true, true, true)))
            .with(Tlv::Challenge(vec![1; 8]))
            .with(Tlv::Version(4));
        let bytes = msg.encode().unwrap();
        assert_eq!(bytes[0], Command::ParentRequest.to_byte());
        assert_eq!(MleMessage::decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(
            MleMessage::decode(&[]),
            Err(ProtocolError::MessageTooShort { .. })
        ));
        assert!(matches!(
            MleMessage::decode(&[42]),
            Err(ProtocolError::InvalidCommand(42))
        ));
    }
}

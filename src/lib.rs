//! Thread MLE: Mesh Link Establishment
//!
//! The control plane of a Thread mesh device: attaching to a parent,
//! keeping that link alive, promoting to router, forming or merging
//! partitions, and maintaining the link-level neighbor tables that routing
//! depends on. Datagram delivery, key management and Network Data content
//! are collaborators behind traits.

pub mod address;
pub mod config;
pub mod neighbor;
pub mod network_data;
pub mod node;
pub mod protocol;
pub mod security;
pub mod settings;
pub mod table;
pub mod timer;
pub mod transport;

// Re-export address types
pub use address::{AddressError, ExtAddress, MeshLocalPrefix};

// Re-export config types
pub use config::{Config, ConfigError, MleConfig, NetworkConfig, SecurityConfig};

// Re-export neighbor types
pub use neighbor::{Child, Neighbor, NeighborState, Router};

// Re-export engine types
pub use node::{
    AttachMode, AttachState, Collaborators, DeviceRole, Mle, MleCounters, MleError, MleEvent,
    ReattachState,
};

// Re-export protocol types
pub use protocol::{Command, DeviceMode, LeaderData, MleMessage, ProtocolError, Tlv, TlvType};

// Re-export security types
pub use security::{ChaChaFrameCipher, FrameCipher, KeyManager, KeySource, SecurityError};

// Re-export settings types
pub use settings::{FileSettings, MemorySettings, SettingsError, SettingsRecord, SettingsStore};

// Re-export table types
pub use table::{ChildTable, RouterTable, TableError};

// Re-export transport types
pub use transport::{MessageInfo, OutboundFrame, SimBus, Transport, TransportError};

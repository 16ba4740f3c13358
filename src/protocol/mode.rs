//! Bit-flag TLV values: device mode and scan mask.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Device mode flags carried in the Mode TLV.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "DeviceModeConfig", into = "DeviceModeConfig")]
pub struct DeviceMode(u8);

impl DeviceMode {
    pub const RX_ON_WHEN_IDLE: u8 = 0x08;
    pub const SECURE_DATA_REQUESTS: u8 = 0x04;
    pub const FULL_THREAD_DEVICE: u8 = 0x02;
    pub const FULL_NETWORK_DATA: u8 = 0x01;

    pub fn from_byte(b: u8) -> Self {
        Self(b)
    }

    pub fn to_byte(self) -> u8 {
        self.0
    }

    pub fn new(rx_on_when_idle: bool, full_thread_device: bool, full_network_data: bool) -> Self {
        let mut b = 0;
        if rx_on_when_idle {
            b |= Self::RX_ON_WHEN_IDLE;
        }
        if full_thread_device {
            b |= Self::FULL_THREAD_DEVICE;
        }
        if full_network_data {
            b |= Self::FULL_NETWORK_DATA;
        }
        Self(b)
    }

    pub fn is_rx_on_when_idle(self) -> bool {
        self.0 & Self::RX_ON_WHEN_IDLE != 0
    }

    pub fn is_full_thread_device(self) -> bool {
        self.0 & Self::FULL_THREAD_DEVICE != 0
    }

    pub fn is_full_network_data(self) -> bool {
        self.0 & Self::FULL_NETWORK_DATA != 0
    }

    /// A minimal device that sleeps between polls.
    pub fn is_sleepy(self) -> bool {
        !self.is_rx_on_when_idle()
    }
}

impl fmt::Debug for DeviceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceMode({self})")
    }
}

impl fmt::Display for DeviceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = if self.is_rx_on_when_idle() { "r" } else { "-" };
        let d = if self.is_full_thread_device() { "d" } else { "-" };
        let n = if self.is_full_network_data() { "n" } else { "-" };
        write!(f, "{r}{d}{n}")
    }
}

/// YAML form of a device mode (`mle.mode.*`).
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
struct DeviceModeConfig {
    #[serde(default = "default_true")]
    rx_on_when_idle: bool,
    #[serde(default = "default_true")]
    full_thread_device: bool,
    #[serde(default = "default_true")]
    full_network_data: bool,
}

fn default_true() -> bool {
    true
}

impl From<DeviceModeConfig> for DeviceMode {
    fn from(c: DeviceModeConfig) -> Self {
        DeviceMode::new(c.rx_on_when_idle, c.full_thread_device, c.full_network_data)
    }
}

impl From<DeviceMode> for DeviceModeConfig {
    fn from(m: DeviceMode) -> Self {
        DeviceModeConfig {
            rx_on_when_idle: m.is_rx_on_when_idle(),
            full_thread_device: m.is_full_thread_device(),
            full_network_data: m.is_full_network_data(),
        }
    }
}

/// Scan mask of a Parent Request: which device classes should answer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScanMask(u8);

impl ScanMask {
    pub const ROUTER: u8 = 0x80;
    pub const END_DEVICE: u8 = 0x40;

    pub fn from_byte(b: u8) -> Self {
        Self(b)
    }

    pub fn to_byte(self) -> u8 {
        self.0
    }

    pub fn routers_only() -> Self {
        Self(Self::ROUTER)
    }

    pub fn routers_and_reeds() -> Self {
        Self(Self::ROUTER | Self::END_DEVICE)
    }

    pub fn includes_routers(self) -> bool {
        self.0 & Self::ROUTER != 0
    }

    pub fn includes_end_devices(self) -> bool {
        self.0 & Self::END_DEVICE != 0
    }
}

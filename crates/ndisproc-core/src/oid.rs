//! NDIS information codes, status codes, and the enumerations carried in them

use std::fmt;

/// Information code selecting which hardware attribute a query retrieves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Oid {
    GenLinkSpeed = 0x0001_0107,
    Bssid = 0x0D01_0101,
    Ssid = 0x0D01_0102,
    InfrastructureMode = 0x0D01_0108,
    AuthenticationMode = 0x0D01_0118,
    EncryptionStatus = 0x0D01_011B,
    TxPowerLevel = 0x0D01_0205,
    Rssi = 0x0D01_0206,
    FragmentationThreshold = 0x0D01_0209,
    RtsThreshold = 0x0D01_020A,
    NumberOfAntennas = 0x0D01_020B,
    RxAntennaSelected = 0x0D01_020C,
    TxAntennaSelected = 0x0D01_020D,
    Configuration = 0x0D01_0211,
    PowerMode = 0x0D01_0216,
    Statistics = 0x0D02_0212,
}

impl Oid {
    pub fn code(self) -> u32 {
        self as u32
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}(0x{:08X})", self, self.code())
    }
}

/// Status word returned by the miniport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NdisStatus(pub u32);

impl NdisStatus {
    pub const SUCCESS: Self = Self(0x0000_0000);
    pub const FAILURE: Self = Self(0xC000_0001);
    pub const NOT_SUPPORTED: Self = Self(0xC000_00BB);
    pub const INVALID_LENGTH: Self = Self(0xC001_0014);
    pub const INVALID_DATA: Self = Self(0xC001_0015);
    pub const BUFFER_TOO_SHORT: Self = Self(0xC001_0016);

    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }
}

impl fmt::Display for NdisStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

/// 802.11 power-save mode reported by `Oid::PowerMode`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerMode {
    /// Constantly awake (CAM)
    AlwaysOn,
    /// Maximum power savings (MAX_PSP)
    MaxSavings,
    /// Anything else, usually FAST_PSP
    MinSavings,
}

impl PowerMode {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0 => Self::AlwaysOn,
            1 => Self::MaxSavings,
            _ => Self::MinSavings,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::AlwaysOn => "always_on",
            Self::MaxSavings => "max_savings",
            Self::MinSavings => "min_savings",
        }
    }
}

/// Association mode reported by `Oid::InfrastructureMode`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfrastructureMode {
    /// Independent BSS
    AdHoc,
    Managed,
    Auto,
}

impl InfrastructureMode {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0 => Self::AdHoc,
            1 => Self::Managed,
            _ => Self::Auto,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::AdHoc => "adhoc",
            Self::Managed => "managed",
            Self::Auto => "auto",
        }
    }
}

/// Power source handed to the miniport with a power-profile notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum PowerProfile {
    Battery = 0,
    AcOnLine = 1,
}

/// Plug-and-play events delivered through the miniport notify handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PnpEvent {
    QueryRemoved,
    Removed,
    SurpriseRemoved,
    QueryStopped,
    Stopped,
    PowerProfileChanged(PowerProfile),
}

/// Device power state; `D0` is fully on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DevicePowerState {
    #[default]
    D0,
    D1,
    D2,
    D3,
}

impl DevicePowerState {
    /// Map a suspend level (1..=3) to its power state
    pub fn from_level(level: i64) -> Option<Self> {
        match level {
            1 => Some(Self::D1),
            2 => Some(Self::D2),
            3 => Some(Self::D3),
            _ => None,
        }
    }
}

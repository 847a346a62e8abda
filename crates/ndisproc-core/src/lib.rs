//! ndisproc Core - Device model, information codes, and miniport traits
//!
//! This crate provides the foundational types for ndisproc:
//! - NDIS information codes and status words
//! - Little-endian decoding of query results
//! - The shared per-device state and its parameter table
//! - Traits for the hardware abstraction and the liveness timer

pub mod device;
pub mod miniport;
pub mod oid;
pub mod settings;
pub mod wire;

pub use device::{
    BusType, Device, DeviceState, EncryptionInfo, EncryptionKey, KeyError, ENCODING_TOKEN_MAX,
    HANGCHECK_TICK, MAX_ENCR_KEYS,
};
pub use miniport::{query_value, HangcheckTimer, Miniport, NoHangcheck, PnpNotifier, QueryError};
pub use oid::{
    DevicePowerState, InfrastructureMode, NdisStatus, Oid, PnpEvent, PowerMode, PowerProfile,
};
pub use settings::{
    ConfigParam, DeviceSetting, ParameterStore, SettingEntry, SettingError, MAX_SETTING_NAME_LEN,
    MAX_SETTING_VALUE_LEN,
};
pub use wire::{Essid, FhConfiguration, MacAddress, NdisConfiguration, QueryValue, WirelessStats};

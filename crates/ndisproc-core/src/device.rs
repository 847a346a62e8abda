//! Device types for a managed wireless adapter

use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::miniport::{HangcheckTimer, Miniport};
use crate::oid::DevicePowerState;
use crate::settings::ParameterStore;

/// Number of key slots per adapter
pub const MAX_ENCR_KEYS: usize = 4;

/// Maximum key material length in bytes
pub const ENCODING_TOKEN_MAX: usize = 32;

/// Base unit of the hangcheck interval
pub const HANGCHECK_TICK: Duration = Duration::from_secs(1);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("Key index {0} out of range (max {max})", max = MAX_ENCR_KEYS)]
    BadIndex(usize),
    #[error("Key too long: {0} bytes (max {max})", max = ENCODING_TOKEN_MAX)]
    TooLong(usize),
}

/// Bus the adapter is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusType {
    #[default]
    Pci,
    Usb,
    Other,
}

impl BusType {
    /// Whether the bus layer implements suspend/resume
    pub fn supports_power_management(self) -> bool {
        self == Self::Pci
    }
}

/// One encryption key slot; a zero length means "off"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncryptionKey {
    length: usize,
    material: [u8; ENCODING_TOKEN_MAX],
}

impl Default for EncryptionKey {
    fn default() -> Self {
        Self {
            length: 0,
            material: [0; ENCODING_TOKEN_MAX],
        }
    }
}

impl EncryptionKey {
    pub fn new(bytes: &[u8]) -> Result<Self, KeyError> {
        if bytes.len() > ENCODING_TOKEN_MAX {
            return Err(KeyError::TooLong(bytes.len()));
        }
        let mut key = Self::default();
        key.material[..bytes.len()].copy_from_slice(bytes);
        key.length = bytes.len();
        Ok(key)
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_off(&self) -> bool {
        self.length == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.material[..self.length]
    }

    /// Upper-case hex of the key material, `None` when the key is off
    pub fn to_hex(&self) -> Option<String> {
        if self.is_off() {
            None
        } else {
            Some(hex::encode_upper(self.as_bytes()))
        }
    }
}

/// Key table with the index of the key used for transmit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EncryptionInfo {
    tx_key_index: usize,
    keys: [EncryptionKey; MAX_ENCR_KEYS],
}

impl EncryptionInfo {
    pub fn tx_key_index(&self) -> usize {
        self.tx_key_index
    }

    pub fn tx_key(&self) -> &EncryptionKey {
        &self.keys[self.tx_key_index]
    }

    pub fn key(&self, index: usize) -> Option<&EncryptionKey> {
        self.keys.get(index)
    }

    pub fn set_key(&mut self, index: usize, key: EncryptionKey) -> Result<(), KeyError> {
        let slot = self.keys.get_mut(index).ok_or(KeyError::BadIndex(index))?;
        *slot = key;
        Ok(())
    }

    pub fn set_tx_key_index(&mut self, index: usize) -> Result<(), KeyError> {
        if index >= MAX_ENCR_KEYS {
            return Err(KeyError::BadIndex(index));
        }
        self.tx_key_index = index;
        Ok(())
    }
}

/// Mutable per-device state shared between endpoints
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceState {
    /// Liveness timer period; zero disables it
    pub hangcheck_interval: Duration,
    pub encryption: EncryptionInfo,
    /// Last authentication mode applied to the hardware
    pub auth_mode: Option<u32>,
    /// Last encryption mode applied to the hardware
    pub encr_mode: Option<u32>,
    pub power_state: DevicePowerState,
    pub settings: ParameterStore,
}

impl DeviceState {
    /// Hangcheck interval in whole ticks
    pub fn hangcheck_ticks(&self) -> u64 {
        (self.hangcheck_interval.as_nanos() / HANGCHECK_TICK.as_nanos()) as u64
    }
}

/// One managed adapter instance
pub struct Device {
    /// External interface name (e.g. "wlan0")
    name: String,
    bus: BusType,
    miniport: Arc<dyn Miniport>,
    hangcheck: Arc<dyn HangcheckTimer>,
    state: RwLock<DeviceState>,
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("name", &self.name)
            .field("bus", &self.bus)
            .finish_non_exhaustive()
    }
}

impl Device {
    pub fn new(
        name: impl Into<String>,
        bus: BusType,
        miniport: Arc<dyn Miniport>,
        hangcheck: Arc<dyn HangcheckTimer>,
        state: DeviceState,
    ) -> Self {
        Self {
            name: name.into(),
            bus,
            miniport,
            hangcheck,
            state: RwLock::new(state),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bus(&self) -> BusType {
        self.bus
    }

    pub fn miniport(&self) -> &dyn Miniport {
        self.miniport.as_ref()
    }

    pub fn hangcheck(&self) -> &dyn HangcheckTimer {
        self.hangcheck.as_ref()
    }

    /// Shared access; a poisoned lock still yields the last written state
    pub fn state(&self) -> RwLockReadGuard<'_, DeviceState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Exclusive access for a single mutation
    pub fn state_mut(&self) -> RwLockWriteGuard<'_, DeviceState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Point-in-time copy of the state
    pub fn snapshot(&self) -> DeviceState {
        self.state().clone()
    }

    /// Arm the hangcheck timer with the stored interval
    pub fn start_hangcheck(&self) {
        let interval = self.state().hangcheck_interval;
        debug!(device = %self.name, interval_secs = interval.as_secs(), "Starting hangcheck");
        self.hangcheck.schedule(interval);
    }

    pub fn stop_hangcheck(&self) {
        self.hangcheck.cancel();
    }
}

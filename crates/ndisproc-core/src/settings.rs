//! Per-device configuration parameters
//!
//! Parameters come from the adapter's configuration file and are handed to
//! the driver on request. The store keeps them in load order; names compare
//! case-insensitively and the first match wins, so duplicates left by the
//! loader are tolerated.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum length of a parameter name
pub const MAX_SETTING_NAME_LEN: usize = 128;

/// Maximum length of a parameter value
pub const MAX_SETTING_VALUE_LEN: usize = 256;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettingError {
    #[error("Setting not found: {0}")]
    NotFound(String),
    #[error("Setting name too long: {len} bytes (max {max})")]
    NameTooLong { len: usize, max: usize },
    #[error("Setting value too long: {len} bytes (max {max})")]
    ValueTooLong { len: usize, max: usize },
}

/// Typed representation the driver last read a parameter as
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConfigParam {
    #[default]
    Unset,
    /// UTF-16 string handed to the driver
    String(Vec<u16>),
}

/// One named configuration parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSetting {
    pub name: String,
    pub value: String,
    pub param: ConfigParam,
}

/// Name/value pair as it appears in configuration files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingEntry {
    pub name: String,
    pub value: String,
}

/// Ordered parameter table owned by a device
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterStore {
    settings: Vec<DeviceSetting>,
}

impl ParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from loader entries, rejecting oversized names or values
    pub fn from_entries<'a>(
        entries: impl IntoIterator<Item = &'a SettingEntry>,
    ) -> Result<Self, SettingError> {
        let mut store = Self::new();
        for entry in entries {
            store.push(&entry.name, &entry.value)?;
        }
        Ok(store)
    }

    /// Append a parameter; duplicates are not checked
    pub fn push(&mut self, name: &str, value: &str) -> Result<(), SettingError> {
        if name.len() > MAX_SETTING_NAME_LEN {
            return Err(SettingError::NameTooLong {
                len: name.len(),
                max: MAX_SETTING_NAME_LEN,
            });
        }
        check_value(value)?;
        self.settings.push(DeviceSetting {
            name: name.to_string(),
            value: value.to_string(),
            param: ConfigParam::Unset,
        });
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&DeviceSetting> {
        self.settings
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
    }

    fn get_mut(&mut self, name: &str) -> Option<&mut DeviceSetting> {
        self.settings
            .iter_mut()
            .find(|s| s.name.eq_ignore_ascii_case(name))
    }

    /// Replace the value of the first parameter matching `name`
    ///
    /// The cached typed representation is dropped so the driver re-reads
    /// the new string. Nothing is modified on error.
    pub fn override_value(&mut self, name: &str, value: &str) -> Result<(), SettingError> {
        let setting = self
            .get_mut(name)
            .ok_or_else(|| SettingError::NotFound(name.to_string()))?;
        check_value(value)?;
        setting.value = value.to_string();
        setting.param = ConfigParam::Unset;
        Ok(())
    }

    /// Driver-side read of a parameter as a string, caching its typed form
    pub fn read_string(&mut self, name: &str) -> Option<&[u16]> {
        let setting = self.get_mut(name)?;
        if setting.param == ConfigParam::Unset {
            setting.param = ConfigParam::String(setting.value.encode_utf16().collect());
        }
        match &setting.param {
            ConfigParam::String(units) => Some(units.as_slice()),
            ConfigParam::Unset => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeviceSetting> {
        self.settings.iter()
    }

    pub fn len(&self) -> usize {
        self.settings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.settings.is_empty()
    }
}

fn check_value(value: &str) -> Result<(), SettingError> {
    if value.len() > MAX_SETTING_VALUE_LEN {
        return Err(SettingError::ValueTooLong {
            len: value.len(),
            max: MAX_SETTING_VALUE_LEN,
        });
    }
    Ok(())
}

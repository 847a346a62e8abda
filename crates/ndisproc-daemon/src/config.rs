//! Configuration loading and validation

use anyhow::Result;
use ndisproc_core::{BusType, SettingEntry};
use ndisproc_procfs::RegistryConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::sim::SimHardware;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub procfs: ProcfsConfig,
    #[serde(default, rename = "device")]
    pub devices: Vec<DeviceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Bind address for the HTTP endpoint server
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8086".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcfsConfig {
    /// Owner of every directory and entry
    #[serde(default)]
    pub uid: u32,
    #[serde(default)]
    pub gid: u32,
    /// Expose the process-wide debug entry
    #[serde(default = "default_true")]
    pub debug_entry: bool,
    /// Debug level at startup
    #[serde(default)]
    pub debug_level: u32,
    /// Highest accepted debug level
    #[serde(default = "default_debug_max")]
    pub debug_max: u32,
    /// Upper bound on directories plus entries
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

impl Default for ProcfsConfig {
    fn default() -> Self {
        Self {
            uid: 0,
            gid: 0,
            debug_entry: true,
            debug_level: 0,
            debug_max: default_debug_max(),
            max_entries: default_max_entries(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_debug_max() -> u32 {
    3
}

fn default_max_entries() -> usize {
    64
}

impl ProcfsConfig {
    pub fn to_registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            uid: self.uid,
            gid: self.gid,
            debug_entry: self.debug_entry,
            max_entries: self.max_entries,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Interface name, e.g. "wlan0"
    pub name: String,
    #[serde(default)]
    pub bus: BusType,
    /// Liveness check period in seconds (0 to disable)
    #[serde(default)]
    pub hangcheck_interval_secs: u32,
    /// Driver parameters in load order
    #[serde(default)]
    pub settings: Vec<SettingEntry>,
    /// Key material per slot as hex strings; empty means off
    #[serde(default)]
    pub keys: Vec<String>,
    #[serde(default)]
    pub tx_key: usize,
    /// Values served by the simulated miniport
    #[serde(default)]
    pub hardware: SimHardware,
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!(path = %path.display(), devices = config.devices.len(), "Loaded configuration");
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(Config::default())
    }
}

/// Save an example configuration to file
pub fn save_default_config(path: &Path) -> Result<()> {
    let config = Config {
        daemon: DaemonConfig::default(),
        procfs: ProcfsConfig::default(),
        devices: vec![DeviceConfig {
            name: "wlan0".to_string(),
            bus: BusType::Pci,
            hangcheck_interval_secs: 3,
            settings: vec![SettingEntry {
                name: "rate".to_string(),
                value: "11".to_string(),
            }],
            keys: Vec::new(),
            tx_key: 0,
            hardware: SimHardware::default(),
        }],
    };

    let content = toml::to_string_pretty(&config)?;
    std::fs::write(path, content)?;
    Ok(())
}

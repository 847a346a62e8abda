//! Application state management

use anyhow::{bail, Context, Result};
use ndisproc_core::{
    Device, DeviceState, EncryptionInfo, EncryptionKey, ParameterStore, HANGCHECK_TICK,
};
use ndisproc_procfs::{DebugLevel, ProcError, Registry};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::runtime::Handle;
use tracing::{error, info, warn};

use crate::config::{Config, DeviceConfig};
use crate::hangcheck::TokioHangcheck;
use crate::sim::SimMiniport;

struct Adapter {
    device: Arc<Device>,
    sim: Arc<SimMiniport>,
}

/// Device summary returned by the listing endpoint
#[derive(Debug, Clone, Serialize)]
pub struct DeviceSummary {
    pub name: String,
    pub bus: ndisproc_core::BusType,
    pub entries: Vec<String>,
    pub power_state: String,
    pub reinits: u32,
    pub pnp_events: usize,
}

/// Shared application state
pub struct AppState {
    /// Configuration
    pub config: Config,
    /// Endpoint namespace
    pub registry: Arc<Registry>,
    adapters: RwLock<BTreeMap<String, Adapter>>,
}

impl AppState {
    /// Create new application state and register every configured device
    pub async fn new(config: Config, debug: Arc<DebugLevel>) -> Result<Arc<Self>> {
        let registry_config = config.procfs.to_registry_config();
        let registry = match Registry::init(registry_config.clone(), debug.clone()) {
            Ok(registry) => registry,
            Err(e) => {
                error!(error = %e, "Couldn't create root namespace, endpoints disabled");
                Registry::without_root(registry_config, debug)
            }
        };

        let state = Arc::new(Self {
            config,
            registry: Arc::new(registry),
            adapters: RwLock::new(BTreeMap::new()),
        });

        let mut names = BTreeSet::new();
        for device_config in &state.config.devices {
            if !names.insert(device_config.name.as_str()) {
                bail!("Duplicate device '{}'", device_config.name);
            }
        }

        let runtime = Handle::current();
        for device_config in &state.config.devices {
            let (device, sim) = build_device(device_config, runtime.clone())
                .with_context(|| format!("Invalid device '{}'", device_config.name))?;
            state.register(device, sim);
        }

        Ok(state)
    }

    /// Register endpoints for a device and start its hangcheck timer
    ///
    /// A device whose endpoints could not be created still runs; its partial
    /// directory is torn down. A device whose name is already registered is
    /// dropped.
    fn register(&self, device: Arc<Device>, sim: Arc<SimMiniport>) {
        let name = device.name().to_string();
        match self.registry.add_device(device.clone()) {
            Ok(()) => {}
            // the existing directory belongs to another device
            Err(e @ ProcError::AlreadyExists(_)) => {
                warn!(device = %name, error = %e, "Couldn't create device endpoints");
                return;
            }
            Err(e) => {
                warn!(device = %name, error = %e, "Couldn't create device endpoints");
                self.registry.remove_device(&name);
            }
        }
        device.start_hangcheck();
        self.adapters
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, Adapter { device, sim });
    }

    /// Stop a device and remove its endpoints
    pub fn remove_device(&self, name: &str) -> bool {
        let adapter = self
            .adapters
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
        match adapter {
            Some(adapter) => {
                adapter.device.stop_hangcheck();
                self.registry.remove_device(name);
                info!(device = %name, "Device removed");
                true
            }
            None => false,
        }
    }

    /// Summaries of all managed devices
    pub fn devices(&self) -> Vec<DeviceSummary> {
        let adapters = self.adapters.read().unwrap_or_else(PoisonError::into_inner);
        adapters
            .iter()
            .map(|(name, adapter)| DeviceSummary {
                name: name.clone(),
                bus: adapter.device.bus(),
                entries: self
                    .registry
                    .entries(name)
                    .unwrap_or_default()
                    .iter()
                    .map(|e| e.name().to_string())
                    .collect(),
                power_state: format!("{:?}", adapter.sim.power_state()),
                reinits: adapter.sim.reinit_count(),
                pnp_events: adapter
                    .sim
                    .notifier()
                    .map(|n| n.events().len())
                    .unwrap_or(0),
            })
            .collect()
    }

    /// Stop every device and tear down the namespace
    pub fn shutdown(&self) {
        let adapters = std::mem::take(
            &mut *self.adapters.write().unwrap_or_else(PoisonError::into_inner),
        );
        for (name, adapter) in adapters {
            adapter.device.stop_hangcheck();
            self.registry.remove_device(&name);
        }
        self.registry.remove();
    }
}

/// Build the device model and simulated backend for one configured adapter
pub fn build_device(
    config: &DeviceConfig,
    runtime: Handle,
) -> Result<(Arc<Device>, Arc<SimMiniport>)> {
    let sim = Arc::new(SimMiniport::new(&config.name, &config.hardware)?);

    let mut encryption = EncryptionInfo::default();
    for (index, text) in config.keys.iter().enumerate() {
        let bytes = hex::decode(text).with_context(|| format!("Key {} is not hex", index))?;
        encryption.set_key(index, EncryptionKey::new(&bytes)?)?;
    }
    encryption.set_tx_key_index(config.tx_key)?;

    let state = DeviceState {
        hangcheck_interval: HANGCHECK_TICK * config.hangcheck_interval_secs,
        encryption,
        settings: ParameterStore::from_entries(&config.settings)?,
        ..Default::default()
    };

    let hangcheck = Arc::new(TokioHangcheck::new(&config.name, sim.clone(), runtime));
    let device = Arc::new(Device::new(
        config.name.clone(),
        config.bus,
        sim.clone(),
        hangcheck.clone(),
        state,
    ));
    hangcheck.attach(&device);
    Ok((device, sim))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::ProcfsConfig;
    use crate::sim::SimHardware;
    use ndisproc_core::{BusType, SettingEntry};
    use ndisproc_procfs::PAGE_SIZE;

    pub(crate) fn device_config(name: &str) -> DeviceConfig {
        DeviceConfig {
            name: name.to_string(),
            bus: BusType::Pci,
            hangcheck_interval_secs: 0,
            settings: vec![SettingEntry {
                name: "rate".into(),
                value: "11".into(),
            }],
            keys: vec![String::new(), "0badc0ffee".into()],
            tx_key: 1,
            hardware: SimHardware::default(),
        }
    }

    #[tokio::test]
    async fn test_registers_configured_devices() {
        let config = Config {
            devices: vec![device_config("wlan0"), device_config("wlan1")],
            ..Default::default()
        };
        let state = AppState::new(config, Arc::new(DebugLevel::new(0, 3))).await.unwrap();

        let devices = state.devices();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].entries, ["hw", "stats", "encr", "settings"]);
        assert_eq!(devices[0].power_state, "D0");

        let encr = state.registry.read("wlan0/encr", 0, PAGE_SIZE).unwrap();
        assert!(encr.data.contains("tx_key=1\nkey=0BADC0FFEE\n"));
    }

    #[tokio::test]
    async fn test_endpoint_failure_keeps_device() {
        let config = Config {
            procfs: ProcfsConfig {
                max_entries: 3,
                ..Default::default()
            },
            devices: vec![device_config("wlan0")],
            ..Default::default()
        };
        let state = AppState::new(config, Arc::new(DebugLevel::new(0, 3))).await.unwrap();

        assert!(state.registry.devices().is_empty());
        let devices = state.devices();
        assert_eq!(devices.len(), 1);
        assert!(devices[0].entries.is_empty());
    }

    #[tokio::test]
    async fn test_bad_key_is_rejected() {
        let mut device = device_config("wlan0");
        device.keys = vec!["zz".into()];
        let config = Config {
            devices: vec![device],
            ..Default::default()
        };
        assert!(AppState::new(config, Arc::default()).await.is_err());
    }

    #[tokio::test]
    async fn test_duplicate_device_name_rejected() {
        let config = Config {
            devices: vec![device_config("wlan0"), device_config("wlan0")],
            ..Default::default()
        };
        let err = AppState::new(config, Arc::default()).await.err().unwrap();
        assert!(err.to_string().contains("Duplicate device 'wlan0'"));
    }

    #[tokio::test]
    async fn test_register_keeps_existing_device() {
        let config = Config {
            devices: vec![device_config("wlan0")],
            ..Default::default()
        };
        let state = AppState::new(config, Arc::new(DebugLevel::new(0, 3))).await.unwrap();

        let (device, sim) = build_device(&device_config("wlan0"), Handle::current()).unwrap();
        state.register(device, sim);

        assert_eq!(state.registry.devices(), ["wlan0"]);
        assert!(state.registry.read("wlan0/settings", 0, PAGE_SIZE).is_ok());
        assert_eq!(state.devices().len(), 1);
    }

    #[tokio::test]
    async fn test_remove_and_shutdown() {
        let config = Config {
            devices: vec![device_config("wlan0"), device_config("wlan1")],
            ..Default::default()
        };
        let state = AppState::new(config, Arc::new(DebugLevel::new(0, 3))).await.unwrap();

        assert!(state.remove_device("wlan0"));
        assert!(!state.remove_device("wlan0"));
        assert_eq!(state.registry.devices(), ["wlan1"]);

        state.shutdown();
        assert!(state.devices().is_empty());
        assert!(!state.registry.has_root());
    }
}

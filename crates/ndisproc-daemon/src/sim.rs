//! Simulated miniport driven by configuration
//!
//! Stands in for a real driver so the endpoints can be served and exercised
//! without hardware. Every information code answers from a table built at
//! startup; sets overwrite the table, and the statistics counters advance on
//! each query as if traffic were flowing.

use anyhow::{bail, Context, Result};
use ndisproc_core::{
    wire::ESSID_MAX, DevicePowerState, Essid, FhConfiguration, MacAddress, Miniport,
    NdisConfiguration, NdisStatus, Oid, PnpEvent, PnpNotifier, WirelessStats,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info, warn};

/// Values the simulated adapter reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimHardware {
    /// Link speed in units of 100 bps
    pub link_speed: u32,
    pub ssid: Option<String>,
    /// Colon-separated access point address
    pub bssid: String,
    pub infrastructure_mode: u32,
    pub auth_mode: u32,
    pub encryption_status: u32,
    /// Transmit power in mW
    pub tx_power: u32,
    /// Signal strength in dBm
    pub rssi: i32,
    pub frag_threshold: u32,
    pub rts_threshold: u32,
    pub antennas: u32,
    pub rx_antenna: u32,
    pub tx_antenna: u32,
    pub beacon_period: u32,
    pub atim_window: u32,
    /// Channel frequency in kHz
    pub channel_khz: u32,
    pub power_mode: u32,
    /// Information codes the adapter refuses, by name (e.g. "Rssi")
    pub unsupported: Vec<String>,
    /// Driver registered a PnP notify handler
    pub pnp_handler: bool,
    /// Reject every set, suspend, and resume
    pub fail_commands: bool,
    /// Report a hang until the next reinitialization
    pub hung: bool,
}

impl Default for SimHardware {
    fn default() -> Self {
        Self {
            link_speed: 540_000,
            ssid: Some("ndiswrapper".to_string()),
            bssid: "00:11:22:33:44:55".to_string(),
            infrastructure_mode: 1,
            auth_mode: 0,
            encryption_status: 1,
            tx_power: 100,
            rssi: -52,
            frag_threshold: 2346,
            rts_threshold: 2347,
            antennas: 2,
            rx_antenna: 0,
            tx_antenna: 0,
            beacon_period: 100,
            atim_window: 0,
            channel_khz: 2_437_000,
            power_mode: 0,
            unsupported: Vec::new(),
            pnp_handler: true,
            fail_commands: false,
            hung: false,
        }
    }
}

const ALL_OIDS: [Oid; 16] = [
    Oid::GenLinkSpeed,
    Oid::Bssid,
    Oid::Ssid,
    Oid::InfrastructureMode,
    Oid::AuthenticationMode,
    Oid::EncryptionStatus,
    Oid::TxPowerLevel,
    Oid::Rssi,
    Oid::FragmentationThreshold,
    Oid::RtsThreshold,
    Oid::NumberOfAntennas,
    Oid::RxAntennaSelected,
    Oid::TxAntennaSelected,
    Oid::Configuration,
    Oid::PowerMode,
    Oid::Statistics,
];

fn parse_mac(text: &str) -> Result<MacAddress> {
    let raw = hex::decode(text.replace(':', "")).context("Invalid BSSID")?;
    let bytes: [u8; 6] = raw
        .try_into()
        .map_err(|_| anyhow::anyhow!("BSSID must be 6 bytes: {}", text))?;
    Ok(MacAddress(bytes))
}

/// PnP handler that logs and records what it was told
#[derive(Debug, Default)]
pub struct SimNotifier {
    device: String,
    events: Mutex<Vec<PnpEvent>>,
}

impl SimNotifier {
    pub fn events(&self) -> Vec<PnpEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl PnpNotifier for SimNotifier {
    fn notify(&self, event: PnpEvent) {
        info!(device = %self.device, event = ?event, "PnP notification");
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

#[derive(Debug)]
struct SimState {
    values: HashMap<Oid, Vec<u8>>,
    /// `None` when the adapter has no statistics support
    stats: Option<WirelessStats>,
    power: DevicePowerState,
    hung: bool,
    reinits: u32,
}

/// In-memory adapter
#[derive(Debug)]
pub struct SimMiniport {
    device: String,
    fail_commands: bool,
    notifier: Option<SimNotifier>,
    state: Mutex<SimState>,
}

impl SimMiniport {
    pub fn new(device: &str, hw: &SimHardware) -> Result<Self> {
        let mut values = HashMap::new();
        let bssid = parse_mac(&hw.bssid)?;
        let config = NdisConfiguration {
            beacon_period: hw.beacon_period,
            atim_window: hw.atim_window,
            ds_config: hw.channel_khz,
            fh_config: FhConfiguration::default(),
        };

        values.insert(Oid::GenLinkSpeed, hw.link_speed.to_le_bytes().to_vec());
        values.insert(Oid::Bssid, bssid.0.to_vec());
        if let Some(ssid) = &hw.ssid {
            if ssid.len() > ESSID_MAX {
                bail!("SSID longer than {} bytes", ESSID_MAX);
            }
            values.insert(Oid::Ssid, Essid::new(ssid.as_bytes()).encode());
        }
        for (oid, value) in [
            (Oid::InfrastructureMode, hw.infrastructure_mode),
            (Oid::AuthenticationMode, hw.auth_mode),
            (Oid::EncryptionStatus, hw.encryption_status),
            (Oid::TxPowerLevel, hw.tx_power),
            (Oid::Rssi, hw.rssi as u32),
            (Oid::FragmentationThreshold, hw.frag_threshold),
            (Oid::RtsThreshold, hw.rts_threshold),
            (Oid::NumberOfAntennas, hw.antennas),
            (Oid::RxAntennaSelected, hw.rx_antenna),
            (Oid::TxAntennaSelected, hw.tx_antenna),
            (Oid::PowerMode, hw.power_mode),
        ] {
            values.insert(oid, value.to_le_bytes().to_vec());
        }
        values.insert(Oid::Configuration, config.encode());

        for name in &hw.unsupported {
            let oid = ALL_OIDS
                .iter()
                .find(|oid| format!("{:?}", oid).eq_ignore_ascii_case(name))
                .with_context(|| format!("Unknown information code '{}'", name))?;
            values.remove(oid);
        }

        let stats_supported = !hw
            .unsupported
            .iter()
            .any(|name| name.eq_ignore_ascii_case("statistics"));

        debug!(device = %device, codes = values.len(), "Built simulated miniport");
        Ok(Self {
            device: device.to_string(),
            fail_commands: hw.fail_commands,
            notifier: hw.pnp_handler.then(|| SimNotifier {
                device: device.to_string(),
                events: Mutex::default(),
            }),
            state: Mutex::new(SimState {
                values,
                stats: stats_supported.then(WirelessStats::default),
                power: DevicePowerState::D0,
                hung: hw.hung,
                reinits: 0,
            }),
        })
    }

    fn state(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn power_state(&self) -> DevicePowerState {
        self.state().power
    }

    pub fn reinit_count(&self) -> u32 {
        self.state().reinits
    }

    pub fn notifier(&self) -> Option<&SimNotifier> {
        self.notifier.as_ref()
    }
}

impl Miniport for SimMiniport {
    fn query_info(&self, oid: Oid, len: usize) -> Result<Vec<u8>, NdisStatus> {
        let mut state = self.state();
        if oid == Oid::Statistics {
            let stats = state.stats.as_mut().ok_or(NdisStatus::NOT_SUPPORTED)?;
            stats.tx_frag += 12;
            stats.rx_frag += 30;
            stats.retry += 1;
            if stats.rx_frag % 300 == 0 {
                stats.fcs_err += 1;
            }
            return Ok(stats.encode());
        }

        let value = state.values.get(&oid).ok_or(NdisStatus::NOT_SUPPORTED)?;
        if value.len() > len {
            return Err(NdisStatus::BUFFER_TOO_SHORT);
        }
        Ok(value.clone())
    }

    fn set_info(&self, oid: Oid, data: &[u8]) -> Result<(), NdisStatus> {
        if self.fail_commands {
            return Err(NdisStatus::FAILURE);
        }
        let mut state = self.state();
        match state.values.get_mut(&oid) {
            Some(value) if value.len() == data.len() => {
                value.copy_from_slice(data);
                debug!(device = %self.device, oid = %oid, "Set information code");
                Ok(())
            }
            Some(_) => Err(NdisStatus::INVALID_LENGTH),
            None => Err(NdisStatus::NOT_SUPPORTED),
        }
    }

    fn suspend(&self, state: DevicePowerState) -> Result<(), NdisStatus> {
        if self.fail_commands {
            return Err(NdisStatus::FAILURE);
        }
        info!(device = %self.device, state = ?state, "Suspending adapter");
        self.state().power = state;
        Ok(())
    }

    fn resume(&self) -> Result<(), NdisStatus> {
        if self.fail_commands {
            return Err(NdisStatus::FAILURE);
        }
        info!(device = %self.device, "Resuming adapter");
        self.state().power = DevicePowerState::D0;
        Ok(())
    }

    fn reinit(&self) -> Result<(), NdisStatus> {
        let mut state = self.state();
        state.reinits += 1;
        state.hung = false;
        state.power = DevicePowerState::D0;
        warn!(device = %self.device, count = state.reinits, "Adapter reinitialized");
        Ok(())
    }

    fn pnp_notifier(&self) -> Option<&dyn PnpNotifier> {
        self.notifier.as_ref().map(|n| n as &dyn PnpNotifier)
    }

    fn check_for_hang(&self) -> bool {
        self.state().hung
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndisproc_core::{query_value, PowerProfile, QueryValue};

    #[test]
    fn test_default_answers() {
        let sim = SimMiniport::new("wlan0", &SimHardware::default()).unwrap();
        assert_eq!(sim.query_int(Oid::GenLinkSpeed).unwrap(), 540_000);
        let bssid: MacAddress = sim.query(Oid::Bssid).unwrap();
        assert_eq!(bssid.to_string(), "00:11:22:33:44:55");
        let essid: Essid = sim.query(Oid::Ssid).unwrap();
        assert_eq!(essid.name(), b"ndiswrapper");
        let rssi: i32 = sim.query(Oid::Rssi).unwrap();
        assert_eq!(rssi, -52);
        let config: NdisConfiguration = sim.query(Oid::Configuration).unwrap();
        assert_eq!(config.ds_config, 2_437_000);
    }

    #[test]
    fn test_statistics_advance() {
        let sim = SimMiniport::new("wlan0", &SimHardware::default()).unwrap();
        let first: WirelessStats = sim.query(Oid::Statistics).unwrap();
        let second: WirelessStats = sim.query(Oid::Statistics).unwrap();
        assert!(second.tx_frag > first.tx_frag);
        assert!(second.rx_frag > first.rx_frag);
    }

    #[test]
    fn test_unsupported_codes() {
        let hw = SimHardware {
            ssid: None,
            unsupported: vec!["rssi".into(), "Statistics".into()],
            ..Default::default()
        };
        let sim = SimMiniport::new("wlan0", &hw).unwrap();
        assert!(sim.query::<Essid>(Oid::Ssid).is_err());
        assert!(sim.query_int(Oid::Rssi).is_err());
        assert!(sim.query::<WirelessStats>(Oid::Statistics).is_err());
        assert!(sim.query_int(Oid::TxPowerLevel).is_ok());

        let bad = SimHardware {
            unsupported: vec!["Warp".into()],
            ..Default::default()
        };
        assert!(SimMiniport::new("wlan0", &bad).is_err());
    }

    #[test]
    fn test_short_caller_buffer() {
        let sim = SimMiniport::new("wlan0", &SimHardware::default()).unwrap();
        assert_eq!(
            sim.query_info(Oid::Configuration, 4),
            Err(NdisStatus::BUFFER_TOO_SHORT)
        );
        let dyn_sim: &dyn Miniport = &sim;
        let config = query_value::<NdisConfiguration, _>(dyn_sim, Oid::Configuration);
        assert!(config.is_ok());
        assert_eq!(<NdisConfiguration as QueryValue>::SIZE, 32);
    }

    #[test]
    fn test_set_and_power_transitions() {
        let sim = SimMiniport::new("wlan0", &SimHardware::default()).unwrap();
        sim.set_int(Oid::AuthenticationMode, 4).unwrap();
        assert_eq!(sim.query_int(Oid::AuthenticationMode).unwrap(), 4);
        assert_eq!(
            sim.set_info(Oid::AuthenticationMode, &[1, 2]),
            Err(NdisStatus::INVALID_LENGTH)
        );

        sim.suspend(DevicePowerState::D3).unwrap();
        assert_eq!(sim.power_state(), DevicePowerState::D3);
        sim.resume().unwrap();
        assert_eq!(sim.power_state(), DevicePowerState::D0);
    }

    #[test]
    fn test_failing_adapter() {
        let hw = SimHardware {
            fail_commands: true,
            pnp_handler: false,
            ..Default::default()
        };
        let sim = SimMiniport::new("wlan0", &hw).unwrap();
        assert_eq!(sim.set_int(Oid::EncryptionStatus, 2), Err(NdisStatus::FAILURE));
        assert_eq!(sim.suspend(DevicePowerState::D1), Err(NdisStatus::FAILURE));
        assert!(sim.pnp_notifier().is_none());
    }

    #[test]
    fn test_hang_cleared_by_reinit() {
        let hw = SimHardware {
            hung: true,
            ..Default::default()
        };
        let sim = SimMiniport::new("wlan0", &hw).unwrap();
        assert!(sim.check_for_hang());
        sim.reinit().unwrap();
        assert!(!sim.check_for_hang());
        assert_eq!(sim.reinit_count(), 1);
    }

    #[test]
    fn test_notifier_records_events() {
        let sim = SimMiniport::new("wlan0", &SimHardware::default()).unwrap();
        sim.pnp_notifier()
            .unwrap()
            .notify(PnpEvent::PowerProfileChanged(PowerProfile::Battery));
        assert_eq!(
            sim.notifier().unwrap().events(),
            vec![PnpEvent::PowerProfileChanged(PowerProfile::Battery)]
        );
    }

    #[test]
    fn test_bad_bssid() {
        let hw = SimHardware {
            bssid: "00:11:22".into(),
            ..Default::default()
        };
        assert!(SimMiniport::new("wlan0", &hw).is_err());
    }
}

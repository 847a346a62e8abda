//! Text reports rendered from live device state
//!
//! Every read re-queries the miniport. A failed query drops the line (or
//! block) it feeds; it never fails the read. Output is bounded by the
//! caller's capacity and only whole lines are ever emitted.

use ndisproc_core::{
    query_value, Device, Essid, InfrastructureMode, MacAddress, NdisConfiguration, Oid, PowerMode,
    QueryError, WirelessStats,
};
use std::fmt;
use tracing::{trace, warn};

/// Default read capacity, one page
pub const PAGE_SIZE: usize = 4096;

/// Result of reading an endpoint
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EntryRead {
    pub data: String,
    /// Output was cut at a line boundary because it exceeded the capacity
    pub truncated: bool,
}

impl EntryRead {
    /// Reads past offset zero are complete and empty
    pub fn eof() -> Self {
        Self::default()
    }
}

/// Line-oriented buffer that refuses to grow past its capacity
#[derive(Debug)]
pub struct ReportWriter {
    buf: String,
    capacity: usize,
    truncated: bool,
}

impl ReportWriter {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: String::new(),
            capacity,
            truncated: false,
        }
    }

    /// Append one line; once a line does not fit nothing more is written
    pub fn line(&mut self, args: fmt::Arguments<'_>) {
        if self.truncated {
            return;
        }
        let line = format!("{}\n", args);
        if self.buf.len() + line.len() > self.capacity {
            self.truncated = true;
            return;
        }
        self.buf.push_str(&line);
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn finish(self, device: &str, entry: &str) -> EntryRead {
        if self.truncated {
            warn!(
                device = %device,
                entry = %entry,
                written = self.buf.len(),
                limit = self.capacity,
                "Report truncated"
            );
        }
        EntryRead {
            data: self.buf,
            truncated: self.truncated,
        }
    }
}

fn omitted(device: &Device, err: &QueryError) {
    trace!(device = %device.name(), error = %err, "Query failed, omitting report line");
}

/// Hardware configuration report
pub fn render_hw(device: &Device, capacity: usize) -> EntryRead {
    let miniport = device.miniport();
    let mut w = ReportWriter::new(capacity);

    match query_value::<NdisConfiguration, _>(miniport, Oid::Configuration) {
        Ok(config) => {
            w.line(format_args!("beacon_period={} msec", config.beacon_period));
            w.line(format_args!("atim_window={} msec", config.atim_window));
            w.line(format_args!("frequency={} kHZ", config.ds_config));
            w.line(format_args!("hop_pattern={}", config.fh_config.hop_pattern));
            w.line(format_args!("hop_set={}", config.fh_config.hop_set));
            w.line(format_args!("dwell_time={} msec", config.fh_config.dwell_time));
        }
        Err(e) => omitted(device, &e),
    }

    match miniport.query_int(Oid::TxPowerLevel) {
        Ok(power) => w.line(format_args!("tx_power={} mW", power)),
        Err(e) => omitted(device, &e),
    }

    // link speed comes in units of 100 bps
    match miniport.query_int(Oid::GenLinkSpeed) {
        Ok(rate) => w.line(format_args!("bit_rate={} kBps", rate / 10)),
        Err(e) => omitted(device, &e),
    }

    match miniport.query_int(Oid::RtsThreshold) {
        Ok(bytes) => w.line(format_args!("rts_threshold={} bytes", bytes)),
        Err(e) => omitted(device, &e),
    }

    match miniport.query_int(Oid::FragmentationThreshold) {
        Ok(bytes) => w.line(format_args!("frag_threshold={} bytes", bytes)),
        Err(e) => omitted(device, &e),
    }

    match miniport.query_int(Oid::PowerMode) {
        Ok(mode) => w.line(format_args!(
            "power_mode={}",
            PowerMode::from_raw(mode).label()
        )),
        Err(e) => omitted(device, &e),
    }

    for (oid, key) in [
        (Oid::NumberOfAntennas, "num_antennas"),
        (Oid::TxAntennaSelected, "tx_antenna"),
        (Oid::RxAntennaSelected, "rx_antenna"),
    ] {
        match miniport.query_int(oid) {
            Ok(antenna) => w.line(format_args!("{}={}", key, antenna)),
            Err(e) => omitted(device, &e),
        }
    }

    w.finish(device.name(), "hw")
}

/// Statistics counters report
pub fn render_stats(device: &Device, capacity: usize) -> EntryRead {
    let miniport = device.miniport();
    let mut w = ReportWriter::new(capacity);

    match query_value::<i32, _>(miniport, Oid::Rssi) {
        Ok(rssi) => w.line(format_args!("signal_level={} dBm", rssi)),
        Err(e) => omitted(device, &e),
    }

    // all counters or none of them
    match query_value::<WirelessStats, _>(miniport, Oid::Statistics) {
        Ok(stats) => {
            let counters = [
                ("tx_frames", stats.tx_frag),
                ("tx_multicast_frames", stats.tx_multi_frag),
                ("tx_failed", stats.failed),
                ("tx_retry", stats.retry),
                ("tx_multi_rerty", stats.multi_retry),
                ("tx_rtss_success", stats.rtss_succ),
                ("tx_rtss_fail", stats.rtss_fail),
                ("ack_fail", stats.ack_fail),
                ("frame_duplicates", stats.frame_dup),
                ("rx_frames", stats.rx_frag),
                ("rx_multicast_frames", stats.rx_multi_frag),
                ("fcs_errors", stats.fcs_err),
            ];
            for (key, value) in counters {
                w.line(format_args!("{}={}", key, value));
            }
        }
        Err(e) => omitted(device, &e),
    }

    w.finish(device.name(), "stats")
}

/// Encryption and association report
pub fn render_encr(device: &Device, capacity: usize) -> EntryRead {
    let miniport = device.miniport();
    let mut w = ReportWriter::new(capacity);

    let ap_address = query_value::<MacAddress, _>(miniport, Oid::Bssid).unwrap_or_else(|e| {
        omitted(device, &e);
        MacAddress::ZERO
    });
    w.line(format_args!("ap_address={}", ap_address));

    match query_value::<Essid, _>(miniport, Oid::Ssid) {
        Ok(essid) => {
            // the name ends at the first NUL within the declared length
            let name = essid.name();
            let name = name.split(|&b| b == 0).next().unwrap_or(name);
            w.line(format_args!("essid={}", String::from_utf8_lossy(name)))
        }
        Err(e) => omitted(device, &e),
    }

    let status = miniport.query_int(Oid::EncryptionStatus);
    let auth_mode = miniport.query_int(Oid::AuthenticationMode);
    match (status, auth_mode) {
        (Ok(status), Ok(auth_mode)) => {
            let encryption = device.state().encryption;
            let key = encryption.tx_key();
            w.line(format_args!("tx_key={}", encryption.tx_key_index()));
            match key.to_hex() {
                Some(hex) => w.line(format_args!("key={}", hex)),
                None => w.line(format_args!("key=off")),
            }
            w.line(format_args!("status={}", status as i32));
            w.line(format_args!("auth_mode={}", auth_mode as i32));
        }
        (Err(e), _) | (_, Err(e)) => omitted(device, &e),
    }

    let mode = match miniport.query_int(Oid::InfrastructureMode) {
        Ok(raw) => InfrastructureMode::from_raw(raw),
        Err(e) => {
            omitted(device, &e);
            InfrastructureMode::Auto
        }
    };
    w.line(format_args!("mode={}", mode.label()));

    w.finish(device.name(), "encr")
}

/// Current settings: the hangcheck interval followed by every parameter
pub fn render_settings(device: &Device, capacity: usize) -> EntryRead {
    let mut w = ReportWriter::new(capacity);
    {
        let state = device.state();
        w.line(format_args!("hangcheck_interval={}", state.hangcheck_ticks()));
        for setting in state.settings.iter() {
            w.line(format_args!("{}={}", setting.name, setting.value));
        }
    }
    w.finish(device.name(), "settings")
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use ndisproc_core::{
        BusType, DevicePowerState, DeviceState, EncryptionKey, FhConfiguration, HangcheckTimer,
        Miniport, NdisStatus, NoHangcheck, ParameterStore, PnpEvent, PnpNotifier, QueryValue,
        HANGCHECK_TICK,
    };
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Miniport answering from a table and recording every command
    #[derive(Default)]
    pub struct FakeMiniport {
        pub answers: HashMap<Oid, Vec<u8>>,
        pub calls: Mutex<Vec<String>>,
        pub fail_commands: bool,
        pub notifier: Option<RecordingNotifier>,
    }

    #[derive(Default)]
    pub struct RecordingNotifier {
        pub events: Mutex<Vec<PnpEvent>>,
    }

    impl PnpNotifier for RecordingNotifier {
        fn notify(&self, event: PnpEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    impl FakeMiniport {
        pub fn with_int(mut self, oid: Oid, value: u32) -> Self {
            self.answers.insert(oid, value.to_le_bytes().to_vec());
            self
        }

        pub fn with_raw(mut self, oid: Oid, raw: Vec<u8>) -> Self {
            self.answers.insert(oid, raw);
            self
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: String) -> Result<(), NdisStatus> {
            self.calls.lock().unwrap().push(call);
            if self.fail_commands {
                Err(NdisStatus::FAILURE)
            } else {
                Ok(())
            }
        }
    }

    impl Miniport for FakeMiniport {
        fn query_info(&self, oid: Oid, _len: usize) -> Result<Vec<u8>, NdisStatus> {
            self.answers
                .get(&oid)
                .cloned()
                .ok_or(NdisStatus::NOT_SUPPORTED)
        }

        fn set_info(&self, oid: Oid, data: &[u8]) -> Result<(), NdisStatus> {
            self.record(format!("set {:?} {:?}", oid, data))
        }

        fn suspend(&self, state: DevicePowerState) -> Result<(), NdisStatus> {
            self.record(format!("suspend {:?}", state))
        }

        fn resume(&self) -> Result<(), NdisStatus> {
            self.record("resume".to_string())
        }

        fn reinit(&self) -> Result<(), NdisStatus> {
            self.record("reinit".to_string())
        }

        fn pnp_notifier(&self) -> Option<&dyn PnpNotifier> {
            self.notifier.as_ref().map(|n| n as &dyn PnpNotifier)
        }
    }

    /// Timer recording cancel/schedule calls
    #[derive(Default)]
    pub struct RecordingTimer {
        pub calls: Mutex<Vec<Option<Duration>>>,
    }

    impl HangcheckTimer for RecordingTimer {
        fn cancel(&self) {
            self.calls.lock().unwrap().push(None);
        }

        fn schedule(&self, interval: Duration) {
            self.calls.lock().unwrap().push(Some(interval));
        }
    }

    pub fn device_with(miniport: FakeMiniport, bus: BusType) -> (Device, Arc<FakeMiniport>) {
        let miniport = Arc::new(miniport);
        let mut settings = ParameterStore::new();
        settings.push("rate", "11").unwrap();
        let state = DeviceState {
            hangcheck_interval: HANGCHECK_TICK * 3,
            settings,
            ..Default::default()
        };
        let device = Device::new(
            "wlan0",
            bus,
            miniport.clone(),
            Arc::new(NoHangcheck),
            state,
        );
        (device, miniport)
    }

    fn full_miniport() -> FakeMiniport {
        let config = NdisConfiguration {
            beacon_period: 100,
            atim_window: 0,
            ds_config: 2_437_000,
            fh_config: FhConfiguration {
                hop_pattern: 0,
                hop_set: 0,
                dwell_time: 0,
            },
        };
        let mut essid = vec![0u8; <Essid as QueryValue>::SIZE];
        essid[..4].copy_from_slice(&6u32.to_le_bytes());
        essid[4..10].copy_from_slice(b"office");
        FakeMiniport::default()
            .with_raw(Oid::Configuration, config.encode())
            .with_int(Oid::TxPowerLevel, 100)
            .with_int(Oid::GenLinkSpeed, 540_000)
            .with_int(Oid::RtsThreshold, 2347)
            .with_int(Oid::FragmentationThreshold, 2346)
            .with_int(Oid::PowerMode, 1)
            .with_int(Oid::NumberOfAntennas, 2)
            .with_int(Oid::TxAntennaSelected, 1)
            .with_int(Oid::RxAntennaSelected, 0)
            .with_raw(Oid::Bssid, vec![0x00, 0x11, 0x22, 0xaa, 0xbb, 0xcc])
            .with_raw(Oid::Ssid, essid)
            .with_int(Oid::EncryptionStatus, 1)
            .with_int(Oid::AuthenticationMode, 0)
            .with_int(Oid::InfrastructureMode, 1)
            .with_int(Oid::Rssi, (-61i32) as u32)
            .with_raw(
                Oid::Statistics,
                WirelessStats {
                    tx_frag: 120,
                    rx_frag: 300,
                    fcs_err: 4,
                    ..Default::default()
                }
                .encode(),
            )
    }

    #[test]
    fn test_hw_report() {
        let (device, _) = device_with(full_miniport(), BusType::Pci);
        let read = render_hw(&device, PAGE_SIZE);
        assert!(!read.truncated);
        assert_eq!(
            read.data,
            "beacon_period=100 msec\n\
             atim_window=0 msec\n\
             frequency=2437000 kHZ\n\
             hop_pattern=0\n\
             hop_set=0\n\
             dwell_time=0 msec\n\
             tx_power=100 mW\n\
             bit_rate=54000 kBps\n\
             rts_threshold=2347 bytes\n\
             frag_threshold=2346 bytes\n\
             power_mode=max_savings\n\
             num_antennas=2\n\
             tx_antenna=1\n\
             rx_antenna=0\n"
        );
    }

    #[test]
    fn test_hw_report_omits_failed_queries() {
        let miniport = FakeMiniport::default()
            .with_int(Oid::TxPowerLevel, 20)
            .with_int(Oid::PowerMode, 0);
        let (device, _) = device_with(miniport, BusType::Pci);
        let read = render_hw(&device, PAGE_SIZE);
        assert_eq!(read.data, "tx_power=20 mW\npower_mode=always_on\n");
    }

    #[test]
    fn test_stats_block_is_atomic() {
        let miniport = FakeMiniport::default().with_int(Oid::Rssi, (-70i32) as u32);
        let (device, _) = device_with(miniport, BusType::Pci);
        let read = render_stats(&device, PAGE_SIZE);
        assert_eq!(read.data, "signal_level=-70 dBm\n");

        // short statistics buffer counts as a failed query
        let miniport = FakeMiniport::default().with_raw(Oid::Statistics, vec![0; 40]);
        let (device, _) = device_with(miniport, BusType::Pci);
        assert_eq!(render_stats(&device, PAGE_SIZE).data, "");
    }

    #[test]
    fn test_stats_report() {
        let (device, _) = device_with(full_miniport(), BusType::Pci);
        let read = render_stats(&device, PAGE_SIZE);
        let lines: Vec<&str> = read.data.lines().collect();
        assert_eq!(lines.len(), 13);
        assert_eq!(lines[0], "signal_level=-61 dBm");
        assert_eq!(lines[1], "tx_frames=120");
        assert_eq!(lines[5], "tx_multi_rerty=0");
        assert_eq!(lines[10], "rx_frames=300");
        assert_eq!(lines[12], "fcs_errors=4");
    }

    #[test]
    fn test_encr_report_key_off() {
        let (device, _) = device_with(full_miniport(), BusType::Pci);
        let read = render_encr(&device, PAGE_SIZE);
        assert_eq!(
            read.data,
            "ap_address=00:11:22:AA:BB:CC\n\
             essid=office\n\
             tx_key=0\n\
             key=off\n\
             status=1\n\
             auth_mode=0\n\
             mode=managed\n"
        );
    }

    #[test]
    fn test_encr_report_key_hex() {
        let (device, _) = device_with(full_miniport(), BusType::Pci);
        {
            let mut state = device.state_mut();
            let key = EncryptionKey::new(&[0xde, 0xad, 0xbe, 0xef, 0x01]).unwrap();
            state.encryption.set_key(1, key).unwrap();
            state.encryption.set_tx_key_index(1).unwrap();
        }
        let read = render_encr(&device, PAGE_SIZE);
        assert!(read.data.contains("tx_key=1\nkey=DEADBEEF01\n"));
    }

    #[test]
    fn test_encr_essid_stops_at_nul() {
        let mut essid = vec![0u8; <Essid as QueryValue>::SIZE];
        essid[..4].copy_from_slice(&8u32.to_le_bytes());
        essid[4..12].copy_from_slice(b"lab\0junk");
        let miniport = full_miniport().with_raw(Oid::Ssid, essid);
        let (device, _) = device_with(miniport, BusType::Pci);
        let read = render_encr(&device, PAGE_SIZE);
        assert!(read.data.contains("\nessid=lab\ntx_key=0\n"));
    }

    #[test]
    fn test_encr_report_defaults() {
        let miniport = FakeMiniport::default()
            .with_int(Oid::EncryptionStatus, 1)
            .with_int(Oid::InfrastructureMode, 7);
        let (device, _) = device_with(miniport, BusType::Pci);
        let read = render_encr(&device, PAGE_SIZE);
        // auth mode query failed, so the whole key group is dropped
        assert_eq!(read.data, "ap_address=00:00:00:00:00:00\nmode=auto\n");
    }

    #[test]
    fn test_encr_report_adhoc() {
        let miniport = full_miniport().with_int(Oid::InfrastructureMode, 0);
        let (device, _) = device_with(miniport, BusType::Pci);
        assert!(render_encr(&device, PAGE_SIZE).data.ends_with("mode=adhoc\n"));
    }

    #[test]
    fn test_settings_report() {
        let (device, _) = device_with(FakeMiniport::default(), BusType::Pci);
        let read = render_settings(&device, PAGE_SIZE);
        assert_eq!(read.data, "hangcheck_interval=3\nrate=11\n");
    }

    #[test]
    fn test_truncation_keeps_whole_lines() {
        let (device, _) = device_with(full_miniport(), BusType::Pci);
        let read = render_hw(&device, 45);
        assert!(read.truncated);
        assert_eq!(read.data, "beacon_period=100 msec\natim_window=0 msec\n");
        assert!(read.data.len() <= 45);
    }

    #[test]
    fn test_writer_stops_after_overflow() {
        let mut w = ReportWriter::new(6);
        w.line(format_args!("abcdefgh"));
        w.line(format_args!("a"));
        assert!(w.is_truncated());
        let read = w.finish("wlan0", "hw");
        assert_eq!(read.data, "");
        assert!(read.truncated);
    }
}

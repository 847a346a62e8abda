//! Little-endian decoding of the structures returned by information queries
//!
//! Each type knows the buffer size it asks the miniport for and how to
//! decode the returned bytes. A buffer shorter than the declared size is
//! rejected rather than padded.

use std::fmt;

/// Maximum SSID length in bytes
pub const ESSID_MAX: usize = 32;

/// A value that can be retrieved with a single information query
pub trait QueryValue: Sized {
    /// Buffer size requested from the miniport
    const SIZE: usize;

    /// Decode from a buffer of at least `SIZE` bytes
    fn decode(buf: &[u8]) -> Option<Self>;
}

fn u32_at(buf: &[u8], offset: usize) -> Option<u32> {
    let bytes = buf.get(offset..offset + 4)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn u64_at(buf: &[u8], offset: usize) -> Option<u64> {
    let bytes = buf.get(offset..offset + 8)?;
    let mut raw = [0u8; 8];
    raw.copy_from_slice(bytes);
    Some(u64::from_le_bytes(raw))
}

impl QueryValue for u32 {
    const SIZE: usize = 4;

    fn decode(buf: &[u8]) -> Option<Self> {
        u32_at(buf, 0)
    }
}

impl QueryValue for i32 {
    const SIZE: usize = 4;

    fn decode(buf: &[u8]) -> Option<Self> {
        u32_at(buf, 0).map(|v| v as i32)
    }
}

/// Hardware (MAC) address of the associated access point or peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    pub const ZERO: Self = Self([0; 6]);
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = &self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

impl QueryValue for MacAddress {
    const SIZE: usize = 6;

    fn decode(buf: &[u8]) -> Option<Self> {
        let bytes = buf.get(..6)?;
        let mut addr = [0u8; 6];
        addr.copy_from_slice(bytes);
        Some(Self(addr))
    }
}

/// Network name with its driver-declared length
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Essid {
    /// Length as declared by the driver, not yet bounded
    pub length: u32,
    pub bytes: [u8; ESSID_MAX],
}

impl Essid {
    pub fn new(name: &[u8]) -> Self {
        let len = name.len().min(ESSID_MAX);
        let mut bytes = [0u8; ESSID_MAX];
        bytes[..len].copy_from_slice(&name[..len]);
        Self {
            length: len as u32,
            bytes,
        }
    }

    /// The name bytes, never reaching past the declared length or the buffer
    pub fn name(&self) -> &[u8] {
        let len = (self.length as usize).min(ESSID_MAX);
        &self.bytes[..len]
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = self.length.to_le_bytes().to_vec();
        buf.extend_from_slice(&self.bytes);
        buf
    }
}

impl QueryValue for Essid {
    const SIZE: usize = 4 + ESSID_MAX;

    fn decode(buf: &[u8]) -> Option<Self> {
        let length = u32_at(buf, 0)?;
        let mut bytes = [0u8; ESSID_MAX];
        bytes.copy_from_slice(buf.get(4..4 + ESSID_MAX)?);
        Some(Self { length, bytes })
    }
}

/// Frequency-hopping parameters of a radio configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FhConfiguration {
    pub hop_pattern: u32,
    pub hop_set: u32,
    pub dwell_time: u32,
}

/// Radio configuration reported by `Oid::Configuration`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NdisConfiguration {
    pub beacon_period: u32,
    pub atim_window: u32,
    /// Channel frequency in kHz
    pub ds_config: u32,
    pub fh_config: FhConfiguration,
}

impl NdisConfiguration {
    pub fn encode(&self) -> Vec<u8> {
        let words = [
            Self::SIZE as u32,
            self.beacon_period,
            self.atim_window,
            self.ds_config,
            16,
            self.fh_config.hop_pattern,
            self.fh_config.hop_set,
            self.fh_config.dwell_time,
        ];
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }
}

impl QueryValue for NdisConfiguration {
    // length, beacon, atim, ds, then fh { length, pattern, set, dwell }
    const SIZE: usize = 32;

    fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < Self::SIZE {
            return None;
        }
        Some(Self {
            beacon_period: u32_at(buf, 4)?,
            atim_window: u32_at(buf, 8)?,
            ds_config: u32_at(buf, 12)?,
            fh_config: FhConfiguration {
                hop_pattern: u32_at(buf, 20)?,
                hop_set: u32_at(buf, 24)?,
                dwell_time: u32_at(buf, 28)?,
            },
        })
    }
}

/// 802.11 counters reported by `Oid::Statistics`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WirelessStats {
    pub tx_frag: u64,
    pub tx_multi_frag: u64,
    pub failed: u64,
    pub retry: u64,
    pub multi_retry: u64,
    pub rtss_succ: u64,
    pub rtss_fail: u64,
    pub ack_fail: u64,
    pub frame_dup: u64,
    pub rx_frag: u64,
    pub rx_multi_frag: u64,
    pub fcs_err: u64,
}

impl WirelessStats {
    pub fn encode(&self) -> Vec<u8> {
        let words = [
            Self::SIZE as u64,
            self.tx_frag,
            self.tx_multi_frag,
            self.failed,
            self.retry,
            self.multi_retry,
            self.rtss_succ,
            self.rtss_fail,
            self.ack_fail,
            self.frame_dup,
            self.rx_frag,
            self.rx_multi_frag,
            self.fcs_err,
        ];
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }
}

impl QueryValue for WirelessStats {
    const SIZE: usize = 13 * 8;

    fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < Self::SIZE {
            return None;
        }
        let field = |n: usize| u64_at(buf, 8 * (n + 1));
        Some(Self {
            tx_frag: field(0)?,
            tx_multi_frag: field(1)?,
            failed: field(2)?,
            retry: field(3)?,
            multi_retry: field(4)?,
            rtss_succ: field(5)?,
            rtss_fail: field(6)?,
            ack_fail: field(7)?,
            frame_dup: field(8)?,
            rx_frag: field(9)?,
            rx_multi_frag: field(10)?,
            fcs_err: field(11)?,
        })
    }
}

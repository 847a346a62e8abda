//! Settings commands written to a device's `settings` entry
//!
//! One write carries one command, `name` or `name=value`. Every check runs
//! before anything is touched, and state is only recorded after the
//! hardware accepted the change, so a rejected write leaves the device as
//! it was.

use ndisproc_core::{
    Device, DevicePowerState, NdisStatus, Oid, PnpEvent, PowerProfile, SettingError,
    HANGCHECK_TICK,
};
use tracing::{debug, info, warn};

use crate::debug::DebugLevel;
use crate::error::ProcError;

/// Longest accepted write, in bytes
pub const MAX_PROC_STR_LEN: usize = 32;

/// A parsed settings write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Hangcheck(i64),
    Suspend(i64),
    Resume,
    Reinit,
    PowerProfile(i64),
    AuthMode(i64),
    EncrMode(i64),
    Override { name: String, value: String },
}

impl Command {
    /// Parse one write. Length is checked before anything else.
    pub fn parse(input: &[u8]) -> Result<Self, ProcError> {
        let line = bounded_str(input)?;
        let line = match line.find('\n') {
            Some(end) => &line[..end],
            None => line,
        };
        let (name, arg) = match line.split_once('=') {
            Some((name, arg)) => (name, Some(arg)),
            None => (line, None),
        };

        let int_arg = |command: &'static str| {
            arg.map(parse_int)
                .ok_or(ProcError::MissingArgument(command))
        };

        let command = match name {
            "hangcheck_interval" => Self::Hangcheck(int_arg("hangcheck_interval")?),
            "suspend" => Self::Suspend(int_arg("suspend")?),
            "resume" => Self::Resume,
            "reinit" => Self::Reinit,
            "power_profile" => Self::PowerProfile(int_arg("power_profile")?),
            "auth_mode" => Self::AuthMode(int_arg("auth_mode")?),
            "encr_mode" => Self::EncrMode(int_arg("encr_mode")?),
            _ => {
                let value = arg.ok_or(ProcError::MissingArgument("setting"))?;
                Self::Override {
                    name: name.to_string(),
                    value: value.to_string(),
                }
            }
        };
        Ok(command)
    }

    /// Name as written by the client
    pub fn name(&self) -> &str {
        match self {
            Self::Hangcheck(_) => "hangcheck_interval",
            Self::Suspend(_) => "suspend",
            Self::Resume => "resume",
            Self::Reinit => "reinit",
            Self::PowerProfile(_) => "power_profile",
            Self::AuthMode(_) => "auth_mode",
            Self::EncrMode(_) => "encr_mode",
            Self::Override { name, .. } => name,
        }
    }

    /// Apply to `device`. Range checks run before any side effect.
    pub fn apply(&self, device: &Device, debug: &DebugLevel) -> Result<(), ProcError> {
        match self {
            Self::Hangcheck(secs) => {
                let secs = in_range("hangcheck_interval", *secs, 0, u32::MAX as i64)?;
                let interval = HANGCHECK_TICK * secs as u32;
                let mut state = device.state_mut();
                device.hangcheck().cancel();
                state.hangcheck_interval = interval;
                device.hangcheck().schedule(interval);
                info!(device = %device.name(), secs = secs, "Hangcheck interval changed");
            }
            Self::Suspend(level) => {
                let power_state =
                    DevicePowerState::from_level(*level).ok_or(ProcError::OutOfRange {
                        command: "suspend",
                        value: *level,
                    })?;
                if !device.bus().supports_power_management() {
                    debug!(device = %device.name(), bus = ?device.bus(), "Suspend ignored on this bus");
                    return Ok(());
                }
                let mut state = device.state_mut();
                device
                    .miniport()
                    .suspend(power_state)
                    .map_err(|status| hardware_failure(device, "suspend", status))?;
                state.power_state = power_state;
            }
            Self::Resume => {
                if !device.bus().supports_power_management() {
                    debug!(device = %device.name(), bus = ?device.bus(), "Resume ignored on this bus");
                    return Ok(());
                }
                let mut state = device.state_mut();
                device
                    .miniport()
                    .resume()
                    .map_err(|status| hardware_failure(device, "resume", status))?;
                state.power_state = DevicePowerState::D0;
            }
            Self::Reinit => {
                let _state = device.state_mut();
                device
                    .miniport()
                    .reinit()
                    .map_err(|status| hardware_failure(device, "reinit", status))?;
                info!(device = %device.name(), "Device reinitialized");
            }
            Self::PowerProfile(value) => {
                let value = in_range("power_profile", *value, 0, 1)?;
                let notifier = device
                    .miniport()
                    .pnp_notifier()
                    .ok_or(ProcError::NoPnpHandler)?;
                let profile = if value == 1 {
                    PowerProfile::AcOnLine
                } else {
                    PowerProfile::Battery
                };
                notifier.notify(PnpEvent::PowerProfileChanged(profile));
                debug!(device = %device.name(), profile = ?profile, "Power profile notified");
            }
            Self::AuthMode(mode) => {
                let mode = in_range("auth_mode", *mode, 1, 5)? as u32;
                let mut state = device.state_mut();
                device
                    .miniport()
                    .set_int(Oid::AuthenticationMode, mode)
                    .map_err(|status| hardware_failure(device, "auth_mode", status))?;
                state.auth_mode = Some(mode);
            }
            Self::EncrMode(mode) => {
                let mode = in_range("encr_mode", *mode, 1, 7)? as u32;
                let mut state = device.state_mut();
                device
                    .miniport()
                    .set_int(Oid::EncryptionStatus, mode)
                    .map_err(|status| hardware_failure(device, "encr_mode", status))?;
                state.encr_mode = Some(mode);
            }
            Self::Override { name, value } => {
                if debug.enabled(1) {
                    debug!(device = %device.name(), name = %name, value = %value, "Overriding setting");
                }
                device
                    .state_mut()
                    .settings
                    .override_value(name, value)
                    .map_err(|e| match e {
                        SettingError::NotFound(name) => ProcError::UnknownSetting(name),
                        SettingError::ValueTooLong { len, max } => ProcError::ValueTooLong { len, max },
                        other => ProcError::InvalidInput(other.to_string()),
                    })?;
            }
        }
        Ok(())
    }
}

/// Parse and apply one write, returning the number of bytes consumed
pub fn write_settings(device: &Device, input: &[u8], debug: &DebugLevel) -> Result<usize, ProcError> {
    let command = Command::parse(input)?;
    if debug.enabled(2) {
        debug!(device = %device.name(), command = command.name(), "Applying settings command");
    }
    command.apply(device, debug)?;
    Ok(input.len())
}

/// Decode a write, rejecting oversized or non-UTF-8 input
pub(crate) fn bounded_str(input: &[u8]) -> Result<&str, ProcError> {
    if input.len() > MAX_PROC_STR_LEN {
        return Err(ProcError::InputTooLong {
            len: input.len(),
            max: MAX_PROC_STR_LEN,
        });
    }
    std::str::from_utf8(input).map_err(|e| ProcError::InvalidInput(e.to_string()))
}

/// Base-10 integer parse that tolerates junk: leading whitespace and an
/// optional sign, then digits up to the first non-digit. No digits is 0.
pub fn parse_int(s: &str) -> i64 {
    let s = s.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let mut value: i64 = 0;
    for b in digits.bytes().take_while(u8::is_ascii_digit) {
        value = value.saturating_mul(10).saturating_add(i64::from(b - b'0'));
    }
    if negative {
        -value
    } else {
        value
    }
}

fn in_range(command: &'static str, value: i64, min: i64, max: i64) -> Result<i64, ProcError> {
    if (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(ProcError::OutOfRange { command, value })
    }
}

fn hardware_failure(
    device: &Device,
    command: &'static str,
    status: NdisStatus,
) -> ProcError {
    warn!(device = %device.name(), command = command, status = %status, "Hardware rejected command");
    ProcError::Hardware { command, status }
}

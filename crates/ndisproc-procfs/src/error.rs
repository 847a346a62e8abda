//! Errors surfaced by endpoint reads, writes, and registration

use ndisproc_core::NdisStatus;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcError {
    #[error("Input too long: {len} bytes (max {max})")]
    InputTooLong { len: usize, max: usize },
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Missing argument for '{0}'")]
    MissingArgument(&'static str),
    #[error("Value {value} out of range for '{command}'")]
    OutOfRange { command: &'static str, value: i64 },
    #[error("Unknown setting: {0}")]
    UnknownSetting(String),
    #[error("Setting value too long: {len} bytes (max {max})")]
    ValueTooLong { len: usize, max: usize },
    #[error("'{command}' failed with status {status}")]
    Hardware {
        command: &'static str,
        status: NdisStatus,
    },
    #[error("Driver has no PnP notify handler")]
    NoPnpHandler,
    #[error("Root namespace does not exist")]
    NoRoot,
    #[error("Entry already exists: {0}")]
    AlreadyExists(String),
    #[error("Namespace entry limit reached ({0})")]
    EntryLimit(usize),
    #[error("No such entry: {0}")]
    NotFound(String),
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("Entry has been removed: {0}")]
    Removed(String),
}

impl ProcError {
    /// Classic errno value for transports that report one
    pub fn errno(&self) -> i32 {
        const EINVAL: i32 = 22;
        const EFAULT: i32 = 14;
        const ENOMEM: i32 = 12;
        const ENOENT: i32 = 2;
        const EACCES: i32 = 13;
        const EEXIST: i32 = 17;
        const ENODEV: i32 = 19;

        match self {
            Self::NoPnpHandler => EFAULT,
            Self::NoRoot | Self::EntryLimit(_) => ENOMEM,
            Self::AlreadyExists(_) => EEXIST,
            Self::NotFound(_) => ENOENT,
            Self::PermissionDenied(_) => EACCES,
            Self::Removed(_) => ENODEV,
            _ => EINVAL,
        }
    }

    /// Rejected input rather than a hardware or namespace problem
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InputTooLong { .. }
                | Self::InvalidInput(_)
                | Self::MissingArgument(_)
                | Self::OutOfRange { .. }
                | Self::UnknownSetting(_)
                | Self::ValueTooLong { .. }
        )
    }
}

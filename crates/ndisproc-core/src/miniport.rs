//! Collaborator traits: the miniport (hardware abstraction) and the hangcheck timer

use std::time::Duration;
use thiserror::Error;

use crate::oid::{DevicePowerState, NdisStatus, Oid, PnpEvent};
use crate::wire::QueryValue;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("Query {oid} failed with status {status}")]
    Status { oid: Oid, status: NdisStatus },
    #[error("Query {oid} returned {got} bytes, expected {expected}")]
    ShortBuffer { oid: Oid, expected: usize, got: usize },
}

impl QueryError {
    /// Status word equivalent of this failure
    pub fn status(&self) -> NdisStatus {
        match self {
            Self::Status { status, .. } => *status,
            Self::ShortBuffer { .. } => NdisStatus::INVALID_LENGTH,
        }
    }
}

/// Receives plug-and-play notifications for a miniport
pub trait PnpNotifier: Send + Sync {
    fn notify(&self, event: PnpEvent);
}

/// Hardware abstraction over one adapter's driver
///
/// All calls are synchronous and may block for the duration of the
/// underlying driver request.
pub trait Miniport: Send + Sync {
    /// Query `oid` with a buffer of `len` bytes
    fn query_info(&self, oid: Oid, len: usize) -> Result<Vec<u8>, NdisStatus>;

    /// Set `oid` to the given raw value
    fn set_info(&self, oid: Oid, data: &[u8]) -> Result<(), NdisStatus>;

    /// Bus-level suspend into the given power state
    fn suspend(&self, state: DevicePowerState) -> Result<(), NdisStatus>;

    /// Bus-level resume back to `D0`
    fn resume(&self) -> Result<(), NdisStatus>;

    /// Halt and reinitialize the adapter
    fn reinit(&self) -> Result<(), NdisStatus>;

    /// The driver's PnP notify handler, if it registered one
    fn pnp_notifier(&self) -> Option<&dyn PnpNotifier>;

    /// Ask the driver whether the adapter stopped responding
    fn check_for_hang(&self) -> bool {
        false
    }

    /// Typed query
    fn query<T: QueryValue>(&self, oid: Oid) -> Result<T, QueryError>
    where
        Self: Sized,
    {
        query_value(self, oid)
    }

    fn query_int(&self, oid: Oid) -> Result<u32, QueryError> {
        query_value(self, oid)
    }

    fn set_int(&self, oid: Oid, value: u32) -> Result<(), NdisStatus> {
        self.set_info(oid, &value.to_le_bytes())
    }
}

/// Typed query usable through `&dyn Miniport`
pub fn query_value<T: QueryValue, M: Miniport + ?Sized>(
    miniport: &M,
    oid: Oid,
) -> Result<T, QueryError> {
    let buf = miniport
        .query_info(oid, T::SIZE)
        .map_err(|status| QueryError::Status { oid, status })?;
    T::decode(&buf).ok_or(QueryError::ShortBuffer {
        oid,
        expected: T::SIZE,
        got: buf.len(),
    })
}

/// Periodic liveness check for one adapter
pub trait HangcheckTimer: Send + Sync {
    /// Stop the timer; a no-op when it is not armed
    fn cancel(&self);

    /// Arm the timer with the given period; `Duration::ZERO` leaves it disarmed
    fn schedule(&self, interval: Duration);
}

/// Timer that never fires, for adapters without liveness checking
#[derive(Debug, Default)]
pub struct NoHangcheck;

impl HangcheckTimer for NoHangcheck {
    fn cancel(&self) {}

    fn schedule(&self, _interval: Duration) {}
}

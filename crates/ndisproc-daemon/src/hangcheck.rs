//! Hangcheck timer backed by a tokio interval task

use ndisproc_core::{Device, HangcheckTimer, Miniport};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, warn};

/// Periodically asks the miniport whether it hung and reinitializes it if so
pub struct TokioHangcheck {
    device: String,
    miniport: Arc<dyn Miniport>,
    runtime: Handle,
    owner: Arc<OnceLock<Weak<Device>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl TokioHangcheck {
    pub fn new(device: &str, miniport: Arc<dyn Miniport>, runtime: Handle) -> Self {
        Self {
            device: device.to_string(),
            miniport,
            runtime,
            owner: Arc::new(OnceLock::new()),
            task: Mutex::new(None),
        }
    }

    /// Serialize timer reinitialization with commands on `device`
    pub fn attach(&self, device: &Arc<Device>) {
        let _ = self.owner.set(Arc::downgrade(device));
    }

    #[cfg(test)]
    fn is_armed(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }
}

impl HangcheckTimer for TokioHangcheck {
    fn cancel(&self) {
        let task = self.task.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(task) = task {
            task.abort();
            debug!(device = %self.device, "Hangcheck stopped");
        }
    }

    fn schedule(&self, interval: Duration) {
        let mut slot = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(old) = slot.take() {
            old.abort();
        }
        if interval.is_zero() {
            return;
        }

        let device = self.device.clone();
        let miniport = self.miniport.clone();
        let owner = self.owner.clone();
        debug!(device = %device, interval_secs = interval.as_secs(), "Hangcheck armed");
        *slot = Some(self.runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let miniport = miniport.clone();
                let owner = owner.get().and_then(Weak::upgrade);
                let outcome = tokio::task::spawn_blocking(move || {
                    if !miniport.check_for_hang() {
                        return None;
                    }
                    // held like the reinit command holds it
                    let _state = owner.as_ref().map(|device| device.state_mut());
                    Some(miniport.reinit())
                })
                .await;
                match outcome {
                    Ok(None) => {}
                    Ok(Some(Ok(()))) => warn!(device = %device, "Adapter hung, reinitialized"),
                    Ok(Some(Err(status))) => {
                        error!(device = %device, status = %status, "Reinitialization failed")
                    }
                    Err(e) => error!(device = %device, error = %e, "Hangcheck task failed"),
                }
            }
        }));
    }
}

impl Drop for TokioHangcheck {
    fn drop(&mut self) {
        self.cancel();
    }
}

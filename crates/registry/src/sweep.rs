//! Periodic staleness sweep.
//!
//! The sweep is the only time-driven writer in the system. Each tick runs
//! three bounded passes: expire lapsed tokens, move silent Joined devices
//! to Stale, and fail JoinPending devices whose token ran out. The store
//! lock is taken per pass and released in between, so a tick never starves
//! issuance or reporting.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info};

use causeway_core::{now_ms, secs_to_ms, RegistryConfig, Result};
use causeway_store::Store;

/// Supervised sweep loop over the store.
pub struct StalenessSweeper {
    store: Arc<Mutex<Store>>,
    staleness_window_ms: u64,
    sweep_interval: Duration,
}

/// Handle to a running sweeper. Dropping the handle leaves the loop
/// running; call [`SweeperHandle::shutdown`] to stop it.
pub struct SweeperHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Signal the sweep loop to stop and wait for it to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.task.await;
    }
}

impl StalenessSweeper {
    pub fn new(store: Arc<Mutex<Store>>, cfg: &RegistryConfig) -> Self {
        Self {
            store,
            staleness_window_ms: secs_to_ms(cfg.staleness_window_secs),
            sweep_interval: Duration::from_secs(cfg.sweep_interval_secs),
        }
    }

    /// Override the tick interval (sub-second cadences for tests).
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Spawn the sweep loop as a supervised task.
    pub fn spawn(self) -> SweeperHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        info!(
            interval_ms = self.sweep_interval.as_millis() as u64,
            staleness_window_ms = self.staleness_window_ms,
            "Staleness sweeper starting"
        );

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.sweep_interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.tick(now_ms()).await {
                            error!(error = %e, "Sweep tick failed");
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        info!("Staleness sweeper stopped");
                        break;
                    }
                }
            }
        });

        SweeperHandle { shutdown_tx, task }
    }

    /// One sweep pass at the given wall-clock time.
    pub async fn tick(&self, now: u64) -> Result<()> {
        let expired = {
            let mut store = self.store.lock().await;
            store.expire_due_tokens(now)?
        };

        let cutoff = now.saturating_sub(self.staleness_window_ms);
        let stale = {
            let mut store = self.store.lock().await;
            store.mark_stale_devices(cutoff)?
        };

        let timed_out = {
            let mut store = self.store.lock().await;
            store.fail_timed_out_joins(now)?
        };

        if expired > 0 || !stale.is_empty() || !timed_out.is_empty() {
            info!(
                expired_tokens = expired,
                stale_devices = stale.len(),
                timed_out_joins = timed_out.len(),
                "Sweep applied transitions"
            );
        }

        Ok(())
    }
}

//! Device registration and heartbeat intake.
//!
//! The registry is the write path for registration and liveness; join
//! transitions arrive through the join reporter and the time-driven ones
//! through the staleness sweep. Every state write is a single short store
//! call, so concurrent callers for different devices never contend beyond
//! the store lock itself.

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use causeway_core::{now_ms, secs_to_ms, Error, RegistryConfig, Result};
use causeway_store::{Device, Store};

/// Registration and heartbeat front end over the store.
pub struct DeviceRegistry {
    store: Arc<Mutex<Store>>,
    heartbeat_max_skew_ms: u64,
}

impl DeviceRegistry {
    pub fn new(store: Arc<Mutex<Store>>, cfg: &RegistryConfig) -> Self {
        Self {
            store,
            heartbeat_max_skew_ms: secs_to_ms(cfg.heartbeat_max_skew_secs),
        }
    }

    /// Register a device, or refresh its hostname/address if it already
    /// exists. Idempotent under at-least-once delivery: a duplicate
    /// registration never resets device state.
    pub async fn register(
        &self,
        device_id: &str,
        hostname: &str,
        ip_address: &str,
    ) -> Result<Device> {
        if device_id.trim().is_empty() {
            return Err(Error::InvalidRequest(
                "deviceId must not be empty".to_string(),
            ));
        }
        if hostname.trim().is_empty() {
            return Err(Error::InvalidRequest(
                "hostname must not be empty".to_string(),
            ));
        }
        if ip_address.trim().is_empty() {
            return Err(Error::InvalidRequest(
                "ipAddress must not be empty".to_string(),
            ));
        }

        let device = {
            let mut store = self.store.lock().await;
            store.insert_device(device_id, hostname, ip_address, now_ms())?
        };

        info!(
            device_id = %device.device_id,
            state = device.state.as_str(),
            "Device registered"
        );

        Ok(device)
    }

    /// Record a heartbeat.
    ///
    /// Rejects timestamps further in the future than the configured skew
    /// allowance; older or duplicate timestamps are absorbed by the store.
    /// A fresh heartbeat on a Stale device moves it back to Joined.
    pub async fn heartbeat(&self, device_id: &str, timestamp_ms: u64) -> Result<Device> {
        if device_id.trim().is_empty() {
            return Err(Error::InvalidRequest(
                "deviceId must not be empty".to_string(),
            ));
        }

        let now = now_ms();
        if timestamp_ms > now + self.heartbeat_max_skew_ms {
            return Err(Error::InvalidRequest(format!(
                "heartbeat timestamp {timestamp_ms} is further than {}ms in the future",
                self.heartbeat_max_skew_ms
            )));
        }

        let device = {
            let mut store = self.store.lock().await;
            store.record_heartbeat(device_id, timestamp_ms)?
        };

        debug!(
            device_id = %device.device_id,
            last_heartbeat_ms = ?device.last_heartbeat_ms,
            "Heartbeat recorded"
        );

        Ok(device)
    }

    /// Device record for the status surface.
    pub async fn device(&self, device_id: &str) -> Result<Device> {
        let store = self.store.lock().await;
        store
            .device(device_id)?
            .ok_or_else(|| Error::NotFound(format!("device {device_id} is not registered")))
    }

    /// All device records, oldest registration first.
    pub async fn list(&self) -> Result<Vec<Device>> {
        let store = self.store.lock().await;
        store.list_devices()
    }
}

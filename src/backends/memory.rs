//! In-process backend used by the binary and the test-suite.

use super::{
    DeviceRegistry, FeedResult, FeedingResultStore, SensorReport, StoreError, TelemetryStore,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceRecord {
    pub gateway_id: String,
    pub firmware_version: Option<String>,
    pub last_seen: Option<DateTime<Utc>>,
    pub heartbeats: u64,
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    devices: RwLock<HashMap<String, DeviceRecord>>,
    sensor_reports: RwLock<Vec<SensorReport>>,
    feed_results: RwLock<Vec<FeedResult>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) a device together with its reported firmware.
    pub async fn register_device(
        &self,
        device_id: &str,
        gateway_id: &str,
        firmware_version: Option<&str>,
    ) {
        let mut devices = self.devices.write().await;
        let record = devices.entry(device_id.to_string()).or_default();
        record.gateway_id = gateway_id.to_string();
        record.firmware_version = firmware_version.map(str::to_string);
    }

    pub async fn device(&self, device_id: &str) -> Option<DeviceRecord> {
        self.devices.read().await.get(device_id).cloned()
    }

    pub async fn sensor_reports(&self) -> Vec<SensorReport> {
        self.sensor_reports.read().await.clone()
    }

    pub async fn feed_results(&self) -> Vec<FeedResult> {
        self.feed_results.read().await.clone()
    }

    /// Total number of writes received across all three roles.
    pub async fn write_count(&self) -> usize {
        let heartbeats: u64 = self
            .devices
            .read()
            .await
            .values()
            .map(|record| record.heartbeats)
            .sum();
        heartbeats as usize
            + self.sensor_reports.read().await.len()
            + self.feed_results.read().await.len()
    }
}

#[async_trait]
impl DeviceRegistry for MemoryBackend {
    async fn record_heartbeat(&self, gateway_id: &str, device_id: &str) -> Result<(), StoreError> {
        let mut devices = self.devices.write().await;
        let record = devices.entry(device_id.to_string()).or_default();
        record.gateway_id = gateway_id.to_string();
        record.last_seen = Some(Utc::now());
        record.heartbeats += 1;
        debug!("Heartbeat #{} for {}", record.heartbeats, device_id);
        Ok(())
    }

    async fn firmware_version(&self, device_id: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .devices
            .read()
            .await
            .get(device_id)
            .and_then(|record| record.firmware_version.clone()))
    }
}

#[async_trait]
impl TelemetryStore for MemoryBackend {
    async fn record_sensor_report(&self, report: SensorReport) -> Result<(), StoreError> {
        self.sensor_reports.write().await.push(report);
        Ok(())
    }
}

#[async_trait]
impl FeedingResultStore for MemoryBackend {
    async fn record_feed_result(&self, result: FeedResult) -> Result<(), StoreError> {
        self.feed_results.write().await.push(result);
        Ok(())
    }
}

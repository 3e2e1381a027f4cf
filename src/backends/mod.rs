//! # Backend Collaborators
//!
//! The session engine does not own any persistent state. Everything it learns
//! from the gateways (liveness, sensor readings, feed outcomes) is handed to the
//! collaborators defined here, and the only thing it reads back is the firmware
//! version recorded for a device.
//!
//! ## Why Traits
//!
//! Storage is owned by the device-management backend, not by this crate. The
//! router and the commander only hold `Arc<dyn ...>` handles, so a deployment
//! can plug its own database in without touching the session engine. The
//! [`memory::MemoryBackend`] implementation is used by the binary and the tests.

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Unknown device: {0}")]
    UnknownDevice(String),

    #[error("Storage backend failure: {0}")]
    Backend(String),
}

/// Battery and link report from a feeder, already converted to physical units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReport {
    pub gateway_id: String,
    pub device_id: String,
    /// Volts.
    pub voltage: f64,
    pub usb_power: bool,
    pub charging: bool,
    pub ir: bool,
    pub rssi: i64,
}

/// Outcome of a single feeding as reported by the device.
///
/// Every field except the identifiers is optional; firmware revisions differ
/// in what they report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedResult {
    pub gateway_id: String,
    pub device_id: String,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
    pub pour: Option<i64>,
    pub full: Option<i64>,
    pub grams_expected: Option<f64>,
    pub grams_actual: Option<f64>,
    pub hopper_start: Option<f64>,
    pub hopper_end: Option<f64>,
    pub source: Option<i64>,
    pub fail: Option<bool>,
    pub trip: Option<bool>,
    pub lrg: Option<bool>,
    pub vol: Option<bool>,
    pub bowl: Option<bool>,
    pub recipe_id: Option<String>,
    pub error: Option<String>,
}

#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    /// Marks the device as alive behind the given gateway.
    async fn record_heartbeat(&self, gateway_id: &str, device_id: &str) -> Result<(), StoreError>;

    /// Firmware version the device last reported, if any.
    async fn firmware_version(&self, device_id: &str) -> Result<Option<String>, StoreError>;
}

#[async_trait]
pub trait TelemetryStore: Send + Sync {
    async fn record_sensor_report(&self, report: SensorReport) -> Result<(), StoreError>;
}

#[async_trait]
pub trait FeedingResultStore: Send + Sync {
    async fn record_feed_result(&self, result: FeedResult) -> Result<(), StoreError>;
}

/// Bundle of collaborator handles passed to the router.
#[derive(Clone)]
pub struct Backends {
    pub registry: Arc<dyn DeviceRegistry>,
    pub telemetry: Arc<dyn TelemetryStore>,
    pub feeding: Arc<dyn FeedingResultStore>,
}

impl Backends {
    pub fn new(
        registry: Arc<dyn DeviceRegistry>,
        telemetry: Arc<dyn TelemetryStore>,
        feeding: Arc<dyn FeedingResultStore>,
    ) -> Self {
        Self {
            registry,
            telemetry,
            feeding,
        }
    }

    /// Uses one backend for all three roles.
    pub fn shared<B>(backend: Arc<B>) -> Self
    where
        B: DeviceRegistry + TelemetryStore + FeedingResultStore + 'static,
    {
        Self {
            registry: backend.clone(),
            telemetry: backend.clone(),
            feeding: backend,
        }
    }
}

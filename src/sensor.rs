//! Sensor port selection.
//!
//! The service always gets a [`SensorPort`]. When the hardware bus cannot be
//! opened (or the binary was built without `i2c_linux`, or `--simulate` was
//! given) it gets an [`OfflineSensor`], which fails every call so the producer
//! runs on simulated data.

use crate::config::SensorConfig;
use async_trait::async_trait;
use pool_core::calibration::CalibrationSet;
use pool_core::capabilities::SensorPort;
use pool_core::error::TransportError;
use std::sync::Arc;
use tracing::warn;

/// Port with no sensor behind it.
#[derive(Debug, Clone)]
pub struct OfflineSensor {
    reason: String,
}

impl OfflineSensor {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    fn unavailable<T>(&self) -> Result<T, TransportError> {
        Err(TransportError::unavailable(self.reason.clone()))
    }
}

#[async_trait]
impl SensorPort for OfflineSensor {
    async fn reset(&self) -> Result<(), TransportError> {
        self.unavailable()
    }

    async fn read_calibration(&self) -> Result<CalibrationSet, TransportError> {
        self.unavailable()
    }

    async fn start_pressure_conversion(&self) -> Result<(), TransportError> {
        self.unavailable()
    }

    async fn start_temperature_conversion(&self) -> Result<(), TransportError> {
        self.unavailable()
    }

    async fn read_raw24(&self) -> Result<u32, TransportError> {
        self.unavailable()
    }

    fn describe(&self) -> String {
        format!("offline ({})", self.reason)
    }
}

/// Open the configured sensor, falling back to [`OfflineSensor`].
pub fn open(config: &SensorConfig, simulate: bool) -> Arc<dyn SensorPort> {
    if simulate {
        return Arc::new(OfflineSensor::new("simulation requested"));
    }
    open_hardware(config)
}

#[cfg(feature = "i2c_linux")]
fn open_hardware(config: &SensorConfig) -> Arc<dyn SensorPort> {
    match pool_driver_ms5837::linux::open(&config.bus_path, config.address) {
        Ok(sensor) => Arc::new(sensor),
        Err(err) => {
            warn!(bus_path = %config.bus_path, error = %err, "Could not open sensor bus");
            Arc::new(OfflineSensor::new(err.message))
        }
    }
}

#[cfg(not(feature = "i2c_linux"))]
fn open_hardware(config: &SensorConfig) -> Arc<dyn SensorPort> {
    warn!(
        bus_path = %config.bus_path,
        "Built without the i2c_linux feature, no hardware sensor available"
    );
    Arc::new(OfflineSensor::new("built without i2c_linux"))
}

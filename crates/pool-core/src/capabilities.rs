//! Sensor capability interface.
//!
//! The reading producer never talks to a bus directly. It drives anything that
//! implements [`SensorPort`]: the MS5837 I²C driver, the in-memory mock used by
//! tests, or any other transport that can trigger a conversion and hand back
//! 24-bit counts.
//!
//! # Contract
//!
//! - `start_*_conversion` only issues the command. The caller must wait at
//!   least [`CONVERSION_DELAY`] before calling [`SensorPort::read_raw24`].
//! - After [`SensorPort::reset`] the caller waits [`RESET_DELAY`] before any
//!   other command.
//! - `read_raw24` returns the result of the most recently started conversion.
//! - All methods take `&self`; implementations use interior mutability.

use crate::calibration::CalibrationSet;
use crate::error::TransportError;
use async_trait::async_trait;
use std::time::Duration;

/// Conversion time at OSR 8192 (datasheet max 18.08 ms, rounded up).
pub const CONVERSION_DELAY: Duration = Duration::from_millis(20);

/// Time for the PROM to reload after a reset command.
pub const RESET_DELAY: Duration = Duration::from_millis(10);

/// Capability: pressure/temperature conversions on an MS58xx-style sensor.
#[async_trait]
pub trait SensorPort: Send + Sync {
    /// Issue the reset sequence.
    async fn reset(&self) -> Result<(), TransportError>;

    /// Read and validate the seven PROM words.
    async fn read_calibration(&self) -> Result<CalibrationSet, TransportError>;

    /// Start a D1 (pressure) conversion.
    async fn start_pressure_conversion(&self) -> Result<(), TransportError>;

    /// Start a D2 (temperature) conversion.
    async fn start_temperature_conversion(&self) -> Result<(), TransportError>;

    /// Read the 24-bit ADC result of the last conversion.
    async fn read_raw24(&self) -> Result<u32, TransportError>;

    /// Short human-readable identifier for logs.
    fn describe(&self) -> String {
        "sensor".to_string()
    }
}

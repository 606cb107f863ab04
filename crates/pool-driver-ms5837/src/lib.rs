//! MS5837-30BA driver for pool-sense
//!
//! Implements [`pool_core::SensorPort`] over any blocking `embedded-hal` 1.0
//! I²C bus. On Linux, enable the `linux` feature to open the bus from a
//! `/dev/i2c-*` device node.
//!
//! # Usage
//!
//! ```rust,ignore
//! use pool_driver_ms5837::linux;
//! use pool_core::SensorPort;
//!
//! let sensor = linux::open("/dev/i2c-1", pool_driver_ms5837::DEFAULT_ADDRESS)?;
//! sensor.reset().await?;
//! let calibration = sensor.read_calibration().await?;
//! ```

mod ms5837;

#[cfg(feature = "linux")]
pub mod linux;

pub use ms5837::{Command, Ms5837, DEFAULT_ADDRESS};

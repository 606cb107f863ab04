//! Mock sensor and simulated pool for pool-sense
//!
//! Lets the producer, session and HTTP layers run without an MS5837 attached.
//!
//! - [`MockSensorPort`]: command-level stand-in for the sensor, with scripted
//!   raw counts, a command log and failure injection
//! - [`SimulatedPool`]: the slowly leaking pool reported in degraded mode
//!
//! All delays use `tokio::time::sleep`, so tests can run under paused time.

pub mod common;
mod mock_sensor;
mod simulated_pool;

pub use common::{ErrorConfig, ErrorScenario, MockRng};
pub use mock_sensor::{
    MockCommand, MockSensorPort, MockSensorPortBuilder, DATASHEET_COEFFICIENTS, DATASHEET_SAMPLE,
};
pub use simulated_pool::{NoiseModel, SimulatedPool};

//! Simulated pool used while the sensor is unavailable.
//!
//! Models a slowly leaking pool (about 1.2 mm/hr) starting from 1000 mm of
//! water. Readings are derived from minutes elapsed in the active session and
//! are always tagged [`ReadingSource::Simulated`].

use crate::common::MockRng;
use pool_core::reading::{CompensatedReading, ReadingSource};
use std::sync::Arc;

const START_PRESSURE_MBAR: f64 = 1113.25;
const PRESSURE_SLOPE_MBAR_PER_MIN: f64 = 0.005;
const START_TEMP_C: f64 = 28.5;
const TEMP_SLOPE_C_PER_HOUR: f64 = 0.1;
const START_DEPTH_MM: f64 = 1000.0;
const DEPTH_SLOPE_MM_PER_MIN: f64 = 0.02;

// =============================================================================
// Noise Model
// =============================================================================

/// Uniform noise amplitudes applied to each simulated channel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NoiseModel {
    pub pressure_mbar: f64,
    pub temperature_c: f64,
    pub depth_mm: f64,
}

impl NoiseModel {
    /// Roughly what a real MS5837 shows at OSR 8192.
    pub fn sensor_like() -> Self {
        Self {
            pressure_mbar: 0.02,
            temperature_c: 0.01,
            depth_mm: 0.2,
        }
    }

    pub fn none() -> Self {
        Self {
            pressure_mbar: 0.0,
            temperature_c: 0.0,
            depth_mm: 0.0,
        }
    }
}

impl Default for NoiseModel {
    fn default() -> Self {
        Self::sensor_like()
    }
}

// =============================================================================
// SimulatedPool
// =============================================================================

#[derive(Clone, Debug)]
pub struct SimulatedPool {
    noise: NoiseModel,
    rng: Arc<MockRng>,
}

impl SimulatedPool {
    /// Sensor-like noise, reproducible when `seed` is set.
    pub fn new(seed: Option<u64>) -> Self {
        Self::with_noise(NoiseModel::default(), seed)
    }

    pub fn with_noise(noise: NoiseModel, seed: Option<u64>) -> Self {
        Self {
            noise,
            rng: Arc::new(MockRng::new(seed)),
        }
    }

    /// Exact model values, no noise.
    pub fn noiseless() -> Self {
        Self::with_noise(NoiseModel::none(), Some(0))
    }

    pub fn noise(&self) -> NoiseModel {
        self.noise
    }

    /// Reading at `timestamp`, `minutes_elapsed` into the active session.
    pub fn reading(&self, timestamp: f64, minutes_elapsed: f64) -> CompensatedReading {
        let m = minutes_elapsed.max(0.0);
        let pressure = START_PRESSURE_MBAR - PRESSURE_SLOPE_MBAR_PER_MIN * m;
        let temperature = START_TEMP_C + TEMP_SLOPE_C_PER_HOUR * m / 60.0;
        let depth = START_DEPTH_MM - DEPTH_SLOPE_MM_PER_MIN * m;

        CompensatedReading {
            timestamp,
            pressure_mbar: pressure + self.rng.jitter(self.noise.pressure_mbar),
            temperature_c: temperature + self.rng.jitter(self.noise.temperature_c),
            depth_mm: depth + self.rng.jitter(self.noise.depth_mm),
            source: ReadingSource::Simulated,
        }
    }
}

impl Default for SimulatedPool {
    fn default() -> Self {
        Self::new(None)
    }
}

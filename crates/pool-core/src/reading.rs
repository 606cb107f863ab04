//! Timestamped, depth-converted readings.

use crate::compensation::Compensated;
use serde::{Deserialize, Serialize};

/// Standard gravity used for the hydrostatic conversion (m/s²).
pub const STANDARD_GRAVITY: f64 = 9.80665;

/// Fluid density of fresh water (kg/m³).
pub const DENSITY_FRESHWATER: f64 = 997.0;

/// Fluid density of sea water (kg/m³).
pub const DENSITY_SALTWATER: f64 = 1029.0;

/// Where a reading came from.
///
/// Simulated readings are emitted only while the producer is degraded and are
/// always labelled so they can never pass for sensor data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReadingSource {
    #[default]
    Sensor,
    Simulated,
}

/// A single compensated sample as stored in a measurement session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompensatedReading {
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
    pub pressure_mbar: f64,
    pub temperature_c: f64,
    pub depth_mm: f64,
    #[serde(default)]
    pub source: ReadingSource,
}

impl CompensatedReading {
    pub fn new(timestamp: f64, pressure_mbar: f64, temperature_c: f64, depth_mm: f64) -> Self {
        Self {
            timestamp,
            pressure_mbar,
            temperature_c,
            depth_mm,
            source: ReadingSource::Sensor,
        }
    }

    /// Mark this reading as simulated.
    pub fn simulated(mut self) -> Self {
        self.source = ReadingSource::Simulated;
        self
    }

    pub fn is_simulated(&self) -> bool {
        self.source == ReadingSource::Simulated
    }

    /// Round to stored resolution: pressure to 0.001 mbar, temperature and
    /// depth to 0.01.
    ///
    /// Readings are quantized once on their way into a session, so the live
    /// feed, the analysis and the saved record all see the same values.
    pub fn quantized(self) -> Self {
        Self {
            pressure_mbar: round_to(self.pressure_mbar, 1e3),
            temperature_c: round_to(self.temperature_c, 1e2),
            depth_mm: round_to(self.depth_mm, 1e2),
            ..self
        }
    }
}

fn round_to(value: f64, scale: f64) -> f64 {
    (value * scale).round() / scale
}

/// Converts gauge pressure above a reference into water column depth.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthConverter {
    pub reference_pressure_mbar: f64,
    pub fluid_density_kg_m3: f64,
}

impl DepthConverter {
    pub fn new(reference_pressure_mbar: f64, fluid_density_kg_m3: f64) -> Self {
        Self {
            reference_pressure_mbar,
            fluid_density_kg_m3,
        }
    }

    /// Depth in millimetres for an absolute pressure in millibar.
    pub fn depth_mm(&self, pressure_mbar: f64) -> f64 {
        let gauge_pa = (pressure_mbar - self.reference_pressure_mbar) * 100.0;
        gauge_pa / (self.fluid_density_kg_m3 * STANDARD_GRAVITY) * 1000.0
    }

    /// Build a stored reading from a compensated sample.
    pub fn reading(&self, timestamp: f64, sample: Compensated) -> CompensatedReading {
        CompensatedReading::new(
            timestamp,
            sample.pressure_mbar,
            sample.temperature_c,
            self.depth_mm(sample.pressure_mbar),
        )
    }
}

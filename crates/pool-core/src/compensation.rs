//! Fixed-point compensation of raw MS5837-30BA counts.
//!
//! Reproduces the datasheet numeric model bit-for-bit. Every intermediate is
//! an `i64`: `D1 * SENS` alone needs ~56 bits. Integer division in Rust
//! truncates toward zero, which is the rounding the model expects, so no
//! explicit flooring is done anywhere.

use crate::calibration::CalibrationSet;
use serde::{Deserialize, Serialize};

/// Below this first-order temperature (centi-degrees) the second-order
/// correction applies.
const SECOND_ORDER_THRESHOLD: i64 = 2000;

/// One physical reading: raw pressure (D1) and temperature (D2) counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawSample {
    pub d1: u32,
    pub d2: u32,
}

impl RawSample {
    pub fn new(d1: u32, d2: u32) -> Self {
        Self { d1, d2 }
    }
}

/// Output of the compensation engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Compensated {
    pub pressure_mbar: f64,
    pub temperature_c: f64,
}

/// Intermediate terms, exposed so tests can check against datasheet tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompensationTerms {
    pub dt: i64,
    pub sens: i64,
    pub off: i64,
    pub temp: i64,
    pub t2: i64,
}

/// Compute the intermediate fixed-point terms for a raw sample.
pub fn compensation_terms(raw: RawSample, cal: &CalibrationSet) -> CompensationTerms {
    let c = |i: usize| cal.coefficient(i);
    let d2 = i64::from(raw.d2);

    let dt = d2 - c(5) * 256;
    let mut sens = c(1) * 65_536 + (c(3) * dt) / 128;
    let mut off = c(2) * 131_072 + (c(4) * dt) / 64;
    let temp = 2000 + (dt * c(6)) / 8_388_608;

    let (t2, off2, sens2) = if temp < SECOND_ORDER_THRESHOLD {
        let delta = temp - SECOND_ORDER_THRESHOLD;
        (
            (11 * dt * dt) / 34_359_738_368,
            (31 * delta * delta) / 8,
            (63 * delta * delta) / 32,
        )
    } else {
        (0, 0, 0)
    };

    off -= off2;
    sens -= sens2;

    CompensationTerms {
        dt,
        sens,
        off,
        temp,
        t2,
    }
}

/// Map raw counts to pressure (mbar) and temperature (°C).
///
/// Pure and infallible. The first quotient of the pressure formula is an
/// integer division; the final two are floating point.
pub fn compensate(raw: RawSample, cal: &CalibrationSet) -> Compensated {
    let terms = compensation_terms(raw, cal);
    let d1 = i64::from(raw.d1);

    let scaled = (d1 * terms.sens) / 2_097_152 - terms.off;
    let pressure_mbar = scaled as f64 / 32_768.0 / 100.0;
    let temperature_c = (terms.temp - terms.t2) as f64 / 100.0;

    Compensated {
        pressure_mbar,
        temperature_c,
    }
}

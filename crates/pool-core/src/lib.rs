//! `pool-core`
//!
//! Core types and logic for the pool-sense leak tester.
//!
//! This crate has no I/O of its own. It provides:
//!
//! - [`compensation`]: MS5837-30BA integer compensation of raw ADC counts
//! - [`calibration`]: PROM coefficient validation (CRC-4)
//! - [`capabilities`]: the [`SensorPort`] trait drivers implement
//! - [`reading`]: depth conversion and the stored reading record
//! - [`session`]: the leak test state machine and its bounded sample log
//! - [`analyzer`]: windowed leak-rate analysis and classification
//!
//! ## Data flow
//!
//! ```text
//! SensorPort ──raw counts──▶ compensate ──▶ DepthConverter ──▶ SessionHandle::append
//!                                                                   │
//!                          snapshot / stop_test ◀── LeakAnalyzer ◀──┘
//! ```

pub mod analyzer;
pub mod calibration;
pub mod capabilities;
pub mod clock;
pub mod compensation;
pub mod error;
pub mod reading;
pub mod session;

pub use analyzer::{
    AnalyzerConfig, Classification, EvaporationModel, LeakAnalyzer, LeakVerdict,
    TemperatureEvaporation, VerdictThresholds,
};
pub use calibration::{CalibrationSet, PROM_WORDS};
pub use capabilities::{SensorPort, CONVERSION_DELAY, RESET_DELAY};
pub use clock::{Clock, ManualClock, SystemClock};
pub use compensation::{compensate, Compensated, RawSample};
pub use error::{PoolError, PoolResult, TransportError, TransportErrorKind};
pub use reading::{
    CompensatedReading, DepthConverter, ReadingSource, DENSITY_FRESHWATER, DENSITY_SALTWATER,
};
pub use session::{
    CompletedTest, MeasurementSession, SessionConfig, SessionHandle, SessionId, SessionSnapshot,
    SessionState,
};

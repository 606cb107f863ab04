//! Mock pressure sensor port.
//!
//! Behaves like an MS5837 at the command level: a conversion must be started
//! before the ADC is read, and the ADC returns 0 when nothing was started.
//! Raw `(D1, D2)` pairs come from a queue; the last pair repeats forever so a
//! test only has to script the interesting part.

use crate::common::ErrorConfig;
use async_trait::async_trait;
use parking_lot::Mutex;
use pool_core::calibration::{CalibrationSet, PROM_WORDS};
use pool_core::capabilities::SensorPort;
use pool_core::compensation::RawSample;
use pool_core::error::TransportError;
use std::collections::VecDeque;
use std::time::Duration;

/// Datasheet example coefficients `C1..C6`.
pub const DATASHEET_COEFFICIENTS: [u16; 6] = [34982, 36352, 20328, 22354, 26646, 26146];

/// Datasheet example counts, about 200 mbar at 19.82 °C with the datasheet PROM.
pub const DATASHEET_SAMPLE: RawSample = RawSample {
    d1: 4_958_179,
    d2: 6_815_414,
};

/// Commands seen by the mock, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockCommand {
    Reset,
    ReadCalibration,
    ConvertPressure,
    ConvertTemperature,
    ReadAdc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Conversion {
    Pressure,
    Temperature,
}

#[derive(Debug)]
struct PortState {
    prom: [u16; PROM_WORDS],
    samples: VecDeque<RawSample>,
    pending: Option<Conversion>,
    log: Vec<MockCommand>,
}

/// In-memory [`SensorPort`] with scripted data and failure injection.
///
/// ```rust,ignore
/// let port = MockSensorPort::builder()
///     .samples([RawSample::new(4_958_179, 6_815_414)])
///     .error_config(ErrorConfig::scenario(ErrorScenario::FailNext { count: 3 }))
///     .build();
/// ```
#[derive(Debug)]
pub struct MockSensorPort {
    state: Mutex<PortState>,
    error_config: ErrorConfig,
    latency: Duration,
}

impl MockSensorPort {
    /// Datasheet PROM and a single repeating datasheet sample.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> MockSensorPortBuilder {
        MockSensorPortBuilder::default()
    }

    pub fn error_config(&self) -> &ErrorConfig {
        &self.error_config
    }

    /// Queue more raw samples behind the current ones.
    pub fn push_samples(&self, samples: impl IntoIterator<Item = RawSample>) {
        self.state.lock().samples.extend(samples);
    }

    /// Replace the sample queue.
    pub fn set_samples(&self, samples: impl IntoIterator<Item = RawSample>) {
        let mut state = self.state.lock();
        state.samples = samples.into_iter().collect();
    }

    /// Overwrite the PROM image, e.g. to corrupt its CRC.
    pub fn set_prom(&self, words: [u16; PROM_WORDS]) {
        self.state.lock().prom = words;
    }

    /// Flip a coefficient bit without touching the CRC nibble.
    pub fn corrupt_calibration(&self) {
        self.state.lock().prom[3] ^= 0x0001;
    }

    pub fn commands(&self) -> Vec<MockCommand> {
        self.state.lock().log.clone()
    }

    pub fn clear_commands(&self) {
        self.state.lock().log.clear();
    }

    async fn operation(&self, name: &'static str, command: MockCommand) -> Result<(), TransportError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.state.lock().log.push(command);
        self.error_config.check_operation(name)
    }
}

impl Default for MockSensorPort {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SensorPort for MockSensorPort {
    async fn reset(&self) -> Result<(), TransportError> {
        self.operation("reset", MockCommand::Reset).await?;
        self.state.lock().pending = None;
        Ok(())
    }

    async fn read_calibration(&self) -> Result<CalibrationSet, TransportError> {
        self.operation("read_calibration", MockCommand::ReadCalibration)
            .await?;
        let prom = self.state.lock().prom;
        CalibrationSet::from_prom(prom)
    }

    async fn start_pressure_conversion(&self) -> Result<(), TransportError> {
        self.operation("start_pressure_conversion", MockCommand::ConvertPressure)
            .await?;
        self.state.lock().pending = Some(Conversion::Pressure);
        Ok(())
    }

    async fn start_temperature_conversion(&self) -> Result<(), TransportError> {
        self.operation("start_temperature_conversion", MockCommand::ConvertTemperature)
            .await?;
        self.state.lock().pending = Some(Conversion::Temperature);
        Ok(())
    }

    async fn read_raw24(&self) -> Result<u32, TransportError> {
        self.operation("read_raw24", MockCommand::ReadAdc).await?;
        let mut state = self.state.lock();
        let Some(current) = state.samples.front().copied() else {
            return Err(TransportError::unavailable("no samples scripted"));
        };
        let value = match state.pending.take() {
            Some(Conversion::Pressure) => current.d1,
            Some(Conversion::Temperature) => {
                // D2 closes the pair; advance unless this is the last one.
                if state.samples.len() > 1 {
                    state.samples.pop_front();
                }
                current.d2
            }
            None => 0,
        };
        Ok(value & 0x00FF_FFFF)
    }

    fn describe(&self) -> String {
        "mock MS5837".to_string()
    }
}

// =============================================================================
// Builder Pattern
// =============================================================================

#[derive(Debug, Clone)]
pub struct MockSensorPortBuilder {
    prom: [u16; PROM_WORDS],
    samples: Vec<RawSample>,
    error_config: ErrorConfig,
    latency: Duration,
}

impl Default for MockSensorPortBuilder {
    fn default() -> Self {
        Self {
            prom: *CalibrationSet::from_coefficients(DATASHEET_COEFFICIENTS).words(),
            samples: vec![DATASHEET_SAMPLE],
            error_config: ErrorConfig::default(),
            latency: Duration::ZERO,
        }
    }
}

impl MockSensorPortBuilder {
    pub fn prom(mut self, words: [u16; PROM_WORDS]) -> Self {
        self.prom = words;
        self
    }

    pub fn calibration(self, calibration: CalibrationSet) -> Self {
        self.prom(*calibration.words())
    }

    pub fn samples(mut self, samples: impl IntoIterator<Item = RawSample>) -> Self {
        self.samples = samples.into_iter().collect();
        self
    }

    pub fn error_config(mut self, config: ErrorConfig) -> Self {
        self.error_config = config;
        self
    }

    /// Delay applied to every port call (paused-time tests use this to hit timeouts).
    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn build(self) -> MockSensorPort {
        MockSensorPort {
            state: Mutex::new(PortState {
                prom: self.prom,
                samples: self.samples.into(),
                pending: None,
                log: Vec::new(),
            }),
            error_config: self.error_config,
            latency: self.latency,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pool_core::error::TransportErrorKind;

    #[tokio::test]
    async fn adc_without_conversion_reads_zero() {
        let port = MockSensorPort::new();
        assert_eq!(port.read_raw24().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn last_sample_repeats() {
        let port = MockSensorPort::builder()
            .samples([RawSample::new(1, 2), RawSample::new(3, 4)])
            .build();
        let mut seen = Vec::new();
        for _ in 0..3 {
            port.start_pressure_conversion().await.unwrap();
            let d1 = port.read_raw24().await.unwrap();
            port.start_temperature_conversion().await.unwrap();
            let d2 = port.read_raw24().await.unwrap();
            seen.push((d1, d2));
        }
        assert_eq!(seen, vec![(1, 2), (3, 4), (3, 4)]);
    }

    #[tokio::test]
    async fn corrupted_prom_fails_crc() {
        let port = MockSensorPort::new();
        assert!(port.read_calibration().await.is_ok());
        port.corrupt_calibration();
        let err = port.read_calibration().await.unwrap_err();
        assert_eq!(err.kind, TransportErrorKind::Calibration);
    }

    #[tokio::test]
    async fn commands_are_logged_even_when_failing() {
        let port = MockSensorPort::new();
        port.error_config().fail_next(1);
        assert!(port.reset().await.is_err());
        port.start_pressure_conversion().await.unwrap();
        assert_eq!(
            port.commands(),
            vec![MockCommand::Reset, MockCommand::ConvertPressure]
        );
        port.clear_commands();
        assert!(port.commands().is_empty());
    }
}

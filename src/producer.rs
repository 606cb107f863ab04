//! Reading producer: the single writer of samples.
//!
//! Every tick runs one full measurement (D1 conversion, wait, read; D2
//! conversion, wait, read), compensates it, converts it to depth and appends
//! it to the active session when a test is running.
//!
//! # Modes
//!
//! ```text
//!            N failed ticks in a row
//!  Sensor ───────────────────────────▶ Degraded
//!    ▲                                    │
//!    └──────── successful reading ────────┘
//! ```
//!
//! - **Sensor**: a failed tick is logged and skipped; nothing is appended.
//! - **Degraded**: each tick still tries the sensor (recalibrating first if
//!   startup never produced a calibration). When that fails, a simulated
//!   reading tagged `Simulated` is produced instead.
//!
//! The current mode is published on a `watch` channel for the HTTP layer.
//!
//! # Depth reference
//!
//! The first successful sensor reading of the process is the zero-depth
//! reference for every later reading, across sessions.

use crate::config::SensorConfig;
use pool_core::calibration::CalibrationSet;
use pool_core::capabilities::SensorPort;
use pool_core::clock::Clock;
use pool_core::compensation::{compensate, Compensated, RawSample};
use pool_core::error::TransportError;
use pool_core::reading::{CompensatedReading, DepthConverter};
use pool_core::session::SessionHandle;
use pool_driver_mock::SimulatedPool;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep, timeout, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Where readings currently come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProducerMode {
    Sensor,
    Degraded,
}

impl std::fmt::Display for ProducerMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProducerMode::Sensor => write!(f, "sensor"),
            ProducerMode::Degraded => write!(f, "degraded"),
        }
    }
}

/// Timing and conversion settings for the producer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProducerSettings {
    pub sample_interval: Duration,
    pub conversion_delay: Duration,
    pub reset_delay: Duration,
    pub read_timeout: Duration,
    pub max_consecutive_failures: u32,
    pub fluid_density: f64,
}

impl Default for ProducerSettings {
    fn default() -> Self {
        Self::from(&SensorConfig::default())
    }
}

impl From<&SensorConfig> for ProducerSettings {
    fn from(config: &SensorConfig) -> Self {
        Self {
            sample_interval: config.sample_interval(),
            conversion_delay: config.conversion_delay(),
            reset_delay: config.reset_delay(),
            read_timeout: config.read_timeout(),
            max_consecutive_failures: config.max_consecutive_failures.max(1),
            fluid_density: config.fluid_density,
        }
    }
}

/// Result of one producer tick.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// A reading was produced. `appended` is false when no test is recording.
    Reading {
        reading: CompensatedReading,
        appended: bool,
    },
    /// The sensor failed and no reading was produced.
    Skipped(TransportError),
}

impl TickOutcome {
    pub fn reading(&self) -> Option<&CompensatedReading> {
        match self {
            TickOutcome::Reading { reading, .. } => Some(reading),
            TickOutcome::Skipped(_) => None,
        }
    }

    pub fn is_appended(&self) -> bool {
        matches!(self, TickOutcome::Reading { appended: true, .. })
    }
}

// =============================================================================
// ReadingProducer
// =============================================================================

pub struct ReadingProducer {
    port: Arc<dyn SensorPort>,
    session: SessionHandle,
    clock: Arc<dyn Clock>,
    settings: ProducerSettings,
    simulator: SimulatedPool,
    calibration: Option<CalibrationSet>,
    reference_pressure: Option<f64>,
    consecutive_failures: u32,
    mode_tx: watch::Sender<ProducerMode>,
}

impl ReadingProducer {
    /// A producer in Sensor mode that has not talked to the port yet.
    ///
    /// Call [`ReadingProducer::initialize`] (or [`ReadingProducer::start`])
    /// before ticking; without calibration every tick first tries to obtain it.
    pub fn new(
        port: Arc<dyn SensorPort>,
        session: SessionHandle,
        clock: Arc<dyn Clock>,
        settings: ProducerSettings,
        simulator: SimulatedPool,
    ) -> Self {
        let (mode_tx, _) = watch::channel(ProducerMode::Sensor);
        Self {
            port,
            session,
            clock,
            settings,
            simulator,
            calibration: None,
            reference_pressure: None,
            consecutive_failures: 0,
            mode_tx,
        }
    }

    pub fn mode(&self) -> ProducerMode {
        *self.mode_tx.borrow()
    }

    /// Receiver that tracks mode changes.
    pub fn subscribe_mode(&self) -> watch::Receiver<ProducerMode> {
        self.mode_tx.subscribe()
    }

    pub fn settings(&self) -> &ProducerSettings {
        &self.settings
    }

    pub fn calibration(&self) -> Option<&CalibrationSet> {
        self.calibration.as_ref()
    }

    /// Zero-depth reference pressure, once the first reading succeeded.
    pub fn reference_pressure(&self) -> Option<f64> {
        self.reference_pressure
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Reset the sensor and read its calibration.
    ///
    /// # Errors
    /// Any transport failure, including an invalid PROM (`Calibration`).
    pub async fn initialize(&mut self) -> Result<CalibrationSet, TransportError> {
        self.bounded("reset", self.port.reset()).await?;
        sleep(self.settings.reset_delay).await;
        let calibration = self
            .bounded("read_calibration", self.port.read_calibration())
            .await?;
        self.calibration = Some(calibration);
        Ok(calibration)
    }

    /// Initialize, entering Degraded mode if the sensor cannot be set up.
    pub async fn start(&mut self) -> ProducerMode {
        match self.initialize().await {
            Ok(calibration) => {
                info!(
                    sensor = %self.port.describe(),
                    prom = ?calibration.words(),
                    "Sensor initialized"
                );
            }
            Err(err) => {
                error!(
                    sensor = %self.port.describe(),
                    error = %err,
                    "Sensor initialization failed, producing simulated data"
                );
                self.set_mode(ProducerMode::Degraded);
            }
        }
        self.mode()
    }

    /// One deterministic producer step.
    pub async fn tick(&mut self) -> TickOutcome {
        match self.read_sensor().await {
            Ok(sample) => {
                self.consecutive_failures = 0;
                if self.mode() == ProducerMode::Degraded {
                    info!("Sensor recovered, leaving degraded mode");
                    self.set_mode(ProducerMode::Sensor);
                }
                let reading = self.to_reading(sample);
                self.emit(reading)
            }
            Err(err) => self.on_failure(err),
        }
    }

    /// Tick every `sample_interval` until `shutdown` turns true or its sender drops.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.settings.sample_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            interval_ms = self.settings.sample_interval.as_millis() as u64,
            mode = %self.mode(),
            "Reading producer started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Reading producer stopped");
    }

    fn on_failure(&mut self, err: TransportError) -> TickOutcome {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);

        match self.mode() {
            ProducerMode::Sensor => {
                warn!(
                    error = %err,
                    consecutive_failures = self.consecutive_failures,
                    "Sensor read failed, skipping tick"
                );
                if self.consecutive_failures >= self.settings.max_consecutive_failures {
                    error!(
                        consecutive_failures = self.consecutive_failures,
                        "Sensor unavailable, switching to simulated data"
                    );
                    self.set_mode(ProducerMode::Degraded);
                }
                TickOutcome::Skipped(err)
            }
            ProducerMode::Degraded => {
                debug!(error = %err, "Sensor still unavailable");
                let now = self.clock.now();
                let minutes = self.session.elapsed_seconds(now) / 60.0;
                let reading = self.simulator.reading(now, minutes);
                self.emit(reading)
            }
        }
    }

    fn emit(&self, reading: CompensatedReading) -> TickOutcome {
        let reading = reading.quantized();
        let appended = self.session.append(reading);
        TickOutcome::Reading { reading, appended }
    }

    fn to_reading(&mut self, sample: Compensated) -> CompensatedReading {
        let reference = *self.reference_pressure.get_or_insert_with(|| {
            info!(
                reference_mbar = sample.pressure_mbar,
                "Zero-depth reference pressure set"
            );
            sample.pressure_mbar
        });
        DepthConverter::new(reference, self.settings.fluid_density).reading(self.clock.now(), sample)
    }

    async fn read_sensor(&mut self) -> Result<Compensated, TransportError> {
        let calibration = match self.calibration {
            Some(calibration) => calibration,
            None => self.initialize().await?,
        };

        self.bounded(
            "start_pressure_conversion",
            self.port.start_pressure_conversion(),
        )
        .await?;
        sleep(self.settings.conversion_delay).await;
        let d1 = self.bounded("read_raw24", self.port.read_raw24()).await?;

        self.bounded(
            "start_temperature_conversion",
            self.port.start_temperature_conversion(),
        )
        .await?;
        sleep(self.settings.conversion_delay).await;
        let d2 = self.bounded("read_raw24", self.port.read_raw24()).await?;

        Ok(compensate(RawSample::new(d1, d2), &calibration))
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T, TransportError>>,
    ) -> Result<T, TransportError> {
        match timeout(self.settings.read_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::timeout(format!(
                "{} did not complete within {} ms",
                operation,
                self.settings.read_timeout.as_millis()
            ))),
        }
    }

    fn set_mode(&self, mode: ProducerMode) {
        self.mode_tx.send_replace(mode);
    }
}

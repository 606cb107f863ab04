//! # PoolSense
//!
//! Pool leak tester built around an MS5837-30BA pressure sensor. The sensor
//! sits at the bottom of the pool; a background producer samples it, converts
//! pressure to water depth and records it into a measurement session. After a
//! stabilization baseline the session switches to testing, and stopping the
//! test fits the depth trend, corrects it for evaporation and classifies the
//! leak rate.
//!
//! ## Crate Structure
//!
//! - **`config`**: layered `figment` configuration (`config/poolsense.toml` plus
//!   `POOLSENSE_` environment variables) and its validation.
//! - **`logging`**: `tracing` subscriber setup.
//! - **`error`**: the application `AppError`.
//! - **`sensor`**: choosing the hardware driver or an offline port.
//! - **`producer`**: the periodic reading loop with its degraded fallback.
//! - **`controller`**: start/stop/status around the session state machine.
//! - **`storage`**: persisting completed tests.
//! - **`server`**: the HTTP API.
//! - **`service`**: wiring all of the above.
//!
//! Sensor math, sessions and the analyzer live in `pool-core`; the I²C driver
//! in `pool-driver-ms5837`; test doubles and the simulated pool in
//! `pool-driver-mock`.

pub mod config;
pub mod controller;
pub mod error;
pub mod logging;
pub mod producer;
pub mod sensor;
pub mod server;
pub mod service;
pub mod storage;

pub use config::PoolSenseConfig;
pub use controller::LeakTestController;
pub use error::{AppError, AppResult};
pub use producer::{ProducerMode, ProducerSettings, ReadingProducer, TickOutcome};
pub use service::PoolSenseService;
pub use storage::{JsonFileStore, ResultStore};

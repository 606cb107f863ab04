//! Configuration using Figment
//!
//! Configuration is layered, later sources winning:
//! 1. Built-in defaults (every field has one)
//! 2. `config/poolsense.toml` (or the file given with `--config`)
//! 3. Environment variables prefixed with `POOLSENSE_`, nested keys split on `__`
//!
//! # Example
//! ```no_run
//! use pool_sense::config::PoolSenseConfig;
//!
//! // POOLSENSE_SERVER__PORT=9000 overrides server.port
//! let config = PoolSenseConfig::load()?;
//! config.validate()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use pool_core::analyzer::{AnalyzerConfig, VerdictThresholds};
use pool_core::session::SessionConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/poolsense.toml";

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "POOLSENSE_";

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const VALID_LOG_FORMATS: [&str; 3] = ["pretty", "compact", "json"];

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSenseConfig {
    pub application: ApplicationConfig,
    pub sensor: SensorConfig,
    pub session: SessionSettings,
    pub analysis: AnalysisConfig,
    pub server: ServerConfig,
    pub storage: StorageConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    pub log_format: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "PoolSense".to_string(),
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

/// Pressure sensor and producer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// I²C character device (e.g., "/dev/i2c-1")
    pub bus_path: String,
    /// 7-bit I²C address
    pub address: u8,
    /// Water density in kg/m³ (997 fresh, 1029 salt)
    pub fluid_density: f64,
    pub sample_interval_ms: u64,
    pub conversion_delay_ms: u64,
    pub reset_delay_ms: u64,
    /// Upper bound on any single port call
    pub read_timeout_ms: u64,
    /// Failed ticks in a row before switching to simulated data
    pub max_consecutive_failures: u32,
    /// Seed for simulated-data noise; random when unset
    pub simulation_seed: Option<u64>,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            bus_path: "/dev/i2c-1".to_string(),
            address: 0x76,
            fluid_density: pool_core::DENSITY_FRESHWATER,
            sample_interval_ms: 1000,
            conversion_delay_ms: 20,
            reset_delay_ms: 10,
            read_timeout_ms: 500,
            max_consecutive_failures: 5,
            simulation_seed: None,
        }
    }
}

impl SensorConfig {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub fn conversion_delay(&self) -> Duration {
        Duration::from_millis(self.conversion_delay_ms)
    }

    pub fn reset_delay(&self) -> Duration {
        Duration::from_millis(self.reset_delay_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// Leak test session settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Minutes in Baseline before the test switches to Testing
    pub baseline_duration_min: f64,
    /// Maximum samples kept per session
    pub capacity: usize,
    /// Minutes into a session before live previews are shown
    pub preview_min_elapsed_min: f64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            baseline_duration_min: 15.0,
            capacity: pool_core::session::DEFAULT_CAPACITY,
            preview_min_elapsed_min: 6.0,
        }
    }
}

impl SessionSettings {
    pub fn baseline_duration(&self) -> Duration {
        Duration::from_secs_f64(self.baseline_duration_min.max(0.0) * 60.0)
    }

    pub fn to_session_config(&self) -> SessionConfig {
        SessionConfig {
            capacity: self.capacity,
            preview_min_elapsed_secs: self.preview_min_elapsed_min * 60.0,
        }
    }
}

/// Leak analysis settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub window_size: usize,
    pub min_samples: usize,
    pub min_elapsed_hours: f64,
    pub pool_surface_m2: f64,
    pub pass_below_mm_hr: f64,
    pub borderline_below_mm_hr: f64,
    pub leak_below_mm_hr: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        let analyzer = AnalyzerConfig::default();
        Self {
            window_size: analyzer.window_size,
            min_samples: analyzer.min_samples,
            min_elapsed_hours: analyzer.min_elapsed_hours,
            pool_surface_m2: analyzer.pool_surface_m2,
            pass_below_mm_hr: analyzer.thresholds.pass_below,
            borderline_below_mm_hr: analyzer.thresholds.borderline_below,
            leak_below_mm_hr: analyzer.thresholds.leak_below,
        }
    }
}

impl AnalysisConfig {
    pub fn to_analyzer_config(&self) -> AnalyzerConfig {
        AnalyzerConfig {
            window_size: self.window_size,
            min_samples: self.min_samples,
            min_elapsed_hours: self.min_elapsed_hours,
            pool_surface_m2: self.pool_surface_m2,
            thresholds: VerdictThresholds {
                pass_below: self.pass_below_mm_hr,
                borderline_below: self.borderline_below_mm_hr,
                leak_below: self.leak_below_mm_hr,
            },
        }
    }
}

/// HTTP server settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, String> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| format!("Invalid server address '{}:{}': {}", self.host, self.port, e))
    }
}

/// Result storage settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for completed test records
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
        }
    }
}

impl PoolSenseConfig {
    /// Load from [`DEFAULT_CONFIG_PATH`] and the environment.
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load from a specific file path and the environment.
    ///
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, figment::Error> {
        Self::figment(path.as_ref()).extract()
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        let level = self.application.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                VALID_LOG_LEVELS.join(", ")
            ));
        }

        let format = self.application.log_format.to_lowercase();
        if !VALID_LOG_FORMATS.contains(&format.as_str()) {
            return Err(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.application.log_format,
                VALID_LOG_FORMATS.join(", ")
            ));
        }

        let sensor = &self.sensor;
        if !(sensor.fluid_density.is_finite() && sensor.fluid_density > 0.0) {
            return Err(format!(
                "Invalid fluid_density {}. Must be positive",
                sensor.fluid_density
            ));
        }
        if sensor.sample_interval_ms == 0 {
            return Err("sample_interval_ms must be greater than 0".to_string());
        }
        if sensor.read_timeout_ms == 0 {
            return Err("read_timeout_ms must be greater than 0".to_string());
        }
        if sensor.conversion_delay_ms.saturating_mul(2) >= sensor.sample_interval_ms {
            return Err(format!(
                "sample_interval_ms {} leaves no room for two {} ms conversions",
                sensor.sample_interval_ms, sensor.conversion_delay_ms
            ));
        }
        if sensor.max_consecutive_failures == 0 {
            return Err("max_consecutive_failures must be at least 1".to_string());
        }
        if sensor.address > 0x7F {
            return Err(format!(
                "Invalid I2C address {:#x}. Must be a 7-bit address",
                sensor.address
            ));
        }

        let session = &self.session;
        if session.capacity == 0 {
            return Err("session capacity must be greater than 0".to_string());
        }
        if !(session.baseline_duration_min.is_finite() && session.baseline_duration_min >= 0.0) {
            return Err(format!(
                "Invalid baseline_duration_min {}",
                session.baseline_duration_min
            ));
        }
        if !(session.preview_min_elapsed_min.is_finite() && session.preview_min_elapsed_min >= 0.0)
        {
            return Err(format!(
                "Invalid preview_min_elapsed_min {}",
                session.preview_min_elapsed_min
            ));
        }

        let analysis = &self.analysis;
        if analysis.window_size == 0 {
            return Err("window_size must be greater than 0".to_string());
        }
        if analysis.window_size.saturating_mul(2) > analysis.min_samples {
            return Err(format!(
                "window_size {} must be at most half of min_samples {}",
                analysis.window_size, analysis.min_samples
            ));
        }
        if !(analysis.pool_surface_m2.is_finite() && analysis.pool_surface_m2 > 0.0) {
            return Err(format!(
                "Invalid pool_surface_m2 {}. Must be positive",
                analysis.pool_surface_m2
            ));
        }
        if !(analysis.min_elapsed_hours.is_finite() && analysis.min_elapsed_hours > 0.0) {
            return Err(format!(
                "Invalid min_elapsed_hours {}. Must be positive",
                analysis.min_elapsed_hours
            ));
        }
        if !(analysis.pass_below_mm_hr < analysis.borderline_below_mm_hr
            && analysis.borderline_below_mm_hr < analysis.leak_below_mm_hr)
        {
            return Err(format!(
                "Thresholds must increase: pass {} < borderline {} < leak {}",
                analysis.pass_below_mm_hr,
                analysis.borderline_below_mm_hr,
                analysis.leak_below_mm_hr
            ));
        }

        self.server.socket_addr()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn defaults_are_valid() {
        let config = PoolSenseConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sensor.address, 0x76);
        assert_eq!(config.session.capacity, 86_400);
        assert_eq!(config.session.baseline_duration(), Duration::from_secs(900));
        assert_eq!(config.analysis.to_analyzer_config(), AnalyzerConfig::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "pool.toml",
                r#"
                [sensor]
                fluid_density = 1029.0

                [server]
                port = 9090
                "#,
            )?;
            let config = PoolSenseConfig::load_from("pool.toml")?;
            assert_eq!(config.sensor.fluid_density, 1029.0);
            assert_eq!(config.sensor.sample_interval_ms, 1000);
            assert_eq!(config.server.port, 9090);
            assert_eq!(config.server.host, "0.0.0.0");
            Ok(())
        });
    }

    #[test]
    fn environment_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file("pool.toml", "[server]\nport = 9090\n")?;
            jail.set_env("POOLSENSE_SERVER__PORT", "7000");
            jail.set_env("POOLSENSE_SESSION__BASELINE_DURATION_MIN", "1.5");
            jail.set_env("POOLSENSE_SENSOR__SIMULATION_SEED", "42");
            let config = PoolSenseConfig::load_from("pool.toml")?;
            assert_eq!(config.server.port, 7000);
            assert_eq!(config.session.baseline_duration_min, 1.5);
            assert_eq!(config.sensor.simulation_seed, Some(42));
            Ok(())
        });
    }

    #[test]
    fn missing_file_uses_defaults() {
        Jail::expect_with(|_jail| {
            let config = PoolSenseConfig::load_from("does-not-exist.toml")?;
            assert_eq!(config, PoolSenseConfig::default());
            Ok(())
        });
    }

    #[test]
    fn rejects_bad_log_settings() {
        let mut config = PoolSenseConfig::default();
        config.application.log_level = "verbose".to_string();
        assert!(config.validate().unwrap_err().contains("log_level"));

        let mut config = PoolSenseConfig::default();
        config.application.log_format = "xml".to_string();
        assert!(config.validate().unwrap_err().contains("log_format"));
    }

    #[test]
    fn rejects_non_positive_density_and_interval() {
        let mut config = PoolSenseConfig::default();
        config.sensor.fluid_density = 0.0;
        assert!(config.validate().is_err());

        let mut config = PoolSenseConfig::default();
        config.sensor.sample_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn huge_values_are_rejected_not_overflowed() {
        let mut config = PoolSenseConfig::default();
        config.sensor.conversion_delay_ms = u64::MAX;
        assert!(config.validate().unwrap_err().contains("conversions"));

        let mut config = PoolSenseConfig::default();
        config.analysis.window_size = usize::MAX;
        assert!(config.validate().unwrap_err().contains("window_size"));
    }

    #[test]
    fn rejects_zero_capacity() {
        let mut config = PoolSenseConfig::default();
        config.session.capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_window_larger_than_half_min_samples() {
        let mut config = PoolSenseConfig::default();
        config.analysis.window_size = 31;
        assert!(config.validate().unwrap_err().contains("window_size"));
    }

    #[test]
    fn rejects_unordered_thresholds() {
        let mut config = PoolSenseConfig::default();
        config.analysis.borderline_below_mm_hr = 3.0;
        assert!(config.validate().unwrap_err().contains("Thresholds"));
    }

    #[test]
    fn rejects_unparseable_host() {
        let mut config = PoolSenseConfig::default();
        config.server.host = "not a host".to_string();
        assert!(config.validate().is_err());
    }
}

//! Leak-rate analysis over a session's samples.
//!
//! The analyzer compares the mean depth of the first and last windows of a
//! test, subtracts modeled evaporation over the elapsed time and classifies
//! the remaining loss rate.
//!
//! | Rate (mm/hr)  | Classification |
//! |---------------|----------------|
//! | `< 0.1`       | Pass           |
//! | `< 0.5`       | Borderline     |
//! | `< 2.0`       | Leak           |
//! | otherwise     | MajorLeak      |
//!
//! Too few samples or too short a span yields `None`. That is an expected
//! transient state early in a test, not an error.
//!
//! Simulated readings (appended while the sensor is unavailable) follow an
//! absolute model depth while sensor readings are relative to the reference
//! pressure, so the two are never averaged together. When a session holds any
//! sensor readings, only those are analyzed and the simulated ones are counted
//! as excluded. A session with nothing but simulated readings is analyzed as
//! such and the verdict says so.

use crate::reading::{CompensatedReading, ReadingSource};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Litres per US gallon.
const LITRES_PER_GALLON: f64 = 3.785;

// =============================================================================
// Evaporation
// =============================================================================

/// Pluggable evaporation estimate.
pub trait EvaporationModel: Send + Sync + std::fmt::Debug {
    /// Expected evaporative loss in mm/hr at the given mean water temperature.
    fn rate_mm_per_hour(&self, water_temp_c: f64) -> f64;
}

/// Linear temperature-only heuristic with a floor.
///
/// Roughly 0.09 mm/hr at 20 °C, 0.17 mm/hr at 30 °C.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemperatureEvaporation {
    pub base_rate_mm_hr: f64,
    pub reference_temp_c: f64,
    pub slope_mm_hr_per_c: f64,
    pub floor_mm_hr: f64,
}

impl Default for TemperatureEvaporation {
    fn default() -> Self {
        Self {
            base_rate_mm_hr: 0.05,
            reference_temp_c: 15.0,
            slope_mm_hr_per_c: 0.008,
            floor_mm_hr: 0.05,
        }
    }
}

impl EvaporationModel for TemperatureEvaporation {
    fn rate_mm_per_hour(&self, water_temp_c: f64) -> f64 {
        let rate =
            self.base_rate_mm_hr + (water_temp_c - self.reference_temp_c) * self.slope_mm_hr_per_c;
        rate.max(self.floor_mm_hr)
    }
}

// =============================================================================
// Verdict
// =============================================================================

/// Outcome class of a leak test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classification {
    Pass,
    Borderline,
    Leak,
    MajorLeak,
}

impl Classification {
    /// Explanatory message for a given net loss rate.
    pub fn message(&self, rate_mm_hr: f64) -> String {
        match self {
            Classification::Pass => {
                "No leak detected. Water loss within normal evaporation range.".to_string()
            }
            Classification::Borderline => format!(
                "Minor water loss detected ({:.2} mm/hr). Could be slow leak or high evaporation. Recommend extended test.",
                rate_mm_hr
            ),
            Classification::Leak => format!(
                "Leak confirmed at {:.2} mm/hr. Moderate leak, recommend dye testing to locate.",
                rate_mm_hr
            ),
            Classification::MajorLeak => format!(
                "Significant leak at {:.2} mm/hr. Urgent repair needed.",
                rate_mm_hr
            ),
        }
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Classification::Pass => "PASS",
            Classification::Borderline => "BORDERLINE",
            Classification::Leak => "LEAK",
            Classification::MajorLeak => "MAJOR LEAK",
        };
        write!(f, "{}", label)
    }
}

/// Exclusive upper bounds (mm/hr) for each classification.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VerdictThresholds {
    pub pass_below: f64,
    pub borderline_below: f64,
    pub leak_below: f64,
}

impl Default for VerdictThresholds {
    fn default() -> Self {
        Self {
            pass_below: 0.1,
            borderline_below: 0.5,
            leak_below: 2.0,
        }
    }
}

impl VerdictThresholds {
    pub fn classify(&self, rate_mm_hr: f64) -> Classification {
        if rate_mm_hr < self.pass_below {
            Classification::Pass
        } else if rate_mm_hr < self.borderline_below {
            Classification::Borderline
        } else if rate_mm_hr < self.leak_below {
            Classification::Leak
        } else {
            Classification::MajorLeak
        }
    }
}

/// Result of a leak analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeakVerdict {
    pub raw_loss_mm: f64,
    pub evap_correction_mm: f64,
    pub net_loss_mm: f64,
    pub leak_rate_mm_hr: f64,
    pub leak_rate_gal_day: f64,
    pub elapsed_hours: f64,
    pub avg_temp_c: f64,
    pub classification: Classification,
    pub message: String,
    /// Source of the readings the verdict was computed from.
    #[serde(default)]
    pub source: ReadingSource,
    /// Simulated readings present in the analyzed session.
    #[serde(default)]
    pub simulated_samples: usize,
}

impl LeakVerdict {
    /// True when the verdict is not backed by sensor data.
    pub fn is_simulated(&self) -> bool {
        self.source == ReadingSource::Simulated
    }
}

// =============================================================================
// Analyzer
// =============================================================================

/// Tunables for [`LeakAnalyzer`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalyzerConfig {
    /// Samples averaged at each end of the test.
    pub window_size: usize,
    /// Minimum sample count before a verdict is attempted.
    pub min_samples: usize,
    /// Minimum first-to-last span, in hours.
    pub min_elapsed_hours: f64,
    /// Pool surface used for the volume estimate.
    pub pool_surface_m2: f64,
    pub thresholds: VerdictThresholds,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            window_size: 30,
            min_samples: 60,
            min_elapsed_hours: 0.1,
            pool_surface_m2: 60.0,
            thresholds: VerdictThresholds::default(),
        }
    }
}

/// Windowed-average leak analyzer.
#[derive(Debug, Clone)]
pub struct LeakAnalyzer {
    config: AnalyzerConfig,
    evaporation: Arc<dyn EvaporationModel>,
}

impl Default for LeakAnalyzer {
    fn default() -> Self {
        Self::new(AnalyzerConfig::default())
    }
}

impl LeakAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self {
            config,
            evaporation: Arc::new(TemperatureEvaporation::default()),
        }
    }

    /// Replace the evaporation model.
    pub fn with_evaporation(mut self, model: Arc<dyn EvaporationModel>) -> Self {
        self.evaporation = model;
        self
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Analyze an ordered sequence of samples.
    ///
    /// Accepts anything iterable by reference whose iterator is cheap to clone
    /// and double-ended, so both slices and the session's ring buffer can be
    /// analyzed in place without copying. Only mixed-source sessions pay for
    /// collecting the sensor readings first.
    pub fn analyze<'a, I>(&self, samples: I) -> Option<LeakVerdict>
    where
        I: IntoIterator<Item = &'a CompensatedReading>,
        I::IntoIter: ExactSizeIterator + DoubleEndedIterator + Clone,
    {
        let iter = samples.into_iter();
        let simulated_samples = iter.clone().filter(|r| r.is_simulated()).count();
        if simulated_samples == 0 {
            return self.verdict(iter, ReadingSource::Sensor, 0);
        }
        if simulated_samples == iter.len() {
            return self.verdict(iter, ReadingSource::Simulated, simulated_samples);
        }

        let sensor: Vec<&CompensatedReading> = iter.filter(|r| !r.is_simulated()).collect();
        self.verdict(sensor.iter().copied(), ReadingSource::Sensor, simulated_samples)
    }

    fn verdict<'a, J>(&self, iter: J, source: ReadingSource, simulated_samples: usize) -> Option<LeakVerdict>
    where
        J: ExactSizeIterator<Item = &'a CompensatedReading> + DoubleEndedIterator + Clone,
    {
        let count = iter.len();
        if count < self.config.min_samples.max(1) {
            return None;
        }

        let first = iter.clone().next()?;
        let last = iter.clone().next_back()?;
        let elapsed_hours = (last.timestamp - first.timestamp) / 3600.0;
        if elapsed_hours.is_nan() || elapsed_hours <= 0.0 || elapsed_hours < self.config.min_elapsed_hours {
            return None;
        }

        let window = self.config.window_size.clamp(1, count);
        let start_depth = mean(iter.clone().take(window).map(|r| r.depth_mm));
        let end_depth = mean(iter.clone().rev().take(window).map(|r| r.depth_mm));
        let avg_temp_c = mean(iter.map(|r| r.temperature_c));

        let raw_loss_mm = start_depth - end_depth;
        let evap_rate = self.evaporation.rate_mm_per_hour(avg_temp_c);
        let evap_correction_mm = evap_rate * elapsed_hours;
        let net_loss_mm = raw_loss_mm - evap_correction_mm;
        let leak_rate_mm_hr = net_loss_mm / elapsed_hours;
        // 1 mm over 1 m² is one litre.
        let leak_rate_gal_day =
            leak_rate_mm_hr * 24.0 * self.config.pool_surface_m2 / LITRES_PER_GALLON;

        let classification = self.config.thresholds.classify(leak_rate_mm_hr);
        let mut message = classification.message(leak_rate_mm_hr);
        match source {
            ReadingSource::Simulated => message.insert_str(0, "SIMULATED DATA, no sensor readings. "),
            ReadingSource::Sensor if simulated_samples > 0 => {
                message.push_str(&format!(" ({} simulated readings excluded)", simulated_samples));
            }
            ReadingSource::Sensor => {}
        }

        Some(LeakVerdict {
            raw_loss_mm,
            evap_correction_mm,
            net_loss_mm,
            leak_rate_mm_hr,
            leak_rate_gal_day,
            elapsed_hours,
            avg_temp_c,
            classification,
            message,
            source,
            simulated_samples,
        })
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(count: usize, spacing_s: f64, depth: impl Fn(usize) -> f64, temp: f64) -> Vec<CompensatedReading> {
        (0..count)
            .map(|i| CompensatedReading::new(i as f64 * spacing_s, 1100.0, temp, depth(i)))
            .collect()
    }

    #[test]
    fn evaporation_has_floor() {
        let model = TemperatureEvaporation::default();
        assert!((model.rate_mm_per_hour(25.0) - 0.13).abs() < 1e-12);
        assert!((model.rate_mm_per_hour(20.0) - 0.09).abs() < 1e-12);
        assert_eq!(model.rate_mm_per_hour(5.0), 0.05);
    }

    #[test]
    fn thresholds_are_exclusive_upper_bounds() {
        let t = VerdictThresholds::default();
        assert_eq!(t.classify(-1.0), Classification::Pass);
        assert_eq!(t.classify(0.0999), Classification::Pass);
        assert_eq!(t.classify(0.1), Classification::Borderline);
        assert_eq!(t.classify(0.5), Classification::Leak);
        assert_eq!(t.classify(1.99), Classification::Leak);
        assert_eq!(t.classify(2.0), Classification::MajorLeak);
    }

    #[test]
    fn messages_embed_rate() {
        assert!(Classification::Leak.message(0.734).contains("0.73 mm/hr"));
        assert!(Classification::MajorLeak.message(3.0).contains("Urgent repair"));
        assert_eq!(Classification::MajorLeak.to_string(), "MAJOR LEAK");
    }

    #[test]
    fn too_few_samples_is_none() {
        let analyzer = LeakAnalyzer::default();
        for count in [0, 1, 30, 59] {
            let samples = series(count, 60.0, |_| 1000.0, 20.0);
            assert!(analyzer.analyze(&samples).is_none(), "count {count}");
        }
    }

    #[test]
    fn too_short_span_is_none() {
        let analyzer = LeakAnalyzer::default();
        // 300 samples at 1 Hz span 299 s, under the 6 minute minimum.
        let samples = series(300, 1.0, |_| 1000.0, 20.0);
        assert!(analyzer.analyze(&samples).is_none());

        // Identical timestamps never divide by zero.
        let flat: Vec<_> = (0..100)
            .map(|_| CompensatedReading::new(5.0, 1100.0, 20.0, 1000.0))
            .collect();
        assert!(analyzer.analyze(&flat).is_none());
    }

    #[test]
    fn exactly_six_minutes_is_enough() {
        let analyzer = LeakAnalyzer::default();
        // 361 samples at 1 Hz span exactly 360 s = 0.1 h.
        let samples = series(361, 1.0, |_| 1000.0, 20.0);
        assert!(analyzer.analyze(&samples).is_some());
    }

    #[test]
    fn steady_large_drop_is_major_leak() {
        let analyzer = LeakAnalyzer::default();
        // 3 mm/hr drop, one sample per minute for two hours.
        let samples = series(121, 60.0, |i| 1000.0 - 3.0 * i as f64 / 60.0, 15.0);
        let verdict = analyzer.analyze(&samples).unwrap();
        assert_eq!(verdict.classification, Classification::MajorLeak);
        assert!((verdict.elapsed_hours - 2.0).abs() < 1e-12);
        // Window centres are 91 minutes apart: 4.55 mm raw loss.
        assert!((verdict.raw_loss_mm - 4.55).abs() < 1e-9);
        assert!((verdict.evap_correction_mm - 0.1).abs() < 1e-12);
        let expected_gal = verdict.leak_rate_mm_hr * 24.0 * 60.0 / 3.785;
        assert!((verdict.leak_rate_gal_day - expected_gal).abs() < 1e-9);
    }

    #[derive(Debug)]
    struct NoEvaporation;

    impl EvaporationModel for NoEvaporation {
        fn rate_mm_per_hour(&self, _water_temp_c: f64) -> f64 {
            0.0
        }
    }

    #[test]
    fn evaporation_model_is_pluggable() {
        let analyzer = LeakAnalyzer::default().with_evaporation(Arc::new(NoEvaporation));
        let samples = series(120, 60.0, |_| 1000.0, 30.0);
        let verdict = analyzer.analyze(&samples).unwrap();
        assert_eq!(verdict.evap_correction_mm, 0.0);
        assert_eq!(verdict.leak_rate_mm_hr, 0.0);
        assert_eq!(verdict.classification, Classification::Pass);
    }

    #[test]
    fn analyzes_ring_buffer_in_place() {
        let analyzer = LeakAnalyzer::default();
        let mut ring = std::collections::VecDeque::new();
        for reading in series(120, 60.0, |_| 1000.0, 20.0) {
            ring.push_back(reading);
        }
        assert!(analyzer.analyze(&ring).is_some());
    }

    #[test]
    fn simulated_readings_are_excluded_from_mixed_sessions() {
        let analyzer = LeakAnalyzer::default();
        // 400 s of flat sensor data near zero, then a minute of model depth near 1000 mm.
        let mut samples = series(400, 1.0, |_| 0.0, 25.0);
        samples.extend(
            (400..460).map(|i| CompensatedReading::new(i as f64, 1100.0, 25.0, 1000.0).simulated()),
        );

        let verdict = analyzer.analyze(&samples).unwrap();
        assert_eq!(verdict.source, ReadingSource::Sensor);
        assert_eq!(verdict.simulated_samples, 60);
        assert_eq!(verdict.raw_loss_mm, 0.0);
        assert!((verdict.elapsed_hours - 399.0 / 3600.0).abs() < 1e-12);
        assert!(verdict.message.contains("60 simulated readings excluded"));
        assert!(!verdict.is_simulated());
    }

    #[test]
    fn mixed_session_with_too_few_sensor_readings_is_withheld() {
        let analyzer = LeakAnalyzer::default();
        let mut samples = series(30, 20.0, |_| 0.0, 25.0);
        samples.extend(
            (30..130).map(|i| CompensatedReading::new(i as f64 * 20.0, 1100.0, 25.0, 1000.0).simulated()),
        );
        assert!(analyzer.analyze(&samples).is_none());
    }

    #[test]
    fn all_simulated_session_is_labelled() {
        let analyzer = LeakAnalyzer::default();
        let samples: Vec<_> = series(120, 60.0, |i| 1000.0 - 0.02 * i as f64, 25.0)
            .into_iter()
            .map(CompensatedReading::simulated)
            .collect();

        let verdict = analyzer.analyze(&samples).unwrap();
        assert!(verdict.is_simulated());
        assert_eq!(verdict.simulated_samples, 120);
        assert!(verdict.message.starts_with("SIMULATED DATA"));
    }

    #[test]
    fn sensor_only_verdict_has_no_simulated_marker() {
        let verdict = LeakAnalyzer::default()
            .analyze(&series(120, 60.0, |_| 1000.0, 20.0))
            .unwrap();
        assert_eq!(verdict.source, ReadingSource::Sensor);
        assert_eq!(verdict.simulated_samples, 0);
        assert!(!verdict.message.contains("simulated"));
    }
}

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Result, TrainerError};

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub metronome: MetronomeConfig,
    pub detector: DetectorConfig,
}

impl AppConfig {
    /// Loads configuration overrides from a JSON file and validates them.
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.detector.validate()
    }
}

/// Configuration for the look-ahead metronome.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetronomeConfig {
    /// Tempo in beats per minute. Clamped to the engine's 30-300 range.
    pub bpm: u32,
    /// Beats per bar; beat 0 of each bar carries the accent click.
    pub beats_per_bar: u32,
    /// Seconds between the start call and the first scheduled beat, so the
    /// first click is never placed in the past.
    pub start_lead: f64,
    /// How often the host should invoke the scheduling pass, in seconds.
    pub tick_interval: f64,
    /// How far ahead of the clock beats are committed, in seconds. Must
    /// comfortably exceed `tick_interval` so a starved pass can catch up.
    pub schedule_ahead: f64,
}

impl Default for MetronomeConfig {
    fn default() -> Self {
        Self {
            bpm: 120,
            beats_per_bar: 4,
            start_lead: 0.05,
            tick_interval: 0.025,
            schedule_ahead: 0.1,
        }
    }
}

/// Configuration for the strum onset detector.
///
/// The threshold and debounce defaults are empirical values tuned against
/// the 0-255 energy scale produced by [`crate::SpectralEnergy`]; suitability
/// depends on input gain, so they are configurable rather than hardcoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Energy above this value can trigger an onset.
    pub upper_threshold: f32,
    /// Energy below this value re-arms the detector. The gap between the
    /// two thresholds is deliberate hysteresis and must never collapse.
    pub lower_threshold: f32,
    /// Minimum interval between two accepted onsets, in seconds.
    pub debounce_window: f64,
    /// Per-bin exponential smoothing applied to the magnitude spectrum.
    pub smoothing: f32,
    /// Analysis window length in samples. Power of two.
    pub fft_size: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            upper_threshold: 15.0,
            lower_threshold: 10.0,
            debounce_window: 0.3,
            smoothing: 0.8,
            fft_size: 256,
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.lower_threshold < 0.0 {
            return Err(TrainerError::config(
                "lower threshold must be non-negative",
            ));
        }
        if self.upper_threshold <= self.lower_threshold {
            return Err(TrainerError::config(
                "upper threshold must exceed the lower threshold",
            ));
        }
        if self.debounce_window < 0.0 {
            return Err(TrainerError::config(
                "debounce window must be non-negative",
            ));
        }
        if !(0.0..1.0).contains(&self.smoothing) {
            return Err(TrainerError::config("smoothing must be within [0, 1)"));
        }
        if !self.fft_size.is_power_of_two() || self.fft_size < 32 {
            return Err(TrainerError::config(
                "fft size must be a power of two of at least 32",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        AppConfig::default().validate().unwrap();
    }

    #[test]
    fn default_detector_keeps_source_constants() {
        let config = DetectorConfig::default();
        assert_eq!(config.upper_threshold, 15.0);
        assert_eq!(config.lower_threshold, 10.0);
        assert_eq!(config.debounce_window, 0.3);
    }

    #[test]
    fn rejects_collapsed_hysteresis() {
        let config = DetectorConfig {
            upper_threshold: 10.0,
            lower_threshold: 10.0,
            ..DetectorConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_odd_fft_size() {
        let config = DetectorConfig {
            fft_size: 300,
            ..DetectorConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn round_trips_through_json() {
        let config = AppConfig::default();
        let text = serde_json::to_string(&config).unwrap();
        let restored: AppConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(restored.metronome.bpm, config.metronome.bpm);
        assert_eq!(
            restored.detector.upper_threshold,
            config.detector.upper_threshold
        );
    }
}

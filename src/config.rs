use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::analysis::weighting::BassBoost;
use crate::error::{AnalyzerError, Result};

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub analyzer: AnalyzerConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
}

/// Everything the analysis engine needs. Set once at construction.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AnalyzerConfig {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: f32,
    #[serde(default = "default_channels")]
    pub channels: usize,
    #[serde(default = "default_fft_size")]
    pub fft_size: usize,
    #[serde(default = "default_band_count")]
    pub band_count: usize,
    #[serde(default = "default_min_bins_per_band")]
    pub min_bins_per_band: usize,
    #[serde(default = "default_min_frequency")]
    pub min_frequency: f32,
    #[serde(default = "default_max_frequency")]
    pub max_frequency: f32,
    /// Display refresh rate the smoother is tuned for.
    #[serde(default = "default_target_fps")]
    pub target_fps: f32,
    /// Ring capacity as a multiple of `fft_size`.
    #[serde(default = "default_ring_capacity_factor")]
    pub ring_capacity_factor: usize,
    /// Samples per channel used for stereo points and correlation.
    #[serde(default = "default_stereo_window")]
    pub stereo_window: usize,
    #[serde(default = "default_stereo_points")]
    pub stereo_points: usize,
    /// Delay before the tap is installed on a freshly attached source.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    /// Level mapped to 0.0 by the normaliser; 0 dB maps to 1.0.
    #[serde(default = "default_floor_db")]
    pub floor_db: f32,
    #[serde(default)]
    pub bass_boost: BassBoost,
    #[serde(default)]
    pub dynamics: DynamicsConfig,
    #[serde(default)]
    pub smoothing: SmoothingConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DynamicsConfig {
    #[serde(default = "default_attack_ms")]
    pub attack_ms: f32,
    #[serde(default = "default_release_ms")]
    pub release_ms: f32,
    #[serde(default = "default_threshold_db")]
    pub threshold_db: f32,
    #[serde(default = "default_ratio")]
    pub ratio: f32,
    #[serde(default = "default_knee_db")]
    pub knee_db: f32,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SmoothingConfig {
    #[serde(default = "default_smoothing_release_ms")]
    pub release_ms: f32,
    #[serde(default = "default_peak_decay_step")]
    pub peak_decay_step: f32,
}

#[derive(Debug, Deserialize)]
pub struct PlaybackConfig {
    /// Frames per simulated audio callback.
    #[serde(default = "default_block_size")]
    pub block_size: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            channels: default_channels(),
            fft_size: default_fft_size(),
            band_count: default_band_count(),
            min_bins_per_band: default_min_bins_per_band(),
            min_frequency: default_min_frequency(),
            max_frequency: default_max_frequency(),
            target_fps: default_target_fps(),
            ring_capacity_factor: default_ring_capacity_factor(),
            stereo_window: default_stereo_window(),
            stereo_points: default_stereo_points(),
            settle_delay_ms: default_settle_delay_ms(),
            floor_db: default_floor_db(),
            bass_boost: BassBoost::default(),
            dynamics: DynamicsConfig::default(),
            smoothing: SmoothingConfig::default(),
        }
    }
}

impl Default for DynamicsConfig {
    fn default() -> Self {
        Self {
            attack_ms: default_attack_ms(),
            release_ms: default_release_ms(),
            threshold_db: default_threshold_db(),
            ratio: default_ratio(),
            knee_db: default_knee_db(),
        }
    }
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            release_ms: default_smoothing_release_ms(),
            peak_decay_step: default_peak_decay_step(),
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            block_size: default_block_size(),
        }
    }
}

fn default_sample_rate() -> f32 { 44100.0 }
fn default_channels() -> usize { 2 }
fn default_fft_size() -> usize { 8192 }
fn default_band_count() -> usize { 32 }
fn default_min_bins_per_band() -> usize { 3 }
fn default_min_frequency() -> f32 { 20.0 }
fn default_max_frequency() -> f32 { 20000.0 }
fn default_target_fps() -> f32 { 60.0 }
fn default_ring_capacity_factor() -> usize { 4 }
fn default_stereo_window() -> usize { 1024 }
fn default_stereo_points() -> usize { 100 }
fn default_settle_delay_ms() -> u64 { 120 }
fn default_floor_db() -> f32 { -60.0 }
fn default_attack_ms() -> f32 { 1.0 }
fn default_release_ms() -> f32 { 100.0 }
fn default_threshold_db() -> f32 { -12.0 }
fn default_ratio() -> f32 { 4.0 }
fn default_knee_db() -> f32 { 6.0 }
fn default_smoothing_release_ms() -> f32 { 150.0 }
fn default_peak_decay_step() -> f32 { 0.01 }
fn default_block_size() -> usize { 512 }

impl AnalyzerConfig {
    pub fn ring_capacity(&self) -> usize {
        self.fft_size.saturating_mul(self.ring_capacity_factor.max(1)).max(1)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_secs_f32(1.0 / self.target_fps.max(1.0))
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(AnalyzerError::InvalidConfig(msg));

        if !(self.sample_rate > 0.0) {
            return invalid(format!("sample_rate must be positive, got {}", self.sample_rate));
        }
        if self.channels == 0 || self.channels > 2 {
            return invalid(format!("channels must be 1 or 2, got {}", self.channels));
        }
        if self.band_count == 0 {
            return invalid("band_count must be at least 1".into());
        }
        if self.min_bins_per_band == 0 {
            return invalid("min_bins_per_band must be at least 1".into());
        }
        if !(self.min_frequency > 0.0 && self.min_frequency < self.max_frequency) {
            return invalid(format!(
                "frequency range must satisfy 0 < min < max, got {}..{}",
                self.min_frequency, self.max_frequency
            ));
        }
        if !(self.target_fps > 0.0) {
            return invalid(format!("target_fps must be positive, got {}", self.target_fps));
        }
        if !(self.floor_db < 0.0) {
            return invalid(format!("floor_db must be negative, got {}", self.floor_db));
        }
        if self.stereo_window == 0 {
            return invalid("stereo_window must be at least 1".into());
        }
        if !(self.dynamics.ratio >= 1.0) {
            return invalid(format!("ratio must be >= 1, got {}", self.dynamics.ratio));
        }
        if !(self.dynamics.attack_ms > 0.0 && self.dynamics.release_ms > 0.0) {
            return invalid("envelope attack and release must be positive".into());
        }
        if self.dynamics.knee_db < 0.0 {
            return invalid(format!("knee_db must be >= 0, got {}", self.dynamics.knee_db));
        }
        if !(self.smoothing.release_ms > 0.0) {
            return invalid("smoothing release must be positive".into());
        }
        if !(0.0..=1.0).contains(&self.smoothing.peak_decay_step) {
            return invalid(format!(
                "peak_decay_step must be within 0..=1, got {}",
                self.smoothing.peak_decay_step
            ));
        }
        self.bass_boost.validate()
    }
}

pub fn load_config(path: &PathBuf) -> Option<Config> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(err) => {
            log::warn!("Ignoring malformed config {}: {}", path.display(), err);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AnalyzerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.fft_size, 8192);
        assert_eq!(config.band_count, 32);
        assert_eq!(config.ring_capacity(), 4 * 8192);
        assert_eq!(config.settle_delay(), Duration::from_millis(120));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [analyzer]
            fft_size = 4096
            band_count = 24

            [analyzer.dynamics]
            ratio = 2.0

            [analyzer.smoothing]
            peak_decay_step = 0.008

            [playback]
            block_size = 256
            "#,
        )
        .unwrap();

        assert_eq!(config.analyzer.fft_size, 4096);
        assert_eq!(config.analyzer.band_count, 24);
        assert_eq!(config.analyzer.dynamics.ratio, 2.0);
        assert_eq!(config.analyzer.dynamics.threshold_db, -12.0);
        assert_eq!(config.analyzer.smoothing.peak_decay_step, 0.008);
        assert_eq!(config.analyzer.smoothing.release_ms, 150.0);
        assert_eq!(config.analyzer.bass_boost, BassBoost::default());
        assert_eq!(config.playback.block_size, 256);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AnalyzerConfig::default();
        config.dynamics.ratio = 0.5;
        assert!(matches!(config.validate(), Err(AnalyzerError::InvalidConfig(_))));

        let mut config = AnalyzerConfig::default();
        config.min_frequency = 30000.0;
        assert!(config.validate().is_err());

        let mut config = AnalyzerConfig::default();
        config.channels = 6;
        assert!(config.validate().is_err());
    }
}

use super::spectrum::lin_to_db;
use crate::config::SmoothingConfig;

/// Maps a linear magnitude onto `[0, 1]`, `floor_db` at 0 and 0 dB at 1.
pub fn normalize_level(magnitude: f32, floor_db: f32) -> f32 {
    ((lin_to_db(magnitude) - floor_db) / -floor_db).clamp(0.0, 1.0)
}

/// Instant-attack / linear-release level smoothing with a peak-hold trace
/// for one output stream. Indexed by band.
pub struct TemporalSmoother {
    smoothed: Vec<f32>,
    peaks: Vec<f32>,
    decay_factor: f32,
    peak_decay_step: f32,
    floor_db: f32,
}

impl TemporalSmoother {
    pub fn new(band_count: usize, config: &SmoothingConfig, target_fps: f32, floor_db: f32) -> Self {
        let frame_s = 1.0 / target_fps.max(f32::EPSILON);
        let release_s = (config.release_ms / 1000.0).max(f32::EPSILON);
        Self {
            smoothed: vec![0.0; band_count],
            peaks: vec![0.0; band_count],
            decay_factor: (frame_s / release_s).clamp(0.0, 1.0),
            peak_decay_step: config.peak_decay_step,
            floor_db,
        }
    }

    pub fn decay_factor(&self) -> f32 {
        self.decay_factor
    }

    /// Feeds one band's reduced magnitude and returns `(level, peak)`.
    pub fn update(&mut self, band: usize, magnitude: f32) -> (f32, f32) {
        let level = normalize_level(magnitude, self.floor_db);
        self.update_level(band, level)
    }

    /// Same as [`update`](Self::update) for an already normalised level.
    pub fn update_level(&mut self, band: usize, level: f32) -> (f32, f32) {
        let current = self.smoothed[band];
        let smoothed = if level > current {
            level
        } else {
            (current - (current - level) * self.decay_factor).max(0.0)
        };
        self.smoothed[band] = smoothed;

        let peak = smoothed.max(self.peaks[band] - self.peak_decay_step);
        self.peaks[band] = peak;

        (smoothed, peak)
    }

    pub fn levels(&self) -> &[f32] {
        &self.smoothed
    }

    pub fn peaks(&self) -> &[f32] {
        &self.peaks
    }

    pub fn reset(&mut self) {
        self.smoothed.fill(0.0);
        self.peaks.fill(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn smoother() -> TemporalSmoother {
        TemporalSmoother::new(4, &SmoothingConfig::default(), 60.0, -60.0)
    }

    #[test]
    fn test_normalize_level() {
        assert_eq!(normalize_level(0.0, -60.0), 0.0);
        assert_eq!(normalize_level(10.0, -60.0), 1.0);
        assert!((normalize_level(10f32.powf(-30.0 / 20.0), -60.0) - 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_decay_factor() {
        let s = smoother();
        assert!((s.decay_factor() - (1.0 / 60.0) / 0.15).abs() < 1e-6);
    }

    #[test]
    fn test_attack_snaps_release_decays() {
        let mut s = smoother();
        let (level, peak) = s.update_level(0, 0.8);
        assert_eq!(level, 0.8);
        assert_eq!(peak, 0.8);

        let (level, _) = s.update_level(0, 0.0);
        let expected = 0.8 - 0.8 * s.decay_factor();
        assert!((level - expected).abs() < 1e-6);

        // Converges towards zero without undershooting.
        for _ in 0..500 {
            let (level, _) = s.update_level(0, 0.0);
            assert!(level >= 0.0);
        }
        assert!(s.levels()[0] < 1e-6);
    }

    #[test]
    fn test_peak_decays_linearly_to_smoothed() {
        let config = SmoothingConfig {
            release_ms: 150.0,
            peak_decay_step: 0.01,
        };
        let mut s = TemporalSmoother::new(1, &config, 60.0, -60.0);
        s.update_level(0, 0.9);

        let mut prev_peak = 0.9f32;
        let mut reached = false;
        for _ in 0..200 {
            let (level, peak) = s.update_level(0, 0.0);
            assert!(peak >= level);
            if !reached && prev_peak - 0.01 > level {
                assert!((prev_peak - peak - 0.01).abs() < 1e-6);
            } else {
                reached = true;
                assert_eq!(peak, level);
            }
            prev_peak = peak;
        }
        assert!(reached);
    }

    #[test]
    fn test_peak_tracks_new_highs() {
        let mut s = smoother();
        s.update_level(1, 0.3);
        let (_, peak) = s.update_level(1, 0.7);
        assert_eq!(peak, 0.7);
        assert_eq!(s.peaks()[0], 0.0);
    }

    #[test]
    fn test_reset() {
        let mut s = smoother();
        s.update(2, 1.0);
        s.reset();
        assert!(s.levels().iter().all(|&v| v == 0.0));
        assert!(s.peaks().iter().all(|&v| v == 0.0));
    }
}

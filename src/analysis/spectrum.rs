use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use super::bands::BandLayout;
use crate::config::AnalyzerConfig;
use crate::error::{AnalyzerError, Result};

/// Keeps `log10` finite on silent bands.
pub const DB_EPSILON: f32 = 1e-5;

pub fn lin_to_db(value: f32) -> f32 {
    20.0 * (value + DB_EPSILON).log10()
}

/// Per-band result of one windowed FFT.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BandSpectrum {
    /// Bass-boost weighted band RMS magnitude (linear).
    pub rms: Vec<f32>,
    /// `rms` in dB.
    pub loudness_db: Vec<f32>,
}

pub struct SpectrumEstimator {
    fft: Arc<dyn Fft<f32>>,
    fft_size: usize,
    window: Vec<f32>,
    layout: BandLayout,
    weights: Vec<f32>,
}

impl SpectrumEstimator {
    pub fn new(config: &AnalyzerConfig) -> Result<Self> {
        let fft_size = config.fft_size;
        if fft_size < 2 || !fft_size.is_power_of_two() {
            return Err(AnalyzerError::FftSetup {
                fft_size,
                reason: "size must be a power of two".into(),
            });
        }

        let layout = BandLayout::from_config(config).map_err(|err| AnalyzerError::FftSetup {
            fft_size,
            reason: err.to_string(),
        })?;
        config.bass_boost.validate()?;

        let weights = layout
            .bands()
            .iter()
            .map(|band| config.bass_boost.gain_at(band.center_hz))
            .collect();

        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(fft_size);

        log::debug!(
            "Spectrum estimator ready: fft_size={}, bands={}, bin={:.2}Hz",
            fft_size,
            layout.len(),
            layout.bin_hz()
        );

        Ok(Self {
            fft,
            fft_size,
            window: hann_window(fft_size),
            layout,
            weights,
        })
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn layout(&self) -> &BandLayout {
        &self.layout
    }

    /// Windowed FFT magnitudes for bins `[0, fft_size / 2)`. Input shorter
    /// than `fft_size` is zero-padded at the end; longer input is truncated.
    pub fn magnitudes(&self, samples: &[f32]) -> Vec<f32> {
        let mut buffer: Vec<Complex<f32>> = vec![Complex::new(0.0, 0.0); self.fft_size];
        for (i, (&s, &w)) in samples.iter().zip(self.window.iter()).enumerate() {
            buffer[i] = Complex::new(s * w, 0.0);
        }
        self.fft.process(&mut buffer);

        buffer[..self.fft_size / 2].iter().map(|c| c.norm()).collect()
    }

    pub fn analyze(&self, samples: &[f32]) -> BandSpectrum {
        let magnitudes = self.magnitudes(samples);

        let rms: Vec<f32> = self
            .layout
            .bands()
            .iter()
            .zip(self.weights.iter())
            .map(|(band, &weight)| {
                let bins = &magnitudes[band.start_bin..band.end_bin];
                if bins.is_empty() {
                    return 0.0;
                }
                let mean_sq = bins.iter().map(|&m| m * m).sum::<f32>() / bins.len() as f32;
                mean_sq.sqrt() * weight
            })
            .collect();

        let loudness_db = rms.iter().map(|&r| lin_to_db(r)).collect();

        BandSpectrum { rms, loudness_db }
    }
}

/// Full-height periodic Hann window.
fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / size as f32).cos()))
        .collect()
}

//! Consumer-side analysis state: one spectrum estimator shared by the three
//! streams, plus per-stream band dynamics and smoothing.
//!
//! The streams share no mutable state, so each tick fans them out with
//! rayon. Filter memory lives here and nowhere else, which keeps a detach
//! reset down to a single call.

use rayon::prelude::*;

use super::dynamics::DynamicsProcessor;
use super::smoothing::TemporalSmoother;
use super::snapshot::{BandFrame, Stream};
use super::spectrum::{BandSpectrum, SpectrumEstimator};
use crate::config::AnalyzerConfig;

struct StreamState {
    dynamics: DynamicsProcessor,
    smoother: TemporalSmoother,
}

impl StreamState {
    fn new(config: &AnalyzerConfig) -> Self {
        Self {
            dynamics: DynamicsProcessor::new(config.band_count, &config.dynamics, config.sample_rate),
            smoother: TemporalSmoother::new(
                config.band_count,
                &config.smoothing,
                config.target_fps,
                config.floor_db,
            ),
        }
    }

    fn process(&mut self, spectrum: &BandSpectrum) -> BandFrame {
        let band_count = spectrum.rms.len().min(self.dynamics.band_count());
        let mut frame = BandFrame::silent(band_count);

        for (band, &rms) in spectrum.rms.iter().take(band_count).enumerate() {
            let dynamics = self.dynamics.process_band(band, rms);
            let (level, peak) = self.smoother.update(band, dynamics.reduced_magnitude);
            frame.levels[band] = level;
            frame.peaks[band] = peak;
            frame.gain_reduction_db[band] = dynamics.gain_reduction_db;
        }

        frame
    }

    fn reset(&mut self) {
        self.dynamics.reset();
        self.smoother.reset();
    }
}

pub struct Pipeline {
    estimator: Option<SpectrumEstimator>,
    streams: Vec<StreamState>,
    band_count: usize,
}

impl Pipeline {
    /// Never fails: if the FFT cannot be set up the pipeline runs degraded
    /// and every tick yields silent spectra.
    pub fn new(config: &AnalyzerConfig) -> Self {
        let estimator = match config.validate().and_then(|_| SpectrumEstimator::new(config)) {
            Ok(estimator) => Some(estimator),
            Err(err) => {
                log::error!("Spectrum analysis disabled, publishing silent spectra: {}", err);
                None
            }
        };

        Self {
            estimator,
            streams: Stream::ALL.iter().map(|_| StreamState::new(config)).collect(),
            band_count: config.band_count,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.estimator.is_none()
    }

    pub fn estimator(&self) -> Option<&SpectrumEstimator> {
        self.estimator.as_ref()
    }

    /// `windows` holds one `fft_size` window per stream, in [`Stream::ALL`]
    /// order. Returns frames in the same order.
    pub fn process(&mut self, windows: &[Vec<f32>]) -> [BandFrame; 3] {
        let silent = || {
            [
                BandFrame::silent(self.band_count),
                BandFrame::silent(self.band_count),
                BandFrame::silent(self.band_count),
            ]
        };

        let Some(estimator) = &self.estimator else {
            return silent();
        };
        if windows.len() != self.streams.len() {
            log::warn!("Expected {} analysis windows, got {}", self.streams.len(), windows.len());
            return silent();
        }

        let frames: Vec<BandFrame> = self
            .streams
            .par_iter_mut()
            .zip(windows.par_iter())
            .map(|(state, window)| state.process(&estimator.analyze(window)))
            .collect();

        frames.try_into().unwrap_or_else(|_| silent())
    }

    pub fn reset(&mut self) {
        self.streams.iter_mut().for_each(StreamState::reset);
    }
}

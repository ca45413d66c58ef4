//! Logarithmic frequency bands over the FFT bins.
//!
//! Band edges are spaced evenly in log-frequency between the configured
//! minimum and maximum. Bin ranges are half-open, `[start_bin, end_bin)`.
//! The outer bands are stretched to bin 0 and to `fft_size / 2` so every
//! bin belongs to some band, and any band narrower than
//! `min_bins_per_band` is widened around its centre.

use serde::Serialize;

use crate::config::AnalyzerConfig;
use crate::error::{AnalyzerError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FrequencyBand {
    pub index: usize,
    pub start_bin: usize,
    pub end_bin: usize,
    pub low_hz: f32,
    pub high_hz: f32,
    pub center_hz: f32,
}

impl FrequencyBand {
    pub fn bin_count(&self) -> usize {
        self.end_bin - self.start_bin
    }

    pub fn contains_bin(&self, bin: usize) -> bool {
        (self.start_bin..self.end_bin).contains(&bin)
    }
}

#[derive(Debug, Clone)]
pub struct BandLayout {
    bands: Vec<FrequencyBand>,
    fft_size: usize,
    sample_rate: f32,
}

impl BandLayout {
    pub fn from_config(config: &AnalyzerConfig) -> Result<Self> {
        Self::new(
            config.sample_rate,
            config.fft_size,
            config.band_count,
            config.min_frequency,
            config.max_frequency,
            config.min_bins_per_band,
        )
    }

    pub fn new(
        sample_rate: f32,
        fft_size: usize,
        band_count: usize,
        min_hz: f32,
        max_hz: f32,
        min_bins: usize,
    ) -> Result<Self> {
        let half = fft_size / 2;
        if band_count == 0 || min_bins == 0 {
            return Err(AnalyzerError::InvalidConfig(
                "band layout needs at least one band of at least one bin".into(),
            ));
        }
        if half < min_bins {
            return Err(AnalyzerError::InvalidConfig(format!(
                "fft size {} has fewer than {} usable bins",
                fft_size, min_bins
            )));
        }
        if !(sample_rate > 0.0 && min_hz > 0.0 && min_hz < max_hz) {
            return Err(AnalyzerError::InvalidConfig(format!(
                "invalid band range {}..{} Hz at {} Hz sample rate",
                min_hz, max_hz, sample_rate
            )));
        }

        let nyquist = sample_rate / 2.0;
        let log_min = min_hz.log10();
        let log_span = max_hz.log10() - log_min;
        let edge_hz = |j: usize| 10f32.powf(log_min + (j as f32 / band_count as f32) * log_span);
        // One function for both sides of a shared edge keeps neighbours contiguous.
        let edge_bin = |j: usize| ((edge_hz(j) / nyquist * half as f32) as usize).min(half);

        let bands = (0..band_count)
            .map(|index| {
                let low_hz = edge_hz(index);
                let high_hz = edge_hz(index + 1);

                let mut start_bin = if index == 0 { 0 } else { edge_bin(index) };
                let mut end_bin = if index + 1 == band_count { half } else { edge_bin(index + 1) };

                if end_bin.saturating_sub(start_bin) < min_bins {
                    let center = (start_bin + end_bin) / 2;
                    start_bin = center.saturating_sub(min_bins / 2);
                    end_bin = start_bin + min_bins;
                    if end_bin > half {
                        end_bin = half;
                        start_bin = half - min_bins;
                    }
                }

                FrequencyBand {
                    index,
                    start_bin,
                    end_bin,
                    low_hz,
                    high_hz,
                    center_hz: (low_hz * high_hz).sqrt(),
                }
            })
            .collect();

        Ok(Self {
            bands,
            fft_size,
            sample_rate,
        })
    }

    pub fn bands(&self) -> &[FrequencyBand] {
        &self.bands
    }

    pub fn len(&self) -> usize {
        self.bands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn bin_hz(&self) -> f32 {
        self.sample_rate / self.fft_size as f32
    }

    /// Index of the band whose nominal edges contain `frequency`.
    pub fn band_for_frequency(&self, frequency: f32) -> Option<usize> {
        self.bands
            .iter()
            .position(|b| frequency >= b.low_hz && frequency < b.high_hz)
    }
}

use serde::Serialize;

/// The three spectra computed every tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stream {
    Standard,
    Mid,
    Side,
}

impl Stream {
    pub const ALL: [Stream; 3] = [Stream::Standard, Stream::Mid, Stream::Side];
}

/// Per-band meter values for one stream, each `band_count` long.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BandFrame {
    /// Smoothed loudness (0.0-1.0)
    pub levels: Vec<f32>,
    /// Peak hold (0.0-1.0)
    pub peaks: Vec<f32>,
    /// Gain reduction applied by the band dynamics, in dB
    pub gain_reduction_db: Vec<f32>,
}

impl BandFrame {
    pub fn silent(band_count: usize) -> Self {
        Self {
            levels: vec![0.0; band_count],
            peaks: vec![0.0; band_count],
            gain_reduction_db: vec![0.0; band_count],
        }
    }

    /// Index of the loudest band, if any band is above zero.
    pub fn loudest_band(&self) -> Option<usize> {
        self.levels
            .iter()
            .enumerate()
            .filter(|(_, &v)| v > 0.0)
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
    }
}

/// Decimated channel traces for the vectorscope and the correlation meter.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct StereoFrame {
    pub left: Vec<f32>,
    pub right: Vec<f32>,
    pub mid: Vec<f32>,
    pub side: Vec<f32>,
    /// Phase correlation (-1.0-1.0)
    pub correlation: f32,
}

/// Everything published by one analysis tick. Replaced wholesale.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AnalysisSnapshot {
    /// Ticks published since the last attach; 0 for the empty snapshot.
    pub sequence: u64,
    pub standard: BandFrame,
    pub mid: BandFrame,
    pub side: BandFrame,
    pub stereo: StereoFrame,
}

impl AnalysisSnapshot {
    pub fn empty(band_count: usize) -> Self {
        Self {
            sequence: 0,
            standard: BandFrame::silent(band_count),
            mid: BandFrame::silent(band_count),
            side: BandFrame::silent(band_count),
            stereo: StereoFrame::default(),
        }
    }

    pub fn stream(&self, stream: Stream) -> &BandFrame {
        match stream {
            Stream::Standard => &self.standard,
            Stream::Mid => &self.mid,
            Stream::Side => &self.side,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sequence == 0
    }
}

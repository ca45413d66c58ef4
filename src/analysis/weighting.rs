use serde::{Deserialize, Serialize};

use crate::error::{AnalyzerError, Result};

/// One step of the boost curve: frequencies strictly below `below_hz` get
/// `gain` unless an earlier (lower) step already matched.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct BoostStep {
    pub below_hz: f32,
    pub gain: f32,
}

/// Piecewise-constant tilt compensation applied to band RMS before the dB
/// conversion. Music spectra fall off towards the top, so lows are lifted.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BassBoost {
    #[serde(default)]
    pub steps: Vec<BoostStep>,
    /// Gain above the last step.
    #[serde(default = "default_above")]
    pub above: f32,
}

fn default_above() -> f32 { 1.0 }

impl Default for BassBoost {
    fn default() -> Self {
        Self::gentle()
    }
}

impl BassBoost {
    pub fn gentle() -> Self {
        Self {
            steps: vec![
                BoostStep { below_hz: 200.0, gain: 1.5 },
                BoostStep { below_hz: 2000.0, gain: 1.3 },
            ],
            above: 1.1,
        }
    }

    pub fn punchy() -> Self {
        Self {
            steps: vec![
                BoostStep { below_hz: 200.0, gain: 1.8 },
                BoostStep { below_hz: 2000.0, gain: 1.4 },
            ],
            above: 1.15,
        }
    }

    pub fn flat() -> Self {
        Self {
            steps: Vec::new(),
            above: 1.0,
        }
    }

    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "gentle" => Some(Self::gentle()),
            "punchy" => Some(Self::punchy()),
            "flat" => Some(Self::flat()),
            _ => None,
        }
    }

    pub fn gain_at(&self, frequency: f32) -> f32 {
        self.steps
            .iter()
            .find(|step| frequency < step.below_hz)
            .map_or(self.above, |step| step.gain)
    }

    /// Steps must be in ascending frequency with non-increasing, positive gains.
    pub fn validate(&self) -> Result<()> {
        let mut prev_hz = 0.0f32;
        let mut prev_gain = f32::INFINITY;
        for step in &self.steps {
            if !(step.below_hz > prev_hz) {
                return Err(AnalyzerError::InvalidConfig(format!(
                    "bass boost steps must be in ascending frequency order (at {} Hz)",
                    step.below_hz
                )));
            }
            if !(step.gain > 0.0 && step.gain <= prev_gain) {
                return Err(AnalyzerError::InvalidConfig(format!(
                    "bass boost gain must be positive and non-increasing (at {} Hz)",
                    step.below_hz
                )));
            }
            prev_hz = step.below_hz;
            prev_gain = step.gain;
        }
        if !(self.above > 0.0 && self.above <= prev_gain) {
            return Err(AnalyzerError::InvalidConfig(
                "bass boost gain above the last step must not exceed the lower steps".into(),
            ));
        }
        Ok(())
    }
}

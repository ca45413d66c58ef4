//! Per-band dynamics for the visual meter: a one-pole envelope follower
//! per band feeding a soft-knee gain computer. The computed reduction is
//! applied to the band magnitude and also published for metering.

use super::spectrum::lin_to_db;
use crate::config::DynamicsConfig;

/// `exp(-1 / (tau * rate))`, the usual one-pole smoothing coefficient.
pub fn time_constant_coeff(time_s: f32, rate_hz: f32) -> f32 {
    let samples = time_s * rate_hz;
    if samples <= 0.0 {
        return 0.0;
    }
    (-1.0 / samples).exp()
}

#[derive(Clone, Copy, Debug)]
pub struct EnvelopeFollower {
    attack_coeff: f32,
    release_coeff: f32,
    envelope: f32,
}

impl EnvelopeFollower {
    pub fn new(attack_s: f32, release_s: f32, rate_hz: f32) -> Self {
        Self {
            attack_coeff: time_constant_coeff(attack_s, rate_hz),
            release_coeff: time_constant_coeff(release_s, rate_hz),
            envelope: 0.0,
        }
    }

    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let x = input.abs();
        let coeff = if x > self.envelope {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        self.envelope = coeff * self.envelope + (1.0 - coeff) * x;
        self.envelope
    }

    pub fn envelope(&self) -> f32 {
        self.envelope
    }

    pub fn reset(&mut self) {
        self.envelope = 0.0;
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GainComputer {
    threshold_db: f32,
    ratio: f32,
    knee_db: f32,
}

impl GainComputer {
    pub fn new(threshold_db: f32, ratio: f32, knee_db: f32) -> Self {
        Self {
            threshold_db,
            ratio: ratio.max(1.0),
            knee_db: knee_db.max(0.0),
        }
    }

    /// Gain reduction in dB (>= 0) for an input level in dB.
    pub fn compute_gain_reduction(&self, input_db: f32) -> f32 {
        let slope = 1.0 - 1.0 / self.ratio;
        let half_knee = self.knee_db * 0.5;

        if self.knee_db <= 0.0 {
            return ((input_db - self.threshold_db) * slope).max(0.0);
        }

        if input_db <= self.threshold_db - half_knee {
            0.0
        } else if input_db >= self.threshold_db + half_knee {
            (input_db - self.threshold_db) * slope
        } else {
            let excess = input_db - self.threshold_db + half_knee;
            let scale = excess / self.knee_db;
            scale * scale * half_knee * slope
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BandDynamics {
    pub reduced_magnitude: f32,
    pub gain_reduction_db: f32,
}

pub struct DynamicsProcessor {
    followers: Vec<EnvelopeFollower>,
    computer: GainComputer,
}

impl DynamicsProcessor {
    /// The follower coefficients are derived from `rate_hz`, normally the
    /// audio sample rate, even though the processor runs once per tick.
    pub fn new(band_count: usize, config: &DynamicsConfig, rate_hz: f32) -> Self {
        let follower = EnvelopeFollower::new(
            config.attack_ms / 1000.0,
            config.release_ms / 1000.0,
            rate_hz,
        );
        Self {
            followers: vec![follower; band_count],
            computer: GainComputer::new(config.threshold_db, config.ratio, config.knee_db),
        }
    }

    pub fn band_count(&self) -> usize {
        self.followers.len()
    }

    pub fn process_band(&mut self, band: usize, magnitude: f32) -> BandDynamics {
        let envelope = self.followers[band].process(magnitude);
        let gain_reduction_db = self.computer.compute_gain_reduction(lin_to_db(envelope));
        BandDynamics {
            reduced_magnitude: magnitude * 10f32.powf(-gain_reduction_db / 20.0),
            gain_reduction_db,
        }
    }

    pub fn envelopes(&self) -> Vec<f32> {
        self.followers.iter().map(|f| f.envelope()).collect()
    }

    pub fn reset(&mut self) {
        self.followers.iter_mut().for_each(EnvelopeFollower::reset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_computer() -> GainComputer {
        GainComputer::new(-12.0, 4.0, 6.0)
    }

    #[test]
    fn test_knee_reference_points() {
        let gc = default_computer();
        assert_eq!(gc.compute_gain_reduction(-15.0), 0.0);
        assert_eq!(gc.compute_gain_reduction(-30.0), 0.0);
        assert!((gc.compute_gain_reduction(-9.0) - 2.25).abs() < 1e-5);
        // Knee centre: (3/6)^2 * 3 * 0.75.
        assert!((gc.compute_gain_reduction(-12.0) - 0.5625).abs() < 1e-5);
        assert!((gc.compute_gain_reduction(0.0) - 9.0).abs() < 1e-5);
    }

    #[test]
    fn test_knee_is_continuous() {
        let gc = default_computer();
        let h = 1e-2;
        for &edge in &[-15.0f32, -9.0] {
            let below = gc.compute_gain_reduction(edge - h);
            let at = gc.compute_gain_reduction(edge);
            let above = gc.compute_gain_reduction(edge + h);
            assert!((above - below).abs() < 0.02, "jump at {}", edge);

            let left_slope = (at - below) / h;
            let right_slope = (above - at) / h;
            assert!((left_slope - right_slope).abs() < 0.01, "kink at {}", edge);
        }
    }

    #[test]
    fn test_gain_reduction_is_monotonic() {
        let gc = default_computer();
        let mut prev = 0.0;
        let mut db = -40.0;
        while db < 10.0 {
            let gr = gc.compute_gain_reduction(db);
            assert!(gr >= prev);
            prev = gr;
            db += 0.25;
        }
    }

    #[test]
    fn test_hard_knee() {
        let gc = GainComputer::new(-12.0, 2.0, 0.0);
        assert_eq!(gc.compute_gain_reduction(-13.0), 0.0);
        assert!((gc.compute_gain_reduction(-8.0) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_envelope_attack_and_release() {
        let mut env = EnvelopeFollower::new(0.001, 0.1, 1000.0);
        let first = env.process(1.0);
        assert!(first > 0.5 && first < 1.0);
        for _ in 0..50 {
            env.process(1.0);
        }
        assert!((env.envelope() - 1.0).abs() < 1e-3);

        // Release is much slower than attack.
        let after = env.process(0.0);
        assert!(after > 0.98);

        env.reset();
        assert_eq!(env.envelope(), 0.0);
    }

    #[test]
    fn test_envelope_uses_magnitude() {
        let mut env = EnvelopeFollower::new(0.001, 0.1, 1000.0);
        let a = env.process(-1.0);
        env.reset();
        let b = env.process(1.0);
        assert_eq!(a, b);
    }

    #[test]
    fn test_processor_reduces_loud_bands() {
        let config = DynamicsConfig::default();
        let mut dynamics = DynamicsProcessor::new(2, &config, 1000.0);

        let mut last = BandDynamics::default();
        for _ in 0..200 {
            dynamics.process_band(0, 1e-4);
            last = dynamics.process_band(1, 1.0);
        }
        // 0 dB input settles at (0 + 12) * 0.75 = 9 dB reduction.
        assert!((last.gain_reduction_db - 9.0).abs() < 0.05);
        assert!((last.reduced_magnitude - 10f32.powf(-9.0 / 20.0)).abs() < 0.01);

        let quiet = dynamics.process_band(0, 1e-4);
        assert_eq!(quiet.gain_reduction_db, 0.0);
        assert_eq!(quiet.reduced_magnitude, 1e-4);

        dynamics.reset();
        assert!(dynamics.envelopes().iter().all(|&e| e == 0.0));
    }
}

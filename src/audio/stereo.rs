/// Per-callback stereo decomposition.
///
/// Mid is deliberately the same signal as mono, `(L+R)/2`. The mid/side
/// display reuses the mono spectrum for its mid trace, and that is kept
/// as-is rather than normalised to a different scaling.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DecodedBlock {
    pub mono: Vec<f32>,
    pub mid: Vec<f32>,
    pub side: Vec<f32>,
}

/// Allocating variant of [`decode_into`]. `right = None` means mono input.
pub fn decode(left: &[f32], right: Option<&[f32]>) -> DecodedBlock {
    let right = right.unwrap_or(left);
    let len = left.len().min(right.len());
    let mut block = DecodedBlock {
        mono: vec![0.0; len],
        mid: vec![0.0; len],
        side: vec![0.0; len],
    };
    decode_into(left, right, &mut block.mono, &mut block.mid, &mut block.side);
    block
}

/// Writes `min(left.len(), right.len(), outputs)` decoded frames. Does not
/// allocate, so it is safe to call from the audio callback.
#[inline]
pub fn decode_into(left: &[f32], right: &[f32], mono: &mut [f32], mid: &mut [f32], side: &mut [f32]) {
    let len = left
        .len()
        .min(right.len())
        .min(mono.len())
        .min(mid.len())
        .min(side.len());

    for i in 0..len {
        let l = left[i];
        let r = right[i];
        let sum = (l + r) * 0.5;
        mono[i] = sum;
        mid[i] = sum;
        side[i] = (r - l) * 0.5;
    }
}

/// Normalised cross-correlation of the two channels in [-1, 1].
/// Zero when either channel is silent.
pub fn correlation(left: &[f32], right: &[f32]) -> f32 {
    let mut lr = 0.0f64;
    let mut ll = 0.0f64;
    let mut rr = 0.0f64;
    for (&l, &r) in left.iter().zip(right.iter()) {
        let (l, r) = (l as f64, r as f64);
        lr += l * r;
        ll += l * l;
        rr += r * r;
    }

    let denom = (ll * rr).sqrt();
    if denom <= f64::MIN_POSITIVE {
        return 0.0;
    }
    ((lr / denom) as f32).clamp(-1.0, 1.0)
}

/// Fixed-stride decimation down to at most `max_points` samples.
pub fn decimate(samples: &[f32], max_points: usize) -> Vec<f32> {
    if samples.is_empty() || max_points == 0 {
        return Vec::new();
    }
    let stride = samples.len().div_ceil(max_points);
    samples.iter().step_by(stride).copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(len: usize, freq: f32, sample_rate: f32) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate).sin())
            .collect()
    }

    #[test]
    fn test_decode_mid_side() {
        let block = decode(&[1.0, 0.5, -1.0], Some(&[0.0, 0.5, 1.0]));
        assert_eq!(block.mono, vec![0.5, 0.5, 0.0]);
        assert_eq!(block.mid, block.mono);
        assert_eq!(block.side, vec![-0.5, 0.0, 1.0]);
    }

    #[test]
    fn test_mono_input_has_no_side() {
        let left = sine(256, 440.0, 48000.0);
        let block = decode(&left, None);
        assert!(block.side.iter().all(|&s| s == 0.0));
        assert_eq!(block.mono, left);
        assert!((correlation(&left, &left) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_decode_uses_shorter_channel() {
        let block = decode(&[1.0, 1.0, 1.0], Some(&[1.0]));
        assert_eq!(block.mono.len(), 1);
    }

    #[test]
    fn test_correlation_bounds() {
        let left = sine(1024, 440.0, 48000.0);
        let inverted: Vec<f32> = left.iter().map(|s| -s).collect();
        let silence = vec![0.0; 1024];

        assert!((correlation(&left, &left) - 1.0).abs() < 1e-6);
        assert!((correlation(&left, &inverted) + 1.0).abs() < 1e-6);
        assert_eq!(correlation(&silence, &silence), 0.0);
        assert_eq!(correlation(&left, &silence), 0.0);

        // Quadrature signals are roughly uncorrelated.
        let cosine: Vec<f32> = (0..1024)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 48000.0).cos())
            .collect();
        let c = correlation(&left, &cosine);
        assert!((-1.0..=1.0).contains(&c));
        assert!(c.abs() < 0.1);
    }

    #[test]
    fn test_decimate_caps_length() {
        let samples: Vec<f32> = (0..1024).map(|i| i as f32).collect();
        let points = decimate(&samples, 100);
        assert!(points.len() <= 100);
        assert_eq!(points.len(), 94);
        assert_eq!(points[0], 0.0);
        assert_eq!(points[1], 11.0);

        assert_eq!(decimate(&samples[..50], 100).len(), 50);
        assert!(decimate(&[], 100).is_empty());
    }
}

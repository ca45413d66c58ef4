//! Fixed-capacity circular sample buffer shared between the audio callback
//! (single writer) and the analysis tick (single reader).
//!
//! Writes overwrite the oldest samples once the buffer is full. There is no
//! backpressure: a slow reader simply loses history it never looked at.
//! The lock is only held while copying samples in or out, never while the
//! reader processes them.

use parking_lot::Mutex;

struct RingState {
    data: Vec<f32>,
    write_index: usize,
    /// Valid samples held, saturating at capacity.
    filled: usize,
}

pub struct RingBuffer {
    capacity: usize,
    state: Mutex<RingState>,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            state: Mutex::new(RingState {
                data: vec![0.0; capacity],
                write_index: 0,
                filled: 0,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of valid samples currently held (at most `capacity`).
    pub fn written(&self) -> usize {
        self.state.lock().filled
    }

    pub fn write(&self, samples: &[f32]) {
        if samples.is_empty() {
            return;
        }

        // Only the tail can survive a write longer than the buffer.
        let samples = if samples.len() > self.capacity {
            &samples[samples.len() - self.capacity..]
        } else {
            samples
        };

        let mut state = self.state.lock();
        let start = state.write_index;
        let first = (self.capacity - start).min(samples.len());
        state.data[start..start + first].copy_from_slice(&samples[..first]);
        let rest = samples.len() - first;
        if rest > 0 {
            state.data[..rest].copy_from_slice(&samples[first..]);
        }

        state.write_index = (start + samples.len()) % self.capacity;
        state.filled = (state.filled + samples.len()).min(self.capacity);
    }

    /// The `count` most recent samples, oldest first. Slots that were never
    /// written come back as leading zeros.
    pub fn read_latest(&self, count: usize) -> Vec<f32> {
        let mut out = vec![0.0; count];
        self.read_latest_into(&mut out);
        out
    }

    pub fn read_latest_into(&self, out: &mut [f32]) {
        let count = out.len();
        let state = self.state.lock();
        let available = state.filled.min(count);
        let pad = count - available;
        out[..pad].fill(0.0);

        if available == 0 {
            return;
        }

        let start = (state.write_index + self.capacity - available) % self.capacity;
        let first = (self.capacity - start).min(available);
        out[pad..pad + first].copy_from_slice(&state.data[start..start + first]);
        let rest = available - first;
        if rest > 0 {
            out[pad + first..].copy_from_slice(&state.data[..rest]);
        }
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.data.fill(0.0);
        state.write_index = 0;
        state.filled = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_zero_padding_before_full() {
        let ring = RingBuffer::new(8);
        ring.write(&[1.0, 2.0, 3.0]);

        assert_eq!(ring.written(), 3);
        assert_eq!(ring.read_latest(5), vec![0.0, 0.0, 1.0, 2.0, 3.0]);
        assert_eq!(ring.read_latest(2), vec![2.0, 3.0]);
    }

    #[test]
    fn test_latest_capacity_after_wraparound() {
        let ring = RingBuffer::new(16);
        let mut all = Vec::new();
        let mut next = 0.0f32;

        // Uneven block sizes so the cursor lands everywhere.
        for block in [5usize, 7, 3, 11, 1, 9, 16, 2] {
            let samples: Vec<f32> = (0..block)
                .map(|_| {
                    next += 1.0;
                    next
                })
                .collect();
            ring.write(&samples);
            all.extend_from_slice(&samples);
        }

        assert!(all.len() >= ring.capacity());
        let expected = all[all.len() - 16..].to_vec();
        assert_eq!(ring.read_latest(16), expected);
        assert_eq!(ring.written(), 16);
    }

    #[test]
    fn test_oversized_write_keeps_tail() {
        let ring = RingBuffer::new(4);
        let samples: Vec<f32> = (0..10).map(|i| i as f32).collect();
        ring.write(&samples);
        assert_eq!(ring.read_latest(4), vec![6.0, 7.0, 8.0, 9.0]);
    }

    #[test]
    fn test_read_beyond_capacity_is_zero_padded() {
        let ring = RingBuffer::new(4);
        ring.write(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(ring.read_latest(6), vec![0.0, 0.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_clear() {
        let ring = RingBuffer::new(4);
        ring.write(&[1.0, 2.0]);
        ring.clear();
        assert_eq!(ring.written(), 0);
        assert_eq!(ring.read_latest(4), vec![0.0; 4]);
    }

    #[test]
    fn test_concurrent_reader_sees_whole_writes() {
        // Every write is a block of identical values, so a torn read would
        // show a block boundary in the wrong place.
        let ring = Arc::new(RingBuffer::new(64));
        let writer = {
            let ring = Arc::clone(&ring);
            std::thread::spawn(move || {
                for i in 1..=2000 {
                    ring.write(&[i as f32; 64]);
                }
            })
        };

        for _ in 0..2000 {
            let latest = ring.read_latest(64);
            let first = latest[0];
            assert!(latest.iter().all(|&s| s == first));
        }
        writer.join().unwrap();
        assert_eq!(ring.read_latest(1), vec![2000.0]);
    }
}

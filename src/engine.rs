//! The analysis orchestrator.
//!
//! Two sides share one [`Analyzer`]:
//! - the audio callback pushes blocks through an [`AudioTap`], which only
//!   decodes stereo and writes the five ring buffers;
//! - a display-rate task calls [`Analyzer::tick`], which copies the latest
//!   windows out of the buffers, runs the spectrum/dynamics/smoothing
//!   pipeline and publishes an immutable [`AnalysisSnapshot`].
//!
//! Attach/detach bump a session generation. Taps and ticks that started
//! under an older generation are ignored, and detach resets filter state
//! under the pipeline lock so it never races an in-flight tick.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};

use crate::analysis::bands::BandLayout;
use crate::analysis::pipeline::Pipeline;
use crate::analysis::snapshot::{AnalysisSnapshot, StereoFrame};
use crate::audio::ring::RingBuffer;
use crate::audio::stereo;
use crate::config::AnalyzerConfig;
use crate::error::Result;
use crate::ticker::Ticker;

/// Frames decoded per stack chunk on the audio thread.
const TAP_CHUNK: usize = 256;

const STATE_DETACHED: u8 = 0;
const STATE_SETTLING: u8 = 1;
const STATE_ATTACHED: u8 = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttachState {
    Detached,
    /// Attached, waiting out the settle delay before the tap goes in.
    Settling,
    Attached,
}

impl AttachState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            STATE_SETTLING => AttachState::Settling,
            STATE_ATTACHED => AttachState::Attached,
            _ => AttachState::Detached,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    Published,
    /// No source attached (or still settling).
    Detached,
    /// Fewer than `fft_size` samples buffered; the previous snapshot stays.
    Underrun,
    /// The session changed while the tick was running.
    Discarded,
}

/// Something that produces audio blocks, e.g. a player's output node.
pub trait AudioSource: Send + Sync {
    /// Start delivering blocks to `tap` from the audio callback.
    fn install_tap(&self, tap: AudioTap);
    /// Stop delivering blocks. Must tolerate being called with no tap.
    fn remove_tap(&self);
}

struct ChannelBuffers {
    mono: RingBuffer,
    left: RingBuffer,
    right: RingBuffer,
    mid: RingBuffer,
    side: RingBuffer,
}

impl ChannelBuffers {
    fn new(capacity: usize) -> Self {
        Self {
            mono: RingBuffer::new(capacity),
            left: RingBuffer::new(capacity),
            right: RingBuffer::new(capacity),
            mid: RingBuffer::new(capacity),
            side: RingBuffer::new(capacity),
        }
    }

    fn clear(&self) {
        for ring in [&self.mono, &self.left, &self.right, &self.mid, &self.side] {
            ring.clear();
        }
    }
}

struct Shared {
    config: AnalyzerConfig,
    layout: Option<BandLayout>,
    buffers: ChannelBuffers,
    state: AtomicU8,
    generation: AtomicU64,
    sequence: AtomicU64,
    pipeline: Mutex<Pipeline>,
    snapshot: RwLock<Arc<AnalysisSnapshot>>,
    source: Mutex<Option<Arc<dyn AudioSource>>>,
}

impl Shared {
    fn is_live(&self, generation: u64) -> bool {
        self.state.load(Ordering::Acquire) == STATE_ATTACHED
            && self.generation.load(Ordering::Acquire) == generation
    }

    fn publish(&self, snapshot: AnalysisSnapshot) {
        *self.snapshot.write() = Arc::new(snapshot);
    }
}

/// Producer handle handed to an [`AudioSource`]. Cheap to clone, never
/// blocks for longer than a ring-buffer copy and never allocates.
#[derive(Clone)]
pub struct AudioTap {
    shared: Arc<Shared>,
    generation: u64,
}

impl AudioTap {
    /// Whether blocks pushed now would be kept.
    pub fn is_live(&self) -> bool {
        self.shared.is_live(self.generation)
    }

    /// Planar input. `right = None` treats the block as mono, as does an
    /// analyzer configured with one channel.
    pub fn push_planar(&self, left: &[f32], right: Option<&[f32]>) {
        if !self.is_live() {
            return;
        }
        let right = right.unwrap_or(left);
        let len = left.len().min(right.len());

        for start in (0..len).step_by(TAP_CHUNK) {
            let end = (start + TAP_CHUNK).min(len);
            if !self.write_chunk(&left[start..end], &right[start..end]) {
                return;
            }
        }
    }

    /// Interleaved input laid out as the analyzer's configured `channels`.
    pub fn push(&self, samples: &[f32]) {
        self.push_interleaved(samples, self.shared.config.channels);
    }

    /// Interleaved input with `channels` samples per frame. Channels past
    /// the first two are ignored; a single channel is treated as mono.
    pub fn push_interleaved(&self, samples: &[f32], channels: usize) {
        if !self.is_live() || channels == 0 {
            return;
        }
        if channels == 1 {
            self.push_planar(samples, None);
            return;
        }

        let mut left = [0.0f32; TAP_CHUNK];
        let mut right = [0.0f32; TAP_CHUNK];
        for chunk in samples.chunks(TAP_CHUNK * channels) {
            let frames = chunk.len() / channels;
            for (i, frame) in chunk.chunks_exact(channels).enumerate() {
                left[i] = frame[0];
                right[i] = frame[1];
            }
            if !self.write_chunk(&left[..frames], &right[..frames]) {
                return;
            }
        }
    }

    /// Returns `false`, writing nothing, once the session has moved on.
    /// Checked per chunk so a long block cannot spill into the next session.
    fn write_chunk(&self, left: &[f32], right: &[f32]) -> bool {
        if !self.is_live() {
            return false;
        }
        let right = if self.shared.config.channels == 1 { left } else { right };

        let mut mono = [0.0f32; TAP_CHUNK];
        let mut mid = [0.0f32; TAP_CHUNK];
        let mut side = [0.0f32; TAP_CHUNK];
        let n = left.len().min(TAP_CHUNK);
        stereo::decode_into(left, right, &mut mono[..n], &mut mid[..n], &mut side[..n]);

        let buffers = &self.shared.buffers;
        buffers.mono.write(&mono[..n]);
        buffers.left.write(&left[..n]);
        buffers.right.write(&right[..n]);
        buffers.mid.write(&mid[..n]);
        buffers.side.write(&side[..n]);
        true
    }
}

/// Owns the buffers, the filter state and the published snapshot.
/// Clones share the same engine.
#[derive(Clone)]
pub struct Analyzer {
    shared: Arc<Shared>,
}

impl Analyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        let pipeline = Pipeline::new(&config);
        let layout = pipeline.estimator().map(|e| e.layout().clone());
        let buffers = ChannelBuffers::new(config.ring_capacity());
        let empty = AnalysisSnapshot::empty(config.band_count);

        log::info!(
            "Analyzer: {}Hz, fft_size={}, bands={}, {:.0}fps, ring={} samples",
            config.sample_rate,
            config.fft_size,
            config.band_count,
            config.target_fps,
            config.ring_capacity()
        );

        Self {
            shared: Arc::new(Shared {
                config,
                layout,
                buffers,
                state: AtomicU8::new(STATE_DETACHED),
                generation: AtomicU64::new(0),
                sequence: AtomicU64::new(0),
                pipeline: Mutex::new(pipeline),
                snapshot: RwLock::new(Arc::new(empty)),
                source: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.shared.config
    }

    /// Band layout, or `None` when the spectrum stage failed to set up.
    pub fn layout(&self) -> Option<&BandLayout> {
        self.shared.layout.as_ref()
    }

    pub fn is_degraded(&self) -> bool {
        self.shared.layout.is_none()
    }

    pub fn state(&self) -> AttachState {
        AttachState::from_raw(self.shared.state.load(Ordering::Acquire))
    }

    /// Latest published snapshot. Cheap; clones an `Arc`.
    pub fn snapshot(&self) -> Arc<AnalysisSnapshot> {
        Arc::clone(&self.shared.snapshot.read())
    }

    /// Starts listening to `source`. The tap is installed after the
    /// configured settle delay so engine reconfiguration can finish first.
    pub fn attach(&self, source: Arc<dyn AudioSource>) {
        if self.state() != AttachState::Detached {
            self.detach();
        }

        self.shared.buffers.clear();
        let generation = self.shared.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.shared.sequence.store(0, Ordering::Release);
        *self.shared.source.lock() = Some(Arc::clone(&source));
        self.shared.state.store(STATE_SETTLING, Ordering::Release);

        let delay = self.shared.config.settle_delay();
        if delay.is_zero() {
            install_tap(&self.shared, source, generation);
            return;
        }

        log::debug!("Deferring tap installation by {:?}", delay);
        let shared = Arc::clone(&self.shared);
        let spawned = std::thread::Builder::new()
            .name("analyzer-attach".into())
            .spawn({
                let source = Arc::clone(&source);
                move || {
                    std::thread::sleep(delay);
                    install_tap(&shared, source, generation);
                }
            });

        if let Err(err) = spawned {
            log::warn!("Could not defer tap installation, installing now: {}", err);
            install_tap(&self.shared, source, generation);
        }
    }

    /// Stops listening and resets everything to the empty state. Safe at
    /// any time, including while a tick is running on another thread.
    pub fn detach(&self) {
        self.shared.state.store(STATE_DETACHED, Ordering::Release);
        self.shared.generation.fetch_add(1, Ordering::AcqRel);

        if let Some(source) = self.shared.source.lock().take() {
            source.remove_tap();
        }

        // Waits for any in-flight tick before touching filter state.
        let mut pipeline = self.shared.pipeline.lock();
        pipeline.reset();
        self.shared.buffers.clear();
        self.shared.sequence.store(0, Ordering::Release);
        self.shared
            .publish(AnalysisSnapshot::empty(self.shared.config.band_count));
        drop(pipeline);

        log::info!("Analyzer detached");
    }

    /// A producer handle for the current session, for callers that drive
    /// their own callback instead of going through an [`AudioSource`].
    /// Take it after [`attach`](Self::attach); a tap from an earlier
    /// session stays inert.
    pub fn tap(&self) -> AudioTap {
        AudioTap {
            shared: Arc::clone(&self.shared),
            generation: self.shared.generation.load(Ordering::Acquire),
        }
    }

    /// One consumer-side analysis pass.
    pub fn tick(&self) -> TickOutcome {
        let shared = &self.shared;
        let config = &shared.config;

        let generation = shared.generation.load(Ordering::Acquire);
        if !shared.is_live(generation) {
            return TickOutcome::Detached;
        }

        let mut pipeline = shared.pipeline.lock();
        // A detach/attach may have happened while waiting for the lock.
        if !shared.is_live(generation) {
            return TickOutcome::Discarded;
        }

        if shared.buffers.mono.written() < config.fft_size {
            log::trace!("Underrun: {} samples buffered", shared.buffers.mono.written());
            return TickOutcome::Underrun;
        }

        let windows = [
            shared.buffers.mono.read_latest(config.fft_size),
            shared.buffers.mid.read_latest(config.fft_size),
            shared.buffers.side.read_latest(config.fft_size),
        ];
        let [standard, mid, side] = pipeline.process(&windows);

        let stereo = self.stereo_frame();

        if !shared.is_live(generation) {
            log::debug!("Discarding tick from a stale session");
            return TickOutcome::Discarded;
        }

        let sequence = shared.sequence.fetch_add(1, Ordering::AcqRel) + 1;
        shared.publish(AnalysisSnapshot {
            sequence,
            standard,
            mid,
            side,
            stereo,
        });
        drop(pipeline);

        TickOutcome::Published
    }

    /// Runs [`tick`](Self::tick) at `target_fps` on its own thread.
    pub fn spawn_ticker(&self) -> Result<Ticker> {
        Ticker::spawn(self.clone(), self.shared.config.tick_period())
    }

    pub fn spawn_ticker_with_period(&self, period: Duration) -> Result<Ticker> {
        Ticker::spawn(self.clone(), period)
    }

    fn stereo_frame(&self) -> StereoFrame {
        let buffers = &self.shared.buffers;
        let window = self.shared.config.stereo_window;
        let points = self.shared.config.stereo_points;

        let left = buffers.left.read_latest(window);
        let right = buffers.right.read_latest(window);
        let mid = buffers.mid.read_latest(window);
        let side = buffers.side.read_latest(window);

        StereoFrame {
            correlation: stereo::correlation(&left, &right),
            left: stereo::decimate(&left, points),
            right: stereo::decimate(&right, points),
            mid: stereo::decimate(&mid, points),
            side: stereo::decimate(&side, points),
        }
    }
}

fn install_tap(shared: &Arc<Shared>, source: Arc<dyn AudioSource>, generation: u64) {
    if shared.generation.load(Ordering::Acquire) != generation {
        log::debug!("Attach superseded before the tap was installed");
        return;
    }
    if shared
        .state
        .compare_exchange(STATE_SETTLING, STATE_ATTACHED, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        return;
    }

    source.install_tap(AudioTap {
        shared: Arc::clone(shared),
        generation,
    });
    log::info!("Analyzer attached");
}

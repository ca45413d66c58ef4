mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use parking_lot::Mutex;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use cli::Cli;
use stereoscope::analysis::bands::BandLayout;
use stereoscope::analysis::weighting::BassBoost;
use stereoscope::audio::decode::{self, AudioData};
use stereoscope::config::{self, AnalyzerConfig, Config};
use stereoscope::{AnalysisSnapshot, Analyzer, AudioSource, AudioTap, TickOutcome};

/// Stands in for a player's output node: whatever it "renders" goes to
/// the installed tap.
#[derive(Default)]
struct PlaybackSource {
    tap: Mutex<Option<AudioTap>>,
}

impl PlaybackSource {
    fn render(&self, left: &[f32], right: Option<&[f32]>) {
        if let Some(tap) = self.tap.lock().as_ref() {
            tap.push_planar(left, right);
        }
    }
}

impl AudioSource for PlaybackSource {
    fn install_tap(&self, tap: AudioTap) {
        *self.tap.lock() = Some(tap);
    }

    fn remove_tap(&self) {
        *self.tap.lock() = None;
    }
}

#[derive(Default)]
struct Summary {
    published: u64,
    underruns: u64,
    correlation_sum: f64,
    loudest_hits: Vec<u64>,
}

impl Summary {
    fn record(&mut self, snapshot: &AnalysisSnapshot) {
        self.published += 1;
        self.correlation_sum += snapshot.stereo.correlation as f64;
        if let Some(band) = snapshot.standard.loudest_band() {
            if self.loudest_hits.len() <= band {
                self.loudest_hits.resize(band + 1, 0);
            }
            self.loudest_hits[band] += 1;
        }
    }

    fn dominant_band(&self) -> Option<usize> {
        self.loudest_hits
            .iter()
            .enumerate()
            .max_by_key(|(_, &hits)| hits)
            .filter(|(_, &hits)| hits > 0)
            .map(|(band, _)| band)
    }

    fn mean_correlation(&self) -> f32 {
        if self.published == 0 {
            return 0.0;
        }
        (self.correlation_sum / self.published as f64) as f32
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let mut cli = Cli::parse();

    // Load config: explicit --config path, or auto-detect stereoscope.toml / global config
    let config_path = cli.config.clone().or_else(|| {
        let local = PathBuf::from("stereoscope.toml");
        if local.exists() {
            return Some(local);
        }
        if let Some(home) = dirs::home_dir() {
            let xdg = home.join(".config").join("stereoscope").join("config.toml");
            if xdg.exists() {
                return Some(xdg);
            }
        }
        if let Some(config_dir) = dirs::config_dir() {
            let platform = config_dir.join("stereoscope").join("config.toml");
            if platform.exists() {
                return Some(platform);
            }
        }
        None
    });

    let mut file_config = Config::default();
    if let Some(ref path) = config_path {
        if let Some(cfg) = config::load_config(path) {
            log::info!("Loaded config from {}", path.display());
            // Merge: config values apply only when CLI is at its default
            if cli.fps == 60.0 { cli.fps = cfg.analyzer.target_fps; }
            if cli.fft_size == 8192 { cli.fft_size = cfg.analyzer.fft_size; }
            if cli.bands == 32 { cli.bands = cfg.analyzer.band_count; }
            if cli.peak_decay == 0.01 { cli.peak_decay = cfg.analyzer.smoothing.peak_decay_step; }
            if cli.block_size == 512 { cli.block_size = cfg.playback.block_size; }
            file_config = cfg;
        } else {
            log::warn!("Failed to load config from {}", path.display());
        }
    }

    let mut analyzer_config = AnalyzerConfig {
        target_fps: cli.fps,
        fft_size: cli.fft_size,
        band_count: cli.bands,
        ..file_config.analyzer
    };
    analyzer_config.smoothing.peak_decay_step = cli.peak_decay;
    // The config file's curve wins unless a preset was asked for explicitly.
    if cli.boost != "gentle" || config_path.is_none() {
        analyzer_config.bass_boost = BassBoost::preset(&cli.boost)
            .with_context(|| format!("Unknown bass boost preset: {}", cli.boost))?;
    }

    if cli.list_bands {
        let layout = BandLayout::from_config(&analyzer_config)?;
        println!(
            "{} bands, fft_size={}, {:.2}Hz per bin at {}Hz:",
            layout.len(),
            layout.fft_size(),
            layout.bin_hz(),
            analyzer_config.sample_rate
        );
        for band in layout.bands() {
            println!(
                "  [{:2}] {:>8.1} - {:>8.1} Hz  (center {:>8.1})  bins {:>5}..{:<5}  boost x{:.2}",
                band.index,
                band.low_hz,
                band.high_hz,
                band.center_hz,
                band.start_bin,
                band.end_bin,
                analyzer_config.bass_boost.gain_at(band.center_hz)
            );
        }
        return Ok(());
    }

    let input = cli.input.as_ref().context("Input audio file is required")?;
    if !input.exists() {
        anyhow::bail!("Input file not found: {}", input.display());
    }
    if cli.block_size == 0 {
        anyhow::bail!("--block-size must be at least 1");
    }

    log::info!("stereoscope - spectrum and stereo meter");
    log::info!("Input: {}", input.display());

    // 1. Decode audio
    log::info!("Decoding audio...");
    let audio = decode::decode_audio(input)?;

    analyzer_config.sample_rate = audio.sample_rate as f32;
    analyzer_config.channels = if audio.is_stereo() { 2 } else { 1 };
    if !cli.realtime {
        // Offline stepping has no engine start-up to wait out.
        analyzer_config.settle_delay_ms = 0;
    }
    analyzer_config.validate().context("Invalid analyzer configuration")?;

    // 2. Output sink
    let mut sink: Option<Box<dyn Write>> = match cli.output.as_ref() {
        Some(path) if path.as_os_str() == "-" => Some(Box::new(BufWriter::new(std::io::stdout()))),
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path.display()))?;
            Some(Box::new(BufWriter::new(file)))
        }
        None => None,
    };

    // 3. Attach the analyzer to the playback source
    let analyzer = Analyzer::new(analyzer_config);
    let source = Arc::new(PlaybackSource::default());
    analyzer.attach(source.clone());

    let summary = if cli.realtime {
        play_realtime(&analyzer, &source, &audio, cli.block_size, &mut sink)?
    } else {
        play_offline(&analyzer, &source, &audio, cli.block_size, &mut sink)?
    };

    analyzer.detach();
    if let Some(mut sink) = sink {
        sink.flush().context("Failed to flush snapshot output")?;
    }

    log::info!(
        "Published {} snapshots ({} underrun ticks), mean correlation {:.3}",
        summary.published,
        summary.underruns,
        summary.mean_correlation()
    );
    if let (Some(band), Some(layout)) = (summary.dominant_band(), analyzer.layout()) {
        let band = layout.bands()[band];
        log::info!(
            "Most often loudest: band {} ({:.0}-{:.0} Hz)",
            band.index,
            band.low_hz,
            band.high_hz
        );
    }

    Ok(())
}

fn write_snapshot(sink: &mut Option<Box<dyn Write>>, snapshot: &AnalysisSnapshot) -> Result<()> {
    if let Some(out) = sink.as_mut() {
        serde_json::to_writer(&mut *out, snapshot).context("Failed to serialize snapshot")?;
        out.write_all(b"\n")?;
    }
    Ok(())
}

fn block_of<'a>(audio: &'a AudioData, start: usize, end: usize) -> (&'a [f32], Option<&'a [f32]>) {
    let left = &audio.left[start..end];
    let right = audio.is_stereo().then(|| &audio.right[start..end]);
    (left, right)
}

fn progress_bar(len: u64, unit: &str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(&format!(
                "[{{elapsed_precise}}] {{bar:40.cyan/blue}} {{pos}}/{{len}} {} ({{eta}} remaining)",
                unit
            ))
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
    );
    pb
}

/// Steps the timeline deterministically: render one tick's worth of
/// audio, then run exactly one analysis tick.
fn play_offline(
    analyzer: &Analyzer,
    source: &PlaybackSource,
    audio: &AudioData,
    block_size: usize,
    sink: &mut Option<Box<dyn Write>>,
) -> Result<Summary> {
    let samples_per_tick = (audio.sample_rate as f32 / analyzer.config().target_fps).max(1.0);
    let total_ticks = (audio.frames() as f32 / samples_per_tick).ceil() as usize;
    log::info!(
        "Offline analysis: {} ticks, {:.1}s @ {:.0}fps",
        total_ticks,
        audio.duration(),
        analyzer.config().target_fps
    );

    let pb = progress_bar(total_ticks as u64, "ticks");
    let mut summary = Summary::default();
    let mut rendered = 0usize;

    for tick_idx in 0..total_ticks {
        let until = (((tick_idx + 1) as f32 * samples_per_tick) as usize).min(audio.frames());
        while rendered < until {
            let end = (rendered + block_size).min(until);
            let (left, right) = block_of(audio, rendered, end);
            source.render(left, right);
            rendered = end;
        }

        match analyzer.tick() {
            TickOutcome::Published => {
                let snapshot = analyzer.snapshot();
                summary.record(&snapshot);
                write_snapshot(sink, &snapshot)?;
            }
            TickOutcome::Underrun => summary.underruns += 1,
            outcome => log::debug!("Tick {}: {:?}", tick_idx, outcome),
        }
        pb.set_position(tick_idx as u64 + 1);
    }

    pb.finish_with_message("Analysis complete");
    Ok(summary)
}

/// Renders blocks at wall-clock pace while a ticker thread analyses.
fn play_realtime(
    analyzer: &Analyzer,
    source: &PlaybackSource,
    audio: &AudioData,
    block_size: usize,
    sink: &mut Option<Box<dyn Write>>,
) -> Result<Summary> {
    let ticker = analyzer.spawn_ticker()?;
    let block_duration = Duration::from_secs_f64(block_size as f64 / audio.sample_rate as f64);
    let total_blocks = audio.frames().div_ceil(block_size);
    log::info!(
        "Realtime playback: {} blocks of {} frames ({:.1}ms each)",
        total_blocks,
        block_size,
        block_duration.as_secs_f64() * 1000.0
    );

    let pb = progress_bar(total_blocks as u64, "blocks");
    let mut summary = Summary::default();
    let mut last_sequence = 0u64;
    let started = Instant::now();

    for block_idx in 0..total_blocks {
        let start = block_idx * block_size;
        let end = (start + block_size).min(audio.frames());
        let (left, right) = block_of(audio, start, end);
        source.render(left, right);

        let snapshot = analyzer.snapshot();
        if snapshot.sequence != last_sequence && !snapshot.is_empty() {
            // Ticks between two polls are not recorded individually.
            last_sequence = snapshot.sequence;
            summary.record(&snapshot);
            write_snapshot(sink, &snapshot)?;
        }

        let due = started + block_duration * (block_idx as u32 + 1);
        if let Some(wait) = due.checked_duration_since(Instant::now()) {
            std::thread::sleep(wait);
        }
        pb.set_position(block_idx as u64 + 1);
    }

    let ticks = ticker.stop();
    pb.finish_with_message("Playback complete");
    log::info!("Ticker published {} snapshots", ticks);
    Ok(summary)
}

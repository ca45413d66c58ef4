use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "stereoscope", about = "Spectrum, stereo and band-dynamics meter for audio files")]
pub struct Cli {
    /// Input audio file (WAV, MP3, FLAC, OGG)
    pub input: Option<PathBuf>,

    /// Write one JSON snapshot per tick to this file ("-" for stdout)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Config file (defaults to ./stereoscope.toml or the user config dir)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Analysis ticks per second
    #[arg(long, default_value_t = 60.0)]
    pub fps: f32,

    /// FFT window size (power of two)
    #[arg(long, default_value_t = 8192)]
    pub fft_size: usize,

    /// Number of logarithmic bands
    #[arg(long, default_value_t = 32)]
    pub bands: usize,

    /// Bass boost preset: gentle, punchy or flat
    #[arg(long, default_value = "gentle")]
    pub boost: String,

    /// Peak-hold fall per tick (0.0-1.0)
    #[arg(long, default_value_t = 0.01)]
    pub peak_decay: f32,

    /// Frames per simulated audio callback
    #[arg(long, default_value_t = 512)]
    pub block_size: usize,

    /// Play through a ticker thread at wall-clock speed instead of
    /// stepping ticks offline
    #[arg(long)]
    pub realtime: bool,

    /// Print the band layout and exit
    #[arg(long)]
    pub list_bands: bool,
}

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("invalid analyzer configuration: {0}")]
    InvalidConfig(String),

    #[error("FFT setup failed for size {fft_size}: {reason}")]
    FftSetup { fft_size: usize, reason: String },

    #[error("failed to spawn analysis thread")]
    Spawn(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AnalyzerError>;

//! Real-time spectrum, stereo-field and band-dynamics metering.
//!
//! An [`Analyzer`] sits between an audio callback and a display loop. The
//! callback pushes PCM through an [`AudioTap`]; a fixed-rate [`Ticker`]
//! (or any caller of [`Analyzer::tick`]) turns the latest window into an
//! [`AnalysisSnapshot`] for the renderer.

pub mod analysis;
pub mod audio;
pub mod config;
pub mod engine;
pub mod error;
pub mod ticker;

pub use analysis::snapshot::{AnalysisSnapshot, BandFrame, StereoFrame, Stream};
pub use config::AnalyzerConfig;
pub use engine::{Analyzer, AttachState, AudioSource, AudioTap, TickOutcome};
pub use error::AnalyzerError;
pub use ticker::Ticker;

pub mod bands;
pub mod dynamics;
pub mod pipeline;
pub mod smoothing;
pub mod snapshot;
pub mod spectrum;
pub mod weighting;

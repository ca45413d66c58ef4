pub mod decode;
pub mod ring;
pub mod stereo;

//! Waveform stitching and audio format encoding.

pub mod encode;
pub mod format;
pub mod stitch;

pub use encode::{encode_wav, AudioEncoder, EncodeError, FfmpegEncoder};
pub use format::AudioFormat;
pub use stitch::{stitch, StitchError, StitchMode, DEFAULT_CROSSFADE_SAMPLES};

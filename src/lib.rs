//! # kokoro-speech
//!
//! Text-to-speech over HTTP and the command line, built around the Kokoro engine.
//!
//! ## Features
//!
//! - **Long-text chunking**: utterances are split into sentences and packed into
//!   bounded chunks, one synthesis call per chunk
//! - **Segment stitching**: chunk audio is concatenated or crossfaded back into
//!   one waveform
//! - **Distribution formats**: WAV, MP3, OGG, AAC and Opus output
//! - **Streaming**: per-chunk MP3 delivery for low time-to-first-byte
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! kokoro-speech = { version = "2026.2", features = ["kokoro"] }
//! ```
//!
//! ```ignore
//! use std::sync::Arc;
//! use kokoro_speech::{
//!     audio::{AudioFormat, FfmpegEncoder},
//!     config::Settings,
//!     engines::kokoro,
//!     pipeline::SpeechPipeline,
//! };
//!
//! let settings = Settings::default();
//! let registry = kokoro::build_registry(&settings.models, &settings.languages()?)?;
//! let pipeline = SpeechPipeline::new(
//!     Arc::new(registry),
//!     Arc::new(FfmpegEncoder::new()),
//!     settings.pipeline.clone(),
//! );
//!
//! let audio = pipeline.render("Hello, world!", "af_heart", AudioFormat::Mp3)?;
//! std::fs::write("hello.mp3", &audio.bytes)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod audio;
pub mod chat;
pub mod config;
pub mod engines;
pub mod error;
pub mod pipeline;
pub mod server;
pub mod text;
pub mod voices;

use std::path::Path;

pub use error::{SpeechError, ValidationError};

/// Boxed error used at collaborator boundaries.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Mono waveform produced by one synthesis call.
#[derive(Debug, Clone, Default)]
pub struct SynthesisResult {
    /// Samples in `[-1.0, 1.0]`
    pub samples: Vec<f32>,
    /// Hz; Kokoro always produces 24 kHz
    pub sample_rate: u32,
    /// IPA the engine actually spoke, for display
    pub phonemes: String,
}

impl SynthesisResult {
    /// Duration of the audio in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Lifecycle of a loadable engine: load weights, synthesize, unload.
///
/// The pipeline never sees this trait; it talks to per-language
/// [`voices::Synthesizer`] profiles wrapping an engine.
pub trait SynthesisEngine {
    /// Per-call knobs such as voice and speed.
    type SynthesisParams;
    /// Load-time knobs such as thread count.
    type ModelParams: Default;

    fn load_model(&mut self, model_path: &Path) -> Result<(), BoxError> {
        self.load_model_with_params(model_path, Self::ModelParams::default())
    }

    fn load_model_with_params(
        &mut self,
        model_path: &Path,
        params: Self::ModelParams,
    ) -> Result<(), BoxError>;

    /// Drop the loaded weights.
    fn unload_model(&mut self);

    /// `None` uses the engine's default parameters.
    fn synthesize(
        &mut self,
        text: &str,
        params: Option<Self::SynthesisParams>,
    ) -> Result<SynthesisResult, BoxError>;
}

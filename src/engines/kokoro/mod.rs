//! Kokoro-82M on ONNX Runtime, phonemized by espeak-ng.
//!
//! # System Requirements
//!
//! **espeak-ng** must be installed, or its location given in `models.espeak_bin`
//! and `models.espeak_data`:
//! - **Linux**: `sudo apt-get install espeak-ng`
//! - **macOS**: `brew install espeak-ng`
//! - **Windows**: installer from <https://espeak-ng.org/download>
//!
//! # Model Directory Layout
//!
//! ```text
//! models/kokoro/
//! ├── kokoro-quant-convinteger.onnx   # 8-bit quantized model (any .onnx works)
//! ├── voices-v1.0.bin                  # voice pack (.npz)
//! └── config.json                      # optional vocabulary
//! ```
//!
//! Downloads:
//! - Model: <https://github.com/taylorchu/kokoro-onnx/releases/tag/v0.2.0>
//! - Voices: <https://github.com/thewh1teagle/kokoro-onnx/releases/tag/model-files-v1.0>
//!
//! # Usage
//!
//! ```rust,no_run
//! use kokoro_speech::engines::kokoro::{KokoroEngine, KokoroInferenceParams, KokoroModelParams};
//! use std::path::Path;
//!
//! let mut engine = KokoroEngine::new();
//! engine.load(Path::new("models/kokoro"), KokoroModelParams::default())?;
//!
//! let params = KokoroInferenceParams {
//!     voice: "bf_emma".to_string(),
//!     speed: 0.9,
//!     ..Default::default()
//! };
//! let result = engine.speak("Hello from British Emma!", &params)?;
//! println!("{} samples, phonemes: {}", result.samples.len(), result.phonemes);
//! # Ok::<(), kokoro_speech::engines::kokoro::KokoroError>(())
//! ```

pub mod engine;
pub mod model;
pub mod phonemizer;
pub mod profile;
pub mod styles;
pub mod vocab;

pub use engine::{KokoroEngine, KokoroInferenceParams, KokoroModelParams};
pub use model::{KokoroError, SAMPLE_RATE};
pub use phonemizer::EspeakConfig;
pub use profile::{build_registry, KokoroProfile};

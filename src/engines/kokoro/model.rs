use std::collections::HashMap;
use std::path::{Path, PathBuf};

use ndarray::{Array2, ArrayView2};
use ort::execution_providers::CPUExecutionProvider;
use ort::inputs;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::TensorRef;

use super::phonemizer::{phonemize, EspeakConfig};
use super::styles::{Style, StyleStore};
use crate::audio::stitch::{append_crossfade, StitchError};

/// Longest token sequence the model accepts, excluding the two pad tokens.
pub const MAX_PHONEME_LEN: usize = 510;

pub const STYLE_DIM: usize = 256;

/// Output sample rate of every Kokoro voice.
pub const SAMPLE_RATE: u32 = 24000;

/// Blend between token windows of one utterance: 10 ms at 24 kHz.
const WINDOW_CROSSFADE_SAMPLES: usize = 240;

/// Token ids of `; : , . ! ?` in the Kokoro vocabulary.
const PAUSE_TOKEN_IDS: [i64; 6] = [1, 2, 3, 4, 5, 6];

const VOICES_FILE: &str = "voices-v1.0.bin";
const PREFERRED_MODEL_FILE: &str = "kokoro-quant-convinteger.onnx";

#[derive(thiserror::Error, Debug)]
pub enum KokoroError {
    #[error("ONNX runtime error: {0}")]
    Ort(#[from] ort::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
    #[error(
        "espeak-ng not found. Install: Linux: `sudo apt-get install espeak-ng`, \
         macOS: `brew install espeak-ng`, Windows: https://espeak-ng.org/download"
    )]
    EspeakNotFound,
    #[error("Phonemization failed: {0}")]
    PhonemizerFailed(String),
    #[error("Voice '{0}' not found in the voice pack")]
    VoiceNotFound(String),
    #[error("Model not loaded. Call load() first.")]
    ModelNotLoaded,
    #[error("Invalid config.json: {0}")]
    Config(String),
    #[error("Failed to parse voice file: {0}")]
    VoiceParse(String),
    #[error("Failed to join token windows: {0}")]
    Stitch(#[from] StitchError),
}

/// One synthesized utterance.
#[derive(Debug, Clone, Default)]
pub struct Utterance {
    pub samples: Vec<f32>,
    /// IPA transcription that was spoken.
    pub phonemes: String,
}

/// Loaded ONNX session plus the voice pack and vocabulary it needs.
pub struct KokoroModel {
    session: Session,
    styles: StyleStore,
    vocab: HashMap<char, i64>,
    /// "input_ids" or "tokens", depending on the export.
    tokens_input: String,
    speed_is_int32: bool,
}

impl KokoroModel {
    /// Load from a model directory holding an `.onnx` graph, `voices-v1.0.bin`
    /// and optionally `config.json`.
    pub fn load(
        model_dir: &Path,
        num_threads: Option<usize>,
        optimized_cache_path: Option<&Path>,
    ) -> Result<Self, KokoroError> {
        let onnx_path = find_onnx_file(model_dir)?;
        log::info!("Loading Kokoro model from {}", onnx_path.display());

        let session = init_session(&onnx_path, num_threads, optimized_cache_path)?;
        let tokens_input = detect_tokens_input(&session);
        let speed_is_int32 = detect_speed_is_int32(&session);
        log::info!("Model inputs: tokens={tokens_input}, speed_is_int32={speed_is_int32}");

        let voices_path = model_dir.join(VOICES_FILE);
        if !voices_path.exists() {
            return Err(not_found(format!(
                "voice pack not found at {}",
                voices_path.display()
            )));
        }
        let styles = StyleStore::load(&voices_path)?;

        let config_path = model_dir.join("config.json");
        let vocab = if config_path.exists() {
            super::vocab::load_vocab(&config_path)?
        } else {
            log::warn!("config.json not found, using built-in vocab");
            super::vocab::hardcoded_vocab()
        };

        Ok(Self {
            session,
            styles,
            vocab,
            tokens_input,
            speed_is_int32,
        })
    }

    /// Speak `text` with `voice`, phonemized as espeak-ng language `lang`.
    ///
    /// Token sequences longer than the model limit are split at pause
    /// punctuation and the windows joined with a short crossfade. The style
    /// row is picked once per utterance so prosody stays stable across
    /// windows.
    pub fn synthesize_text(
        &mut self,
        text: &str,
        voice: &str,
        lang: &str,
        speed: f32,
        style_index: Option<usize>,
        espeak: &EspeakConfig,
    ) -> Result<Utterance, KokoroError> {
        if !self.styles.contains(voice) {
            return Err(KokoroError::VoiceNotFound(voice.to_string()));
        }

        let phonemes = phonemize(text, lang, &self.vocab, espeak)?;
        if phonemes.ids.is_empty() {
            log::warn!("No phoneme tokens produced for {text:?}");
            return Ok(Utterance {
                samples: Vec::new(),
                phonemes: phonemes.ipa,
            });
        }

        let style: Style = *self
            .styles
            .style(voice, style_index.unwrap_or(phonemes.ids.len()))?;

        let windows = token_windows(&phonemes.ids);
        if windows.len() > 1 {
            log::debug!(
                "{} tokens exceed the model limit of {MAX_PHONEME_LEN}; using {} windows",
                phonemes.ids.len(),
                windows.len()
            );
        }

        let mut samples = Vec::with_capacity(phonemes.ids.len() * 300);
        for window in windows {
            let audio = self.infer(window, &style, speed)?;
            let overlap = WINDOW_CROSSFADE_SAMPLES.min(samples.len()).min(audio.len());
            append_crossfade(&mut samples, &audio, overlap)?;
        }

        Ok(Utterance {
            samples,
            phonemes: phonemes.ipa,
        })
    }

    /// Run the graph on one token window.
    fn infer(
        &mut self,
        tokens: &[i64],
        style: &Style,
        speed: f32,
    ) -> Result<Vec<f32>, KokoroError> {
        // [[0, t1..tN, 0]]
        let mut padded = Vec::with_capacity(tokens.len() + 2);
        padded.push(0);
        padded.extend_from_slice(tokens);
        padded.push(0);
        let tokens_arr = Array2::from_shape_vec((1, padded.len()), padded)?;
        let style_view = ArrayView2::from_shape((1, STYLE_DIM), style.as_slice())?;

        let outputs = if self.speed_is_int32 {
            let speed_arr = ndarray::arr1(&[speed.round() as i32]);
            self.session.run(inputs![
                self.tokens_input.as_str() => TensorRef::from_array_view(tokens_arr.view())?,
                "style" => TensorRef::from_array_view(style_view)?,
                "speed" => TensorRef::from_array_view(speed_arr.view())?,
            ])?
        } else {
            let speed_arr = ndarray::arr1(&[speed]);
            self.session.run(inputs![
                self.tokens_input.as_str() => TensorRef::from_array_view(tokens_arr.view())?,
                "style" => TensorRef::from_array_view(style_view)?,
                "speed" => TensorRef::from_array_view(speed_arr.view())?,
            ])?
        };

        let (_, waveform) = outputs
            .iter()
            .next()
            .ok_or_else(|| KokoroError::Ort(ort::Error::new("model produced no output")))?;
        let waveform = waveform.try_extract_array::<f32>()?;
        Ok(waveform.iter().copied().collect())
    }

    pub fn list_voices(&self) -> Vec<&str> {
        self.styles.list_voices()
    }
}

fn not_found(message: String) -> KokoroError {
    KokoroError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, message))
}

/// The quantized graph if present, otherwise the first `.onnx` file.
fn find_onnx_file(model_dir: &Path) -> Result<PathBuf, KokoroError> {
    let preferred = model_dir.join(PREFERRED_MODEL_FILE);
    if preferred.exists() {
        return Ok(preferred);
    }

    let mut candidates = Vec::new();
    for entry in std::fs::read_dir(model_dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "onnx") {
            candidates.push(path);
        }
    }
    candidates.sort();
    candidates
        .into_iter()
        .next()
        .ok_or_else(|| not_found(format!("no .onnx file in {}", model_dir.display())))
}

/// Build a CPU session. With a cache path, the first load writes the Level3
/// optimized graph there and later loads read it back without re-optimizing.
fn init_session(
    onnx_path: &Path,
    num_threads: Option<usize>,
    optimized_cache_path: Option<&Path>,
) -> Result<Session, KokoroError> {
    let (load_path, level, write_cache) = match optimized_cache_path {
        Some(cache) if cache.exists() => {
            log::info!("Loading pre-optimized graph from {}", cache.display());
            (cache, GraphOptimizationLevel::Disable, None)
        }
        Some(cache) => {
            log::info!("Optimizing graph; caching it at {}", cache.display());
            (onnx_path, GraphOptimizationLevel::Level3, Some(cache))
        }
        None => (onnx_path, GraphOptimizationLevel::Level3, None),
    };

    let mut builder = Session::builder()?
        .with_optimization_level(level)?
        .with_execution_providers(vec![CPUExecutionProvider::default().build()])?
        .with_parallel_execution(true)?;

    if let Some(cache) = write_cache {
        builder = builder.with_optimized_model_path(cache)?;
    }
    if let Some(threads) = num_threads {
        builder = builder
            .with_intra_threads(threads)?
            .with_inter_threads(threads)?;
    }

    Ok(builder.commit_from_file(load_path)?)
}

fn detect_tokens_input(session: &Session) -> String {
    session
        .inputs()
        .iter()
        .map(|input| input.name())
        .find(|name| *name == "input_ids" || *name == "tokens")
        .unwrap_or("input_ids")
        .to_string()
}

fn detect_speed_is_int32(session: &Session) -> bool {
    session
        .inputs()
        .iter()
        .find(|input| input.name() == "speed")
        .map(|input| format!("{:?}", input.dtype()).to_lowercase().contains("int32"))
        // Current Kokoro exports take an int32 speed.
        .unwrap_or(true)
}

/// Split token ids into windows of at most [`MAX_PHONEME_LEN`], cutting after
/// the last pause punctuation in each window when there is one.
fn token_windows(ids: &[i64]) -> Vec<&[i64]> {
    let mut windows = Vec::new();
    let mut rest = ids;

    while rest.len() > MAX_PHONEME_LEN {
        let cut = rest[..MAX_PHONEME_LEN]
            .iter()
            .rposition(|id| PAUSE_TOKEN_IDS.contains(id))
            .map(|pos| pos + 1)
            .unwrap_or(MAX_PHONEME_LEN);
        let (window, tail) = rest.split_at(cut);
        windows.push(window);
        rest = tail;
    }
    if !rest.is_empty() {
        windows.push(rest);
    }
    windows
}

use std::path::{Path, PathBuf};

use crate::{BoxError, SynthesisEngine, SynthesisResult};

use super::model::{KokoroError, KokoroModel, SAMPLE_RATE};
use super::phonemizer::{voice_lang, EspeakConfig};

#[derive(Debug, Clone, Default)]
pub struct KokoroModelParams {
    /// Intra-op threads; `None` lets ONNX Runtime decide.
    pub num_threads: Option<usize>,
    /// Writable path for the optimized graph, reused on later loads.
    pub optimized_model_cache_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct KokoroInferenceParams {
    pub voice: String,
    pub speed: f32,
    /// Style row to use; `None` picks the row matching the token count.
    pub style_index: Option<usize>,
    /// espeak-ng language code; `None` follows the voice prefix.
    pub language: Option<String>,
}

impl Default for KokoroInferenceParams {
    fn default() -> Self {
        Self {
            voice: "af_heart".to_string(),
            speed: 1.0,
            style_index: None,
            language: None,
        }
    }
}

/// Owns at most one loaded [`KokoroModel`] plus the espeak-ng install used to
/// phonemize input.
///
/// ```rust,no_run
/// use kokoro_speech::{SynthesisEngine, engines::kokoro::KokoroEngine};
/// use std::path::Path;
///
/// let mut engine = KokoroEngine::new();
/// engine.load_model(Path::new("models/kokoro"))?;
/// let speech = engine.synthesize("Good morning.", None)?;
/// println!("{:.2}s", speech.duration_secs());
/// # Ok::<(), Box<dyn std::error::Error + Send + Sync>>(())
/// ```
pub struct KokoroEngine {
    model: Option<KokoroModel>,
    model_path: Option<PathBuf>,
    espeak: EspeakConfig,
}

impl Default for KokoroEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl KokoroEngine {
    /// Engine that uses `espeak-ng` from PATH.
    pub fn new() -> Self {
        Self::with_espeak(EspeakConfig::default())
    }

    /// Engine with an explicit espeak-ng install, e.g. one bundled with the app.
    pub fn with_espeak(espeak: EspeakConfig) -> Self {
        Self {
            model: None,
            model_path: None,
            espeak,
        }
    }

    /// Load the model, keeping the typed error.
    pub fn load(
        &mut self,
        model_path: &Path,
        params: KokoroModelParams,
    ) -> Result<(), KokoroError> {
        let model = KokoroModel::load(
            model_path,
            params.num_threads,
            params.optimized_model_cache_path.as_deref(),
        )?;
        log::info!("Kokoro ready with {} voices", model.list_voices().len());
        self.model = Some(model);
        self.model_path = Some(model_path.to_path_buf());
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        self.model.is_some()
    }

    pub fn model_path(&self) -> Option<&Path> {
        self.model_path.as_deref()
    }

    /// Voice names in the loaded voice pack; empty before loading.
    pub fn list_voices(&self) -> Vec<&str> {
        self.model
            .as_ref()
            .map(|m| m.list_voices())
            .unwrap_or_default()
    }

    /// Synthesize with the typed error.
    pub fn speak(
        &mut self,
        text: &str,
        params: &KokoroInferenceParams,
    ) -> Result<SynthesisResult, KokoroError> {
        let model = self.model.as_mut().ok_or(KokoroError::ModelNotLoaded)?;
        let lang = params
            .language
            .as_deref()
            .unwrap_or_else(|| voice_lang(&params.voice));

        let utterance = model.synthesize_text(
            text,
            &params.voice,
            lang,
            params.speed,
            params.style_index,
            &self.espeak,
        )?;

        Ok(SynthesisResult {
            samples: utterance.samples,
            sample_rate: SAMPLE_RATE,
            phonemes: utterance.phonemes,
        })
    }
}

impl SynthesisEngine for KokoroEngine {
    type SynthesisParams = KokoroInferenceParams;
    type ModelParams = KokoroModelParams;

    fn load_model_with_params(
        &mut self,
        model_path: &Path,
        params: Self::ModelParams,
    ) -> Result<(), BoxError> {
        Ok(self.load(model_path, params)?)
    }

    fn unload_model(&mut self) {
        self.model = None;
        self.model_path = None;
    }

    fn synthesize(
        &mut self,
        text: &str,
        params: Option<Self::SynthesisParams>,
    ) -> Result<SynthesisResult, BoxError> {
        Ok(self.speak(text, &params.unwrap_or_default())?)
    }
}

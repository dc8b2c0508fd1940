//! Kokoro behind the pipeline's [`Synthesizer`] seam.

use std::sync::Arc;

use parking_lot::Mutex;

use super::engine::{KokoroEngine, KokoroInferenceParams, KokoroModelParams};
use super::model::KokoroError;
use super::phonemizer::EspeakConfig;
use crate::config::ModelSettings;
use crate::voices::{Language, Synthesizer, VoiceRegistry};
use crate::{BoxError, SynthesisResult};

/// One language served by a shared engine.
///
/// The engine is not reentrant, so calls from different requests queue on the
/// mutex.
pub struct KokoroProfile {
    engine: Arc<Mutex<KokoroEngine>>,
    language: Language,
    speed: f32,
}

impl KokoroProfile {
    pub fn new(engine: Arc<Mutex<KokoroEngine>>, language: Language, speed: f32) -> Self {
        Self {
            engine,
            language,
            speed,
        }
    }

    fn params(&self, voice: &str) -> KokoroInferenceParams {
        KokoroInferenceParams {
            voice: voice.to_string(),
            speed: self.speed,
            style_index: None,
            language: Some(self.language.espeak_code().to_string()),
        }
    }
}

impl Synthesizer for KokoroProfile {
    fn synthesize(&self, text: &str, voice: &str) -> Result<SynthesisResult, BoxError> {
        let params = self.params(voice);
        Ok(self.engine.lock().speak(text, &params)?)
    }
}

/// Load the model once and register a profile for each language.
pub fn build_registry(
    models: &ModelSettings,
    languages: &[Language],
) -> Result<VoiceRegistry, KokoroError> {
    let mut engine = KokoroEngine::with_espeak(EspeakConfig {
        bin_path: models.espeak_bin.clone(),
        data_path: models.espeak_data.clone(),
    });
    engine.load(
        &models.dir,
        KokoroModelParams {
            num_threads: models.num_threads,
            optimized_model_cache_path: models.optimized_cache.clone(),
        },
    )?;

    let engine = Arc::new(Mutex::new(engine));
    let mut registry = VoiceRegistry::new();
    for &language in languages {
        log::info!("Registering Kokoro pipeline for {language}");
        registry.register(
            language,
            Arc::new(KokoroProfile::new(Arc::clone(&engine), language, models.speed)),
        );
    }
    Ok(registry)
}

//! Voice identifiers, language profiles and the synthesizer registry.
//!
//! A voice identifier such as `af_heart` starts with a one-character language
//! code (`a` = American English). Requests are routed to the synthesizer
//! registered for that code; unregistered codes are rejected before any
//! synthesis work starts.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::error::ValidationError;
use crate::{BoxError, SynthesisResult};

/// Languages the Kokoro voice pack covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Language {
    AmericanEnglish,
    BritishEnglish,
    Spanish,
    French,
    Hindi,
    Italian,
    Japanese,
    BrazilianPortuguese,
    MandarinChinese,
}

impl Language {
    pub const ALL: [Language; 9] = [
        Language::AmericanEnglish,
        Language::BritishEnglish,
        Language::Spanish,
        Language::French,
        Language::Hindi,
        Language::Italian,
        Language::Japanese,
        Language::BrazilianPortuguese,
        Language::MandarinChinese,
    ];

    /// The language-code character that prefixes voice identifiers.
    pub fn code(&self) -> char {
        match self {
            Language::AmericanEnglish => 'a',
            Language::BritishEnglish => 'b',
            Language::Spanish => 'e',
            Language::French => 'f',
            Language::Hindi => 'h',
            Language::Italian => 'i',
            Language::Japanese => 'j',
            Language::BrazilianPortuguese => 'p',
            Language::MandarinChinese => 'z',
        }
    }

    pub fn from_code(code: char) -> Option<Language> {
        Language::ALL.into_iter().find(|lang| lang.code() == code)
    }

    /// Language of a voice identifier, by its first character.
    pub fn from_voice(voice: &str) -> Option<Language> {
        voice.chars().next().and_then(Language::from_code)
    }

    /// espeak-ng voice used for phonemization.
    pub fn espeak_code(&self) -> &'static str {
        match self {
            Language::AmericanEnglish => "en-us",
            Language::BritishEnglish => "en-gb",
            Language::Spanish => "es",
            Language::French => "fr-fr",
            Language::Hindi => "hi",
            Language::Italian => "it",
            Language::Japanese => "ja",
            Language::BrazilianPortuguese => "pt-br",
            Language::MandarinChinese => "cmn",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Language::AmericanEnglish => "American English",
            Language::BritishEnglish => "British English",
            Language::Spanish => "Spanish",
            Language::French => "French",
            Language::Hindi => "Hindi",
            Language::Italian => "Italian",
            Language::Japanese => "Japanese",
            Language::BrazilianPortuguese => "Brazilian Portuguese",
            Language::MandarinChinese => "Mandarin Chinese",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.code())
    }
}

/// A catalog entry: voice identifier and display name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VoiceInfo {
    pub id: &'static str,
    pub name: &'static str,
}

const fn voice(id: &'static str, name: &'static str) -> VoiceInfo {
    VoiceInfo { id, name }
}

const VOICE_CATALOG: &[VoiceInfo] = &[
    voice("af_heart", "Heart (Default)"),
    voice("af_bella", "Bella (American)"),
    voice("af_sarah", "Sarah (American)"),
    voice("af_nicole", "Nicole (American)"),
    voice("af_sky", "Sky (American)"),
    voice("am_adam", "Adam (American)"),
    voice("am_michael", "Michael (American)"),
    voice("bf_emma", "Emma (British)"),
    voice("bf_isabella", "Isabella (British)"),
    voice("bm_george", "George (British)"),
    voice("bm_lewis", "Lewis (British)"),
    voice("ff_siwis", "SIWIS (French)"),
    voice("hf_alpha", "Alpha (Hindi)"),
    voice("hf_beta", "Beta (Hindi)"),
];

/// Static catalog of the voices offered to callers.
pub fn voice_catalog() -> &'static [VoiceInfo] {
    VOICE_CATALOG
}

/// Produces a waveform for one chunk of text.
///
/// Implementations are shared across requests and must be callable from any
/// worker thread.
pub trait Synthesizer: Send + Sync {
    fn synthesize(&self, text: &str, voice: &str) -> Result<SynthesisResult, BoxError>;
}

/// A registered language and the synthesizer that serves it.
#[derive(Clone)]
pub struct LanguageProfile {
    language: Language,
    synthesizer: Arc<dyn Synthesizer>,
}

impl LanguageProfile {
    pub fn language(&self) -> Language {
        self.language
    }

    pub fn synthesizer(&self) -> &Arc<dyn Synthesizer> {
        &self.synthesizer
    }
}

impl fmt::Debug for LanguageProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LanguageProfile")
            .field("language", &self.language)
            .finish_non_exhaustive()
    }
}

/// Synthesizers keyed by language code, built once at startup.
#[derive(Debug, Clone, Default)]
pub struct VoiceRegistry {
    profiles: BTreeMap<char, LanguageProfile>,
}

impl VoiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the synthesizer for a language.
    pub fn register(&mut self, language: Language, synthesizer: Arc<dyn Synthesizer>) -> &mut Self {
        log::debug!("Registering synthesizer for {language}");
        self.profiles.insert(
            language.code(),
            LanguageProfile {
                language,
                synthesizer,
            },
        );
        self
    }

    /// Resolve the profile serving `voice`.
    pub fn resolve(&self, voice: &str) -> Result<&LanguageProfile, ValidationError> {
        let code = voice
            .trim()
            .chars()
            .next()
            .ok_or(ValidationError::EmptyVoice)?;
        self.profiles
            .get(&code)
            .ok_or(ValidationError::UnsupportedLanguage(code))
    }

    /// Registered languages, ordered by code.
    pub fn languages(&self) -> Vec<Language> {
        self.profiles.values().map(|p| p.language).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

//! Application settings.
//!
//! Sources are layered, later ones winning:
//! 1. Built-in defaults
//! 2. `config/default.{toml,json}` if present
//! 3. An explicit file passed with `--config`
//! 4. Environment variables prefixed `KOKORO_SPEECH`, e.g. `KOKORO_SPEECH__SERVER__PORT=9000`

use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::audio::StitchMode;
use crate::pipeline::PipelineConfig;
use crate::voices::Language;

const ENV_PREFIX: &str = "KOKORO_SPEECH";

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("Configuration file not found: {}", .0.display())]
    FileNotFound(PathBuf),
    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub models: ModelSettings,
    /// Language codes to register at startup.
    pub languages: Vec<String>,
    pub pipeline: PipelineConfig,
    pub chat: ChatSettings,
    /// Where the CLI writes audio files.
    pub output_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            models: ModelSettings::default(),
            languages: ["a", "b", "f", "h"].into_iter().map(String::from).collect(),
            pipeline: PipelineConfig::default(),
            chat: ChatSettings::default(),
            output_dir: PathBuf::from("output"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

/// Kokoro model and phonemizer locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// Directory holding the `.onnx` model and `voices-v1.0.bin`.
    pub dir: PathBuf,
    /// ONNX Runtime thread count; unset uses the runtime default.
    pub num_threads: Option<usize>,
    /// Where the optimized graph is cached between runs.
    pub optimized_cache: Option<PathBuf>,
    pub espeak_bin: Option<PathBuf>,
    pub espeak_data: Option<PathBuf>,
    /// Speech speed multiplier.
    pub speed: f32,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("models/kokoro"),
            num_threads: None,
            optimized_cache: None,
            espeak_bin: None,
            espeak_data: None,
            speed: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatSettings {
    pub base_url: String,
    pub model: String,
    /// Falls back to `OPENAI_API_KEY` when unset.
    pub api_key: Option<String>,
    pub system_prompt: String,
    pub timeout_secs: u64,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            api_key: None,
            system_prompt: "You are a helpful assistant. Keep responses brief and conversational."
                .to_string(),
            timeout_secs: 30,
        }
    }
}

impl Settings {
    /// Parsed language list. Fails on codes outside the Kokoro voice pack.
    pub fn languages(&self) -> Result<Vec<Language>, ConfigError> {
        self.languages
            .iter()
            .map(|code| {
                let mut chars = code.trim().chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Language::from_code(c),
                    _ => None,
                }
                .ok_or_else(|| ConfigError::InvalidValue {
                    field: "languages".to_string(),
                    message: format!("unknown language code {code:?}"),
                })
            })
            .collect()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pipeline.max_chunk_chars == 0 {
            return Err(ConfigError::InvalidValue {
                field: "pipeline.max_chunk_chars".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if let StitchMode::Crossfade { overlap: 0 } = self.pipeline.stitch {
            return Err(ConfigError::InvalidValue {
                field: "pipeline.stitch.overlap".to_string(),
                message: "crossfade overlap must be greater than zero".to_string(),
            });
        }
        if self.models.speed.is_nan() || self.models.speed <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "models.speed".to_string(),
                message: format!("must be positive, got {}", self.models.speed),
            });
        }
        if self.languages()?.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "languages".to_string(),
                message: "at least one language is required".to_string(),
            });
        }
        Ok(())
    }
}

/// Load settings from the layered sources and validate them.
pub fn load_settings(path: Option<&Path>) -> Result<Settings, ConfigError> {
    let mut builder =
        Config::builder().add_source(File::with_name("config/default").required(false));

    if let Some(path) = path {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }
        builder = builder.add_source(File::from(path).required(true));
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true),
    );

    let settings: Settings = builder.build()?.try_deserialize()?;
    settings.validate()?;

    log::debug!(
        "Loaded settings: server={}:{}, models={}, languages={:?}",
        settings.server.host,
        settings.server.port,
        settings.models.dir.display(),
        settings.languages
    );
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::audio::AudioFormat;

    #[test]
    fn defaults_are_valid() {
        let settings = Settings::default();
        settings.validate().unwrap();
        assert_eq!(settings.server.port, 8000);
        assert_eq!(settings.pipeline.max_chunk_chars, 200);
        assert_eq!(
            settings.languages().unwrap(),
            vec![
                Language::AmericanEnglish,
                Language::BritishEnglish,
                Language::French,
                Language::Hindi
            ]
        );
    }

    #[test]
    fn rejects_zero_chunk_size() {
        let mut settings = Settings::default();
        settings.pipeline.max_chunk_chars = 0;
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidValue { field, .. }) if field == "pipeline.max_chunk_chars"
        ));
    }

    #[test]
    fn rejects_unknown_language_codes() {
        let mut settings = Settings::default();
        settings.languages.push("zz".to_string());
        assert!(settings.validate().is_err());

        settings.languages = vec!["q".to_string()];
        assert!(settings.languages().is_err());
    }

    #[test]
    fn rejects_zero_crossfade_overlap() {
        let mut settings = Settings::default();
        settings.pipeline.stitch = StitchMode::Crossfade { overlap: 0 };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let err = load_settings(Some(Path::new("/nonexistent/kokoro.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[test]
    fn loads_toml_file_over_defaults() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            r#"
languages = ["a", "e"]
output_dir = "renders"

[server]
port = 9123

[pipeline]
max_chunk_chars = 120
fallback_format = "wav"

[pipeline.stitch]
mode = "crossfade"
overlap = 480
"#
        )
        .unwrap();

        let settings = load_settings(Some(file.path())).unwrap();
        assert_eq!(settings.server.port, 9123);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.output_dir, PathBuf::from("renders"));
        assert_eq!(settings.pipeline.max_chunk_chars, 120);
        assert_eq!(settings.pipeline.fallback_format, AudioFormat::Wav);
        assert_eq!(settings.pipeline.stitch, StitchMode::Crossfade { overlap: 480 });
        assert_eq!(settings.pipeline.default_voice, "af_heart");
        assert_eq!(
            settings.languages().unwrap(),
            vec![Language::AmericanEnglish, Language::Spanish]
        );
    }
}

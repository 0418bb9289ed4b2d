//! TOML configuration file loading
//!
//! Supports `~/.config/devspeak/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::Result;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct DevspeakConfigFile {
    /// Path to a persona JSON file
    #[serde(default)]
    pub persona: Option<PathBuf>,

    /// Chat completion configuration
    #[serde(default)]
    pub llm: LlmFileConfig,

    /// Voice/audio configuration
    #[serde(default)]
    pub voice: VoiceFileConfig,

    /// Terminal presentation
    #[serde(default)]
    pub display: DisplayFileConfig,

    /// API keys for external services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,
}

/// LLM-related configuration
#[derive(Debug, Default, Deserialize)]
pub struct LlmFileConfig {
    /// Model identifier (e.g. "gpt-4")
    pub model: Option<String>,

    /// OpenAI-compatible API root
    pub base_url: Option<String>,

    pub max_tokens: Option<u32>,

    pub temperature: Option<f32>,

    /// HTTP timeout in seconds
    pub timeout_secs: Option<u64>,

    /// Give up waiting for a reply after this many seconds
    pub reply_timeout_secs: Option<u64>,
}

/// Voice processing configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// Speak replies aloud
    pub speak_replies: Option<bool>,

    /// "whisper" or "deepgram"
    pub stt_provider: Option<String>,

    /// STT model (e.g. "whisper-1")
    pub stt_model: Option<String>,

    /// Recognition language (BCP 47, e.g. "en-US")
    pub language: Option<String>,

    /// "openai" or "elevenlabs"
    pub tts_provider: Option<String>,

    /// TTS model (e.g. "tts-1")
    pub tts_model: Option<String>,

    /// TTS voice identifier (e.g. "alloy")
    pub tts_voice: Option<String>,

    /// TTS speed multiplier
    pub tts_speed: Option<f32>,

    /// RMS level that counts as speech
    pub energy_threshold: Option<f32>,

    /// Trailing silence that ends an utterance, in milliseconds
    pub silence_ms: Option<u64>,

    /// Give up if nothing is said within this many seconds
    pub no_speech_timeout_secs: Option<u64>,

    /// Interim transcript cadence in milliseconds; 0 disables
    pub interim_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DisplayFileConfig {
    /// Typewriter delay per character in milliseconds; 0 prints instantly
    pub typewriter_ms: Option<u64>,
}

/// API keys configuration
#[derive(Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub openai: Option<String>,
    pub deepgram: Option<String>,
    pub elevenlabs: Option<String>,
}

impl std::fmt::Debug for ApiKeysFileConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeysFileConfig")
            .field("openai", &self.openai.as_ref().map(|_| "[REDACTED]"))
            .field("deepgram", &self.deepgram.as_ref().map(|_| "[REDACTED]"))
            .field("elevenlabs", &self.elevenlabs.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Load the TOML config file from the standard path
///
/// Returns `DevspeakConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> DevspeakConfigFile {
    config_file_path().map_or_else(DevspeakConfigFile::default, |path| load_config_from(&path))
}

/// Load a TOML config file from `path`, falling back to defaults
pub fn load_config_from(path: &Path) -> DevspeakConfigFile {
    if !path.exists() {
        return DevspeakConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match parse_config(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                DevspeakConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            DevspeakConfigFile::default()
        }
    }
}

/// Parse config file contents
///
/// # Errors
///
/// Returns [`crate::Error::Toml`] if the contents aren't valid for the schema
pub fn parse_config(content: &str) -> Result<DevspeakConfigFile> {
    Ok(toml::from_str(content)?)
}

/// Return the config file path: `~/.config/devspeak/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("devspeak").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let fc = load_config_from(&dir.path().join("config.toml"));
        assert!(fc.llm.model.is_none());
        assert!(fc.persona.is_none());
    }

    #[test]
    fn partial_file_overlays() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
persona = "/tmp/ada.json"

[llm]
model = "gpt-4o-mini"
reply_timeout_secs = 20

[voice]
stt_provider = "deepgram"
interim_ms = 0

[api_keys]
openai = "sk-file"
"#
        )
        .unwrap();

        let fc = load_config_from(file.path());
        assert_eq!(fc.persona, Some(PathBuf::from("/tmp/ada.json")));
        assert_eq!(fc.llm.model.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(fc.llm.reply_timeout_secs, Some(20));
        assert_eq!(fc.voice.stt_provider.as_deref(), Some("deepgram"));
        assert_eq!(fc.voice.interim_ms, Some(0));
        assert_eq!(fc.api_keys.openai.as_deref(), Some("sk-file"));
        assert!(fc.display.typewriter_ms.is_none());
    }

    #[test]
    fn malformed_file_falls_back() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[llm\nmodel = ").unwrap();
        let fc = load_config_from(file.path());
        assert!(fc.llm.model.is_none());
    }

    #[test]
    fn parse_rejects_wrong_types() {
        let result = parse_config("[llm]\nmax_tokens = \"lots\"");
        assert!(matches!(result, Err(crate::Error::Toml(_))));
    }

    #[test]
    fn api_keys_are_redacted() {
        let keys = ApiKeysFileConfig {
            openai: Some("sk-secret".to_string()),
            ..Default::default()
        };
        let debug = format!("{keys:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("REDACTED"));
    }
}

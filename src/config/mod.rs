//! Configuration management for devspeak
//!
//! Precedence: CLI flags > environment > `config.toml` > defaults.

pub mod file;

use std::path::Path;
use std::time::Duration;

use crate::voice::{EndpointSettings, RecognizerSettings, SttProvider, TtsProvider};
use crate::{Error, Persona, Result};

use file::DevspeakConfigFile;

const DEFAULT_LLM_MODEL: &str = "gpt-4";
const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_LANGUAGE: &str = "en-US";
const DEFAULT_OPENAI_VOICE: &str = "alloy";
const DEFAULT_ELEVENLABS_VOICE: &str = "21m00Tcm4TlvDq8ikWAM";

/// devspeak configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Active persona
    pub persona: Persona,

    /// API keys
    pub api_keys: ApiKeys,

    /// Chat completion configuration
    pub llm: LlmConfig,

    /// Voice processing configuration
    pub voice: VoiceConfig,

    /// Delay per character when revealing replies
    pub typewriter_delay: Duration,
}

/// Chat completion configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Model identifier, `DEVSPEAK_LLM_MODEL`
    pub model: String,

    /// API root, `DEVSPEAK_LLM_BASE_URL`
    pub base_url: url::Url,

    pub max_tokens: u32,

    pub temperature: Option<f32>,

    /// HTTP timeout
    pub timeout: Duration,

    /// Orchestrator-level reply deadline
    pub reply_timeout: Option<Duration>,
}

/// Voice processing configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Speak replies aloud
    pub speak_replies: bool,

    pub stt_provider: SttProvider,

    /// STT model (e.g. "whisper-1", "nova-2")
    pub stt_model: String,

    /// Recognition language (BCP 47)
    pub language: String,

    pub tts_provider: TtsProvider,

    /// TTS model; provider default when unset
    pub tts_model: Option<String>,

    /// TTS voice identifier
    pub tts_voice: String,

    /// TTS speed multiplier (0.25 to 4.0)
    pub tts_speed: f32,

    /// Endpointing and interim cadence for the microphone
    pub recognizer: RecognizerSettings,
}

/// API keys for external services
#[derive(Clone, Default)]
pub struct ApiKeys {
    /// `OpenAI` API key (chat, Whisper and TTS)
    pub openai: Option<String>,

    /// `Deepgram` API key (optional STT)
    pub deepgram: Option<String>,

    /// `ElevenLabs` API key (optional TTS)
    pub elevenlabs: Option<String>,
}

impl std::fmt::Debug for ApiKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |key: &Option<String>| key.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("ApiKeys")
            .field("openai", &redact(&self.openai))
            .field("deepgram", &redact(&self.deepgram))
            .field("elevenlabs", &redact(&self.elevenlabs))
            .finish()
    }
}

impl Config {
    /// Load configuration from the config file and environment
    ///
    /// `persona_path` (from the CLI) wins over the file's `persona` entry;
    /// without either the embedded persona is used.
    ///
    /// # Errors
    ///
    /// Returns error if the persona can't be loaded or a setting is invalid
    pub fn load(persona_path: Option<&Path>, disable_speech: bool) -> Result<Self> {
        let fc = file::load_config_file();
        Self::from_sources(fc, persona_path, disable_speech, |name| {
            std::env::var(name).ok().filter(|v| !v.trim().is_empty())
        })
    }

    /// Resolve configuration from a parsed file and an environment lookup
    ///
    /// # Errors
    ///
    /// Returns error if the persona can't be loaded or a setting is invalid
    pub fn from_sources(
        fc: DevspeakConfigFile,
        persona_path: Option<&Path>,
        disable_speech: bool,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let persona = match persona_path.or(fc.persona.as_deref()) {
            Some(path) => Persona::load(path)?,
            None => Persona::embedded()?,
        };

        // Load API keys (env > toml > None)
        let api_keys = ApiKeys {
            openai: env("OPENAI_API_KEY").or(fc.api_keys.openai),
            deepgram: env("DEEPGRAM_API_KEY").or(fc.api_keys.deepgram),
            elevenlabs: env("ELEVENLABS_API_KEY").or(fc.api_keys.elevenlabs),
        };

        let base_url = env("DEVSPEAK_LLM_BASE_URL")
            .or(fc.llm.base_url)
            .unwrap_or_else(|| DEFAULT_LLM_BASE_URL.to_string());
        let llm = LlmConfig {
            model: env("DEVSPEAK_LLM_MODEL")
                .or(fc.llm.model)
                .unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
            base_url: url::Url::parse(&base_url)
                .map_err(|e| Error::Config(format!("invalid LLM base URL {base_url}: {e}")))?,
            max_tokens: fc.llm.max_tokens.unwrap_or(500),
            temperature: Some(fc.llm.temperature.unwrap_or(0.7)),
            timeout: Duration::from_secs(fc.llm.timeout_secs.unwrap_or(30)),
            reply_timeout: fc.llm.reply_timeout_secs.map(Duration::from_secs),
        };

        let stt_provider = env("DEVSPEAK_STT_PROVIDER")
            .or(fc.voice.stt_provider)
            .map(|p| p.parse::<SttProvider>())
            .transpose()?
            .unwrap_or_default();
        let stt_model = env("DEVSPEAK_STT_MODEL")
            .or(fc.voice.stt_model)
            .unwrap_or_else(|| default_stt_model(stt_provider).to_string());

        let tts_provider = env("DEVSPEAK_TTS_PROVIDER")
            .or(fc.voice.tts_provider)
            .map(|p| p.parse::<TtsProvider>())
            .transpose()?
            .unwrap_or_default();
        let tts_voice = env("DEVSPEAK_TTS_VOICE")
            .or(fc.voice.tts_voice)
            .or_else(|| persona.tts_voice().map(str::to_string))
            .unwrap_or_else(|| default_tts_voice(tts_provider).to_string());

        let defaults = RecognizerSettings::default();
        let recognizer = RecognizerSettings {
            endpoint: EndpointSettings {
                energy_threshold: fc
                    .voice
                    .energy_threshold
                    .unwrap_or(defaults.endpoint.energy_threshold),
                silence: fc
                    .voice
                    .silence_ms
                    .map_or(defaults.endpoint.silence, Duration::from_millis),
                ..defaults.endpoint
            },
            no_speech_timeout: fc
                .voice
                .no_speech_timeout_secs
                .map_or(defaults.no_speech_timeout, Duration::from_secs),
            interim_interval: match fc.voice.interim_ms {
                Some(0) => None,
                Some(ms) => Some(Duration::from_millis(ms)),
                None => defaults.interim_interval,
            },
        };

        let voice = VoiceConfig {
            speak_replies: !disable_speech && fc.voice.speak_replies.unwrap_or(true),
            stt_provider,
            stt_model,
            language: env("DEVSPEAK_LANGUAGE")
                .or(fc.voice.language)
                .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
            tts_provider,
            tts_model: env("DEVSPEAK_TTS_MODEL").or(fc.voice.tts_model),
            tts_voice,
            tts_speed: fc.voice.tts_speed.unwrap_or_else(|| persona.tts_speed()),
            recognizer,
        };

        let typewriter_delay = Duration::from_millis(fc.display.typewriter_ms.unwrap_or(30));

        tracing::debug!(
            persona = persona.name(),
            model = %llm.model,
            stt = ?voice.stt_provider,
            tts = ?voice.tts_provider,
            speak_replies = voice.speak_replies,
            "configuration resolved"
        );

        Ok(Self {
            persona,
            api_keys,
            llm,
            voice,
            typewriter_delay,
        })
    }

    /// Key for the chat completion endpoint
    #[must_use]
    pub fn llm_api_key(&self) -> Option<&str> {
        self.api_keys.openai.as_deref()
    }

    /// Key for the configured STT provider
    #[must_use]
    pub fn stt_api_key(&self) -> Option<&str> {
        match self.voice.stt_provider {
            SttProvider::Whisper => self.api_keys.openai.as_deref(),
            SttProvider::Deepgram => self.api_keys.deepgram.as_deref(),
        }
    }

    /// Key for the configured TTS provider
    #[must_use]
    pub fn tts_api_key(&self) -> Option<&str> {
        match self.voice.tts_provider {
            TtsProvider::OpenAI => self.api_keys.openai.as_deref(),
            TtsProvider::ElevenLabs => self.api_keys.elevenlabs.as_deref(),
        }
    }
}

const fn default_stt_model(provider: SttProvider) -> &'static str {
    match provider {
        SttProvider::Whisper => "whisper-1",
        SttProvider::Deepgram => "nova-2",
    }
}

const fn default_tts_voice(provider: TtsProvider) -> &'static str {
    match provider {
        TtsProvider::OpenAI => DEFAULT_OPENAI_VOICE,
        TtsProvider::ElevenLabs => DEFAULT_ELEVENLABS_VOICE,
    }
}

//! Persona configuration
//!
//! A persona is the identity the assistant answers as: a display name, a
//! system prompt, and the voice its replies are spoken in. Stored as JSON in
//! the persona.json layout (`identity`, `voice.tts`, `personality`).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Compiled-in default persona
const EMBEDDED_PERSONA: &str = include_str!("../personas/devspeak.json");

/// Identity the assistant speaks as
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Persona {
    /// Semantic version of this persona file
    #[serde(default = "default_version")]
    pub version: String,

    /// Core identity (required)
    pub identity: Identity,

    /// Voice and audio configuration
    pub voice: Option<Voice>,

    /// Behavior and communication style
    pub personality: Option<Personality>,
}

/// Core identity of the entity
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: String,

    /// Display name
    pub name: String,

    /// Short descriptive phrase
    pub tagline: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Voice {
    pub tts: Option<TtsConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TtsConfig {
    /// Voice identifier
    pub voice: Option<String>,

    /// Speech rate multiplier
    #[serde(default = "default_tts_speed")]
    pub speed: f32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Personality {
    /// Base system prompt
    pub system_prompt: Option<String>,

    /// Default communication tone
    pub tone: Option<String>,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

const fn default_tts_speed() -> f32 {
    0.9
}

impl Default for Persona {
    fn default() -> Self {
        Self {
            version: default_version(),
            identity: Identity {
                id: "assistant".to_string(),
                name: "Assistant".to_string(),
                tagline: None,
            },
            voice: None,
            personality: None,
        }
    }
}

impl Persona {
    /// Load a persona from a JSON file
    ///
    /// # Errors
    ///
    /// Returns error if the file can't be read or parsed
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Persona(format!("failed to read {}: {e}", path.display())))?;
        let persona = Self::from_json(&content)
            .map_err(|e| Error::Persona(format!("failed to parse {}: {e}", path.display())))?;
        tracing::debug!(path = %path.display(), name = persona.name(), "loaded persona from file");
        Ok(persona)
    }

    /// Load the persona compiled into the binary
    ///
    /// # Errors
    ///
    /// Returns error if the embedded JSON is malformed
    pub fn embedded() -> Result<Self> {
        Self::from_json(EMBEDDED_PERSONA)
    }

    /// Parse persona JSON
    ///
    /// # Errors
    ///
    /// Returns error if the JSON doesn't describe a persona
    pub fn from_json(json: &str) -> Result<Self> {
        let persona: Self = serde_json::from_str(json)?;
        if persona.identity.name.trim().is_empty() {
            return Err(Error::Persona("persona name must not be empty".to_string()));
        }
        Ok(persona)
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.identity.id
    }

    /// Get the display name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.identity.name
    }

    /// System prompt for chat completions
    ///
    /// Falls back to a short instruction built from the name when the persona
    /// doesn't carry one.
    #[must_use]
    pub fn system_prompt(&self) -> String {
        self.personality
            .as_ref()
            .and_then(|p| p.system_prompt.as_deref())
            .map(str::trim)
            .filter(|prompt| !prompt.is_empty())
            .map_or_else(
                || {
                    format!(
                        "You are {}. Keep responses concise and conversational.",
                        self.name()
                    )
                },
                str::to_string,
            )
    }

    /// Get the TTS voice
    #[must_use]
    pub fn tts_voice(&self) -> Option<&str> {
        self.voice.as_ref()?.tts.as_ref()?.voice.as_deref()
    }

    /// Get the TTS speech rate
    #[must_use]
    pub fn tts_speed(&self) -> f32 {
        self.voice
            .as_ref()
            .and_then(|v| v.tts.as_ref())
            .map_or_else(default_tts_speed, |tts| tts.speed)
    }
}

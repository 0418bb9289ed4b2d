//! Error types for DevSpeak

use thiserror::Error;

/// Result type alias for DevSpeak operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in DevSpeak
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Persona could not be loaded
    #[error("persona error: {0}")]
    Persona(String),

    /// Audio device or stream error
    #[error("audio error: {0}")]
    Audio(String),

    /// No input device is attached
    #[error("no input device available")]
    NoInputDevice,

    /// The platform refused access to the microphone
    #[error("microphone access denied: {0}")]
    MicrophoneDenied(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Speech capture adapter error (e.g. already started)
    #[error("capture error: {0}")]
    Capture(String),

    /// Completion request failed
    #[error("completion request failed: {0}")]
    Completion(String),

    /// Operation was cancelled before it finished
    #[error("cancelled")]
    Cancelled,

    /// Orchestrator is no longer running
    #[error("orchestrator error: {0}")]
    Orchestrator(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Whether this error only reports a cancellation
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

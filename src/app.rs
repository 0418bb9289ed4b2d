//! Application wiring
//!
//! Builds the native adapters from [`Config`], starts the orchestrator and
//! hands the terminal to the console until the user quits or presses Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use crate::completion::{ChatCompletionClient, ChatCompletionSettings, CompletionClient};
use crate::console::Console;
use crate::orchestrator::{Orchestrator, OrchestratorConfig};
use crate::voice::{
    MicrophoneRecognizer, SilentOutput, SpeakerOutput, SpeechCapture, SpeechOutput, SpeechToText,
    TextToSpeech, Transcriber,
};
use crate::{Config, Result};

/// How long to wait for the orchestrator to release the adapters on exit
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Interactive voice chat session
pub struct App {
    config: Config,
}

impl App {
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run the voice chat until the user quits
    ///
    /// # Errors
    ///
    /// Returns error if an adapter can't be built (usually a missing API key)
    /// or the terminal fails
    pub async fn run(self) -> Result<()> {
        let completion: Arc<dyn CompletionClient> = Arc::new(build_completion(&self.config)?);
        let capture: Arc<dyn SpeechCapture> = Arc::new(build_recognizer(&self.config)?);
        let output = build_output(&self.config)?;

        let orchestrator = Orchestrator::new(
            capture,
            output,
            completion,
            OrchestratorConfig {
                reply_timeout: self.config.llm.reply_timeout,
                speak_replies: self.config.voice.speak_replies,
            },
        );
        let handle = orchestrator.handle();
        let mut orchestrator_task = tokio::spawn(orchestrator.run());

        tracing::info!(
            persona = self.config.persona.name(),
            model = %self.config.llm.model,
            "devspeak ready"
        );

        let console = Console::new(
            handle.clone(),
            self.config.persona.name(),
            self.config.typewriter_delay,
        );

        let result = tokio::select! {
            result = console.run() => result,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                Ok(())
            }
        };

        // Already stopped if the console quit normally
        let _ = handle.shutdown();
        if tokio::time::timeout(SHUTDOWN_GRACE, &mut orchestrator_task)
            .await
            .is_err()
        {
            tracing::warn!("orchestrator did not stop in time");
            orchestrator_task.abort();
        }

        tracing::info!("devspeak stopped");
        result
    }
}

/// Chat completion client for the configured endpoint and persona
///
/// # Errors
///
/// Returns error if no API key is configured
pub fn build_completion(config: &Config) -> Result<ChatCompletionClient> {
    let settings = ChatCompletionSettings {
        base_url: config.llm.base_url.clone(),
        model: config.llm.model.clone(),
        system_prompt: config.persona.system_prompt(),
        max_tokens: config.llm.max_tokens,
        temperature: config.llm.temperature,
        timeout: config.llm.timeout,
    };
    ChatCompletionClient::new(config.llm_api_key().unwrap_or_default().to_string(), settings)
}

/// Microphone recognizer backed by the configured STT provider
///
/// # Errors
///
/// Returns error if the STT provider has no API key
pub fn build_recognizer(config: &Config) -> Result<MicrophoneRecognizer> {
    let stt = SpeechToText::new(
        config.voice.stt_provider,
        config.stt_api_key().unwrap_or_default().to_string(),
        config.voice.stt_model.clone(),
        Some(config.voice.language.clone()),
    )?;
    let transcriber: Arc<dyn Transcriber> = Arc::new(stt);
    Ok(MicrophoneRecognizer::new(transcriber, config.voice.recognizer))
}

/// Text-to-speech for the configured provider and voice
///
/// # Errors
///
/// Returns error if the TTS provider has no API key
pub fn build_tts(config: &Config) -> Result<TextToSpeech> {
    TextToSpeech::new(
        config.voice.tts_provider,
        config.tts_api_key().unwrap_or_default().to_string(),
        config.voice.tts_voice.clone(),
        config.voice.tts_speed,
        config.voice.tts_model.clone(),
    )
}

/// Speaker output, or a silent stand-in when replies aren't spoken
///
/// # Errors
///
/// Returns error if speech is enabled but TTS can't be built
pub fn build_output(config: &Config) -> Result<Arc<dyn SpeechOutput>> {
    if !config.voice.speak_replies {
        tracing::info!("speech output disabled");
        return Ok(Arc::new(SilentOutput));
    }
    Ok(Arc::new(SpeakerOutput::new(build_tts(config)?)))
}

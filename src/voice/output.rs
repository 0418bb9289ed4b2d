//! Speech output adapter
//!
//! One utterance at a time: beginning a new one cancels whatever is playing,
//! and the speaker lock keeps the device from being opened twice.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::playback::{AudioPlayback, decode_mp3};
use super::tts::TextToSpeech;
use crate::{Error, Result};

/// Cancellation token for one utterance
///
/// Raised by whoever wants the utterance stopped; never lowered again.
pub type CancelToken = Arc<AtomicBool>;

/// Cancellable "speak and await completion"
#[async_trait]
pub trait SpeechOutput: Send + Sync {
    /// Speak `text`, resolving when playback ends naturally
    ///
    /// The caller owns `cancel` and may raise it at any time, including
    /// before this future is first polled. Speaking while already speaking
    /// cancels the earlier utterance first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if `cancel`, [`cancel`](Self::cancel) or a
    /// newer utterance interrupted this one, or the synthesis/playback error
    async fn speak(&self, text: &str, cancel: CancelToken) -> Result<()>;

    /// Stop the current utterance; no-op when idle
    fn cancel(&self);

    fn is_speaking(&self) -> bool;
}

/// Tracks the utterance currently allowed to play
#[derive(Debug, Default)]
pub struct UtteranceSlot {
    current: Mutex<Option<CancelToken>>,
}

impl UtteranceSlot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `token` the current utterance, cancelling the previous one
    pub fn begin(&self, token: &CancelToken) {
        if let Ok(mut current) = self.current.lock()
            && let Some(previous) = current.replace(Arc::clone(token))
            && !Arc::ptr_eq(&previous, token)
        {
            previous.store(true, Ordering::SeqCst);
            tracing::debug!("previous utterance superseded");
        }
    }

    /// Release the slot if `token` still owns it
    pub fn finish(&self, token: &CancelToken) {
        if let Ok(mut current) = self.current.lock()
            && current.as_ref().is_some_and(|t| Arc::ptr_eq(t, token))
        {
            *current = None;
        }
    }

    /// Cancel the current utterance, if any
    pub fn cancel(&self) {
        if let Ok(mut current) = self.current.lock()
            && let Some(token) = current.take()
        {
            token.store(true, Ordering::SeqCst);
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.current
            .lock()
            .map(|current| {
                current
                    .as_ref()
                    .is_some_and(|t| !t.load(Ordering::SeqCst))
            })
            .unwrap_or(false)
    }
}

/// Synthesizes with [`TextToSpeech`] and plays through the default output device
pub struct SpeakerOutput {
    tts: Arc<TextToSpeech>,
    slot: UtteranceSlot,
    speaker: Arc<tokio::sync::Mutex<()>>,
}

impl SpeakerOutput {
    #[must_use]
    pub fn new(tts: TextToSpeech) -> Self {
        Self {
            tts: Arc::new(tts),
            slot: UtteranceSlot::new(),
            speaker: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    async fn play_utterance(&self, text: &str, token: &CancelToken) -> Result<()> {
        ensure_live(token)?;
        let audio = self.tts.synthesize(text).await?;
        ensure_live(token)?;

        let samples = decode_mp3(&audio)?;
        tracing::debug!(samples = samples.len(), "speech synthesized");

        let _speaker = self.speaker.lock().await;
        ensure_live(token)?;

        let token = Arc::clone(token);
        tokio::task::spawn_blocking(move || {
            let playback = AudioPlayback::new()?;
            playback.play(samples, &token)
        })
        .await
        .map_err(|e| Error::Audio(format!("playback task failed: {e}")))?
    }
}

#[async_trait]
impl SpeechOutput for SpeakerOutput {
    async fn speak(&self, text: &str, cancel: CancelToken) -> Result<()> {
        self.slot.begin(&cancel);
        let result = self.play_utterance(text, &cancel).await;
        self.slot.finish(&cancel);

        match &result {
            Ok(()) => tracing::debug!("utterance finished"),
            Err(e) if e.is_cancelled() => tracing::debug!("utterance cancelled"),
            Err(e) => tracing::warn!(error = %e, "utterance failed"),
        }
        result
    }

    fn cancel(&self) {
        self.slot.cancel();
    }

    fn is_speaking(&self) -> bool {
        self.slot.is_active()
    }
}

/// Output that never makes a sound, used when replies aren't spoken
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentOutput;

#[async_trait]
impl SpeechOutput for SilentOutput {
    async fn speak(&self, text: &str, cancel: CancelToken) -> Result<()> {
        ensure_live(&cancel)?;
        tracing::debug!(chars = text.len(), "speech output disabled");
        Ok(())
    }

    fn cancel(&self) {}

    fn is_speaking(&self) -> bool {
        false
    }
}

fn ensure_live(token: &CancelToken) -> Result<()> {
    if token.load(Ordering::SeqCst) {
        Err(Error::Cancelled)
    } else {
        Ok(())
    }
}

//! Utterance endpointing
//!
//! Decides when a spoken utterance starts and ends from raw audio energy:
//! loud enough starts it, a long enough run of silence after enough speech ends it.

use std::time::Duration;

use super::capture::{SAMPLE_RATE, rms};

/// Thresholds for [`UtteranceDetector`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EndpointSettings {
    /// RMS energy above which a block counts as speech
    pub energy_threshold: f32,

    /// Speech shorter than this is never considered an utterance
    pub min_speech: Duration,

    /// Trailing silence that ends an utterance
    pub silence: Duration,

    /// Hard cap on utterance length
    pub max_utterance: Duration,
}

impl Default for EndpointSettings {
    fn default() -> Self {
        Self {
            energy_threshold: 0.03,
            min_speech: Duration::from_millis(300),
            silence: Duration::from_millis(800),
            max_utterance: Duration::from_secs(30),
        }
    }
}

/// Where the detector is within an utterance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointState {
    /// No speech yet
    Waiting,
    /// Speech started, accumulating
    Speaking,
    /// Enough speech followed by silence (or the length cap)
    Complete,
}

/// Tracks one utterance worth of audio
pub struct UtteranceDetector {
    settings: EndpointSettings,
    state: EndpointState,
    speech_buffer: Vec<f32>,
    silence_counter: usize,
    samples_seen: usize,
}

impl UtteranceDetector {
    #[must_use]
    pub fn new(settings: EndpointSettings) -> Self {
        Self {
            settings,
            state: EndpointState::Waiting,
            speech_buffer: Vec::new(),
            silence_counter: 0,
            samples_seen: 0,
        }
    }

    /// Feed a block of samples and return the resulting state
    pub fn push(&mut self, samples: &[f32]) -> EndpointState {
        self.samples_seen += samples.len();
        let energy = rms(samples);
        let is_speech = energy > self.settings.energy_threshold;

        match self.state {
            EndpointState::Waiting => {
                if is_speech {
                    self.state = EndpointState::Speaking;
                    self.speech_buffer.extend_from_slice(samples);
                    self.silence_counter = 0;
                    tracing::trace!(energy, "speech started");
                }
            }
            EndpointState::Speaking => {
                self.speech_buffer.extend_from_slice(samples);

                if is_speech {
                    self.silence_counter = 0;
                } else {
                    self.silence_counter += samples.len();
                }

                tracing::trace!(
                    buffer_len = self.speech_buffer.len(),
                    silence = self.silence_counter,
                    is_speech,
                    energy,
                    "speaking"
                );

                let enough_speech = self.speech_buffer.len() > samples_for(self.settings.min_speech);
                if enough_speech && self.silence_counter > samples_for(self.settings.silence) {
                    tracing::debug!(samples = self.speech_buffer.len(), "utterance complete");
                    self.state = EndpointState::Complete;
                } else if self.speech_buffer.len() >= samples_for(self.settings.max_utterance) {
                    tracing::debug!(samples = self.speech_buffer.len(), "utterance length cap reached");
                    self.state = EndpointState::Complete;
                }
            }
            EndpointState::Complete => {}
        }

        self.state
    }

    #[must_use]
    pub const fn state(&self) -> EndpointState {
        self.state
    }

    /// Whether any speech has been heard
    #[must_use]
    pub fn heard_speech(&self) -> bool {
        self.state != EndpointState::Waiting
    }

    /// Total audio fed so far, speech or not
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn elapsed(&self) -> Duration {
        Duration::from_secs_f64(self.samples_seen as f64 / f64::from(SAMPLE_RATE))
    }

    #[must_use]
    pub fn speech_buffer(&self) -> &[f32] {
        &self.speech_buffer
    }

    /// Take the speech buffer, clearing it
    pub fn take_speech_buffer(&mut self) -> Vec<f32> {
        std::mem::take(&mut self.speech_buffer)
    }

    /// Return to [`EndpointState::Waiting`] and forget all audio
    pub fn reset(&mut self) {
        self.state = EndpointState::Waiting;
        self.speech_buffer.clear();
        self.silence_counter = 0;
        self.samples_seen = 0;
    }
}

/// Sample count for a duration at [`SAMPLE_RATE`]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub(crate) fn samples_for(duration: Duration) -> usize {
    (duration.as_secs_f64() * f64::from(SAMPLE_RATE)) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_samples_for() {
        assert_eq!(samples_for(Duration::from_millis(500)), 8000);
        assert_eq!(samples_for(Duration::from_secs(1)), 16000);
    }

    #[test]
    fn test_silence_keeps_waiting() {
        let mut detector = UtteranceDetector::new(EndpointSettings::default());
        assert_eq!(detector.push(&[0.0; 1600]), EndpointState::Waiting);
        assert!(!detector.heard_speech());
        assert!(detector.speech_buffer().is_empty());
    }

    #[test]
    fn test_reset_forgets_audio() {
        let mut detector = UtteranceDetector::new(EndpointSettings::default());
        detector.push(&[0.5; 1600]);
        assert!(detector.heard_speech());
        detector.reset();
        assert_eq!(detector.state(), EndpointState::Waiting);
        assert_eq!(detector.elapsed(), Duration::ZERO);
    }
}

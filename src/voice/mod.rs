//! Voice processing module
//!
//! Handles microphone capture with utterance endpointing, transcription,
//! speech synthesis and playback.

mod capture;
mod endpoint;
mod output;
mod playback;
mod recognizer;
mod stt;
mod tts;

pub use capture::{AudioCapture, SAMPLE_RATE, rms, samples_to_wav};
pub use endpoint::{EndpointSettings, EndpointState, UtteranceDetector};
pub use output::{CancelToken, SilentOutput, SpeakerOutput, SpeechOutput, UtteranceSlot};
pub use playback::{AudioPlayback, PLAYBACK_SAMPLE_RATE, decode_mp3, playback_duration};
pub use recognizer::{
    CaptureErrorKind, CaptureEvent, CaptureSink, MicrophoneRecognizer, RecognizerSettings,
    SpeechCapture,
};
pub use stt::{SpeechToText, SttProvider, Transcriber};
pub use tts::{TextToSpeech, TtsProvider};

//! Speech capture adapter
//!
//! [`SpeechCapture`] is the contract the orchestrator drives: start a session,
//! stop it, and receive [`CaptureEvent`]s through a [`CaptureSink`]. Every
//! session ends with exactly one [`CaptureEvent::Ended`].
//!
//! [`MicrophoneRecognizer`] implements it natively: audio is pulled from the
//! default input device on a dedicated thread, endpointed by energy, and sent
//! to a [`Transcriber`].

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use super::capture::{AudioCapture, SAMPLE_RATE, samples_to_wav};
use super::endpoint::{EndpointSettings, EndpointState, UtteranceDetector, samples_for};
use super::stt::Transcriber;
use crate::{Error, Result};

/// How often the capture thread forwards audio (100ms blocks)
const CHUNK_INTERVAL: Duration = Duration::from_millis(100);

/// Why a capture session failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureErrorKind {
    PermissionDenied,
    NoSpeech,
    NoMicrophone,
    Network,
    Other(String),
}

impl CaptureErrorKind {
    /// Message suitable for showing to the user
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::PermissionDenied => {
                "Microphone access denied. Please allow microphone permissions and try again."
                    .to_string()
            }
            Self::NoSpeech => "No speech detected. Please try speaking again.".to_string(),
            Self::NoMicrophone => {
                "No microphone found. Please check your microphone connection.".to_string()
            }
            Self::Network => {
                "Network error occurred. Please check your internet connection.".to_string()
            }
            Self::Other(detail) => format!("Speech recognition error: {detail}"),
        }
    }
}

impl From<&Error> for CaptureErrorKind {
    fn from(err: &Error) -> Self {
        match err {
            Error::NoInputDevice => Self::NoMicrophone,
            Error::MicrophoneDenied(_) => Self::PermissionDenied,
            Error::Http(_) => Self::Network,
            Error::Stt(detail) | Error::Audio(detail) => Self::Other(detail.clone()),
            other => Self::Other(other.to_string()),
        }
    }
}

/// Events a capture session reports
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    /// Audio capture began
    Started,
    /// Provisional transcript; replaces any earlier interim text
    Interim(String),
    /// Completed transcript, at most once per session
    Final(String),
    /// Session failed
    Error(CaptureErrorKind),
    /// Session is over and the adapter is inactive again
    Ended,
}

/// Where a capture session delivers its events
#[derive(Clone)]
pub struct CaptureSink {
    deliver: Arc<dyn Fn(CaptureEvent) + Send + Sync>,
}

impl CaptureSink {
    pub fn new(deliver: impl Fn(CaptureEvent) + Send + Sync + 'static) -> Self {
        Self {
            deliver: Arc::new(deliver),
        }
    }

    pub fn emit(&self, event: CaptureEvent) {
        (self.deliver)(event);
    }
}

impl fmt::Debug for CaptureSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureSink").finish_non_exhaustive()
    }
}

/// Continuous speech recognition with interim results
pub trait SpeechCapture: Send + Sync {
    /// Begin a capture session delivering events to `sink`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Capture`] if a session is already active or can't be
    /// launched
    fn start(&self, sink: CaptureSink) -> Result<()>;

    /// Ask the active session to finish; no-op when inactive
    fn stop(&self);

    /// Whether a session is running
    fn is_active(&self) -> bool;
}

/// Tuning for [`MicrophoneRecognizer`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecognizerSettings {
    /// Utterance endpointing thresholds
    pub endpoint: EndpointSettings,

    /// Give up with [`CaptureErrorKind::NoSpeech`] if nothing is heard this long
    pub no_speech_timeout: Duration,

    /// Emit an interim transcript after this much new speech; `None` disables
    pub interim_interval: Option<Duration>,
}

impl Default for RecognizerSettings {
    fn default() -> Self {
        Self {
            endpoint: EndpointSettings::default(),
            no_speech_timeout: Duration::from_secs(8),
            interim_interval: Some(Duration::from_millis(1500)),
        }
    }
}

/// Messages from the audio thread to the session task
enum AudioMessage {
    Opened,
    Samples(Vec<f32>),
    Failed(Error),
}

/// Stop flag of the running session, cleared when that session ends
type StopSlot = Arc<Mutex<Option<Arc<AtomicBool>>>>;

/// Microphone-backed [`SpeechCapture`]
pub struct MicrophoneRecognizer {
    transcriber: Arc<dyn Transcriber>,
    settings: RecognizerSettings,
    active: Arc<AtomicBool>,
    stop_flag: StopSlot,
}

impl MicrophoneRecognizer {
    #[must_use]
    pub fn new(transcriber: Arc<dyn Transcriber>, settings: RecognizerSettings) -> Self {
        Self {
            transcriber,
            settings,
            active: Arc::new(AtomicBool::new(false)),
            stop_flag: StopSlot::default(),
        }
    }
}

impl SpeechCapture for MicrophoneRecognizer {
    fn start(&self, sink: CaptureSink) -> Result<()> {
        if self.active.swap(true, Ordering::SeqCst) {
            return Err(Error::Capture("recognition already started".to_string()));
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            self.active.store(false, Ordering::SeqCst);
            Error::Capture(format!("no async runtime: {e}"))
        })?;

        let stop = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::unbounded_channel();

        let thread_stop = Arc::clone(&stop);
        std::thread::Builder::new()
            .name("devspeak-capture".to_string())
            .spawn(move || run_audio_thread(&tx, &thread_stop))
            .map_err(|e| {
                self.active.store(false, Ordering::SeqCst);
                Error::Capture(format!("failed to spawn capture thread: {e}"))
            })?;

        if let Ok(mut slot) = self.stop_flag.lock() {
            *slot = Some(Arc::clone(&stop));
        }

        let session = Session {
            transcriber: Arc::clone(&self.transcriber),
            settings: self.settings,
            sink,
            stop,
            stop_slot: Arc::clone(&self.stop_flag),
            active: Arc::clone(&self.active),
        };
        runtime.spawn(session.run(rx));

        tracing::debug!("speech recognition started");
        Ok(())
    }

    fn stop(&self) {
        if !self.active.load(Ordering::SeqCst) {
            return;
        }
        if let Ok(slot) = self.stop_flag.lock()
            && let Some(flag) = slot.as_ref()
        {
            flag.store(true, Ordering::SeqCst);
            tracing::debug!("speech recognition stop requested");
        }
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

/// Owns the input stream until asked to stop
fn run_audio_thread(tx: &mpsc::UnboundedSender<AudioMessage>, stop: &AtomicBool) {
    let mut capture = match AudioCapture::new() {
        Ok(capture) => capture,
        Err(e) => {
            let _ = tx.send(AudioMessage::Failed(e));
            return;
        }
    };

    if let Err(e) = capture.start() {
        let _ = tx.send(AudioMessage::Failed(e));
        return;
    }

    if tx.send(AudioMessage::Opened).is_err() {
        capture.stop();
        return;
    }

    while !stop.load(Ordering::SeqCst) {
        std::thread::sleep(CHUNK_INTERVAL);
        let samples = capture.take_buffer();
        if !samples.is_empty() && tx.send(AudioMessage::Samples(samples)).is_err() {
            break;
        }
    }

    capture.stop();
}

/// One start→ended run of the recognizer
struct Session {
    transcriber: Arc<dyn Transcriber>,
    settings: RecognizerSettings,
    sink: CaptureSink,
    stop: Arc<AtomicBool>,
    stop_slot: StopSlot,
    active: Arc<AtomicBool>,
}

impl Session {
    async fn run(self, mut rx: mpsc::UnboundedReceiver<AudioMessage>) {
        let outcome = self.listen(&mut rx).await;
        self.stop.store(true, Ordering::SeqCst);

        match outcome {
            Ok(Some(text)) => {
                tracing::info!(transcript = %text, "final transcript");
                self.sink.emit(CaptureEvent::Final(text));
            }
            Ok(None) => tracing::debug!("session ended without a transcript"),
            Err(kind) => {
                tracing::warn!(error = ?kind, "speech recognition failed");
                self.sink.emit(CaptureEvent::Error(kind));
            }
        }

        // A newer session may already own the slot
        if let Ok(mut slot) = self.stop_slot.lock()
            && slot.as_ref().is_some_and(|flag| Arc::ptr_eq(flag, &self.stop))
        {
            *slot = None;
        }

        self.active.store(false, Ordering::SeqCst);
        self.sink.emit(CaptureEvent::Ended);
    }

    async fn listen(
        &self,
        rx: &mut mpsc::UnboundedReceiver<AudioMessage>,
    ) -> std::result::Result<Option<String>, CaptureErrorKind> {
        let mut detector = UtteranceDetector::new(self.settings.endpoint);
        let interim_every = self.settings.interim_interval.map(samples_for);
        let mut since_interim = 0usize;

        while let Some(message) = rx.recv().await {
            match message {
                AudioMessage::Opened => self.sink.emit(CaptureEvent::Started),
                AudioMessage::Failed(err) => return Err(CaptureErrorKind::from(&err)),
                AudioMessage::Samples(samples) => match detector.push(&samples) {
                    EndpointState::Waiting => {
                        if detector.elapsed() >= self.settings.no_speech_timeout {
                            return Err(CaptureErrorKind::NoSpeech);
                        }
                    }
                    EndpointState::Speaking => {
                        since_interim += samples.len();
                        if interim_every.is_some_and(|every| since_interim >= every) {
                            since_interim = 0;
                            self.emit_interim(detector.speech_buffer()).await;
                        }
                    }
                    EndpointState::Complete => break,
                },
            }
        }

        if !detector.heard_speech() {
            return Ok(None);
        }

        let speech = detector.take_speech_buffer();
        let text = transcribe(self.transcriber.as_ref(), &speech)
            .await
            .map_err(|e| CaptureErrorKind::from(&e))?;
        Ok((!text.is_empty()).then_some(text))
    }

    async fn emit_interim(&self, speech: &[f32]) {
        match transcribe(self.transcriber.as_ref(), speech).await {
            Ok(text) if !text.is_empty() => self.sink.emit(CaptureEvent::Interim(text)),
            Ok(_) => {}
            Err(e) => tracing::debug!(error = %e, "interim transcription skipped"),
        }
    }
}

async fn transcribe(transcriber: &dyn Transcriber, speech: &[f32]) -> Result<String> {
    let wav = samples_to_wav(speech, SAMPLE_RATE)?;
    let text = transcriber.transcribe(wav).await?;
    Ok(text.trim().to_string())
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;

    use super::*;

    #[test]
    fn test_error_messages() {
        assert!(CaptureErrorKind::PermissionDenied.message().contains("microphone permissions"));
        assert!(CaptureErrorKind::NoMicrophone.message().contains("No microphone found"));
        assert_eq!(
            CaptureErrorKind::Other("aborted".to_string()).message(),
            "Speech recognition error: aborted"
        );
    }

    #[test]
    fn test_error_kind_from_crate_error() {
        assert_eq!(CaptureErrorKind::from(&Error::NoInputDevice), CaptureErrorKind::NoMicrophone);
        assert_eq!(
            CaptureErrorKind::from(&Error::MicrophoneDenied("tcc".to_string())),
            CaptureErrorKind::PermissionDenied
        );
        assert_eq!(
            CaptureErrorKind::from(&Error::Stt("bad audio".to_string())),
            CaptureErrorKind::Other("bad audio".to_string())
        );
    }

    /// Replies with a scripted transcript per call, then empty text
    struct ScriptedTranscriber {
        replies: Mutex<VecDeque<Result<String>>>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Transcriber for ScriptedTranscriber {
        async fn transcribe(&self, wav: Vec<u8>) -> Result<String> {
            assert!(!wav.is_empty());
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(String::new()))
        }
    }

    struct Fixture {
        session: Option<Session>,
        transcriber: Arc<ScriptedTranscriber>,
        /// Each event with the adapter's active flag at delivery
        events: Arc<Mutex<Vec<(CaptureEvent, bool)>>>,
        stop: Arc<AtomicBool>,
        slot: StopSlot,
        active: Arc<AtomicBool>,
    }

    impl Fixture {
        fn new(replies: Vec<Result<String>>, settings: RecognizerSettings) -> Self {
            let transcriber = Arc::new(ScriptedTranscriber {
                replies: Mutex::new(replies.into()),
                calls: AtomicUsize::new(0),
            });
            let active = Arc::new(AtomicBool::new(true));
            let events = Arc::new(Mutex::new(Vec::new()));

            let seen = Arc::clone(&events);
            let flag = Arc::clone(&active);
            let sink = CaptureSink::new(move |event| {
                seen.lock().unwrap().push((event, flag.load(Ordering::SeqCst)));
            });

            let stop = Arc::new(AtomicBool::new(false));
            let slot = StopSlot::new(Mutex::new(Some(Arc::clone(&stop))));

            let session = Session {
                transcriber: Arc::clone(&transcriber) as Arc<dyn Transcriber>,
                settings,
                sink,
                stop: Arc::clone(&stop),
                stop_slot: Arc::clone(&slot),
                active: Arc::clone(&active),
            };

            Self {
                session: Some(session),
                transcriber,
                events,
                stop,
                slot,
                active,
            }
        }

        /// Run the session over `messages`, closing the audio channel after them
        async fn run(mut self, messages: Vec<AudioMessage>) -> Self {
            let (tx, rx) = mpsc::unbounded_channel();
            for message in messages {
                tx.send(message).unwrap();
            }
            drop(tx);

            self.session.take().unwrap().run(rx).await;
            self
        }

        fn events(&self) -> Vec<CaptureEvent> {
            self.events.lock().unwrap().iter().map(|(e, _)| e.clone()).collect()
        }

        fn calls(&self) -> usize {
            self.transcriber.calls.load(Ordering::SeqCst)
        }
    }

    fn quiet_settings() -> RecognizerSettings {
        RecognizerSettings {
            interim_interval: None,
            ..RecognizerSettings::default()
        }
    }

    fn speech(secs: f32) -> AudioMessage {
        AudioMessage::Samples(vec![0.3; (SAMPLE_RATE as f32 * secs) as usize])
    }

    fn silence(secs: f32) -> AudioMessage {
        AudioMessage::Samples(vec![0.0; (SAMPLE_RATE as f32 * secs) as usize])
    }

    #[test]
    fn test_sink_delivers_events() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let collected = Arc::clone(&seen);
        let sink = CaptureSink::new(move |event| collected.lock().unwrap().push(event));

        sink.emit(CaptureEvent::Started);
        sink.clone().emit(CaptureEvent::Ended);

        assert_eq!(
            *seen.lock().unwrap(),
            vec![CaptureEvent::Started, CaptureEvent::Ended]
        );
    }

    #[tokio::test]
    async fn test_pause_after_speech_finalizes() {
        let mut fixture = Fixture::new(vec![Ok(" what is rust ".to_string())], quiet_settings());

        // The pause ends the session while the audio thread is still sending
        let (tx, rx) = mpsc::unbounded_channel();
        for message in [AudioMessage::Opened, speech(0.5), silence(1.0)] {
            tx.send(message).unwrap();
        }
        fixture.session.take().unwrap().run(rx).await;

        assert_eq!(
            *fixture.events.lock().unwrap(),
            vec![
                (CaptureEvent::Started, true),
                (CaptureEvent::Final("what is rust".to_string()), true),
                (CaptureEvent::Ended, false),
            ]
        );
        assert!(fixture.stop.load(Ordering::SeqCst));
        drop(tx);
    }

    #[tokio::test]
    async fn test_stop_mid_speech_transcribes_what_was_heard() {
        let fixture = Fixture::new(vec![Ok("hello".to_string())], quiet_settings())
            .run(vec![AudioMessage::Opened, speech(0.5)])
            .await;

        assert_eq!(
            fixture.events(),
            vec![
                CaptureEvent::Started,
                CaptureEvent::Final("hello".to_string()),
                CaptureEvent::Ended
            ]
        );
        assert_eq!(fixture.calls(), 1);
        assert!(!fixture.active.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_stop_before_speech_ends_quietly() {
        let fixture = Fixture::new(Vec::new(), quiet_settings())
            .run(vec![AudioMessage::Opened, silence(0.5)])
            .await;

        assert_eq!(fixture.events(), vec![CaptureEvent::Started, CaptureEvent::Ended]);
        assert_eq!(fixture.calls(), 0);
    }

    #[tokio::test]
    async fn test_blank_transcript_has_no_final() {
        let fixture = Fixture::new(vec![Ok("   ".to_string())], quiet_settings())
            .run(vec![AudioMessage::Opened, speech(0.5)])
            .await;

        assert_eq!(fixture.events(), vec![CaptureEvent::Started, CaptureEvent::Ended]);
    }

    #[tokio::test]
    async fn test_long_silence_reports_no_speech() {
        let settings = RecognizerSettings {
            no_speech_timeout: Duration::from_secs(1),
            ..quiet_settings()
        };
        let fixture = Fixture::new(Vec::new(), settings)
            .run(vec![AudioMessage::Opened, silence(0.6), silence(0.6), speech(0.5)])
            .await;

        assert_eq!(
            fixture.events(),
            vec![
                CaptureEvent::Started,
                CaptureEvent::Error(CaptureErrorKind::NoSpeech),
                CaptureEvent::Ended
            ]
        );
        assert_eq!(fixture.calls(), 0);
    }

    #[tokio::test]
    async fn test_transcription_failure_reported() {
        let fixture = Fixture::new(vec![Err(Error::Stt("bad audio".to_string()))], quiet_settings())
            .run(vec![AudioMessage::Opened, speech(0.5)])
            .await;

        assert_eq!(
            fixture.events(),
            vec![
                CaptureEvent::Started,
                CaptureEvent::Error(CaptureErrorKind::Other("bad audio".to_string())),
                CaptureEvent::Ended
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_microphone_reported() {
        let fixture = Fixture::new(Vec::new(), quiet_settings())
            .run(vec![AudioMessage::Failed(Error::NoInputDevice)])
            .await;

        assert_eq!(
            fixture.events(),
            vec![
                CaptureEvent::Error(CaptureErrorKind::NoMicrophone),
                CaptureEvent::Ended
            ]
        );
    }

    #[tokio::test]
    async fn test_interim_throttled_by_new_speech() {
        let settings = RecognizerSettings {
            interim_interval: Some(Duration::from_millis(500)),
            ..RecognizerSettings::default()
        };
        let fixture = Fixture::new(
            vec![Ok("what is".to_string()), Ok("what is rust".to_string())],
            settings,
        )
        .run(vec![
            AudioMessage::Opened,
            speech(0.2),
            speech(0.2),
            speech(0.2),
            speech(0.2),
            speech(0.2),
        ])
        .await;

        assert_eq!(
            fixture.events(),
            vec![
                CaptureEvent::Started,
                CaptureEvent::Interim("what is".to_string()),
                CaptureEvent::Final("what is rust".to_string()),
                CaptureEvent::Ended
            ]
        );
        assert_eq!(fixture.calls(), 2);
    }

    #[tokio::test]
    async fn test_failed_interim_skipped() {
        let settings = RecognizerSettings {
            interim_interval: Some(Duration::from_millis(500)),
            ..RecognizerSettings::default()
        };
        let fixture = Fixture::new(
            vec![Err(Error::Stt("timeout".to_string())), Ok("hello".to_string())],
            settings,
        )
        .run(vec![AudioMessage::Opened, speech(0.6)])
        .await;

        assert_eq!(
            fixture.events(),
            vec![
                CaptureEvent::Started,
                CaptureEvent::Final("hello".to_string()),
                CaptureEvent::Ended
            ]
        );
    }

    #[tokio::test]
    async fn test_ended_session_releases_stop_flag() {
        let fixture = Fixture::new(Vec::new(), quiet_settings())
            .run(vec![AudioMessage::Opened])
            .await;

        assert!(fixture.slot.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ended_session_keeps_newer_stop_flag() {
        let fixture = Fixture::new(Vec::new(), quiet_settings());
        let newer = Arc::new(AtomicBool::new(false));
        *fixture.slot.lock().unwrap() = Some(Arc::clone(&newer));

        let fixture = fixture.run(vec![AudioMessage::Opened]).await;

        let slot = fixture.slot.lock().unwrap();
        assert!(slot.as_ref().is_some_and(|flag| Arc::ptr_eq(flag, &newer)));
        assert!(!newer.load(Ordering::SeqCst));
    }

    #[test]
    fn test_stop_when_idle_leaves_stale_flag_alone() {
        let transcriber = Arc::new(ScriptedTranscriber {
            replies: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
        });
        let recognizer = MicrophoneRecognizer::new(transcriber, quiet_settings());
        let stale = Arc::new(AtomicBool::new(false));
        *recognizer.stop_flag.lock().unwrap() = Some(Arc::clone(&stale));

        recognizer.stop();

        assert!(!recognizer.is_active());
        assert!(!stale.load(Ordering::SeqCst));
    }
}

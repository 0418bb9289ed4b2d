//! Conversation orchestrator
//!
//! Owns the turn-taking state machine and the transcript. Everything that can
//! change state (user actions, capture events, completion results, speech
//! completions) arrives through one inbox and is applied one event at a time.
//!
//! ```text
//!            start-capture              final (non-empty)
//!   Idle ───────────────────▶ Capturing ──────────────────▶ AwaitingReply
//!    ▲                            │                              │
//!    │   error / ended / empty    │                              │
//!    ├────────────────────────────┘                              │
//!    │             reply (speech starts) / completion failure    │
//!    └───────────────────────────────────────────────────────────┘
//! ```
//!
//! Speaking is tracked separately; a reply being spoken never blocks a new
//! capture.

mod handle;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::sync::{mpsc, watch};

pub use handle::OrchestratorHandle;

use crate::completion::CompletionClient;
use crate::conversation::{Conversation, Turn};
use crate::voice::{CancelToken, CaptureEvent, CaptureSink, SpeechCapture, SpeechOutput};
use crate::{Error, Result};

/// Shown when the capture adapter refuses to start
pub const START_FAILED_MESSAGE: &str = "Failed to start voice recognition. Please try again.";

/// Shown when the completion request fails
pub const REPLY_FAILED_MESSAGE: &str =
    "Failed to get response. Please check your API key and try again.";

/// Where the conversation is in the turn-taking cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Capturing,
    AwaitingReply,
}

/// User-initiated commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    StartCapture,
    StopCapture,
    Clear,
    StopSpeaking,
    Shutdown,
}

/// Inbox entries
#[derive(Debug)]
pub enum Event {
    Action(Action),
    /// Capture adapter event, tagged with the session that produced it
    Capture { session: u64, event: CaptureEvent },
    /// Completion outcome, tagged with the generation it was requested in
    Reply { generation: u64, result: Result<String> },
    /// Speech output settled
    SpeechFinished { utterance: u64, result: Result<()> },
}

/// Immutable view handed to presentation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub phase: Phase,
    pub turns: Vec<Turn>,
    pub interim: String,
    pub error: Option<String>,
    pub speaking: bool,
    pub generation: u64,
}

/// Orchestrator tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Treat a completion that takes longer than this as failed
    pub reply_timeout: Option<Duration>,

    /// Speak assistant replies aloud
    pub speak_replies: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            reply_timeout: None,
            speak_replies: true,
        }
    }
}

/// Turn-taking state machine
pub struct Orchestrator {
    capture: Arc<dyn SpeechCapture>,
    output: Arc<dyn SpeechOutput>,
    completion: Arc<dyn CompletionClient>,
    config: OrchestratorConfig,

    tx: mpsc::UnboundedSender<Event>,
    rx: mpsc::UnboundedReceiver<Event>,
    snapshots: watch::Sender<Snapshot>,

    phase: Phase,
    conversation: Conversation,
    interim: String,
    error: Option<String>,
    speaking: bool,
    speech_cancel: Option<CancelToken>,
    generation: u64,
    session: u64,
    session_finalized: bool,
    utterance: u64,
    shutdown: bool,
}

impl Orchestrator {
    #[must_use]
    pub fn new(
        capture: Arc<dyn SpeechCapture>,
        output: Arc<dyn SpeechOutput>,
        completion: Arc<dyn CompletionClient>,
        config: OrchestratorConfig,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (snapshots, _) = watch::channel(Snapshot::default());

        Self {
            capture,
            output,
            completion,
            config,
            tx,
            rx,
            snapshots,
            phase: Phase::Idle,
            conversation: Conversation::new(),
            interim: String::new(),
            error: None,
            speaking: false,
            speech_cancel: None,
            generation: 0,
            session: 0,
            session_finalized: false,
            utterance: 0,
            shutdown: false,
        }
    }

    #[must_use]
    pub fn handle(&self) -> OrchestratorHandle {
        OrchestratorHandle::new(self.tx.clone(), self.snapshots.subscribe())
    }

    /// Apply a user action immediately
    pub fn dispatch(&mut self, action: Action) {
        self.handle_event(Event::Action(action));
    }

    /// Apply one event and publish the resulting snapshot
    pub fn handle_event(&mut self, event: Event) {
        match event {
            Event::Action(action) => self.on_action(action),
            Event::Capture { session, event } => self.on_capture(session, event),
            Event::Reply { generation, result } => self.on_reply(generation, result),
            Event::SpeechFinished { utterance, result } => {
                self.on_speech_finished(utterance, result);
            }
        }
        self.publish();
    }

    /// Wait for the next inbox event and apply it
    ///
    /// Returns `false` once shutdown has been requested.
    pub async fn next_event(&mut self) -> bool {
        if self.shutdown {
            return false;
        }
        match self.rx.recv().await {
            Some(event) => {
                self.handle_event(event);
                !self.shutdown
            }
            None => false,
        }
    }

    /// Apply every event already waiting in the inbox
    pub fn drain(&mut self) {
        while !self.shutdown
            && let Ok(event) = self.rx.try_recv()
        {
            self.handle_event(event);
        }
    }

    /// Process events until shutdown, then release the adapters
    pub async fn run(mut self) {
        tracing::debug!("orchestrator started");
        while self.next_event().await {}

        if self.capture.is_active() {
            self.capture.stop();
        }
        self.cancel_speech();
        self.publish();
        tracing::debug!("orchestrator stopped");
    }

    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub const fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    #[must_use]
    pub fn interim(&self) -> &str {
        &self.interim
    }

    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    #[must_use]
    pub const fn is_speaking(&self) -> bool {
        self.speaking
    }

    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            phase: self.phase,
            turns: self.conversation.turns().to_vec(),
            interim: self.interim.clone(),
            error: self.error.clone(),
            speaking: self.speaking,
            generation: self.generation,
        }
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.snapshot());
    }

    fn on_action(&mut self, action: Action) {
        tracing::debug!(?action, phase = ?self.phase, "action");
        match action {
            Action::StartCapture => self.start_capture(),
            Action::StopCapture => {
                if self.phase == Phase::Capturing {
                    self.capture.stop();
                }
            }
            Action::Clear => self.clear(),
            Action::StopSpeaking => {
                if self.speaking {
                    self.cancel_speech();
                }
            }
            Action::Shutdown => self.shutdown = true,
        }
    }

    fn start_capture(&mut self) {
        if self.phase != Phase::Idle {
            tracing::debug!(phase = ?self.phase, "start-capture ignored");
            return;
        }

        self.interim.clear();
        self.error = None;
        self.session += 1;
        self.session_finalized = false;

        let session = self.session;
        let tx = self.tx.clone();
        let sink = CaptureSink::new(move |event| {
            let _ = tx.send(Event::Capture { session, event });
        });

        match self.capture.start(sink) {
            Ok(()) => {
                tracing::info!(session, "capture started");
                self.phase = Phase::Capturing;
            }
            Err(e) => {
                tracing::warn!(error = %e, "capture failed to start");
                self.error = Some(START_FAILED_MESSAGE.to_string());
            }
        }
    }

    fn clear(&mut self) {
        tracing::info!(turns = self.conversation.len(), "clearing conversation");

        if self.phase == Phase::Capturing || self.capture.is_active() {
            self.capture.stop();
        }
        // Late events from the stopped session and in-flight replies are now stale
        self.session += 1;
        self.generation += 1;

        self.cancel_speech();

        self.conversation.clear();
        self.interim.clear();
        self.error = None;
        self.phase = Phase::Idle;
    }

    fn on_capture(&mut self, session: u64, event: CaptureEvent) {
        if session != self.session {
            tracing::debug!(session, current = self.session, ?event, "stale capture event");
            return;
        }

        match event {
            CaptureEvent::Started => tracing::debug!(session, "capture audio started"),
            CaptureEvent::Interim(text) => {
                if self.phase == Phase::Capturing {
                    self.interim = text;
                }
            }
            CaptureEvent::Final(text) => self.on_final(&text),
            CaptureEvent::Error(kind) => {
                tracing::warn!(session, error = ?kind, "capture error");
                self.error = Some(kind.message());
                if self.phase == Phase::Capturing {
                    self.interim.clear();
                    self.phase = Phase::Idle;
                }
            }
            CaptureEvent::Ended => {
                tracing::debug!(session, "capture ended");
                if self.phase == Phase::Capturing {
                    self.phase = Phase::Idle;
                }
            }
        }
    }

    fn on_final(&mut self, text: &str) {
        if self.phase != Phase::Capturing || self.session_finalized {
            tracing::debug!("duplicate final transcript ignored");
            return;
        }
        self.session_finalized = true;
        self.interim.clear();

        let text = text.trim();
        if text.is_empty() {
            tracing::debug!("empty final transcript discarded");
            self.phase = Phase::Idle;
            return;
        }

        let history = self.conversation.turns().to_vec();
        self.conversation.push(Turn::user(text));
        self.phase = Phase::AwaitingReply;
        self.request_reply(text.to_string(), history);
    }

    fn request_reply(&self, text: String, history: Vec<Turn>) {
        let generation = self.generation;
        let completion = Arc::clone(&self.completion);
        let timeout = self.config.reply_timeout;
        let tx = self.tx.clone();

        tracing::info!(generation, history = history.len(), "requesting reply");

        tokio::spawn(async move {
            let request = completion.complete(&text, &history);
            let result = match timeout {
                Some(limit) => tokio::time::timeout(limit, request)
                    .await
                    .unwrap_or_else(|_| Err(Error::Completion("request timed out".to_string()))),
                None => request.await,
            };
            let _ = tx.send(Event::Reply { generation, result });
        });
    }

    fn on_reply(&mut self, generation: u64, result: Result<String>) {
        if generation != self.generation || self.phase != Phase::AwaitingReply {
            tracing::debug!(generation, current = self.generation, "stale reply discarded");
            return;
        }
        self.phase = Phase::Idle;

        match result {
            Ok(reply) => {
                self.conversation.push(Turn::assistant(reply.as_str()));
                self.speak(reply);
            }
            Err(e) => {
                tracing::error!(error = %e, "reply failed");
                self.error = Some(REPLY_FAILED_MESSAGE.to_string());
            }
        }
    }

    fn speak(&mut self, text: String) {
        if !self.config.speak_replies {
            return;
        }

        // The token exists before the task runs, so a clear that lands first still stops it
        if let Some(previous) = self.speech_cancel.take() {
            previous.store(true, Ordering::SeqCst);
        }
        let cancel = CancelToken::default();
        self.speech_cancel = Some(Arc::clone(&cancel));

        self.utterance += 1;
        self.speaking = true;

        let utterance = self.utterance;
        let output = Arc::clone(&self.output);
        let tx = self.tx.clone();

        tokio::spawn(async move {
            let result = if cancel.load(Ordering::SeqCst) {
                Err(Error::Cancelled)
            } else {
                output.speak(&text, cancel).await
            };
            let _ = tx.send(Event::SpeechFinished { utterance, result });
        });
    }

    /// Stop the current utterance, whether or not its task has started
    fn cancel_speech(&mut self) {
        if let Some(cancel) = self.speech_cancel.take() {
            cancel.store(true, Ordering::SeqCst);
        }
        self.output.cancel();
        self.speaking = false;
    }

    fn on_speech_finished(&mut self, utterance: u64, result: Result<()>) {
        if utterance == self.utterance {
            self.speaking = false;
            self.speech_cancel = None;
        }

        match result {
            Ok(()) => tracing::debug!(utterance, "speech finished"),
            Err(e) if e.is_cancelled() => tracing::debug!(utterance, "speech cancelled"),
            Err(e) => {
                tracing::warn!(utterance, error = %e, "speech failed");
                self.error = Some(format!("Speech playback failed: {e}"));
            }
        }
    }
}

//! Shared test utilities: scripted stand-ins for the three adapters

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use devspeak::completion::CompletionClient;
use devspeak::voice::{CancelToken, CaptureEvent, CaptureSink, SpeechCapture, SpeechOutput, UtteranceSlot};
use devspeak::{Error, Orchestrator, OrchestratorConfig, Result, Turn};

/// Capture adapter driven by the test
#[derive(Default)]
pub struct FakeCapture {
    sink: Mutex<Option<CaptureSink>>,
    active: AtomicBool,
    refuse: AtomicBool,
    starts: AtomicUsize,
    stops: AtomicUsize,
}

impl FakeCapture {
    /// A capture adapter whose `start` always fails
    pub fn refusing() -> Self {
        let capture = Self::default();
        capture.refuse.store(true, Ordering::SeqCst);
        capture
    }

    /// Deliver an event through the current session's sink
    pub fn emit(&self, event: CaptureEvent) {
        if event == CaptureEvent::Ended {
            self.active.store(false, Ordering::SeqCst);
        }
        let sink = self.sink().expect("capture was never started");
        sink.emit(event);
    }

    /// Sink handed over by the most recent `start`
    pub fn sink(&self) -> Option<CaptureSink> {
        self.sink.lock().unwrap().clone()
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl SpeechCapture for FakeCapture {
    fn start(&self, sink: CaptureSink) -> Result<()> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(Error::Capture("microphone busy".to_string()));
        }
        if self.active.swap(true, Ordering::SeqCst) {
            return Err(Error::Capture("recognition already started".to_string()));
        }
        *self.sink.lock().unwrap() = Some(sink);
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

/// Completion client answering from a script
pub struct ScriptedCompletion {
    replies: Mutex<VecDeque<Result<String>>>,
    calls: Mutex<Vec<(String, Vec<Turn>)>>,
    gate: Option<Arc<Notify>>,
}

impl ScriptedCompletion {
    pub fn new(replies: Vec<Result<String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    /// Replies are held until the returned `Notify` is signalled once per reply
    pub fn gated(replies: Vec<Result<String>>) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        let completion = Self {
            gate: Some(Arc::clone(&gate)),
            ..Self::new(replies)
        };
        (completion, gate)
    }

    /// Every `(text, history)` pair requested so far
    pub fn calls(&self) -> Vec<(String, Vec<Turn>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionClient for ScriptedCompletion {
    async fn complete(&self, text: &str, history: &[Turn]) -> Result<String> {
        self.calls
            .lock()
            .unwrap()
            .push((text.to_string(), history.to_vec()));

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::Completion("no scripted reply".to_string())))
    }
}

/// How [`FakeOutput`] settles each utterance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Finish immediately
    Instant,
    /// Keep "playing" until cancelled
    HoldUntilCancelled,
    /// Fail every utterance
    Failing,
}

/// Speech output that records what it was asked to say
pub struct FakeOutput {
    mode: OutputMode,
    slot: UtteranceSlot,
    spoken: Mutex<Vec<String>>,
    tokens: Mutex<Vec<CancelToken>>,
    cancels: AtomicUsize,
}

impl FakeOutput {
    pub fn new(mode: OutputMode) -> Self {
        Self {
            mode,
            slot: UtteranceSlot::new(),
            spoken: Mutex::new(Vec::new()),
            tokens: Mutex::new(Vec::new()),
            cancels: AtomicUsize::new(0),
        }
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }

    /// Utterances begun and not cancelled
    pub fn live_utterances(&self) -> usize {
        self.tokens
            .lock()
            .unwrap()
            .iter()
            .filter(|t| !t.load(Ordering::SeqCst))
            .count()
    }

    pub fn cancels(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechOutput for FakeOutput {
    async fn speak(&self, text: &str, token: CancelToken) -> Result<()> {
        if token.load(Ordering::SeqCst) {
            return Err(Error::Cancelled);
        }
        self.slot.begin(&token);
        self.spoken.lock().unwrap().push(text.to_string());
        self.tokens.lock().unwrap().push(Arc::clone(&token));

        let result = match self.mode {
            OutputMode::Instant => Ok(()),
            OutputMode::Failing => Err(Error::Tts("voice not found".to_string())),
            OutputMode::HoldUntilCancelled => {
                while !token.load(Ordering::SeqCst) {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
                Err(Error::Cancelled)
            }
        };

        self.slot.finish(&token);
        result
    }

    fn cancel(&self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        self.slot.cancel();
    }

    fn is_speaking(&self) -> bool {
        self.slot.is_active()
    }
}

/// An orchestrator wired to fakes the test can reach
pub struct Harness {
    pub orchestrator: Orchestrator,
    pub capture: Arc<FakeCapture>,
    pub completion: Arc<ScriptedCompletion>,
    pub output: Arc<FakeOutput>,
}

impl Harness {
    pub fn new(completion: ScriptedCompletion, mode: OutputMode) -> Self {
        Self::with(FakeCapture::default(), completion, mode, OrchestratorConfig::default())
    }

    pub fn with(
        capture: FakeCapture,
        completion: ScriptedCompletion,
        mode: OutputMode,
        config: OrchestratorConfig,
    ) -> Self {
        let capture = Arc::new(capture);
        let completion = Arc::new(completion);
        let output = Arc::new(FakeOutput::new(mode));

        let orchestrator = Orchestrator::new(
            Arc::clone(&capture) as Arc<dyn SpeechCapture>,
            Arc::clone(&output) as Arc<dyn SpeechOutput>,
            Arc::clone(&completion) as Arc<dyn CompletionClient>,
            config,
        );

        Self {
            orchestrator,
            capture,
            completion,
            output,
        }
    }

    /// Emit capture events and apply them
    pub fn capture_events(&mut self, events: impl IntoIterator<Item = CaptureEvent>) {
        for event in events {
            self.capture.emit(event);
        }
        self.orchestrator.drain();
    }

    /// Wait for and apply one inbox event, failing the test if none arrives
    pub async fn next(&mut self) {
        let processed = tokio::time::timeout(Duration::from_secs(2), self.orchestrator.next_event())
            .await
            .expect("no event arrived");
        assert!(processed, "orchestrator shut down");
    }

    /// Let spawned speech tasks run until `count` utterances have begun
    pub async fn until_spoken(&self, count: usize) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while self.output.spoken().len() < count {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("speech never started");
    }
}

/// Shorthand for a successful scripted reply
pub fn reply(text: &str) -> Result<String> {
    Ok(text.to_string())
}

//! DevSpeak - talk to an AI persona with your voice
//!
//! This library provides the pieces of a voice conversation loop:
//! - Speech capture with utterance endpointing and transcription
//! - Chat completions against an OpenAI-compatible endpoint
//! - Speech synthesis and cancellable playback
//! - The turn-taking orchestrator that ties them together
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 Console (terminal)                   │
//! │      keyboard actions  ▲  snapshots (watch)          │
//! └──────────────┬─────────┴────────────────────────────┘
//!                │
//! ┌──────────────▼──────────────────────────────────────┐
//! │                   Orchestrator                       │
//! │   Idle → Capturing → AwaitingReply → Idle (+speaking)│
//! └──────┬────────────────────┬───────────────────┬─────┘
//!        │                    │                   │
//! ┌──────▼──────┐   ┌─────────▼────────┐   ┌──────▼──────┐
//! │  Capture    │   │   Completion     │   │   Output    │
//! │ mic + STT   │   │ chat/completions │   │ TTS + audio │
//! └─────────────┘   └──────────────────┘   └─────────────┘
//! ```

pub mod app;
pub mod completion;
pub mod config;
pub mod console;
pub mod conversation;
pub mod error;
pub mod orchestrator;
pub mod persona;
pub mod voice;

pub use app::App;
pub use completion::{ChatCompletionClient, CompletionClient};
pub use config::Config;
pub use conversation::{Conversation, Role, Turn, TurnId};
pub use error::{Error, Result};
pub use orchestrator::{
    Action, Event, Orchestrator, OrchestratorConfig, OrchestratorHandle, Phase, Snapshot,
};
pub use persona::Persona;

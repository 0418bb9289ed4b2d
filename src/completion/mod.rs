//! Language-model completion
//!
//! The orchestrator only sees [`CompletionClient`]: new user text plus the turns
//! that came before it in, reply text out. Any failure is a single
//! [`Error::Completion`](crate::Error::Completion); callers don't retry.

mod openai;

pub use openai::{ChatCompletionClient, ChatCompletionSettings};

use async_trait::async_trait;

use crate::Result;
use crate::conversation::Turn;

/// Sends one conversation turn to a remote model
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Request a reply to `text`, given the earlier turns of the conversation
    ///
    /// # Errors
    ///
    /// Returns [`Error::Completion`](crate::Error::Completion) on any transport or
    /// provider failure
    async fn complete(&self, text: &str, history: &[Turn]) -> Result<String>;
}

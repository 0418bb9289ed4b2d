//! OpenAI-compatible chat completion client

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::CompletionClient;
use crate::conversation::Turn;
use crate::{Error, Result};

/// Connection and sampling settings for [`ChatCompletionClient`]
#[derive(Debug, Clone)]
pub struct ChatCompletionSettings {
    /// API root, e.g. `https://api.openai.com/v1`
    pub base_url: url::Url,

    /// Model identifier
    pub model: String,

    /// System prompt sent ahead of the conversation
    pub system_prompt: String,

    /// Maximum tokens in the reply
    pub max_tokens: u32,

    /// Sampling temperature
    pub temperature: Option<f32>,

    /// HTTP request timeout
    pub timeout: Duration,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Talks to `POST {base_url}/chat/completions`
pub struct ChatCompletionClient {
    client: reqwest::Client,
    api_key: SecretString,
    endpoint: url::Url,
    settings: ChatCompletionSettings,
}

impl ChatCompletionClient {
    /// Create a new client
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing or the HTTP client can't be built
    pub fn new(api_key: String, settings: ChatCompletionSettings) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(
                "API key required for chat completions".to_string(),
            ));
        }

        let endpoint = chat_endpoint(&settings.base_url)?;
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()?;

        tracing::debug!(endpoint = %endpoint, model = %settings.model, "completion client initialized");

        Ok(Self {
            client,
            api_key: SecretString::from(api_key),
            endpoint,
            settings,
        })
    }

    /// Model this client requests
    #[must_use]
    pub fn model(&self) -> &str {
        &self.settings.model
    }

    async fn send(&self, text: &str, history: &[Turn]) -> Result<String> {
        let request = ChatRequest {
            model: &self.settings.model,
            messages: build_messages(&self.settings.system_prompt, history, text),
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "chat completion API error");
            return Err(Error::Completion(format!("API error {status}")));
        }

        let parsed: ChatResponse = response.json().await?;
        extract_reply(parsed)
    }
}

#[async_trait]
impl CompletionClient for ChatCompletionClient {
    async fn complete(&self, text: &str, history: &[Turn]) -> Result<String> {
        tracing::debug!(history = history.len(), "requesting completion");

        match self.send(text, history).await {
            Ok(reply) => {
                tracing::info!(reply_len = reply.len(), "completion received");
                Ok(reply)
            }
            Err(Error::Completion(msg)) => Err(Error::Completion(msg)),
            Err(e) => {
                tracing::error!(error = %e, "completion request failed");
                Err(Error::Completion(e.to_string()))
            }
        }
    }
}

/// Resolve the chat completions endpoint under `base`
fn chat_endpoint(base: &url::Url) -> Result<url::Url> {
    let mut root = base.clone();
    if !root.path().ends_with('/') {
        let path = format!("{}/", root.path());
        root.set_path(&path);
    }
    root.join("chat/completions")
        .map_err(|e| Error::Config(format!("invalid completion base URL: {e}")))
}

/// System prompt, then prior turns in order, then the new user text
fn build_messages<'a>(system_prompt: &'a str, history: &'a [Turn], text: &'a str) -> Vec<ChatMessage<'a>> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    if !system_prompt.is_empty() {
        messages.push(ChatMessage {
            role: "system",
            content: system_prompt,
        });
    }
    messages.extend(history.iter().map(|turn| ChatMessage {
        role: turn.role().as_str(),
        content: turn.text(),
    }));
    messages.push(ChatMessage {
        role: "user",
        content: text,
    });
    messages
}

fn extract_reply(response: ChatResponse) -> Result<String> {
    let content = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| Error::Completion("no completion choices returned".to_string()))?
        .message
        .content
        .unwrap_or_default();

    let reply = content.trim();
    if reply.is_empty() {
        return Err(Error::Completion("empty reply".to_string()));
    }
    Ok(reply.to_string())
}

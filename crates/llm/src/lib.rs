pub mod provider;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

/// Chat models exposed to clients. Serialized names are the wire ids sent to
/// the provider.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, TS)]
pub enum ChatModel {
    #[serde(rename = "chat-model")]
    Chat,
    #[serde(rename = "chat-model-reasoning")]
    Reasoning,
    #[serde(rename = "title-model")]
    Title,
}

impl Default for ChatModel {
    fn default() -> Self {
        ChatModel::Chat
    }
}

impl ChatModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatModel::Chat => "chat-model",
            ChatModel::Reasoning => "chat-model-reasoning",
            ChatModel::Title => "title-model",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderMessage {
    pub role: ProviderRole,
    pub content: String,
}

impl ProviderMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ProviderRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ProviderRole::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: ChatModel,
    pub system: Option<String>,
    pub messages: Vec<ProviderMessage>,
    pub temperature: Option<f32>,
}

impl CompletionRequest {
    pub fn new(model: ChatModel, messages: Vec<ProviderMessage>) -> Self {
        Self {
            model,
            system: None,
            messages,
            temperature: None,
        }
    }

    pub fn with_system(mut self, system: Option<String>) -> Self {
        self.system = system;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// How the provider ended a streamed completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    ToolCalls,
    Length,
    Other,
}

#[derive(Debug, Clone)]
pub enum StreamChunk {
    Delta(String),
    Finish(FinishReason),
}

pub type CompletionStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, ProviderError>> + Send>>;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("provider returned {status} for model {model}: {message}")]
    Api {
        status: u16,
        message: String,
        model: String,
    },
    #[error("provider stream error: {0}")]
    Stream(String),
}

/// Seam between the services and the hosted model. The production
/// implementation is [`provider::OpenAiProvider`]; tests substitute stubs.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Single-shot completion, used by the generator, tag and title calls.
    async fn complete(&self, request: CompletionRequest) -> Result<String, ProviderError>;

    /// Incremental token stream for chat turns.
    async fn stream(&self, request: CompletionRequest) -> Result<CompletionStream, ProviderError>;
}

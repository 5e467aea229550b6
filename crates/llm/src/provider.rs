//! OpenAI-compatible chat completions client.
//!
//! Logical [`ChatModel`] ids are mapped to concrete provider model ids by
//! configuration, so clients never pick raw provider models.

use futures::StreamExt;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::{
    ChatModel, CompletionProvider, CompletionRequest, CompletionStream, FinishReason,
    ProviderError, ProviderRole, StreamChunk,
};

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_key: String,
    pub chat_model_id: String,
    pub reasoning_model_id: String,
    pub title_model_id: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            chat_model_id: "gpt-4o-mini".to_string(),
            reasoning_model_id: "o4-mini".to_string(),
            title_model_id: "gpt-4o-mini".to_string(),
        }
    }
}

pub struct OpenAiProvider {
    client: reqwest::Client,
    config: ProviderConfig,
}

impl OpenAiProvider {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn model_id(&self, model: ChatModel) -> &str {
        match model {
            ChatModel::Chat => &self.config.chat_model_id,
            ChatModel::Reasoning => &self.config.reasoning_model_id,
            ChatModel::Title => &self.config.title_model_id,
        }
    }

    fn build_body(&self, request: &CompletionRequest, stream: bool) -> Value {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = &request.system {
            messages.push(json!({ "role": "system", "content": system }));
        }
        for message in &request.messages {
            let role = match message.role {
                ProviderRole::System => "system",
                ProviderRole::User => "user",
                ProviderRole::Assistant => "assistant",
            };
            messages.push(json!({ "role": role, "content": message.content }));
        }

        let mut body = json!({
            "model": self.model_id(request.model),
            "messages": messages,
            "stream": stream,
        });
        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }
        body
    }

    async fn post(
        &self,
        request: &CompletionRequest,
        stream: bool,
    ) -> Result<reqwest::Response, ProviderError> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&self.build_body(request, stream))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
                model: self.model_id(request.model).to_string(),
            });
        }
        Ok(response)
    }
}

#[async_trait::async_trait]
impl CompletionProvider for OpenAiProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<String, ProviderError> {
        let response = self.post(&request, false).await?;
        let body: Value = response.json().await?;
        let content = body
            .get("choices")
            .and_then(|v| v.get(0))
            .and_then(|v| v.get("message"))
            .and_then(|v| v.get("content"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| ProviderError::Stream("missing message content".to_string()))?;
        Ok(content.to_string())
    }

    async fn stream(&self, request: CompletionRequest) -> Result<CompletionStream, ProviderError> {
        let response = self.post(&request, true).await?;
        let (tx, rx) = mpsc::channel::<Result<StreamChunk, ProviderError>>(64);

        tokio::spawn(async move {
            let mut bytes = response.bytes_stream();
            let mut buffer = String::new();

            while let Some(next) = bytes.next().await {
                let chunk = match next {
                    Ok(chunk) => chunk,
                    Err(err) => {
                        let _ = tx.send(Err(ProviderError::Http(err))).await;
                        return;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(newline) = buffer.find('\n') {
                    let line = buffer[..newline].trim_end_matches('\r').to_string();
                    buffer.drain(..=newline);

                    match parse_sse_line(&line) {
                        SseEvent::Ignore => {}
                        SseEvent::Done => return,
                        SseEvent::Chunk(chunk) => {
                            if tx.send(Ok(chunk)).await.is_err() {
                                // receiver dropped, caller stopped consuming
                                return;
                            }
                        }
                    }
                }
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

enum SseEvent {
    Ignore,
    Done,
    Chunk(StreamChunk),
}

fn parse_sse_line(line: &str) -> SseEvent {
    let Some(data) = line.strip_prefix("data:").map(str::trim) else {
        return SseEvent::Ignore;
    };
    if data.is_empty() {
        return SseEvent::Ignore;
    }
    if data == "[DONE]" {
        return SseEvent::Done;
    }

    let payload: Value = match serde_json::from_str(data) {
        Ok(value) => value,
        Err(err) => {
            tracing::debug!(error = %err, "skipping unparseable stream line");
            return SseEvent::Ignore;
        }
    };

    let Some(choice) = payload.get("choices").and_then(|v| v.get(0)) else {
        return SseEvent::Ignore;
    };

    if let Some(reason) = choice.get("finish_reason").and_then(|v| v.as_str()) {
        let reason = match reason {
            "stop" => FinishReason::Stop,
            "tool_calls" => FinishReason::ToolCalls,
            "length" => FinishReason::Length,
            _ => FinishReason::Other,
        };
        return SseEvent::Chunk(StreamChunk::Finish(reason));
    }

    let delta = choice
        .get("delta")
        .and_then(|v| v.get("content"))
        .and_then(|v| v.as_str())
        .unwrap_or_default();
    if delta.is_empty() {
        return SseEvent::Ignore;
    }
    SseEvent::Chunk(StreamChunk::Delta(delta.to_string()))
}

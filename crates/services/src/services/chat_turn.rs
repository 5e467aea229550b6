//! The chat turn pipeline: quota, chat resolution, context merge, provider
//! streaming and persistence.
//!
//! A turn is split in two halves. [`prepare_turn`] does every database write
//! that must happen regardless of how the stream goes (the inbound user
//! message is durable even if the model call dies) and registers the live
//! stream. [`stream_turn`] then drives the provider stream to completion,
//! fanning deltas out through the registry and persisting the assistant
//! message at the end.

use chrono::{Duration, Utc};
use db::models::chat::{Chat, ChatVisibility, CreateChat};
use db::models::chat_context::ChatContext;
use db::models::context::Context;
use db::models::message::{Attachment, CreateMessage, Message, MessagePart, MessageRole};
use db::models::stream_id::StreamId;
use llm::{
    ChatModel, CompletionProvider, CompletionRequest, FinishReason, ProviderMessage, StreamChunk,
};
use serde::Deserialize;
use sqlx::SqlitePool;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio_stream::StreamExt;
use ts_rs::TS;
use utils::text::truncate_chars;
use uuid::Uuid;

use crate::services::auth::Identity;
use crate::services::context_merge::{
    MergedContext, render_system_prompt, synthetic_context_message,
};
use crate::services::stream_registry::{StreamRegistry, TurnStreamEvent};

/// Upper bound on provider round-trips within one turn when the model keeps
/// ending segments with a tool-call finish.
pub const MAX_TOOL_STEPS: usize = 5;

pub const TITLE_MAX_CHARS: usize = 80;
const TITLE_TEMPERATURE: f32 = 0.3;

/// Generic client-facing failure text; the real error stays in the logs.
const STREAM_ERROR_MESSAGE: &str = "An error occurred, please try again!";

#[derive(Debug, Error)]
pub enum ChatTurnError {
    #[error("Daily message limit reached")]
    RateLimited,
    #[error("Not the owner of this chat")]
    Forbidden,
    #[error("Validation error: {0}")]
    Validation(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Deserialize, TS)]
pub struct ChatTurnRequest {
    /// Client-generated chat id. The first turn creates the chat under it.
    pub chat_id: Uuid,
    pub text: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub model: ChatModel,
    #[serde(default)]
    pub visibility: ChatVisibility,
    #[serde(default)]
    pub context_ids: Vec<Uuid>,
}

/// Everything a turn needs after the durable writes are done.
#[derive(Debug)]
pub struct PreparedTurn {
    pub chat: Chat,
    pub stream_id: Uuid,
    pub user_message: Message,
    pub request: CompletionRequest,
    pub receiver: broadcast::Receiver<TurnStreamEvent>,
}

/// Runs the pre-stream half of a turn: quota check, chat resolution (creating
/// it with a generated title on first contact), inbound message persistence,
/// context merge and stream registration.
///
/// The quota check runs before any write so a rejected turn leaves no rows
/// behind.
pub async fn prepare_turn(
    pool: &SqlitePool,
    provider: &dyn CompletionProvider,
    registry: &StreamRegistry,
    identity: &Identity,
    request: ChatTurnRequest,
) -> Result<PreparedTurn, ChatTurnError> {
    if request.text.trim().is_empty() {
        return Err(ChatTurnError::Validation(
            "message text must not be empty".to_string(),
        ));
    }

    let window_start = Utc::now() - Duration::hours(24);
    let sent = Message::count_for_user_since(pool, identity.user_id, window_start).await?;
    if sent >= identity.entitlements().max_messages_per_day {
        tracing::info!(user_id = %identity.user_id, sent, "daily message quota reached");
        return Err(ChatTurnError::RateLimited);
    }

    let chat = match Chat::find_by_id(pool, request.chat_id).await? {
        Some(chat) => {
            if chat.user_id != identity.user_id {
                return Err(ChatTurnError::Forbidden);
            }
            chat
        }
        None => {
            let title = generate_title(provider, &request.text).await;
            Chat::create(
                pool,
                &CreateChat {
                    user_id: identity.user_id,
                    title,
                    visibility: request.visibility,
                },
                request.chat_id,
            )
            .await?
        }
    };

    let history = Message::find_by_chat_id(pool, chat.id).await?;

    let user_message = Message::create(
        pool,
        &CreateMessage {
            chat_id: chat.id,
            role: MessageRole::User,
            parts: vec![MessagePart::text(request.text.clone())],
            attachments: request.attachments,
        },
        Uuid::new_v4(),
    )
    .await?;

    let contexts = Context::find_by_ids(pool, &request.context_ids).await?;
    let merged: Vec<MergedContext> = contexts.iter().map(MergedContext::from).collect();
    if !contexts.is_empty() {
        let ids: Vec<Uuid> = contexts.iter().map(|c| c.id).collect();
        // Audit-only linkage; a failure here never fails the turn.
        if let Err(err) = ChatContext::link(pool, chat.id, &ids).await {
            tracing::warn!(chat_id = %chat.id, error = %err, "failed to record chat contexts");
        }
    }

    let completion = build_completion_request(request.model, &merged, &history, &request.text);

    let stream_id = Uuid::new_v4();
    StreamId::create(pool, chat.id, stream_id).await?;
    let receiver = registry.register(stream_id);

    tracing::info!(
        chat_id = %chat.id,
        stream_id = %stream_id,
        contexts = contexts.len(),
        model = request.model.as_str(),
        "prepared chat turn"
    );

    Ok(PreparedTurn {
        chat,
        stream_id,
        user_message,
        request: completion,
        receiver,
    })
}

fn build_completion_request(
    model: ChatModel,
    contexts: &[MergedContext],
    history: &[Message],
    text: &str,
) -> CompletionRequest {
    let mut messages = Vec::with_capacity(history.len() + 2);
    if let Some(synthetic) = synthetic_context_message(contexts) {
        messages.push(ProviderMessage::user(synthetic));
    }
    for message in history {
        let content = message.text_content();
        if content.is_empty() {
            continue;
        }
        match message.role {
            MessageRole::User => messages.push(ProviderMessage::user(content)),
            MessageRole::Assistant => messages.push(ProviderMessage::assistant(content)),
            MessageRole::System => {}
        }
    }
    messages.push(ProviderMessage::user(text));

    CompletionRequest::new(model, messages).with_system(render_system_prompt(contexts))
}

/// Drives the provider stream to completion. Runs as its own task so the
/// initiating request can return immediately and clients follow along through
/// the registry.
///
/// Whatever assistant text accumulated is persisted even when the stream dies
/// midway; the client sees a generic error event and the partial text
/// survives in history.
pub async fn stream_turn(
    pool: SqlitePool,
    provider: std::sync::Arc<dyn CompletionProvider>,
    registry: StreamRegistry,
    chat_id: Uuid,
    stream_id: Uuid,
    mut request: CompletionRequest,
) {
    let message_id = Uuid::new_v4();
    registry.emit(stream_id, TurnStreamEvent::MessageStart { chat_id, message_id });

    let mut accumulated = String::new();

    'steps: for step in 0..MAX_TOOL_STEPS {
        let mut stream = match provider.stream(request.clone()).await {
            Ok(stream) => stream,
            Err(err) => {
                tracing::error!(chat_id = %chat_id, stream_id = %stream_id, error = %err, "provider stream failed to open");
                registry.emit(
                    stream_id,
                    TurnStreamEvent::Error {
                        message: STREAM_ERROR_MESSAGE.to_string(),
                    },
                );
                break 'steps;
            }
        };

        let mut segment = String::new();
        let mut finish = FinishReason::Stop;

        loop {
            match stream.next().await {
                Some(Ok(StreamChunk::Delta(text))) => {
                    segment.push_str(&text);
                    registry.emit(stream_id, TurnStreamEvent::Delta { text });
                }
                Some(Ok(StreamChunk::Finish(reason))) => {
                    finish = reason;
                    break;
                }
                Some(Err(err)) => {
                    tracing::error!(chat_id = %chat_id, stream_id = %stream_id, error = %err, "provider stream broke midway");
                    registry.emit(
                        stream_id,
                        TurnStreamEvent::Error {
                            message: STREAM_ERROR_MESSAGE.to_string(),
                        },
                    );
                    accumulated.push_str(&segment);
                    break 'steps;
                }
                None => break,
            }
        }

        accumulated.push_str(&segment);

        if finish == FinishReason::ToolCalls && step + 1 < MAX_TOOL_STEPS {
            // Feed the partial back and let the model continue.
            if !segment.is_empty() {
                request.messages.push(ProviderMessage::assistant(segment));
            }
            continue;
        }
        break;
    }

    if !accumulated.is_empty() {
        let result = Message::create(
            &pool,
            &CreateMessage {
                chat_id,
                role: MessageRole::Assistant,
                parts: vec![MessagePart::text(accumulated)],
                attachments: Vec::new(),
            },
            message_id,
        )
        .await;
        if let Err(err) = result {
            tracing::error!(chat_id = %chat_id, error = %err, "failed to persist assistant message");
        }
    }

    registry.finish(stream_id);
}

/// Title for a brand-new chat, derived from the first message. Provider
/// failure degrades to the message's first line.
async fn generate_title(provider: &dyn CompletionProvider, text: &str) -> String {
    let request = CompletionRequest::new(ChatModel::Title, vec![ProviderMessage::user(text)])
        .with_system(Some(
            "Summarize the user's message as a short chat title. Reply with the \
             title only: no quotes, no punctuation at the end, at most 80 \
             characters."
                .to_string(),
        ))
        .with_temperature(TITLE_TEMPERATURE);

    match provider.complete(request).await {
        Ok(title) if !title.trim().is_empty() => truncate_chars(title.trim(), TITLE_MAX_CHARS),
        Ok(_) => fallback_title(text),
        Err(err) => {
            tracing::warn!(error = %err, "title generation failed, falling back to first line");
            fallback_title(text)
        }
    }
}

fn fallback_title(text: &str) -> String {
    truncate_chars(text.lines().next().unwrap_or("New chat").trim(), TITLE_MAX_CHARS)
}

/// Owner-only chat delete; cascades take the messages and stream ids.
pub async fn delete_chat(
    pool: &SqlitePool,
    user_id: Uuid,
    chat_id: Uuid,
) -> Result<bool, ChatTurnError> {
    let Some(chat) = Chat::find_by_id(pool, chat_id).await? else {
        return Ok(false);
    };
    if !crate::services::authz::can_mutate(chat.user_id, user_id) {
        return Err(ChatTurnError::Forbidden);
    }
    Ok(Chat::delete(pool, chat_id).await? > 0)
}

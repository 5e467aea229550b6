//! Chat turn streaming, resume, delete and search endpoints.

use std::convert::Infallible;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json as ResponseJson, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use db::models::chat::{Chat, ChatVisibility};
use db::models::message::Attachment;
use db::models::stream_id::StreamId;
use futures::StreamExt;
use llm::ChatModel;
use serde::{Deserialize, Serialize};
use services::services::auth::Identity;
use services::services::chat_turn::{self, ChatTurnRequest};
use services::services::search::{self, ChatSearchResult};
use services::services::stream_registry::TurnStreamEvent;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use ts_rs::TS;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize, TS)]
pub struct ChatRequestBody {
    /// Client-generated chat id; first use creates the chat.
    pub id: Uuid,
    pub message: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub selected_chat_model: ChatModel,
    #[serde(default)]
    pub selected_visibility_type: ChatVisibility,
    #[serde(default)]
    pub context_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize, TS)]
pub struct ChatDeleteQuery {
    pub id: Uuid,
}

#[derive(Debug, Serialize, TS)]
pub struct DeletedResponse {
    pub deleted: bool,
}

#[derive(Debug, Deserialize, TS)]
pub struct ChatSearchQuery {
    pub q: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, TS)]
pub struct ChatSearchResponse {
    pub results: Vec<ChatSearchResult>,
}

fn sse_from_receiver(
    receiver: tokio::sync::broadcast::Receiver<TurnStreamEvent>,
) -> Sse<impl futures::Stream<Item = Result<Event, Infallible>>> {
    let stream = BroadcastStream::new(receiver).filter_map(|item| async move {
        match item {
            Ok(event) => Event::default().json_data(&event).ok().map(Ok),
            // A lagged reader skips ahead rather than terminating.
            Err(BroadcastStreamRecvError::Lagged(_)) => None,
        }
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

pub async fn post_chat(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(body): Json<ChatRequestBody>,
) -> Result<Response, ApiError> {
    let request = ChatTurnRequest {
        chat_id: body.id,
        text: body.message,
        attachments: body.attachments,
        model: body.selected_chat_model,
        visibility: body.selected_visibility_type,
        context_ids: body.context_ids,
    };

    let prepared = chat_turn::prepare_turn(
        &state.db.pool,
        state.provider.as_ref(),
        &state.registry,
        &identity,
        request,
    )
    .await?;

    tokio::spawn(chat_turn::stream_turn(
        state.db.pool.clone(),
        state.provider.clone(),
        state.registry.clone(),
        prepared.chat.id,
        prepared.stream_id,
        prepared.request,
    ));

    Ok(sse_from_receiver(prepared.receiver).into_response())
}

/// Best-effort resume of the latest in-flight stream for a chat. 204 when the
/// turn already completed (the client refetches history instead).
pub async fn resume_chat_stream(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(chat_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let Some(chat) = Chat::find_by_id(&state.db.pool, chat_id).await? else {
        return Err(ApiError::NotFound("chat"));
    };
    if chat.user_id != identity.user_id && chat.visibility != ChatVisibility::Public {
        return Err(ApiError::Forbidden("Not the owner of this chat".to_string()));
    }

    let Some(stream_row) = StreamId::find_latest_for_chat(&state.db.pool, chat_id).await? else {
        return Ok(StatusCode::NO_CONTENT.into_response());
    };
    match state.registry.subscribe(stream_row.id) {
        Some(receiver) => Ok(sse_from_receiver(receiver).into_response()),
        None => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

pub async fn delete_chat(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<ChatDeleteQuery>,
) -> Result<ResponseJson<ApiResponse<DeletedResponse>>, ApiError> {
    let deleted = chat_turn::delete_chat(&state.db.pool, identity.user_id, query.id).await?;
    Ok(ResponseJson(ApiResponse::success(DeletedResponse { deleted })))
}

pub async fn search_chats(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<ChatSearchQuery>,
) -> Result<ResponseJson<ApiResponse<ChatSearchResponse>>, ApiError> {
    let results = search::search_chats(
        &state.db.pool,
        identity.user_id,
        query.q.as_deref().unwrap_or_default(),
        query.limit,
    )
    .await?;
    Ok(ResponseJson(ApiResponse::success(ChatSearchResponse { results })))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/chat", post(post_chat).delete(delete_chat))
        .route("/chat/{id}/stream", get(resume_chat_stream))
        .route("/chat-search", get(search_chats))
}

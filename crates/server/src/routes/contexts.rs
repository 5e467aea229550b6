//! Context library endpoints: listing, generation, manual authoring, star
//! toggle, delete and import.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json as ResponseJson, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};
use services::services::auth::Identity;
use services::services::context_generator::{self, GenerateContextInput};
use services::services::library::{self, ContextFilter, ContextScope, CreateContextInput};
use ts_rs::TS;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::AppState;
use crate::error::ApiError;
use crate::routes::chat::DeletedResponse;

#[derive(Debug, Deserialize, TS)]
pub struct ContextListQuery {
    pub q: Option<String>,
    pub tag: Option<String>,
    #[serde(default)]
    pub mine: bool,
    #[serde(default)]
    pub starred: bool,
    #[serde(default)]
    pub with_meta: bool,
}

impl ContextListQuery {
    fn filter(&self) -> ContextFilter {
        let scope = if self.mine {
            ContextScope::Mine
        } else if self.starred {
            ContextScope::Starred
        } else {
            ContextScope::All
        };
        ContextFilter {
            query: self.q.clone(),
            tag: self.tag.clone(),
            scope: Some(scope),
        }
    }
}

#[derive(Debug, Serialize, TS)]
pub struct StarResponse {
    pub liked: bool,
}

#[derive(Debug, Deserialize, TS)]
pub struct ImportRequest {
    pub public_id: Uuid,
}

pub async fn list_contexts(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<ContextListQuery>,
) -> Result<Response, ApiError> {
    let filter = query.filter();
    if query.with_meta {
        let contexts =
            library::list_contexts_with_meta(&state.db.pool, identity.user_id, &filter).await?;
        Ok(ResponseJson(ApiResponse::success(contexts)).into_response())
    } else {
        let contexts = library::list_contexts(&state.db.pool, identity.user_id, &filter).await?;
        Ok(ResponseJson(ApiResponse::success(contexts)).into_response())
    }
}

pub async fn create_context(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(input): Json<CreateContextInput>,
) -> Result<Response, ApiError> {
    let context = library::create_context(&state.db.pool, identity.user_id, input).await?;
    Ok((StatusCode::CREATED, ResponseJson(ApiResponse::success(context))).into_response())
}

pub async fn generate_context(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(input): Json<GenerateContextInput>,
) -> Result<Response, ApiError> {
    let generated = context_generator::generate_context(
        &state.db.pool,
        state.provider.as_ref(),
        identity.user_id,
        input,
    )
    .await?;
    Ok((StatusCode::CREATED, ResponseJson(ApiResponse::success(generated))).into_response())
}

pub async fn toggle_star(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(context_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<StarResponse>>, ApiError> {
    let liked = library::toggle_star(&state.db.pool, identity.user_id, context_id).await?;
    Ok(ResponseJson(ApiResponse::success(StarResponse { liked })))
}

pub async fn delete_context(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(context_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<DeletedResponse>>, ApiError> {
    let deleted = library::delete_context(&state.db.pool, identity.user_id, context_id).await?;
    Ok(ResponseJson(ApiResponse::success(DeletedResponse { deleted })))
}

pub async fn import_context(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(request): Json<ImportRequest>,
) -> Result<Response, ApiError> {
    let context =
        library::import_public_context(&state.db.pool, identity.user_id, request.public_id)
            .await?;
    Ok((StatusCode::CREATED, ResponseJson(ApiResponse::success(context))).into_response())
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/contexts", get(list_contexts).post(create_context))
        .route("/contexts/generate", post(generate_context))
        .route("/contexts/import", post(import_context))
        .route("/contexts/{id}", axum::routing::patch(toggle_star).delete(delete_context))
}

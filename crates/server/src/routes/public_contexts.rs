//! Publishing surface: browse, publish and unpublish shared contexts.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json as ResponseJson, Response};
use axum::routing::get;
use axum::{Extension, Json, Router};
use serde::Deserialize;
use services::services::auth::Identity;
use services::services::library;
use ts_rs::TS;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize, TS)]
pub struct PublishRequest {
    pub context_id: Uuid,
}

pub async fn list_public_contexts(
    State(state): State<AppState>,
) -> Result<Response, ApiError> {
    let listings = library::list_public_contexts(&state.db.pool).await?;
    Ok(ResponseJson(ApiResponse::success(listings)).into_response())
}

pub async fn publish_context(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(request): Json<PublishRequest>,
) -> Result<Response, ApiError> {
    let listing =
        library::publish_context(&state.db.pool, identity.user_id, request.context_id).await?;
    Ok((StatusCode::CREATED, ResponseJson(ApiResponse::success(listing))).into_response())
}

pub async fn unpublish_context(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(public_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    library::unpublish_context(&state.db.pool, identity.user_id, public_id).await?;
    Ok(ResponseJson(ApiResponse::success(())))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/public-contexts",
            get(list_public_contexts).post(publish_context),
        )
        .route(
            "/public-contexts/{id}",
            axum::routing::delete(unpublish_context),
        )
}

pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;

use std::sync::Arc;

use axum::routing::get;
use axum::{Json, Router};
use db::DBService;
use llm::CompletionProvider;
use services::services::auth::SessionService;
use services::services::stream_registry::StreamRegistry;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utils::response::ApiResponse;

#[derive(Clone)]
pub struct AppState {
    pub db: DBService,
    pub provider: Arc<dyn CompletionProvider>,
    pub registry: StreamRegistry,
    pub sessions: SessionService,
}

impl AppState {
    pub fn new(db: DBService, provider: Arc<dyn CompletionProvider>) -> Self {
        Self {
            db,
            provider,
            registry: StreamRegistry::new(),
            sessions: SessionService::new(),
        }
    }
}

async fn health() -> Json<ApiResponse<&'static str>> {
    Json(ApiResponse::success("ok"))
}

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .merge(routes::chat::router())
        .merge(routes::contexts::router())
        .merge(routes::public_contexts::router())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_identity,
        ));

    Router::new()
        .route("/health", get(health))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use llm::{CompletionRequest, CompletionStream, FinishReason, ProviderError, StreamChunk};
    use serde_json::Value;
    use tower::ServiceExt;
    use uuid::Uuid;

    struct CannedProvider;

    #[async_trait]
    impl CompletionProvider for CannedProvider {
        async fn complete(&self, _request: CompletionRequest) -> Result<String, ProviderError> {
            Ok("A Chat Title".to_string())
        }

        async fn stream(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionStream, ProviderError> {
            Ok(Box::pin(futures::stream::iter(vec![
                Ok(StreamChunk::Delta("hello".to_string())),
                Ok(StreamChunk::Finish(FinishReason::Stop)),
            ])))
        }
    }

    async fn test_app() -> Router {
        let db = DBService::new_in_memory().await.unwrap();
        router(AppState::new(db, Arc::new(CannedProvider)))
    }

    fn authed(request: axum::http::request::Builder) -> axum::http::request::Builder {
        request
            .header(crate::middleware::USER_ID_HEADER, Uuid::new_v4().to_string())
            .header(crate::middleware::USER_EMAIL_HEADER, "a@example.com")
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_needs_no_identity() {
        let app = test_app().await;
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["success"], true);
    }

    #[tokio::test]
    async fn missing_identity_headers_are_unauthorized() {
        let app = test_app().await;
        let response = app
            .oneshot(Request::get("/contexts").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let json = body_json(response).await;
        assert_eq!(json["success"], false);
    }

    #[tokio::test]
    async fn malformed_user_id_is_unauthorized() {
        let app = test_app().await;
        let response = app
            .oneshot(
                Request::get("/contexts")
                    .header(crate::middleware::USER_ID_HEADER, "not-a-uuid")
                    .header(crate::middleware::USER_EMAIL_HEADER, "a@example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn authed_context_listing_starts_empty() {
        let app = test_app().await;
        let response = app
            .oneshot(authed(Request::get("/contexts")).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["data"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn context_create_and_delete_round_trip() {
        let app = test_app().await;
        let user_id = Uuid::new_v4();
        let with_user = |request: axum::http::request::Builder| {
            request
                .header(crate::middleware::USER_ID_HEADER, user_id.to_string())
                .header(crate::middleware::USER_EMAIL_HEADER, "a@example.com")
        };

        let response = app
            .clone()
            .oneshot(
                with_user(Request::post("/contexts"))
                    .header("content-type", "application/json")
                    .body(Body::from(
                        serde_json::json!({
                            "name": "Tutor",
                            "content": "be patient",
                            "tags": ["teaching"],
                        })
                        .to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = body_json(response).await;
        let id = created["data"]["id"].as_str().unwrap().to_string();

        let response = app
            .oneshot(
                with_user(Request::delete(format!("/contexts/{id}")))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["data"]["deleted"], true);
    }

    #[tokio::test]
    async fn deleting_a_missing_chat_reports_deleted_false() {
        let app = test_app().await;
        let response = app
            .oneshot(
                authed(Request::delete(format!("/chat?id={}", Uuid::new_v4())))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["data"]["deleted"], false);
    }

    #[tokio::test]
    async fn resume_on_unknown_chat_is_not_found() {
        let app = test_app().await;
        let response = app
            .oneshot(
                authed(Request::get(format!("/chat/{}/stream", Uuid::new_v4())))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}

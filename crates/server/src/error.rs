use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use services::services::chat_turn::ChatTurnError;
use services::services::context_generator::GeneratorError;
use services::services::library::LibraryError;
use thiserror::Error;
use utils::response::ApiResponse;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized")]
    Unauthorized,
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(String),
    #[error("Daily message limit reached")]
    RateLimited,
    #[error("Model returned invalid output, retry")]
    ModelOutput,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    /// Raw provider message and attempted model id, relayed to aid debugging
    /// of generation calls.
    #[error("{0}")]
    Provider(String),
}

impl From<GeneratorError> for ApiError {
    fn from(err: GeneratorError) -> Self {
        match err {
            GeneratorError::Validation(msg) => ApiError::BadRequest(msg),
            GeneratorError::InvalidModelOutput => ApiError::ModelOutput,
            GeneratorError::Provider { ref model, ref message } => {
                tracing::error!(%model, %message, "provider call failed");
                ApiError::Provider(err.to_string())
            }
            GeneratorError::Database(err) => ApiError::Database(err),
        }
    }
}

impl From<LibraryError> for ApiError {
    fn from(err: LibraryError) -> Self {
        match err {
            LibraryError::Forbidden => ApiError::Forbidden(err.to_string()),
            LibraryError::NotFound(what) => ApiError::NotFound(what),
            LibraryError::Validation(msg) => ApiError::BadRequest(msg),
            LibraryError::Database(err) => ApiError::Database(err),
        }
    }
}

impl From<ChatTurnError> for ApiError {
    fn from(err: ChatTurnError) -> Self {
        match err {
            ChatTurnError::RateLimited => ApiError::RateLimited,
            ChatTurnError::Forbidden => ApiError::Forbidden(err.to_string()),
            ChatTurnError::Validation(msg) => ApiError::BadRequest(msg),
            ChatTurnError::Database(err) => ApiError::Database(err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::ModelOutput => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Provider(_) => StatusCode::BAD_GATEWAY,
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let message = match &self {
            // Internal detail stays in the logs.
            ApiError::Database(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };

        (status, Json(ApiResponse::<()>::error(&message))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generator_provider_failure_keeps_model_and_raw_message() {
        let err: ApiError = GeneratorError::Provider {
            model: "chat-model".to_string(),
            message: "upstream 503: overloaded".to_string(),
        }
        .into();

        let rendered = err.to_string();
        assert!(rendered.contains("chat-model"));
        assert!(rendered.contains("upstream 503: overloaded"));
        assert!(matches!(err, ApiError::Provider(_)));
    }

    #[test]
    fn database_detail_is_hidden_from_clients() {
        let err = ApiError::Database(sqlx::Error::RowNotFound);
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

//! Gateway-trust identity middleware. Authentication itself happens upstream;
//! this layer turns the forwarded headers into an [`Identity`] extension and
//! makes sure the user row exists.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use uuid::Uuid;

use crate::AppState;
use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_EMAIL_HEADER: &str = "x-user-email";

pub async fn require_identity(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let headers = request.headers();

    // Missing or malformed headers reject uniformly; no hint which part failed.
    let user_id = headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v).ok())
        .ok_or(ApiError::Unauthorized)?;
    let email = headers
        .get(USER_EMAIL_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or(ApiError::Unauthorized)?
        .to_string();

    let identity = state
        .sessions
        .establish(&state.db.pool, user_id, &email)
        .await?;

    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}
